//! Temporary artifacts on scratch storage.
//!
//! Every file or directory a conversion touches is allocated here under a
//! fresh UUIDv4 name and wrapped in an [`Artifact`] guard. Dropping the guard
//! deletes the path, so cleanup runs on normal return, on `?`, on panic
//! unwinding and when a future is dropped mid-flight. The one artifact that
//! outlives an executor (its result) is moved into the response body and
//! deleted when the transport drops that body.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    File,
    Directory,
}

/// Root of all per-job artifacts. Cheap to clone; the directory itself is
/// never removed by the service.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: Arc<PathBuf>,
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reserves a uniquely named path under the root. Directories are created
    /// immediately; files are left for the caller to write.
    pub fn allocate(&self, kind: ArtifactKind, extension: Option<&str>) -> io::Result<Artifact> {
        let id = Uuid::new_v4();
        let name = match extension {
            Some(ext) => format!("{}.{}", id, ext.trim_start_matches('.')),
            None => id.to_string(),
        };
        let path = self.root.join(name);

        if kind == ArtifactKind::Directory {
            fs::create_dir(&path)?;
        }

        log::debug!("Allocated {:?} artifact {}", kind, path.display());
        Ok(Artifact { path, kind })
    }

    pub fn file(&self, extension: &str) -> io::Result<Artifact> {
        self.allocate(ArtifactKind::File, Some(extension))
    }

    pub fn dir(&self) -> io::Result<Artifact> {
        self.allocate(ArtifactKind::Directory, None)
    }

    /// Takes ownership of a path an external engine will write, so it is
    /// released on every exit path even though this service did not name it.
    pub fn adopt(&self, path: impl Into<PathBuf>, kind: ArtifactKind) -> Artifact {
        Artifact {
            path: path.into(),
            kind,
        }
    }

    /// Removes artifacts under the root whose last modification is older than
    /// `max_age`. Entries not named like an allocated artifact are left alone.
    /// Returns how many were removed.
    pub fn sweep(&self, max_age: Duration) -> io::Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in fs::read_dir(self.root.as_path())? {
            let entry = entry?;
            if !is_artifact_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            let kind = if metadata.is_dir() {
                ArtifactKind::Directory
            } else {
                ArtifactKind::File
            };
            match release(&entry.path(), kind) {
                Ok(()) => removed += 1,
                Err(e) => log::warn!("Could not sweep {}: {}", entry.path().display(), e),
            }
        }

        Ok(removed)
    }
}

/// True for `<uuid>` and `<uuid>.<ext>`, the only names this module hands out.
fn is_artifact_name(name: &str) -> bool {
    let id = name.split('.').next().unwrap_or_default();
    Uuid::parse_str(id).is_ok()
}

/// Deletes `path`, recursively for directories. Absent paths are not an error,
/// so releasing twice is harmless.
pub fn release(path: &Path, kind: ArtifactKind) -> io::Result<()> {
    let result = match kind {
        ArtifactKind::File => fs::remove_file(path),
        ArtifactKind::Directory => fs::remove_dir_all(path),
    };
    match result {
        Ok(()) => {
            log::debug!("Released artifact {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Owning handle to one artifact. The path is released when the handle drops.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    kind: ArtifactKind,
}

impl Artifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Releases now instead of at drop, surfacing the I/O error.
    pub fn release(self) -> io::Result<()> {
        release(&self.path, self.kind)
        // Drop runs afterwards and finds nothing to delete.
    }
}

impl AsRef<Path> for Artifact {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        if let Err(e) = release(&self.path, self.kind) {
            log::warn!("Failed to release artifact {}: {}", self.path.display(), e);
        }
    }
}

/// Periodically sweeps stale entries out of the scratch root. Runs until the
/// runtime shuts down.
pub async fn sweep_loop(scratch: ScratchDir, max_age: Duration, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let scratch = scratch.clone();
        match tokio::task::spawn_blocking(move || scratch.sweep(max_age)).await {
            Ok(Ok(0)) => {}
            Ok(Ok(count)) => log::info!("🧹 Swept {} stale artifacts", count),
            Ok(Err(e)) => log::warn!("Scratch sweep failed: {}", e),
            Err(e) => log::error!("Scratch sweep task panicked: {}", e),
        }
    }
}
