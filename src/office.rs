//! DOCX → PDF through a headless office suite.
//!
//! The suite is an external process. It is spawned with `kill_on_drop`, so a
//! timeout or a dropped request future terminates it. Each run gets its own
//! user profile directory; LibreOffice refuses to start a second instance on a
//! profile that is already in use.

use crate::artifact::{Artifact, ScratchDir};
use crate::types::*;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use url::Url;

#[async_trait]
pub trait DocumentSuite: Send + Sync {
    /// Converts `input` into a PDF placed in `out_dir` and returns its path.
    async fn convert_docx_to_pdf(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf, ConversionError>;
}

/// Path at which LibreOffice writes its output: the input's file stem with a
/// `.pdf` extension, inside `out_dir`.
pub fn expected_pdf_path(input: &Path, out_dir: &Path) -> PathBuf {
    let mut name = input.file_stem().unwrap_or(input.as_os_str()).to_os_string();
    name.push(".pdf");
    out_dir.join(name)
}

pub struct LibreOffice {
    executable: PathBuf,
    timeout: Duration,
}

impl LibreOffice {
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
        }
    }

    fn command(&self, input: &Path, out_dir: &Path, profile: &Url) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg("pdf")
            .arg("--outdir")
            .arg(out_dir)
            .arg(input)
            .arg(format!("-env:UserInstallation={}", profile))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Allocates a fresh profile directory under `out_dir` and returns its guard
/// together with the `file://` URL LibreOffice expects.
fn user_profile(out_dir: &Path) -> Result<(Artifact, Url), ConversionError> {
    let profile = ScratchDir::new(out_dir).dir().map_err(|e| {
        ConversionError::failed(format!("Could not create LibreOffice profile: {}", e))
    })?;
    let absolute = profile.path().canonicalize().map_err(|e| {
        ConversionError::failed(format!("Could not resolve LibreOffice profile: {}", e))
    })?;
    let url = Url::from_directory_path(&absolute).map_err(|_| {
        ConversionError::failed(format!(
            "Profile path is not a valid file URL: {}",
            absolute.display()
        ))
    })?;
    Ok((profile, url))
}

#[async_trait]
impl DocumentSuite for LibreOffice {
    async fn convert_docx_to_pdf(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf, ConversionError> {
        // Released when this call returns, on every path.
        let (_profile, profile_url) = user_profile(out_dir)?;

        let child = self.command(input, out_dir, &profile_url).spawn().map_err(|e| {
            ConversionError::failed(format!(
                "Failed to start LibreOffice ({}): {}",
                self.executable.display(),
                e
            ))
        })?;

        log::info!("LibreOffice started for {}", input.display());

        // Dropping the future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                ConversionError::failed(format!("LibreOffice did not complete: {}", e))
            })?,
            Err(_) => {
                log::warn!(
                    "LibreOffice timed out after {:?} on {}",
                    self.timeout,
                    input.display()
                );
                return Err(ConversionError::failed(format!(
                    "LibreOffice conversion timed out after {} seconds",
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                "Unknown LibreOffice error.".to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(ConversionError::failed(format!(
                "LibreOffice conversion failed ({}): {}",
                output.status, message
            )));
        }

        log::debug!(
            "LibreOffice stdout: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );

        let pdf_path = expected_pdf_path(input, out_dir);
        if !pdf_path.exists() {
            return Err(ConversionError::failed(
                "PDF file was not created after conversion process.",
            ));
        }
        Ok(pdf_path)
    }
}
