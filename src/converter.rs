use crate::artifact::{Artifact, ArtifactKind, ScratchDir};
use crate::config::AppConfig;
use crate::docx_processor::{PdfToDocx, TextFlowConverter};
use crate::image_processor::ImageProcessor;
use crate::office::{expected_pdf_path, DocumentSuite, LibreOffice};
use crate::pdf_processor::{PageRasterizer, PdfProcessor, PdfiumRasterizer, RENDER_DPI};
use crate::types::*;
use image::DynamicImage;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

/// The third-party engines behind each conversion.
#[derive(Clone)]
pub struct Engines {
    pub suite: Arc<dyn DocumentSuite>,
    pub pdf_to_docx: Arc<dyn PdfToDocx>,
    pub rasterizer: Arc<dyn PageRasterizer>,
}

impl Engines {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            suite: Arc::new(LibreOffice::new(&config.libreoffice_path, config.office_timeout)),
            pdf_to_docx: Arc::new(TextFlowConverter::new()),
            rasterizer: Arc::new(PdfiumRasterizer::new(config.pdfium_library_dir.clone())),
        }
    }
}

/// Runs the four conversion executors.
///
/// Each executor returns the result as an [`Artifact`]; the caller owns its
/// deletion. Every other artifact an executor allocates is released before it
/// returns, whatever the outcome.
pub struct ConversionService {
    scratch: ScratchDir,
    engines: Engines,
    image_processor: ImageProcessor,
}

impl ConversionService {
    pub fn new(scratch: ScratchDir, engines: Engines) -> Self {
        Self {
            scratch,
            engines,
            image_processor: ImageProcessor::new(),
        }
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    pub async fn pdf_to_docx(&self, upload: Upload) -> Result<Artifact, ConversionError> {
        validate_pdf(&upload)?;
        log::info!("Converting PDF to DOCX: {}", upload.stem());

        let input = self.scratch.file("pdf").map_err(io_failed("allocate input file"))?;
        let output = self.scratch.file("docx").map_err(io_failed("allocate output file"))?;
        tokio::fs::write(input.path(), &upload.data)
            .await
            .map_err(io_failed("save uploaded PDF"))?;

        let engine = Arc::clone(&self.engines.pdf_to_docx);
        run_blocking("PDF to DOCX", move || {
            engine.convert(input.path(), output.path())?;
            drop(input);
            if !output.exists() {
                return Err(ConversionError::failed("DOCX file was not created after conversion."));
            }
            Ok(output)
        })
        .await
    }

    pub async fn docx_to_pdf(&self, upload: Upload) -> Result<Artifact, ConversionError> {
        validate_docx(&upload)?;
        log::info!("Converting DOCX to PDF: {}", upload.stem());

        let input = self.scratch.file("docx").map_err(io_failed("allocate input file"))?;
        tokio::fs::write(input.path(), &upload.data)
            .await
            .map_err(io_failed("save uploaded DOCX"))?;

        // The suite names its output; own that path before it can appear.
        let expected = self.scratch.adopt(
            expected_pdf_path(input.path(), self.scratch.root()),
            ArtifactKind::File,
        );

        let produced = self
            .engines
            .suite
            .convert_docx_to_pdf(input.path(), self.scratch.root())
            .await?;

        let output = if produced == expected.path() {
            expected
        } else {
            self.scratch.adopt(produced, ArtifactKind::File)
        };
        if !output.exists() {
            return Err(ConversionError::failed(
                "PDF file was not created after conversion process.",
            ));
        }
        Ok(output)
    }

    pub async fn images_to_pdf(&self, uploads: Vec<Upload>) -> Result<Artifact, ConversionError> {
        self.image_processor.validate_uploads(&uploads)?;
        log::info!("Converting {} images to PDF", uploads.len());

        let scratch = self.scratch.clone();
        run_blocking("image to PDF", move || {
            let bytes = PdfProcessor::new().images_to_pdf(&uploads)?;
            let output = scratch.file("pdf").map_err(io_failed("allocate output file"))?;
            fs::write(output.path(), bytes).map_err(io_failed("write PDF"))?;
            Ok(output)
        })
        .await
    }

    pub async fn pdf_to_images(&self, upload: Upload) -> Result<Artifact, ConversionError> {
        validate_pdf(&upload)?;
        log::info!("Converting PDF to images: {}", upload.stem());

        let scratch = self.scratch.clone();
        let rasterizer = Arc::clone(&self.engines.rasterizer);
        let data = upload.data;

        run_blocking("PDF to image", move || {
            let pages_dir = scratch.dir().map_err(io_failed("create page directory"))?;
            let archive = scratch.file("zip").map_err(io_failed("allocate archive"))?;
            let images = ImageProcessor::new();

            let mut save_page = |index: usize, page: DynamicImage| {
                let path = pages_dir.path().join(format!("page_{}.png", index + 1));
                images.save_png(&page, &path)
            };
            let rendered = rasterizer.render_pages(&data, RENDER_DPI, &mut save_page)?;
            if rendered == 0 {
                return Err(ConversionError::failed("PDF contains no pages."));
            }

            let archived = archive_pages(pages_dir.path(), archive.path())?;
            log::info!("Archived {} rendered pages", archived);
            Ok(archive)
            // pages_dir drops here, on success and on every early return
        })
        .await
    }
}

fn validate_pdf(upload: &Upload) -> Result<(), ConversionError> {
    if upload.declared_type() != PDF_MIME {
        return Err(ConversionError::invalid_file(format!(
            "Invalid file type: {}. Only PDF files are accepted.",
            upload.declared_type()
        )));
    }
    Ok(())
}

fn validate_docx(upload: &Upload) -> Result<(), ConversionError> {
    if upload.declared_type() != DOCX_MIME {
        return Err(ConversionError::invalid_file(format!(
            "Invalid file type: {}. Only DOCX files are accepted.",
            upload.declared_type()
        )));
    }
    Ok(())
}

fn io_failed(action: &'static str) -> impl Fn(io::Error) -> ConversionError {
    move |e| ConversionError::failed(format!("Could not {}: {}", action, e))
}

/// Runs CPU-bound or blocking engine work on the blocking pool.
///
/// If the awaiting request is dropped the task still runs to completion; its
/// result, including any artifact, is then dropped and thereby released.
async fn run_blocking<T, F>(label: &'static str, task: F) -> Result<T, ConversionError>
where
    F: FnOnce() -> Result<T, ConversionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task).await.map_err(|e| {
        log::error!("{} task panicked: {}", label, e);
        ConversionError::failed(format!("{} conversion task failed: {}", label, e))
    })?
}

/// Zips every file in `dir` into `archive` with flat entry names, ordered by
/// page number.
fn archive_pages(dir: &Path, archive: &Path) -> Result<usize, ConversionError> {
    let zip_failed = |e: zip::result::ZipError| {
        ConversionError::failed(format!("Could not write archive: {}", e))
    };

    let mut pages: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_failed("read page directory"))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    pages.sort_by_key(|path| page_ordinal(path));

    let file = File::create(archive).map_err(io_failed("create archive"))?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for page in &pages {
        let name = page
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        zip.start_file(name, options).map_err(zip_failed)?;
        let mut source = File::open(page).map_err(io_failed("open rendered page"))?;
        io::copy(&mut source, &mut zip).map_err(io_failed("copy rendered page"))?;
    }
    zip.finish().map_err(zip_failed)?;

    Ok(pages.len())
}

/// Sort key: the number in `page_<n>.png`, then the name itself.
fn page_ordinal(path: &Path) -> (usize, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let number = stem
        .strip_prefix("page_")
        .and_then(|n| n.parse().ok())
        .unwrap_or(usize::MAX);
    (number, stem)
}
