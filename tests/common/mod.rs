#![allow(dead_code)]

use async_trait::async_trait;
use file_converter_api::docx_processor::PdfToDocx;
use file_converter_api::office::{expected_pdf_path, DocumentSuite, LibreOffice};
use file_converter_api::pdf_processor::{PageRasterizer, PdfProcessor};
use file_converter_api::{ConversionError, ConversionService, Engines, ScratchDir, Upload};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DOCX_BYTES: &[u8] = b"PK fake docx";

/// Stands in for the PDF → DOCX engine.
#[derive(Default)]
pub struct FakeDocx {
    pub calls: AtomicUsize,
    pub fail_with: Option<String>,
}

impl PdfToDocx for FakeDocx {
    fn convert(&self, pdf: &Path, docx: &Path) -> Result<(), ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(pdf.exists(), "input artifact must be written before the engine runs");
        // Partial output first, so failure paths have something to clean.
        std::fs::write(docx, DOCX_BYTES).unwrap();
        match &self.fail_with {
            Some(message) => Err(ConversionError::failed(message.clone())),
            None => Ok(()),
        }
    }
}

/// Renders one blank page per page object found by lopdf.
#[derive(Default)]
pub struct FakeRasterizer {
    pub calls: AtomicUsize,
    pub fail_on_page: Option<usize>,
    pub delay: Option<Duration>,
}

impl PageRasterizer for FakeRasterizer {
    fn render_pages(
        &self,
        pdf: &[u8],
        dpi: u32,
        on_page: &mut dyn FnMut(usize, DynamicImage) -> Result<(), ConversionError>,
    ) -> Result<usize, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(dpi, 200);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let doc = lopdf::Document::load_mem(pdf)
            .map_err(|e| ConversionError::failed(format!("Failed to load PDF: {}", e)))?;
        let pages = doc.get_pages().len();
        for index in 0..pages {
            if self.fail_on_page == Some(index + 1) {
                return Err(ConversionError::failed(format!("page {} exploded", index + 1)));
            }
            on_page(index, DynamicImage::new_rgb8(8, 8))?;
        }
        Ok(pages)
    }
}

/// Writes the suite's output, then fails: the executor must still clean up.
#[derive(Default)]
pub struct HalfWrittenSuite {
    pub calls: AtomicUsize,
}

#[async_trait]
impl DocumentSuite for HalfWrittenSuite {
    async fn convert_docx_to_pdf(
        &self,
        input: &Path,
        out_dir: &Path,
    ) -> Result<PathBuf, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(expected_pdf_path(input, out_dir), b"%PDF-1.4 trunc")
            .await
            .unwrap();
        Err(ConversionError::failed("LibreOffice crashed mid-write"))
    }
}

pub struct Fakes {
    pub suite: Arc<dyn DocumentSuite>,
    pub docx: Arc<FakeDocx>,
    pub rasterizer: Arc<FakeRasterizer>,
}

impl Fakes {
    pub fn new() -> Self {
        Self {
            suite: Arc::new(HalfWrittenSuite::default()),
            docx: Arc::new(FakeDocx::default()),
            rasterizer: Arc::new(FakeRasterizer::default()),
        }
    }

    pub fn with_suite(mut self, suite: Arc<dyn DocumentSuite>) -> Self {
        self.suite = suite;
        self
    }

    pub fn with_docx(mut self, docx: FakeDocx) -> Self {
        self.docx = Arc::new(docx);
        self
    }

    pub fn with_rasterizer(mut self, rasterizer: FakeRasterizer) -> Self {
        self.rasterizer = Arc::new(rasterizer);
        self
    }

    pub fn engines(&self) -> Engines {
        Engines {
            suite: self.suite.clone(),
            pdf_to_docx: self.docx.clone(),
            rasterizer: self.rasterizer.clone(),
        }
    }

    pub fn service(&self, scratch: &Path) -> ConversionService {
        ConversionService::new(ScratchDir::new(scratch), self.engines())
    }
}

/// A shell script standing in for the office binary. Its arguments are
/// `--headless --convert-to pdf --outdir DIR INPUT PROFILE`.
#[cfg(unix)]
pub fn fake_office(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-soffice");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[cfg(unix)]
pub fn script_suite(dir: &Path, body: &str) -> Arc<dyn DocumentSuite> {
    Arc::new(LibreOffice::new(fake_office(dir, body), Duration::from_secs(10)))
}

pub const WRITE_PDF_SCRIPT: &str =
    r#"stem=$(basename "$6" .docx); printf '%%PDF-1.4 converted' > "$5/$stem.pdf""#;

pub fn encoded(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), format).unwrap();
    out
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    encoded(DynamicImage::new_rgb8(width, height), ImageFormat::Png)
}

/// A real PDF with `pages` pages.
pub fn pdf_with_pages(pages: usize) -> Vec<u8> {
    let uploads: Vec<Upload> = (0..pages)
        .map(|i| Upload::new(format!("{}.png", i), "image/png", png(10 + i as u32, 20)))
        .collect();
    PdfProcessor::new().images_to_pdf(&uploads).unwrap()
}

pub fn scratch_entries(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect()
}

pub fn zip_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
