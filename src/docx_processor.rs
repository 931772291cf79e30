//! PDF → DOCX engine.
//!
//! The text-flow engine re-flows the text layer of each PDF page into Word
//! paragraphs, with a hard page break between source pages. Layout, images
//! and fonts are not carried over.

use crate::types::*;
use docx_rs::{BreakType, Docx, Paragraph, Run};
use std::fs::File;
use std::path::Path;

pub trait PdfToDocx: Send + Sync {
    /// Reads the PDF at `pdf` and writes a DOCX document to `docx`.
    fn convert(&self, pdf: &Path, docx: &Path) -> Result<(), ConversionError>;
}

pub struct TextFlowConverter;

impl TextFlowConverter {
    pub fn new() -> Self {
        Self
    }

    /// Extract per-page text. pdf-extract can panic on malformed fonts, so
    /// the call is isolated with `catch_unwind`.
    pub fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ConversionError> {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(bytes)
        })) {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(ConversionError::failed(format!(
                "PDF text extraction failed: {}",
                e
            ))),
            Err(_panic) => {
                log::error!("PDF text extraction panicked - likely malformed fonts");
                Err(ConversionError::failed(
                    "PDF text extraction panicked - likely contains malformed fonts",
                ))
            }
        }
    }

    pub fn build_docx(&self, pages: &[String]) -> Docx {
        let mut docx = Docx::new();

        for (index, page) in pages.iter().enumerate() {
            if index > 0 {
                let page_break = Run::new().add_break(BreakType::Page);
                docx = docx.add_paragraph(Paragraph::new().add_run(page_break));
            }

            let mut previous_blank = true;
            for line in page.lines().map(str::trim_end) {
                let blank = line.trim().is_empty();
                // collapse runs of blank lines
                if blank && previous_blank {
                    continue;
                }
                previous_blank = blank;
                docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(line)));
            }
        }

        docx
    }
}

impl Default for TextFlowConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfToDocx for TextFlowConverter {
    fn convert(&self, pdf: &Path, docx: &Path) -> Result<(), ConversionError> {
        let bytes = std::fs::read(pdf)
            .map_err(|e| ConversionError::failed(format!("Failed to read PDF file: {}", e)))?;
        let pages = self.extract_pages(&bytes)?;
        log::debug!("Extracted text from {} pages of {}", pages.len(), pdf.display());

        let file = File::create(docx)
            .map_err(|e| ConversionError::failed(format!("Failed to create DOCX file: {}", e)))?;
        self.build_docx(&pages)
            .build()
            .pack(file)
            .map_err(|e| ConversionError::failed(format!("Failed to write DOCX file: {}", e)))?;
        Ok(())
    }
}
