use crate::types::*;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// A4 size in points (72 DPI)
pub const A4_WIDTH: f32 = 595.0;
pub const A4_HEIGHT: f32 = 842.0;

/// Where an image lands on a page, in PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub scale: f32,
}

pub struct ImageProcessor;

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Every upload must declare one of the accepted image types, and there
    /// must be at least one.
    pub fn validate_uploads(&self, uploads: &[Upload]) -> Result<(), ConversionError> {
        if uploads.is_empty() {
            return Err(ConversionError::invalid_file("No files were uploaded."));
        }
        for upload in uploads {
            if !IMAGE_MIMES.contains(&upload.declared_type()) {
                return Err(ConversionError::invalid_file(format!(
                    "Invalid file type: {}. Only images are accepted.",
                    upload.declared_type()
                )));
            }
        }
        Ok(())
    }

    pub fn decode(&self, content: &[u8]) -> Result<DynamicImage, ConversionError> {
        image::load_from_memory(content)
            .map_err(|e| ConversionError::failed(format!("Could not decode image: {}", e)))
    }

    /// Scale an image uniformly so it fits inside the page, then centre it.
    pub fn fit_to_page(
        &self,
        img_width: u32,
        img_height: u32,
        page_width: f32,
        page_height: f32,
    ) -> Placement {
        let scale = (page_width / img_width as f32).min(page_height / img_height as f32);
        let width = img_width as f32 * scale;
        let height = img_height as f32 * scale;

        Placement {
            x: (page_width - width) / 2.0,
            y: (page_height - height) / 2.0,
            width,
            height,
            scale,
        }
    }

    /// Placement on an A4 page for a decoded image.
    pub fn fit_to_a4(&self, img: &DynamicImage) -> Placement {
        let (width, height) = img.dimensions();
        self.fit_to_page(width, height, A4_WIDTH, A4_HEIGHT)
    }

    /// Encode image as PNG
    pub fn encode_png(&self, img: &DynamicImage) -> Result<Vec<u8>, ConversionError> {
        let mut output = Vec::new();
        img.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
            .map_err(|e| ConversionError::failed(format!("PNG encoding failed: {}", e)))?;
        Ok(output)
    }

    pub fn save_png(&self, img: &DynamicImage, path: &Path) -> Result<(), ConversionError> {
        img.save_with_format(path, ImageFormat::Png).map_err(|e| {
            ConversionError::failed(format!("Could not write {}: {}", path.display(), e))
        })
    }
}

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}
