use crate::image_processor::{ImageProcessor, A4_HEIGHT, A4_WIDTH};
use crate::types::*;
use flate2::{write::ZlibEncoder, Compression};
use image::{DynamicImage, GenericImageView};
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref};
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::PathBuf;

/// Resolution at which PDF pages are rasterised.
pub const RENDER_DPI: u32 = 200;

const IMAGE_NAME: Name<'static> = Name(b"Im0");

/// Engine that turns PDF pages into bitmaps.
///
/// Pages are handed to `on_page` one at a time, in document order, with their
/// zero-based index, so only one rendered page needs to live in memory.
/// Returns the number of pages rendered.
pub trait PageRasterizer: Send + Sync {
    fn render_pages(
        &self,
        pdf: &[u8],
        dpi: u32,
        on_page: &mut dyn FnMut(usize, DynamicImage) -> Result<(), ConversionError>,
    ) -> Result<usize, ConversionError>;
}

/// Renders through the pdfium shared library.
pub struct PdfiumRasterizer {
    library_dir: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn bind(&self) -> Result<Pdfium, ConversionError> {
        let bindings = match &self.library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ConversionError::failed(format!("pdfium library unavailable: {:?}", e)))?;

        Ok(Pdfium::new(bindings))
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn render_pages(
        &self,
        pdf: &[u8],
        dpi: u32,
        on_page: &mut dyn FnMut(usize, DynamicImage) -> Result<(), ConversionError>,
    ) -> Result<usize, ConversionError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| ConversionError::failed(format!("Failed to load PDF: {:?}", e)))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
        let mut rendered = 0;

        for (index, page) in document.pages().iter().enumerate() {
            let bitmap = page.render_with_config(&config).map_err(|e| {
                ConversionError::failed(format!(
                    "Rasterisation failed for page {}: {:?}",
                    index + 1,
                    e
                ))
            })?;
            let image = bitmap.as_image();
            log::debug!("Rendered page {} → {}x{} px", index + 1, image.width(), image.height());

            on_page(index, image)?;
            rendered += 1;
        }

        Ok(rendered)
    }
}

pub struct PdfProcessor {
    image_processor: ImageProcessor,
}

impl PdfProcessor {
    pub fn new() -> Self {
        Self {
            image_processor: ImageProcessor::new(),
        }
    }

    /// Build a PDF with one A4 page per image, each scaled to fit and centred.
    pub fn images_to_pdf(&self, uploads: &[Upload]) -> Result<Vec<u8>, ConversionError> {
        let mut alloc = Ref::new(1);
        let catalog_id = alloc.bump();
        let page_tree_id = alloc.bump();

        let mut pdf = Pdf::new();
        let mut page_ids = Vec::with_capacity(uploads.len());

        for (index, upload) in uploads.iter().enumerate() {
            let img = self.image_processor.decode(&upload.data).map_err(|e| {
                ConversionError::failed(format!(
                    "Image {} ({}): {}",
                    index + 1,
                    upload.file_name.as_deref().unwrap_or("unnamed"),
                    e
                ))
            })?;
            let placement = self.image_processor.fit_to_a4(&img);
            let (width, height) = img.dimensions();

            let page_id = alloc.bump();
            let content_id = alloc.bump();
            let image_id = alloc.bump();
            let mask_id = img.color().has_alpha().then(|| alloc.bump());

            let rgb = deflate(img.to_rgb8().as_raw())?;
            let mut image = pdf.image_xobject(image_id, &rgb);
            image.filter(Filter::FlateDecode);
            image.width(width as i32);
            image.height(height as i32);
            image.color_space().device_rgb();
            image.bits_per_component(8);
            if let Some(mask_id) = mask_id {
                image.s_mask(mask_id);
            }
            image.finish();

            if let Some(mask_id) = mask_id {
                let alpha: Vec<u8> = img.to_rgba8().pixels().map(|p| p.0[3]).collect();
                let alpha = deflate(&alpha)?;
                let mut mask = pdf.image_xobject(mask_id, &alpha);
                mask.filter(Filter::FlateDecode);
                mask.width(width as i32);
                mask.height(height as i32);
                mask.color_space().device_gray();
                mask.bits_per_component(8);
                mask.finish();
            }

            let mut page = pdf.page(page_id);
            page.media_box(Rect::new(0.0, 0.0, A4_WIDTH, A4_HEIGHT));
            page.parent(page_tree_id);
            page.contents(content_id);
            page.resources().x_objects().pair(IMAGE_NAME, image_id);
            page.finish();

            let mut content = Content::new();
            content.save_state();
            content.transform([
                placement.width,
                0.0,
                0.0,
                placement.height,
                placement.x,
                placement.y,
            ]);
            content.x_object(IMAGE_NAME);
            content.restore_state();
            pdf.stream(content_id, &content.finish());

            log::debug!(
                "Placed image {} ({}x{} px) at scale {:.4}",
                index + 1,
                width,
                height,
                placement.scale
            );
            page_ids.push(page_id);
        }

        pdf.catalog(catalog_id).pages(page_tree_id);
        pdf.pages(page_tree_id)
            .kids(page_ids.iter().copied())
            .count(page_ids.len() as i32);

        let bytes = pdf.finish();
        log::info!("Created PDF from {} images: {} bytes", uploads.len(), bytes.len());
        Ok(bytes)
    }
}

impl Default for PdfProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, ConversionError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let compress_failed = |e: std::io::Error| {
        ConversionError::failed(format!("Image compression failed: {}", e))
    };
    encoder.write_all(data).map_err(compress_failed)?;
    encoder.finish().map_err(compress_failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use lopdf::content::Content;
    use lopdf::{Document, Object};
    use std::io::Cursor;

    fn encoded(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    fn number(object: &Object) -> f32 {
        match object {
            Object::Integer(i) => *i as f32,
            Object::Real(r) => *r as f32,
            other => panic!("expected a number, got {:?}", other),
        }
    }

    fn media_box(doc: &Document, page: lopdf::ObjectId) -> Vec<f32> {
        let dict = doc.get_dictionary(page).unwrap();
        dict.get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(number)
            .collect()
    }

    /// Operands of the `cm` operator that places the image on `page`.
    fn image_matrix(doc: &Document, page: lopdf::ObjectId) -> Vec<f32> {
        let content = Content::decode(&doc.get_page_content(page).unwrap()).unwrap();
        let cm = content
            .operations
            .iter()
            .find(|op| op.operator == "cm")
            .expect("page content has no cm operator");
        cm.operands.iter().map(number).collect()
    }

    #[test]
    fn one_a4_page_per_image() {
        let png = encoded(DynamicImage::new_rgb8(300, 200), ImageFormat::Png);
        let gif = encoded(DynamicImage::new_rgba8(20, 80), ImageFormat::Gif);
        let bmp = encoded(DynamicImage::new_rgb8(64, 64), ImageFormat::Bmp);
        let uploads = vec![
            Upload::new("a.png", "image/png", png),
            Upload::new("b.gif", "image/gif", gif),
            Upload::new("c.bmp", "image/bmp", bmp),
        ];

        let bytes = PdfProcessor::new().images_to_pdf(&uploads).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages = doc.get_pages();

        assert_eq!(pages.len(), 3);
        for (_, page_id) in pages {
            assert_eq!(media_box(&doc, page_id), vec![0.0, 0.0, A4_WIDTH, A4_HEIGHT]);
        }
    }

    #[test]
    fn images_are_centred_and_scaled_uniformly_on_the_page() {
        let sizes = [(300u32, 100u32), (100, 400)];
        let uploads: Vec<Upload> = sizes
            .iter()
            .map(|&(w, h)| {
                let png = encoded(DynamicImage::new_rgb8(w, h), ImageFormat::Png);
                Upload::new(format!("{}x{}.png", w, h), "image/png", png)
            })
            .collect();

        let bytes = PdfProcessor::new().images_to_pdf(&uploads).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        let pages: Vec<_> = doc.get_pages().into_values().collect();
        assert_eq!(pages.len(), sizes.len());

        for (&(w, h), page) in sizes.iter().zip(pages) {
            let m = image_matrix(&doc, page);
            let (width, height, x, y) = (m[0], m[3], m[4], m[5]);

            assert_eq!((m[1], m[2]), (0.0, 0.0), "image must not be skewed");
            assert!((width / height - w as f32 / h as f32).abs() < 1e-3);
            assert!((2.0 * x + width - A4_WIDTH).abs() < 0.01, "not centred horizontally");
            assert!((2.0 * y + height - A4_HEIGHT).abs() < 0.01, "not centred vertically");
            assert!(width <= A4_WIDTH + 0.01 && height <= A4_HEIGHT + 0.01);
            // One side touches the page edge.
            assert!((width - A4_WIDTH).abs() < 0.01 || (height - A4_HEIGHT).abs() < 0.01);
        }
    }

    #[test]
    fn transparent_images_get_a_soft_mask() {
        let mut img = RgbaImage::new(4, 4);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 10]));
        let png = encoded(DynamicImage::ImageRgba8(img), ImageFormat::Png);

        let bytes = PdfProcessor::new()
            .images_to_pdf(&[Upload::new("t.png", "image/png", png)])
            .unwrap();
        let doc = Document::load_mem(&bytes).unwrap();

        let has_mask = doc.objects.values().any(|object| match object {
            Object::Stream(stream) => stream.dict.has(b"SMask"),
            _ => false,
        });
        assert!(has_mask);
    }

    #[test]
    fn undecodable_image_names_the_offender() {
        let uploads = vec![Upload::new("broken.jpg", "image/jpeg", b"\xff\xd8 nope".to_vec())];
        match PdfProcessor::new().images_to_pdf(&uploads) {
            Err(ConversionError::ConversionFailed { details }) => {
                assert!(details.contains("broken.jpg"))
            }
            other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
        }
    }
}
