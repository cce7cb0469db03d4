use crate::image_processor::ImageProcessor;
use crate::page_range::parse_page_ranges;
use crate::pdf_processor::{JpegPage, PdfProcessor};
use crate::raster::RasterCapability;
use crate::storage::Scratch;
use crate::types::*;
use crate::upload::UploadedFile;
use image::DynamicImage;
use std::io::{Cursor, Write};
use std::path::PathBuf;

const DEGRADED_WARNING: &str = "Aggressive compression needs PDF rasterization (PDFium) on server; \
returned best-effort structural optimization result.";

/// How far the PDF compression cascade had to go.
#[derive(Debug)]
pub enum PdfCompression {
    /// The structural pass alone met the target.
    Optimized(Vec<u8>),
    /// Pages were rendered and recompressed as JPEG.
    Rasterized(Vec<u8>),
    /// Target missed and no rasterizer is available; `optimized` is the
    /// structural result.
    Degraded { optimized: Vec<u8>, size_kb: u64 },
}

pub struct DocumentConverter {
    upload_root: PathBuf,
    raster: RasterCapability,
    raster_dpi: u16,
    image_processor: ImageProcessor,
    pdf_processor: PdfProcessor,
}

impl DocumentConverter {
    pub fn new(upload_root: impl Into<PathBuf>, raster: RasterCapability, raster_dpi: u16) -> Self {
        Self {
            upload_root: upload_root.into(),
            raster,
            raster_dpi,
            image_processor: ImageProcessor::new(),
            pdf_processor: PdfProcessor::new(),
        }
    }

    pub fn raster(&self) -> &RasterCapability {
        &self.raster
    }

    // === PDF OPERATIONS ===

    /// Merge every uploaded PDF in upload order. Files without a `.pdf`
    /// extension are skipped.
    pub fn merge(&self, inputs: &[&UploadedFile]) -> Result<ConvertedFile, ConversionError> {
        let scratch = Scratch::create(&self.upload_root)?;
        let mut documents = Vec::new();

        for input in inputs {
            if !input.is_allowed(ALLOWED_PDF_EXTENSIONS) {
                log::warn!("Skipping non-PDF upload in merge: {}", input.file_name);
                continue;
            }
            let path = scratch.persist(&input.file_name, &input.content)?;
            documents.push(self.pdf_processor.load(&path)?);
        }

        if documents.is_empty() {
            return Err(ConversionError::validation("No PDFs"));
        }

        log::info!("Merging {} PDFs", documents.len());
        let merged = self.pdf_processor.merge(documents)?;
        Ok(ConvertedFile::new("merged.pdf", "application/pdf", merged))
    }

    /// Keep the pages named by `ranges`, in the order given.
    pub fn split(
        &self,
        input: Option<&UploadedFile>,
        ranges: &str,
    ) -> Result<ConvertedFile, ConversionError> {
        let scratch = Scratch::create(&self.upload_root)?;
        let path = self.stage_pdf(input, &scratch)?;
        let doc = self.pdf_processor.load(&path)?;

        let total = self.pdf_processor.page_count(&doc);
        let selected = parse_page_ranges(ranges.trim(), total);
        if selected.is_empty() {
            log::warn!("Split selection {:?} matched none of {} pages", ranges, total);
            return Err(ConversionError::validation("No pages selected"));
        }

        log::info!("Splitting {} of {} pages", selected.len(), total);
        let split = self.pdf_processor.select_pages(doc, &selected)?;
        Ok(ConvertedFile::new("split.pdf", "application/pdf", split))
    }

    pub fn extract_text(&self, input: Option<&UploadedFile>) -> Result<ConvertedFile, ConversionError> {
        let scratch = Scratch::create(&self.upload_root)?;
        let path = self.stage_pdf(input, &scratch)?;
        let doc = self.pdf_processor.load(&path)?;

        let text = self.pdf_processor.extract_text(&doc);
        log::info!("Extracted {} characters of text", text.chars().count());
        Ok(ConvertedFile::new(
            "extracted.txt",
            "text/plain; charset=utf-8",
            text.into_bytes(),
        ))
    }

    /// Render every page. A single page comes back as one image, several as a
    /// zip archive.
    pub fn pdf_to_images(
        &self,
        input: Option<&UploadedFile>,
        format: PageImageFormat,
    ) -> Result<ConvertedFile, ConversionError> {
        let scratch = Scratch::create(&self.upload_root)?;
        let path = self.stage_pdf(input, &scratch)?;
        let rasterizer = self.raster.require()?;

        let content = std::fs::read(&path)?;
        let pages = rasterizer.rasterize(&content, self.raster_dpi)?;
        let extension = format.extension();

        let encoded = pages
            .iter()
            .map(|page| self.encode_page(page, format))
            .collect::<Result<Vec<_>, _>>()?;

        if let [single] = encoded.as_slice() {
            return Ok(ConvertedFile::new(
                format!("page_1.{}", extension),
                format.mime_type(),
                single.clone(),
            ));
        }

        let mut archive = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (index, bytes) in encoded.iter().enumerate() {
            archive.start_file(format!("page_{}.{}", index + 1, extension), options)?;
            archive.write_all(bytes)?;
        }
        let zipped = archive.finish()?.into_inner();

        log::info!("Packed {} page images into {} bytes", encoded.len(), zipped.len());
        Ok(ConvertedFile::new("pages.zip", "application/zip", zipped))
    }

    // === IMAGE OPERATIONS ===

    /// One PDF page per image, in upload order. Files outside the image
    /// allowlist are skipped.
    pub fn images_to_pdf(&self, inputs: &[&UploadedFile]) -> Result<ConvertedFile, ConversionError> {
        let mut pages = Vec::new();

        for input in inputs {
            if !input.is_allowed(ALLOWED_IMAGE_EXTENSIONS) {
                log::warn!("Skipping non-image upload: {}", input.file_name);
                continue;
            }
            let rgb = self.image_processor.decode(&input.content)?.to_rgb8();
            let (width, height) = rgb.dimensions();
            pages.push(JpegPage {
                data: self.image_processor.encode_jpeg(&rgb, EMBED_JPEG_QUALITY)?,
                width,
                height,
                page_width: width as f32,
                page_height: height as f32,
            });
        }

        if pages.is_empty() {
            return Err(ConversionError::validation("No images"));
        }

        let pdf = self.pdf_processor.jpeg_pages_to_pdf(&pages)?;
        Ok(ConvertedFile::new("images_converted.pdf", "application/pdf", pdf))
    }

    // === SIZE-TARGETED COMPRESSION ===

    /// Compress an image or PDF towards `target_kb`, dispatching on extension.
    pub fn compress(
        &self,
        input: Option<&UploadedFile>,
        target_kb: u64,
    ) -> Result<CompressionOutcome, ConversionError> {
        let input = input.ok_or_else(|| ConversionError::validation("Upload file"))?;
        let name = input.safe_name();
        let output_name = format!("compressed_{}", name);
        let extension = input.extension().unwrap_or_default();

        if ALLOWED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            let img = self.image_processor.decode(&input.content)?;
            let compressed = self.image_processor.compress_to_target(&img, target_kb)?;
            return Ok(CompressionOutcome::File(ConvertedFile::new(
                output_name,
                "image/jpeg",
                compressed.bytes,
            )));
        }

        if ALLOWED_PDF_EXTENSIONS.contains(&extension.as_str()) {
            let scratch = Scratch::create(&self.upload_root)?;
            let path = scratch.persist(&input.file_name, &input.content)?;
            let content = std::fs::read(&path)?;

            return Ok(match self.compress_pdf(&content, target_kb)? {
                PdfCompression::Optimized(bytes) | PdfCompression::Rasterized(bytes) => {
                    CompressionOutcome::File(ConvertedFile::new(output_name, "application/pdf", bytes))
                }
                PdfCompression::Degraded { optimized, size_kb } => CompressionOutcome::Degraded {
                    file: ConvertedFile::new(output_name, "application/pdf", optimized),
                    report: DegradedCompression {
                        warning: DEGRADED_WARNING.to_string(),
                        size_kb,
                    },
                },
            });
        }

        log::warn!("Unsupported type for compression: {}", name);
        Err(ConversionError::validation("Unsupported type"))
    }

    /// Structural optimization first; if that misses the target, rasterize
    /// every page and recompress it under an even share of the budget.
    pub fn compress_pdf(&self, content: &[u8], target_kb: u64) -> Result<PdfCompression, ConversionError> {
        let optimized = self.pdf_processor.optimize_pdf(content);
        let size_kb = optimized.len() as u64 / 1024;

        if size_kb <= target_kb {
            log::info!("✅ Structural optimization met target: {} KB <= {} KB", size_kb, target_kb);
            return Ok(PdfCompression::Optimized(optimized));
        }

        let rasterizer = match &self.raster {
            RasterCapability::Available(rasterizer) => rasterizer,
            RasterCapability::Unavailable { reason } => {
                log::warn!(
                    "Target {} KB missed ({} KB) and rasterization unavailable: {}",
                    target_kb,
                    size_kb,
                    reason
                );
                return Ok(PdfCompression::Degraded { optimized, size_kb });
            }
        };

        let pages = rasterizer.rasterize(&optimized, self.raster_dpi)?;
        if pages.is_empty() {
            log::warn!("PDF has no pages to rasterize, keeping structural result");
            return Ok(PdfCompression::Optimized(optimized));
        }

        let per_page_kb = (target_kb / pages.len() as u64).max(MIN_PAGE_BUDGET_KB);
        log::info!(
            "Rasterizing {} pages with {} KB each (target {} KB)",
            pages.len(),
            per_page_kb,
            target_kb
        );

        let dpi = self.raster_dpi.max(1) as f32;
        let mut jpeg_pages = Vec::with_capacity(pages.len());
        for page in &pages {
            let compressed = self.image_processor.compress_to_target(page, per_page_kb)?;
            jpeg_pages.push(JpegPage {
                data: compressed.bytes,
                width: page.width(),
                height: page.height(),
                page_width: page.width() as f32 * 72.0 / dpi,
                page_height: page.height() as f32 * 72.0 / dpi,
            });
        }

        let rebuilt = self.pdf_processor.jpeg_pages_to_pdf(&jpeg_pages)?;
        log::info!(
            "✅ Rasterized PDF: {} -> {} bytes (target {} KB)",
            content.len(),
            rebuilt.len(),
            target_kb
        );
        Ok(PdfCompression::Rasterized(rebuilt))
    }

    // === HELPER METHODS ===

    fn stage_pdf(&self, input: Option<&UploadedFile>, scratch: &Scratch) -> Result<PathBuf, ConversionError> {
        match input {
            Some(file) if file.is_allowed(ALLOWED_PDF_EXTENSIONS) => {
                scratch.persist(&file.file_name, &file.content)
            }
            _ => Err(ConversionError::validation("Upload PDF")),
        }
    }

    fn encode_page(&self, page: &DynamicImage, format: PageImageFormat) -> Result<Vec<u8>, ConversionError> {
        match format {
            PageImageFormat::Png => self.image_processor.encode_png(page),
            PageImageFormat::Jpeg { .. } => self
                .image_processor
                .encode_jpeg(&page.to_rgb8(), EMBED_JPEG_QUALITY),
        }
    }
}
