//! PDF page rasterization.
//!
//! Rendering needs the PDFium shared library at runtime. Whether it could be
//! loaded is decided once at startup and carried around as a
//! [`RasterCapability`]; operations that need pixels ask the capability for a
//! [`Rasterizer`] and degrade or refuse when there is none.

use crate::config::ServerConfig;
use crate::types::ConversionError;
use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

pub trait Rasterizer: Send + Sync {
    /// Render every page of `pdf` at `dpi`, in page order.
    fn rasterize(&self, pdf: &[u8], dpi: u16) -> Result<Vec<DynamicImage>, ConversionError>;

    fn name(&self) -> &'static str;
}

pub struct PdfiumRasterizer {
    pdfium: Pdfium,
}

impl PdfiumRasterizer {
    /// Bind to PDFium from `library_dir`, or from `./` and then the system
    /// library path when no directory is given.
    pub fn bind(library_dir: Option<&Path>) -> Result<Self, ConversionError> {
        let bindings = match library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ConversionError::Raster(format!("Failed to load PDFium library: {:?}", e)))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf: &[u8], dpi: u16) -> Result<Vec<DynamicImage>, ConversionError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| ConversionError::Raster(format!("Failed to open PDF: {:?}", e)))?;

        let config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);
        let mut images = Vec::new();

        for (index, page) in document.pages().iter().enumerate() {
            let bitmap = page.render_with_config(&config).map_err(|e| {
                ConversionError::Raster(format!("Failed to render page {}: {:?}", index + 1, e))
            })?;

            let width = bitmap.width() as u32;
            let height = bitmap.height() as u32;
            let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes()).ok_or_else(|| {
                ConversionError::Raster(format!(
                    "Page {} bitmap does not match {}x{}",
                    index + 1,
                    width,
                    height
                ))
            })?;
            images.push(DynamicImage::ImageRgba8(rgba));
        }

        log::info!("Rasterized {} pages at {} dpi", images.len(), dpi);
        Ok(images)
    }

    fn name(&self) -> &'static str {
        "pdfium"
    }
}

#[derive(Clone)]
pub enum RasterCapability {
    Available(Arc<dyn Rasterizer>),
    Unavailable { reason: String },
}

impl RasterCapability {
    /// Decide once whether pages can be rendered in this process.
    pub fn probe(config: &ServerConfig) -> Self {
        if config.disable_raster {
            return Self::unavailable("rasterization disabled by configuration");
        }

        match PdfiumRasterizer::bind(config.pdfium_dir.as_deref()) {
            Ok(rasterizer) => {
                log::info!("🖼️ Rasterization available via {}", rasterizer.name());
                RasterCapability::Available(Arc::new(rasterizer))
            }
            Err(e) => {
                log::warn!("Rasterization unavailable: {}", e);
                Self::unavailable(e.to_string())
            }
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        RasterCapability::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, RasterCapability::Available(_))
    }

    /// The rasterizer, or a `RasterUnavailable` error suitable for the caller.
    pub fn require(&self) -> Result<&Arc<dyn Rasterizer>, ConversionError> {
        match self {
            RasterCapability::Available(rasterizer) => Ok(rasterizer),
            RasterCapability::Unavailable { .. } => Err(ConversionError::RasterUnavailable(
                "PDF rasterization (PDFium) not available on server".to_string(),
            )),
        }
    }
}

impl fmt::Debug for RasterCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RasterCapability::Available(rasterizer) => {
                f.debug_tuple("Available").field(&rasterizer.name()).finish()
            }
            RasterCapability::Unavailable { reason } => {
                f.debug_struct("Unavailable").field("reason", reason).finish()
            }
        }
    }
}
