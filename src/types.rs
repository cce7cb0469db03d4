use actix_web::http::{header::ContentType, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Lowest JPEG quality the compressor will try; also the unconditional fallback.
pub const MIN_QUALITY: u8 = 10;
/// Highest JPEG quality the compressor will try.
pub const MAX_QUALITY: u8 = 95;
/// Per-page budget floor when a PDF budget is split across rasterized pages.
pub const MIN_PAGE_BUDGET_KB: u64 = 30;
/// JPEG quality used when embedding uploaded images and rendering pages as JPEG.
pub const EMBED_JPEG_QUALITY: u8 = 90;
pub const DEFAULT_TARGET_KB: u64 = 300;

pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];
pub const ALLOWED_PDF_EXTENSIONS: &[&str] = &["pdf"];

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    RasterUnavailable(String),

    #[error("Upload too large (limit {limit} bytes)")]
    UploadTooLarge { limit: usize },

    #[error("Malformed upload: {0}")]
    Multipart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("PDF processing error: {0}")]
    Pdf(String),

    #[error("Rasterization failed: {0}")]
    Raster(String),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Worker pool error: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

impl From<lopdf::Error> for ConversionError {
    fn from(err: lopdf::Error) -> Self {
        ConversionError::Pdf(err.to_string())
    }
}

impl ConversionError {
    pub fn validation(message: impl Into<String>) -> Self {
        ConversionError::Validation(message.into())
    }
}

impl ResponseError for ConversionError {
    fn status_code(&self) -> StatusCode {
        match self {
            ConversionError::Validation(_)
            | ConversionError::RasterUnavailable(_)
            | ConversionError::Multipart(_) => StatusCode::BAD_REQUEST,
            ConversionError::UploadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            ConversionError::RasterUnavailable(message) => HttpResponse::build(self.status_code())
                .json(serde_json::json!({ "error": message })),
            _ => HttpResponse::build(self.status_code())
                .content_type(ContentType::plaintext())
                .body(self.to_string()),
        }
    }
}

/// A finished output, served to the caller as an attachment.
#[derive(Debug, Clone)]
pub struct ConvertedFile {
    pub file_name: String,
    pub mime_type: &'static str,
    pub content: Vec<u8>,
}

impl ConvertedFile {
    pub fn new(file_name: impl Into<String>, mime_type: &'static str, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type,
            content,
        }
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// Result of a compression request.
#[derive(Debug)]
pub enum CompressionOutcome {
    File(ConvertedFile),
    /// Only the structural pass could run; `file` is its output and `report`
    /// explains why nothing more aggressive was attempted.
    Degraded {
        file: ConvertedFile,
        report: DegradedCompression,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DegradedCompression {
    pub warning: String,
    pub size_kb: u64,
}

/// Output format for rendered PDF pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageImageFormat {
    Png,
    Jpeg { extension: &'static str },
}

impl PageImageFormat {
    /// Unknown values fall back to PNG.
    pub fn from_field(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("jpg") => PageImageFormat::Jpeg { extension: "jpg" },
            Some("jpeg") => PageImageFormat::Jpeg { extension: "jpeg" },
            _ => PageImageFormat::Png,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            PageImageFormat::Png => "png",
            PageImageFormat::Jpeg { extension } => *extension,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            PageImageFormat::Png => "image/png",
            PageImageFormat::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// Lower-cased extension of `file_name`, if it has one.
pub fn extension_of(file_name: &str) -> Option<String> {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn has_allowed_extension(file_name: &str, allowed: &[&str]) -> bool {
    extension_of(file_name).is_some_and(|ext| allowed.contains(&ext.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_extension_is_case_insensitive() {
        assert!(has_allowed_extension("Scan.JPG", ALLOWED_IMAGE_EXTENSIONS));
        assert!(has_allowed_extension("a.b.pdf", ALLOWED_PDF_EXTENSIONS));
        assert!(!has_allowed_extension("pdf", ALLOWED_PDF_EXTENSIONS));
        assert!(!has_allowed_extension("notes.txt", ALLOWED_PDF_EXTENSIONS));
        assert!(!has_allowed_extension("trailing.", ALLOWED_PDF_EXTENSIONS));
    }

    #[test]
    fn test_page_image_format_defaults_to_png() {
        assert_eq!(PageImageFormat::from_field(None), PageImageFormat::Png);
        assert_eq!(PageImageFormat::from_field(Some("tiff")), PageImageFormat::Png);
        assert_eq!(PageImageFormat::from_field(Some("JPG")).extension(), "jpg");
        assert_eq!(PageImageFormat::from_field(Some("jpeg")).mime_type(), "image/jpeg");
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            ConversionError::validation("Upload PDF").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ConversionError::RasterUnavailable("missing".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ConversionError::UploadTooLarge { limit: 1 }.status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ConversionError::Pdf("broken xref".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
