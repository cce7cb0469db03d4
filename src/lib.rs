//! Document Toolkit
//!
//! On-demand PDF and image transformations served over HTTP: merging, splitting
//! by page range, text extraction, image to PDF, PDF to images, and
//! best-effort compression towards a target size.

pub mod config;
pub mod converter;
pub mod image_processor;
pub mod page_range;
pub mod pdf_processor;
pub mod raster;
pub mod routes;
pub mod storage;
pub mod types;
pub mod upload;

pub use converter::DocumentConverter;
pub use types::*;
