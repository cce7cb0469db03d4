use crate::config::ServerConfig;
use crate::converter::DocumentConverter;
use crate::raster::RasterCapability;
use crate::storage::sweep_stale;
use crate::types::*;
use crate::upload::{UploadForm, UploadedFile};
use actix_multipart::Multipart;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use std::sync::Arc;

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Read-only state shared by every worker.
pub struct AppState {
    pub config: ServerConfig,
    pub converter: Arc<DocumentConverter>,
}

impl AppState {
    pub fn new(config: ServerConfig, raster: RasterCapability) -> Self {
        let converter = DocumentConverter::new(config.upload_dir.clone(), raster, config.raster_dpi);
        Self {
            config,
            converter: Arc::new(converter),
        }
    }
}

type State = web::Data<AppState>;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(home))
        .route("/health", web::get().to(health))
        .route("/merge", web::post().to(merge))
        .route("/img_to_pdf", web::post().to(img_to_pdf))
        .route("/split", web::post().to(split))
        .route("/extract", web::post().to(extract))
        .route("/pdf_to_images", web::post().to(pdf_to_images))
        .route("/compress_kb", web::post().to(compress_kb));
}

async fn home(state: State) -> HttpResponse {
    let root = state.config.upload_dir.clone();
    let max_age = state.config.sweep_age();
    match tokio::task::spawn_blocking(move || sweep_stale(&root, max_age)).await {
        Ok(removed) if removed > 0 => log::info!("🧹 Swept {} stale upload entries", removed),
        Ok(_) => {}
        Err(e) => log::warn!("Stale upload sweep did not run: {}", e),
    }

    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

async fn health(state: State) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "document-toolkit",
        "version": env!("CARGO_PKG_VERSION"),
        "capabilities": {
            "rasterization": state.converter.raster().is_available(),
            "image_formats": ALLOWED_IMAGE_EXTENSIONS,
            "operations": ["merge", "img_to_pdf", "split", "extract", "pdf_to_images", "compress_kb"]
        },
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn merge(payload: Multipart, state: State) -> Result<HttpResponse, ConversionError> {
    let form = UploadForm::collect(payload, state.config.max_upload_bytes()).await?;
    log::info!("🚀 Merge request: {} files", form.total_files());

    let converter = state.converter.clone();
    let file = run_blocking("merge", move || {
        let inputs: Vec<&UploadedFile> = form.files("pdfs").collect();
        converter.merge(&inputs)
    })
    .await?;
    Ok(attachment(file))
}

async fn img_to_pdf(payload: Multipart, state: State) -> Result<HttpResponse, ConversionError> {
    let form = UploadForm::collect(payload, state.config.max_upload_bytes()).await?;
    log::info!("🚀 Image to PDF request: {} files", form.total_files());

    let converter = state.converter.clone();
    let file = run_blocking("img_to_pdf", move || {
        let inputs: Vec<&UploadedFile> = form.files("images").collect();
        converter.images_to_pdf(&inputs)
    })
    .await?;
    Ok(attachment(file))
}

async fn split(payload: Multipart, state: State) -> Result<HttpResponse, ConversionError> {
    let form = UploadForm::collect(payload, state.config.max_upload_bytes()).await?;

    let converter = state.converter.clone();
    let file = run_blocking("split", move || {
        converter.split(form.file("pdf"), form.text("ranges").unwrap_or_default())
    })
    .await?;
    Ok(attachment(file))
}

async fn extract(payload: Multipart, state: State) -> Result<HttpResponse, ConversionError> {
    let form = UploadForm::collect(payload, state.config.max_upload_bytes()).await?;

    let converter = state.converter.clone();
    let file = run_blocking("extract", move || converter.extract_text(form.file("pdf"))).await?;
    Ok(attachment(file))
}

async fn pdf_to_images(payload: Multipart, state: State) -> Result<HttpResponse, ConversionError> {
    let form = UploadForm::collect(payload, state.config.max_upload_bytes()).await?;
    let format = PageImageFormat::from_field(form.text("fmt"));

    let converter = state.converter.clone();
    let file = run_blocking("pdf_to_images", move || {
        converter.pdf_to_images(form.file("pdf"), format)
    })
    .await?;
    Ok(attachment(file))
}

async fn compress_kb(payload: Multipart, state: State) -> Result<HttpResponse, ConversionError> {
    let form = UploadForm::collect(payload, state.config.max_upload_bytes()).await?;
    let target_kb = parse_target_kb(form.text("target_kb"))?;
    log::info!("🚀 Compression request: target {} KB", target_kb);

    let converter = state.converter.clone();
    let outcome = run_blocking("compress_kb", move || {
        converter.compress(form.file("file"), target_kb)
    })
    .await?;

    Ok(match outcome {
        CompressionOutcome::File(file) => attachment(file),
        CompressionOutcome::Degraded { report, .. } => HttpResponse::Ok().json(report),
    })
}

/// Missing or blank means the default budget.
fn parse_target_kb(value: Option<&str>) -> Result<u64, ConversionError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(DEFAULT_TARGET_KB),
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| ConversionError::validation("Invalid target_kb")),
    }
}

/// Run document work off the async workers and log how it ended.
async fn run_blocking<T, F>(operation: &'static str, work: F) -> Result<T, ConversionError>
where
    F: FnOnce() -> Result<T, ConversionError> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(work).await?;
    match &result {
        Ok(_) => log::info!("✅ {} completed", operation),
        Err(e @ ConversionError::Validation(_)) | Err(e @ ConversionError::RasterUnavailable(_)) => {
            log::warn!("{} rejected: {}", operation, e)
        }
        Err(e) => log::error!("❌ {} failed: {}", operation, e),
    }
    result
}

fn attachment(file: ConvertedFile) -> HttpResponse {
    log::info!("Serving {} ({} bytes)", file.file_name, file.size());
    HttpResponse::Ok()
        .content_type(file.mime_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file.file_name)],
        })
        .body(file.content)
}
