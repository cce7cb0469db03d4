use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use clap::Parser;
use document_toolkit::config::ServerConfig;
use document_toolkit::raster::RasterCapability;
use document_toolkit::routes::{self, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();

    log::info!("🦀 Starting document toolkit");
    log::info!("📍 Listening on {}:{}", config.host, config.port);
    log::info!("📂 Scratch root: {}", config.upload_dir.display());
    log::info!("📦 Upload limit: {} MB", config.max_upload_mb);

    std::fs::create_dir_all(&config.upload_dir)?;

    let raster = RasterCapability::probe(&config);
    if !raster.is_available() {
        log::warn!("⚠️ PDF to image conversion disabled; PDF compression limited to structural optimization");
    }

    let bind_address = config.bind_address();
    let state = web::Data::new(AppState::new(config, raster));

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .wrap(cors)
            .configure(routes::configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
