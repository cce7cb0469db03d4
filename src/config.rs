use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings; every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "document-toolkit", version, about)]
pub struct ServerConfig {
    #[arg(long, env = "DOCTOOLS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "DOCTOOLS_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Root under which per-request scratch directories are created.
    #[arg(long, env = "DOCTOOLS_UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,

    /// Scratch entries older than this are removed when the form page is served.
    #[arg(long, env = "DOCTOOLS_SWEEP_AGE_SECS", default_value_t = 600)]
    pub sweep_age_secs: u64,

    #[arg(long, env = "DOCTOOLS_MAX_UPLOAD_MB", default_value_t = 200)]
    pub max_upload_mb: usize,

    #[arg(
        long,
        env = "DOCTOOLS_RASTER_DPI",
        default_value_t = 200,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub raster_dpi: u16,

    /// Directory holding the PDFium shared library.
    #[arg(long, env = "PDFIUM_DYNAMIC_LIB_PATH")]
    pub pdfium_dir: Option<PathBuf>,

    /// Run without rasterization even if PDFium could be loaded.
    #[arg(long, env = "DOCTOOLS_DISABLE_RASTER", default_value_t = false)]
    pub disable_raster: bool,
}

impl ServerConfig {
    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn sweep_age(&self) -> Duration {
        Duration::from_secs(self.sweep_age_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            upload_dir: PathBuf::from("uploads"),
            sweep_age_secs: 600,
            max_upload_mb: 200,
            raster_dpi: 200,
            pdfium_dir: None,
            disable_raster: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_parsed_defaults() {
        let parsed = ServerConfig::try_parse_from(["document-toolkit"]).unwrap();
        let defaults = ServerConfig::default();
        assert_eq!(parsed.port, defaults.port);
        assert_eq!(parsed.upload_dir, defaults.upload_dir);
        assert_eq!(parsed.max_upload_bytes(), 200 * 1024 * 1024);
        assert_eq!(parsed.sweep_age(), Duration::from_secs(600));
        assert_eq!(parsed.raster_dpi, 200);
    }

    #[test]
    fn test_flags_override_defaults() {
        let parsed = ServerConfig::try_parse_from([
            "document-toolkit",
            "--port",
            "8002",
            "--max-upload-mb",
            "5",
            "--disable-raster",
        ])
        .unwrap();
        assert_eq!(parsed.bind_address(), ("0.0.0.0".to_string(), 8002));
        assert_eq!(parsed.max_upload_bytes(), 5 * 1024 * 1024);
        assert!(parsed.disable_raster);
    }

    #[test]
    fn test_zero_raster_dpi_is_rejected() {
        assert!(ServerConfig::try_parse_from(["document-toolkit", "--raster-dpi", "0"]).is_err());
        let parsed =
            ServerConfig::try_parse_from(["document-toolkit", "--raster-dpi", "1"]).unwrap();
        assert_eq!(parsed.raster_dpi, 1);
    }
}
