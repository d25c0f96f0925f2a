use std::path::PathBuf;

/// Service configuration, loaded from environment variables.
pub struct Config {
    /// Directory of reference images, one enrolled face per file.
    pub faces_dir: PathBuf,
    /// Euclidean distance threshold for a grant (lower = stricter).
    pub threshold: f32,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Bind address for the HTTP server.
    pub bind_addr: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("FACEGATE_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| facegate_core::default_model_dir());

        Self {
            faces_dir: std::env::var("FACEGATE_FACES_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("images")),
            threshold: env_f32("FACEGATE_THRESHOLD", 0.65),
            model_dir,
            bind_addr: std::env::var("FACEGATE_BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env_u16("FACEGATE_PORT", 8080),
            max_upload_bytes: env_usize("FACEGATE_MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
