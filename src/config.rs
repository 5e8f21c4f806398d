//! Application configuration loaded from environment variables.

use crate::error::Result;
use std::env;
use std::path::PathBuf;

/// Read an environment variable and parse it, falling back to a default on missing or invalid values.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read a comma-separated environment variable into a list, falling back to defaults.
fn env_list(key: &str, defaults: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => defaults.iter().map(|s| s.to_string()).collect(),
    }
}

/// Default host suffixes admitted for model downloads.
pub const DEFAULT_ALLOWED_HOSTS: &[&str] =
    &["huggingface.co", "civitai.com", "127.0.0.1", "localhost"];

/// Default extension whitelist for model files.
pub const DEFAULT_MODEL_EXTENSIONS: &[&str] = &[
    ".safetensors",
    ".ckpt",
    ".pt",
    ".pth",
    ".bin",
    ".gguf",
    ".onnx",
    ".sft",
    ".yaml",
];

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the model tree; per-kind directories live beneath it
    pub base_path: PathBuf,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Log level
    pub log_level: String,

    /// Override for the catalog database file (defaults to
    /// `<base>/.registry/catalog.db`)
    pub database_path: Option<PathBuf>,

    /// Host suffixes admitted for download URLs
    pub allowed_hosts: Vec<String>,

    /// Allowed model file extensions (with leading dot)
    pub allowed_extensions: Vec<String>,

    /// Idle timeout for download network reads, in seconds
    pub idle_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            base_path: PathBuf::from(
                env::var("MODELS_BASE_PATH").unwrap_or_else(|_| "./models".into()),
            ),
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            database_path: env::var("REGISTRY_DB_PATH").ok().map(PathBuf::from),
            allowed_hosts: env_list("ALLOWED_HOSTS", DEFAULT_ALLOWED_HOSTS),
            allowed_extensions: env_list("MODEL_FILE_EXTENSIONS", DEFAULT_MODEL_EXTENSIONS),
            idle_timeout_secs: env_parse("DOWNLOAD_IDLE_TIMEOUT_SECS", 60),
        })
    }

    /// Path of the catalog database file.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.base_path.join(".registry").join("catalog.db"))
    }

    /// Temp directory for in-progress downloads.
    pub fn temp_dir(&self) -> PathBuf {
        self.base_path.join(".cache").join("tmp")
    }
}
