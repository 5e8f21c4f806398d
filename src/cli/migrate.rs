//! CLI definition for the model tree migration pass.
//!
//! Scans pre-existing model folders, computes SHA-256 hashes, and
//! populates the registry catalog so files downloaded before the registry
//! existed take part in deduplication.

use clap::Parser;
use std::path::PathBuf;

/// Migrate an existing model tree into the registry catalog
#[derive(Parser, Debug)]
#[command(name = "registry-migrate")]
#[command(about = "Scan existing model folders and register them in the catalog", long_about = None)]
pub struct MigrateCli {
    /// Root of the model tree (can also be set via MODELS_BASE_PATH)
    #[arg(long, env = "MODELS_BASE_PATH", default_value = "./models")]
    pub base_path: PathBuf,

    /// Catalog database path (defaults to <base>/.registry/catalog.db)
    #[arg(long, env = "REGISTRY_DB_PATH")]
    pub database: Option<PathBuf>,

    /// Only process one kind (e.g. checkpoints, loras)
    #[arg(short, long)]
    pub folder: Option<String>,

    /// Show what would be done without making changes
    #[arg(long)]
    pub dry_run: bool,

    /// Output format (json, text)
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

/// Print message based on output format
pub fn output(format: &str, message: &str, json_value: Option<serde_json::Value>) {
    match format {
        "json" => {
            if let Some(value) = json_value {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&value).unwrap_or_default()
                );
            } else {
                println!(r#"{{"message": "{}"}}"#, message);
            }
        }
        _ => {
            println!("{}", message);
        }
    }
}

/// Print error message
pub fn error(format: &str, message: &str) {
    match format {
        "json" => {
            eprintln!(r#"{{"error": "{}"}}"#, message);
        }
        _ => {
            eprintln!("Error: {}", message);
        }
    }
}
