//! Execution logic for the migration CLI.

use crate::cli::migrate::{error, output, MigrateCli};
use crate::config::Config;
use crate::db;
use crate::paths::PathPolicy;
use crate::services::catalog_service::CatalogService;
use crate::services::migration_service::MigrationService;

/// Run the migration CLI command
pub async fn run(cli: MigrateCli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    config.base_path = cli.base_path.clone();
    if cli.database.is_some() {
        config.database_path = cli.database.clone();
    }

    if cli.dry_run {
        output(&cli.format, "Dry run: no changes will be made", None);
    }

    let pool = db::create_pool(&config.database_path()).await?;
    let catalog = CatalogService::new(pool);
    let paths = PathPolicy::new(&config.base_path, &config.allowed_extensions)?;
    let migration = MigrationService::new(catalog.clone(), paths);

    let summary = match migration.run(cli.folder.as_deref(), cli.dry_run).await {
        Ok(summary) => summary,
        Err(e) => {
            error(&cli.format, &e.to_string());
            return Err(e.into());
        }
    };

    if cli.format == "json" {
        output(&cli.format, "", Some(serde_json::to_value(&summary)?));
    } else {
        println!("============================================================");
        println!("MIGRATION SUMMARY");
        println!("============================================================");
        println!("Total files scanned:     {}", summary.total_files);
        println!("Already registered:      {}", summary.already_registered);
        println!("Newly registered:        {}", summary.new_artifacts);
        println!("New aliases:             {}", summary.new_aliases);
        println!("Bytes hashed:            {}", format_bytes(summary.bytes_hashed));
        println!("Errors:                  {}", summary.errors);
        println!("============================================================");

        if cli.dry_run {
            println!("\nNo changes were made. Run without --dry-run to apply changes.");
        } else {
            let stats = catalog.stats().await?;
            println!("\nRegistry statistics:");
            println!("  Total models:   {}", stats.artifact_count);
            println!("  Total aliases:  {}", stats.alias_count);
            println!("  Total size:     {}", format_bytes(stats.total_size_bytes as u64));
        }
    }

    if summary.errors > 0 {
        return Err(format!("{} files failed to migrate", summary.errors).into());
    }
    Ok(())
}

/// Format bytes as a human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1_572_864), "1.50 MB");
        assert_eq!(format_bytes(1_073_741_824), "1.00 GB");
    }
}
