//! Migration pass - one-shot ingestion of a pre-existing model tree.
//!
//! Walks per-kind directories, hashes files with allowed extensions, and
//! populates the catalog. A file whose hash is already registered under a
//! different path becomes an alias of the existing canonical (no data
//! movement). Supports a dry-run mode that only reports planned changes.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;
use crate::paths::{PathPolicy, MODEL_KINDS};
use crate::services::catalog_service::{self, CatalogService};

/// Structured summary of one migration run.
#[derive(Debug, Clone, Default, Serialize, utoipa::ToSchema)]
pub struct MigrationSummary {
    pub total_files: u64,
    pub already_registered: u64,
    pub new_artifacts: u64,
    pub new_aliases: u64,
    pub bytes_hashed: u64,
    pub errors: u64,
    pub dry_run: bool,
}

/// Migration pass over the model tree.
#[derive(Clone)]
pub struct MigrationService {
    catalog: CatalogService,
    paths: PathPolicy,
}

impl MigrationService {
    pub fn new(catalog: CatalogService, paths: PathPolicy) -> Self {
        Self { catalog, paths }
    }

    /// Scan one kind (or all kinds when `folder` is None) and register
    /// every model file found. Per-file errors are counted and logged, not
    /// fatal.
    pub async fn run(&self, folder: Option<&str>, dry_run: bool) -> Result<MigrationSummary> {
        let kinds: Vec<String> = match folder {
            Some(kind) => vec![self.paths.validate_kind(kind)?],
            None => MODEL_KINDS.iter().map(|k| k.to_string()).collect(),
        };

        if dry_run {
            tracing::info!("Migration dry run: no changes will be made");
        }

        let mut summary = MigrationSummary {
            dry_run,
            ..Default::default()
        };
        // Hashes this run would register; lets a dry run still detect
        // duplicates among the files it scans.
        let mut planned = HashSet::new();

        for kind in &kinds {
            let dir = self.paths.base().join(kind);
            if !dir.is_dir() {
                tracing::debug!(kind = %kind, "Skipping non-existent kind directory");
                continue;
            }
            tracing::info!(kind = %kind, dir = %dir.display(), "Scanning kind directory");
            self.scan_dir(&dir, dry_run, &mut summary, &mut planned).await?;
        }

        if !dry_run {
            let pruned = self
                .catalog
                .prune_dangling_aliases(self.paths.base())
                .await?;
            if pruned > 0 {
                tracing::info!(pruned, "Pruned dangling alias rows");
            }
        }

        tracing::info!(
            total = summary.total_files,
            new_artifacts = summary.new_artifacts,
            new_aliases = summary.new_aliases,
            already = summary.already_registered,
            errors = summary.errors,
            "Migration pass finished"
        );

        Ok(summary)
    }

    async fn scan_dir(
        &self,
        root: &Path,
        dry_run: bool,
        summary: &mut MigrationSummary,
        planned: &mut HashSet<String>,
    ) -> Result<()> {
        let mut stack: Vec<PathBuf> = vec![root.to_path_buf()];

        while let Some(current) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&current).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(dir = %current.display(), error = %e, "Unable to read directory");
                    summary.errors += 1;
                    continue;
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name.starts_with('.') {
                    continue;
                }

                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(t) => t,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Unable to stat entry");
                        summary.errors += 1;
                        continue;
                    }
                };

                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                // Links are materialized aliases of files registered on
                // their own; hashing them would double-count.
                if file_type.is_symlink() || is_extra_hardlink(&path).await {
                    tracing::debug!(path = %path.display(), "Skipping link");
                    continue;
                }
                if !self.paths.has_allowed_extension(&name) {
                    continue;
                }

                if let Err(e) = self.ingest_file(&path, dry_run, summary, planned).await {
                    tracing::warn!(path = %path.display(), error = %e, "Error processing file");
                    summary.errors += 1;
                }
            }
        }

        Ok(())
    }

    async fn ingest_file(
        &self,
        path: &Path,
        dry_run: bool,
        summary: &mut MigrationSummary,
        planned: &mut HashSet<String>,
    ) -> Result<()> {
        let Some(rel) = self.paths.rel_from_abs(path) else {
            tracing::warn!(path = %path.display(), "File outside the model base, skipping");
            return Ok(());
        };

        summary.total_files += 1;

        if self.catalog.get_by_path(&rel).await?.is_some() {
            summary.already_registered += 1;
            return Ok(());
        }

        let size = tokio::fs::metadata(path).await?.len();
        tracing::info!(path = %rel, size, "Hashing");
        let sha256 = catalog_service::sha256_file(path).await?;
        summary.bytes_hashed += size;

        let duplicate = self.catalog.get_by_hash(&sha256).await?.is_some()
            || (dry_run && planned.contains(&sha256));
        if duplicate {
            tracing::info!(path = %rel, sha256 = %catalog_service::short_hash(&sha256), "Duplicate content");
            if !dry_run {
                self.catalog.insert_alias(&sha256, &rel).await?;
            }
            summary.new_aliases += 1;
            return Ok(());
        }

        if dry_run {
            planned.insert(sha256.clone());
            tracing::info!(path = %rel, sha256 = %catalog_service::short_hash(&sha256), "Would register");
        } else {
            let (kind, filename) = split_rel(&rel);
            self.catalog
                .insert_artifact(&crate::models::NewModelFile {
                    sha256,
                    file_path: rel.clone(),
                    size_bytes: size as i64,
                    source_url: None,
                    metadata: serde_json::json!({
                        "filename": filename,
                        "folder": kind,
                        "migrated": true,
                    }),
                })
                .await?;
        }
        summary.new_artifacts += 1;
        Ok(())
    }
}

/// Whether the file has more than one filesystem link (a hard-link alias).
#[cfg(unix)]
async fn is_extra_hardlink(path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.nlink() > 1,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
async fn is_extra_hardlink(_path: &Path) -> bool {
    false
}

fn split_rel(rel: &str) -> (&str, &str) {
    match rel.split_once('/') {
        Some((kind, rest)) => (kind, rest.rsplit('/').next().unwrap_or(rest)),
        None => ("", rel),
    }
}
