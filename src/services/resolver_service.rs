//! Dependency resolver - classifies a workflow's declared dependencies
//! against the catalog and the filesystem.
//!
//! The resolver is a pure read: it never mutates the catalog or the
//! filesystem. Alias materialization for `symlink`-action entries happens
//! later, when the frontend issues the corresponding download requests.

use crate::error::Result;
use crate::models::{
    DependencyAction, DependencyEntry, DependencyManifest, DependencyResolution,
    ExistingDependency, MissingDependency,
};
use crate::paths::PathPolicy;
use crate::services::catalog_service::CatalogService;
use crate::services::download_service::normalize_sha256;
use crate::services::url_policy::UrlPolicy;

/// Resolver over the catalog, path policy, and URL admission.
#[derive(Clone)]
pub struct DependencyResolver {
    catalog: CatalogService,
    paths: PathPolicy,
    urls: UrlPolicy,
}

impl DependencyResolver {
    pub fn new(catalog: CatalogService, paths: PathPolicy, urls: UrlPolicy) -> Self {
        Self {
            catalog,
            paths,
            urls,
        }
    }

    /// Classify every manifest entry into missing or existing, with
    /// aggregate size totals.
    pub async fn resolve(&self, manifest: &DependencyManifest) -> Result<DependencyResolution> {
        let mut missing = Vec::new();
        let mut existing = Vec::new();

        for (kind, entries) in manifest {
            for entry in entries {
                self.classify(kind, entry, &mut missing, &mut existing)
                    .await?;
            }
        }

        let total_download_size = missing.iter().map(|m| m.size).sum();
        let total_saved_size = existing
            .iter()
            .filter(|e| e.action == DependencyAction::Symlink)
            .map(|e| e.size)
            .sum();

        Ok(DependencyResolution {
            missing,
            existing,
            total_download_size,
            total_saved_size,
        })
    }

    async fn classify(
        &self,
        kind: &str,
        entry: &DependencyEntry,
        missing: &mut Vec<MissingDependency>,
        existing: &mut Vec<ExistingDependency>,
    ) -> Result<()> {
        // Entries that cannot be placed or fetched are still reported as
        // missing, but only admitted URLs are handed back to the client.
        let admitted_urls: Vec<String> = entry
            .urls
            .iter()
            .filter(|u| self.urls.admit(u).is_ok())
            .cloned()
            .collect();

        let dest = match self.paths.resolve(kind, &entry.filename) {
            Ok(dest) => dest,
            Err(e) => {
                tracing::warn!(
                    kind = %kind,
                    filename = %entry.filename,
                    error = %e,
                    "Dependency entry failed path policy"
                );
                missing.push(self.missing_entry(kind, entry, admitted_urls));
                return Ok(());
            }
        };

        let sha256 = match normalize_sha256(&entry.sha256) {
            Ok(sha) => sha,
            Err(e) => {
                tracing::warn!(filename = %entry.filename, error = %e, "Dependency entry has invalid hash");
                missing.push(self.missing_entry(kind, entry, admitted_urls));
                return Ok(());
            }
        };

        if let Some(row) = self.catalog.get_by_hash(&sha256).await? {
            // Known content: canonical when the requested name already
            // resolves to these bytes, otherwise an alias will be created.
            let satisfied_in_place = row.file_path == dest.rel
                || matches!(
                    self.catalog.get_by_path(&dest.rel).await?,
                    Some((by_path, _)) if by_path.sha256 == sha256
                );

            existing.push(ExistingDependency {
                filename: entry.filename.clone(),
                exists_at: row.file_path.clone(),
                kind: dest.kind.clone(),
                sha256,
                size: row.size_bytes.max(0) as u64,
                action: if satisfied_in_place {
                    DependencyAction::Canonical
                } else {
                    DependencyAction::Symlink
                },
            });
            return Ok(());
        }

        // Unknown hash but the destination file is already on disk: not
        // missing; the download pre-check will ingest it.
        if tokio::fs::symlink_metadata(&dest.abs).await.is_ok() {
            existing.push(ExistingDependency {
                filename: entry.filename.clone(),
                exists_at: dest.rel.clone(),
                kind: dest.kind.clone(),
                sha256,
                size: entry.size,
                action: DependencyAction::Canonical,
            });
            return Ok(());
        }

        missing.push(self.missing_entry(kind, entry, admitted_urls));
        Ok(())
    }

    fn missing_entry(
        &self,
        kind: &str,
        entry: &DependencyEntry,
        admitted_urls: Vec<String>,
    ) -> MissingDependency {
        MissingDependency {
            filename: entry.filename.clone(),
            kind: crate::paths::map_legacy(kind).to_string(),
            sha256: entry.sha256.trim().to_ascii_lowercase(),
            size: entry.size,
            urls: admitted_urls,
            requires_auth: entry.requires_auth,
            auth_provider: entry.auth_provider.map(|p| p.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_ALLOWED_HOSTS, DEFAULT_MODEL_EXTENSIONS};
    use crate::db::create_pool;
    use crate::models::NewModelFile;
    use tempfile::TempDir;

    async fn resolver(temp: &TempDir) -> (DependencyResolver, CatalogService) {
        let pool = create_pool(&temp.path().join("catalog.db")).await.unwrap();
        let catalog = CatalogService::new(pool);
        let exts: Vec<String> = DEFAULT_MODEL_EXTENSIONS.iter().map(|s| s.to_string()).collect();
        let hosts: Vec<String> = DEFAULT_ALLOWED_HOSTS.iter().map(|s| s.to_string()).collect();
        let paths = PathPolicy::new(temp.path(), &exts).unwrap();
        let urls = UrlPolicy::new(&hosts);
        (
            DependencyResolver::new(catalog.clone(), paths, urls),
            catalog,
        )
    }

    fn entry(filename: &str, sha256: &str, size: u64, urls: &[&str]) -> DependencyEntry {
        DependencyEntry {
            filename: filename.into(),
            sha256: sha256.into(),
            size,
            urls: urls.iter().map(|s| s.to_string()).collect(),
            display_name: None,
            required: true,
            requires_auth: false,
            auth_provider: None,
        }
    }

    #[tokio::test]
    async fn mixed_manifest_splits_missing_and_existing() {
        let temp = TempDir::new().unwrap();
        let (resolver, catalog) = resolver(&temp).await;

        let h1 = "1".repeat(64);
        let h2 = "2".repeat(64);
        catalog
            .insert_artifact(&NewModelFile {
                sha256: h1.clone(),
                file_path: "checkpoints/a.safetensors".into(),
                size_bytes: 100,
                source_url: None,
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();

        let mut manifest = DependencyManifest::new();
        manifest.insert(
            "checkpoints".into(),
            vec![
                entry(
                    "b.safetensors",
                    &h1,
                    100,
                    &["https://huggingface.co/x/b.safetensors"],
                ),
                entry(
                    "c.safetensors",
                    &h2,
                    250,
                    &["https://huggingface.co/x/c.safetensors"],
                ),
            ],
        );

        let resolution = resolver.resolve(&manifest).await.unwrap();

        assert_eq!(resolution.existing.len(), 1);
        let existing = &resolution.existing[0];
        assert_eq!(existing.filename, "b.safetensors");
        assert_eq!(existing.exists_at, "checkpoints/a.safetensors");
        assert_eq!(existing.action, DependencyAction::Symlink);
        assert_eq!(existing.kind, "checkpoints");

        assert_eq!(resolution.missing.len(), 1);
        assert_eq!(resolution.missing[0].filename, "c.safetensors");

        assert_eq!(resolution.total_download_size, 250);
        assert_eq!(resolution.total_saved_size, 100);
    }

    #[tokio::test]
    async fn canonical_when_name_matches_registered_path() {
        let temp = TempDir::new().unwrap();
        let (resolver, catalog) = resolver(&temp).await;

        let h1 = "3".repeat(64);
        catalog
            .insert_artifact(&NewModelFile {
                sha256: h1.clone(),
                file_path: "checkpoints/a.safetensors".into(),
                size_bytes: 10,
                source_url: None,
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();

        let mut manifest = DependencyManifest::new();
        manifest.insert(
            "checkpoints".into(),
            vec![entry("a.safetensors", &h1, 10, &[])],
        );

        let resolution = resolver.resolve(&manifest).await.unwrap();
        assert_eq!(resolution.existing[0].action, DependencyAction::Canonical);
        assert_eq!(resolution.total_saved_size, 0);
    }

    #[tokio::test]
    async fn existing_alias_counts_as_canonical() {
        let temp = TempDir::new().unwrap();
        let (resolver, catalog) = resolver(&temp).await;

        let h1 = "4".repeat(64);
        catalog
            .insert_artifact(&NewModelFile {
                sha256: h1.clone(),
                file_path: "checkpoints/a.safetensors".into(),
                size_bytes: 10,
                source_url: None,
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap();
        catalog
            .insert_alias(&h1, "checkpoints/b.safetensors")
            .await
            .unwrap();

        let mut manifest = DependencyManifest::new();
        manifest.insert(
            "checkpoints".into(),
            vec![entry("b.safetensors", &h1, 10, &[])],
        );

        let resolution = resolver.resolve(&manifest).await.unwrap();
        assert_eq!(resolution.existing[0].action, DependencyAction::Canonical);
    }

    #[tokio::test]
    async fn forbidden_urls_filtered_from_missing() {
        let temp = TempDir::new().unwrap();
        let (resolver, _) = resolver(&temp).await;

        let mut manifest = DependencyManifest::new();
        manifest.insert(
            "loras".into(),
            vec![entry(
                "style.safetensors",
                &"5".repeat(64),
                20,
                &[
                    "https://evil.example/style.safetensors",
                    "https://civitai.com/api/download/models/9",
                ],
            )],
        );

        let resolution = resolver.resolve(&manifest).await.unwrap();
        assert_eq!(resolution.missing.len(), 1);
        assert_eq!(
            resolution.missing[0].urls,
            vec!["https://civitai.com/api/download/models/9".to_string()]
        );
    }

    #[tokio::test]
    async fn invalid_filename_reported_missing_without_resolution() {
        let temp = TempDir::new().unwrap();
        let (resolver, _) = resolver(&temp).await;

        let mut manifest = DependencyManifest::new();
        manifest.insert(
            "checkpoints".into(),
            vec![entry(
                "../escape.safetensors",
                &"6".repeat(64),
                5,
                &["https://evil.example/escape.safetensors"],
            )],
        );

        let resolution = resolver.resolve(&manifest).await.unwrap();
        assert_eq!(resolution.missing.len(), 1);
        assert!(resolution.missing[0].urls.is_empty());
    }

    #[tokio::test]
    async fn on_disk_file_with_unknown_hash_is_existing() {
        let temp = TempDir::new().unwrap();
        let (resolver, _) = resolver(&temp).await;

        let dir = temp.path().join("vae");
        tokio::fs::create_dir_all(&dir).await.unwrap();
        tokio::fs::write(dir.join("seen.safetensors"), b"bytes")
            .await
            .unwrap();

        let mut manifest = DependencyManifest::new();
        manifest.insert(
            "vae".into(),
            vec![entry("seen.safetensors", &"7".repeat(64), 5, &[])],
        );

        let resolution = resolver.resolve(&manifest).await.unwrap();
        assert!(resolution.missing.is_empty());
        assert_eq!(resolution.existing[0].exists_at, "vae/seen.safetensors");
        assert_eq!(resolution.existing[0].action, DependencyAction::Canonical);
    }

    #[tokio::test]
    async fn legacy_kind_names_resolve() {
        let temp = TempDir::new().unwrap();
        let (resolver, _) = resolver(&temp).await;

        let mut manifest = DependencyManifest::new();
        manifest.insert(
            "unet".into(),
            vec![entry(
                "flux.gguf",
                &"8".repeat(64),
                30,
                &["https://huggingface.co/x/flux.gguf"],
            )],
        );

        let resolution = resolver.resolve(&manifest).await.unwrap();
        assert_eq!(resolution.missing[0].kind, "diffusion_models");
    }
}
