//! Aliaser - materializes secondary filenames for registered models.
//!
//! Strategy order: symbolic link, then hard link, then byte copy. The
//! concrete mechanism is picked at runtime per attempt; hard links cover
//! filesystems that forbid symlinks, and the copy fallback covers alias
//! directories on a different filesystem than the canonical file.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::services::catalog_service::CatalogService;

/// Mechanism used to materialize an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasKind {
    Symlink,
    Hardlink,
    Copy,
}

impl AliasKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Symlink => "symlink",
            Self::Hardlink => "hardlink",
            Self::Copy => "copy",
        }
    }
}

/// Creates filesystem aliases and records them in the catalog.
#[derive(Clone)]
pub struct AliasService {
    catalog: CatalogService,
}

impl AliasService {
    pub fn new(catalog: CatalogService) -> Self {
        Self { catalog }
    }

    /// Materialize `alias_abs` pointing at `canonical_abs` and record the
    /// alias row. The alias path must not exist yet; an occupied path is an
    /// `AliasCollision`. Returns the mechanism used.
    pub async fn create_alias(
        &self,
        sha256: &str,
        canonical_abs: &Path,
        alias_abs: &Path,
        alias_rel: &str,
    ) -> Result<AliasKind> {
        if tokio::fs::symlink_metadata(alias_abs).await.is_ok() {
            return Err(AppError::AliasCollision(format!(
                "destination '{}' already exists",
                alias_abs.display()
            )));
        }

        if let Some(parent) = alias_abs.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let kind = materialize(canonical_abs, alias_abs).await?;

        tracing::info!(
            alias = %alias_rel,
            target = %canonical_abs.display(),
            mechanism = kind.as_str(),
            "Materialized alias"
        );

        // Filesystem side is the source of truth; the row is a follow-up insert.
        self.catalog.insert_alias(sha256, alias_rel).await?;

        Ok(kind)
    }
}

/// Try each aliasing mechanism in order, returning the one that succeeded.
async fn materialize(canonical: &Path, alias: &Path) -> Result<AliasKind> {
    let symlink_err = match create_symlink(canonical, alias).await {
        Ok(()) => return Ok(AliasKind::Symlink),
        Err(e) => e,
    };
    tracing::debug!(
        error = %symlink_err,
        alias = %alias.display(),
        "Symlink failed, trying hard link"
    );

    let hardlink_err = match tokio::fs::hard_link(canonical, alias).await {
        Ok(()) => return Ok(AliasKind::Hardlink),
        Err(e) => e,
    };
    tracing::debug!(
        error = %hardlink_err,
        alias = %alias.display(),
        "Hard link failed, falling back to copy"
    );

    tokio::fs::copy(canonical, alias).await?;
    Ok(AliasKind::Copy)
}

#[cfg(unix)]
async fn create_symlink(canonical: &Path, alias: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(canonical, alias).await
}

#[cfg(windows)]
async fn create_symlink(canonical: &Path, alias: &Path) -> std::io::Result<()> {
    tokio::fs::symlink_file(canonical, alias).await
}
