//! Path policy: model kinds, filename validation, and destination resolution.
//!
//! Every filesystem path handed to the download engine or the resolver goes
//! through this module. The policy guarantees a resolved destination is a
//! single filename with an allowed extension, placed directly under the
//! per-kind directory of the configured base path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{AppError, Result};

/// The closed set of model kinds; each maps to a directory of the same
/// name under the base path.
pub const MODEL_KINDS: &[&str] = &[
    "checkpoints",
    "loras",
    "vae",
    "controlnet",
    "upscale_models",
    "text_encoders",
    "diffusion_models",
    "clip_vision",
    "embeddings",
    "hypernetworks",
];

/// Map legacy kind names used by older workflow documents onto the
/// current directory names.
pub fn map_legacy(kind: &str) -> &str {
    match kind {
        "unet" => "diffusion_models",
        "clip" => "text_encoders",
        "upscale" => "upscale_models",
        _ => kind,
    }
}

/// A destination resolved by the policy.
#[derive(Debug, Clone)]
pub struct ResolvedDest {
    /// Canonicalized absolute path of the destination file
    pub abs: PathBuf,
    /// Path relative to the base directory, with forward slashes
    pub rel: String,
    /// Normalized kind name
    pub kind: String,
}

/// Filename and destination policy for the model tree.
#[derive(Clone)]
pub struct PathPolicy {
    base: Arc<PathBuf>,
    allowed_extensions: Arc<Vec<String>>,
}

impl PathPolicy {
    /// Create a policy rooted at `base`, creating and canonicalizing the
    /// base directory.
    pub fn new(base: &Path, allowed_extensions: &[String]) -> Result<Self> {
        std::fs::create_dir_all(base)?;
        let base = base.canonicalize()?;
        let allowed_extensions = allowed_extensions
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();
        Ok(Self {
            base: Arc::new(base),
            allowed_extensions: Arc::new(allowed_extensions),
        })
    }

    /// The canonicalized base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Normalize and validate a model kind.
    pub fn validate_kind(&self, kind: &str) -> Result<String> {
        let kind = map_legacy(kind);
        if MODEL_KINDS.contains(&kind) {
            Ok(kind.to_string())
        } else {
            Err(AppError::InvalidName(format!("unknown model kind '{kind}'")))
        }
    }

    /// Whether `name` ends in one of the allowed model extensions.
    pub fn has_allowed_extension(&self, name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|ext| lower.ends_with(ext.as_str()))
    }

    /// Validate that `name` is a safe single path segment with an allowed
    /// extension.
    pub fn validate_filename(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(AppError::InvalidName("empty filename".into()));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(AppError::InvalidName(format!(
                "filename '{name}' must not contain path separators"
            )));
        }
        if name == "." || name == ".." {
            return Err(AppError::InvalidName(format!("invalid filename '{name}'")));
        }
        if name.starts_with('.') {
            return Err(AppError::InvalidName(format!(
                "filename '{name}' must not start with a dot"
            )));
        }
        if name.contains('\0') {
            return Err(AppError::InvalidName("filename contains NUL".into()));
        }
        if !self.has_allowed_extension(name) {
            return Err(AppError::InvalidName(format!(
                "extension of '{}' is not allowed (expected one of {})",
                name,
                self.allowed_extensions.join(", ")
            )));
        }
        Ok(())
    }

    /// Resolve a `(kind, filename)` pair to an absolute destination under
    /// the base directory. Resolution never touches the filesystem beyond
    /// reads; the kind directory is created lazily by whoever publishes
    /// into it. The result is guaranteed to be a descendant of the base
    /// (an existing kind directory is canonicalized, so a symlinked kind
    /// directory pointing outside the base is rejected).
    pub fn resolve(&self, kind: &str, filename: &str) -> Result<ResolvedDest> {
        let kind = self.validate_kind(kind)?;
        self.validate_filename(filename)?;

        let dir = self.base.join(&kind);
        let dir = dir.canonicalize().unwrap_or(dir);
        if !dir.starts_with(self.base.as_ref()) {
            return Err(AppError::InvalidName(format!(
                "kind directory '{kind}' escapes the model base directory"
            )));
        }

        let abs = dir.join(filename);
        if !abs.starts_with(self.base.as_ref()) {
            return Err(AppError::InvalidName(format!(
                "resolved path for '{filename}' escapes the model base directory"
            )));
        }

        Ok(ResolvedDest {
            abs,
            rel: format!("{kind}/{filename}"),
            kind,
        })
    }

    /// Absolute path for a catalog-relative path.
    pub fn abs_from_rel(&self, rel: &str) -> PathBuf {
        self.base.join(rel)
    }

    /// Catalog-relative path (forward slashes) for an absolute path under
    /// the base, when it is one.
    pub fn rel_from_abs(&self, abs: &Path) -> Option<String> {
        abs.strip_prefix(self.base.as_ref())
            .ok()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MODEL_EXTENSIONS;
    use tempfile::TempDir;

    fn policy(temp: &TempDir) -> PathPolicy {
        let exts: Vec<String> = DEFAULT_MODEL_EXTENSIONS.iter().map(|s| s.to_string()).collect();
        PathPolicy::new(temp.path(), &exts).unwrap()
    }

    #[test]
    fn resolve_places_file_under_kind_dir() {
        let temp = TempDir::new().unwrap();
        let policy = policy(&temp);

        let dest = policy.resolve("checkpoints", "model.safetensors").unwrap();
        assert_eq!(dest.rel, "checkpoints/model.safetensors");
        assert!(dest.abs.ends_with("checkpoints/model.safetensors"));
        assert!(dest.abs.starts_with(policy.base()));
    }

    #[test]
    fn legacy_kinds_are_mapped() {
        let temp = TempDir::new().unwrap();
        let policy = policy(&temp);

        let dest = policy.resolve("unet", "flux.gguf").unwrap();
        assert_eq!(dest.kind, "diffusion_models");
        assert_eq!(dest.rel, "diffusion_models/flux.gguf");
    }

    #[test]
    fn unknown_kind_rejected() {
        let temp = TempDir::new().unwrap();
        let policy = policy(&temp);
        assert!(matches!(
            policy.resolve("plugins", "x.safetensors"),
            Err(AppError::InvalidName(_))
        ));
    }

    #[test]
    fn traversal_names_rejected() {
        let temp = TempDir::new().unwrap();
        let policy = policy(&temp);

        for bad in [
            "../evil.safetensors",
            "a/b.safetensors",
            "a\\b.safetensors",
            "..",
            ".hidden.safetensors",
            "",
        ] {
            assert!(
                matches!(policy.resolve("checkpoints", bad), Err(AppError::InvalidName(_))),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn disallowed_extension_rejected() {
        let temp = TempDir::new().unwrap();
        let policy = policy(&temp);
        assert!(matches!(
            policy.resolve("checkpoints", "model.exe"),
            Err(AppError::InvalidName(_))
        ));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let policy = policy(&temp);
        assert!(policy.resolve("checkpoints", "Model.SafeTensors").is_ok());
    }

    #[test]
    fn rel_abs_roundtrip() {
        let temp = TempDir::new().unwrap();
        let policy = policy(&temp);

        let dest = policy.resolve("loras", "style.safetensors").unwrap();
        assert_eq!(policy.rel_from_abs(&dest.abs).unwrap(), dest.rel);
        assert_eq!(policy.abs_from_rel(&dest.rel), dest.abs);
    }
}
