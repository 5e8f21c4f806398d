//! Workflow dependency manifest types and resolution results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::services::credential_service::AuthProvider;

fn default_required() -> bool {
    true
}

/// One artifact a workflow depends on, as declared in its manifest. The
/// kind comes from the enclosing manifest key.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct DependencyEntry {
    pub filename: String,
    pub sha256: String,
    #[serde(default)]
    pub size: u64,
    /// Ordered candidate source URLs
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(default)]
    pub auth_provider: Option<AuthProvider>,
}

/// A workflow's dependency manifest: kind name to declared entries.
/// BTreeMap keeps resolution output ordering stable.
pub type DependencyManifest = BTreeMap<String, Vec<DependencyEntry>>;

/// Disposition of an already-present dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DependencyAction {
    /// No filesystem change needed
    Canonical,
    /// An alias will be materialized at download time
    Symlink,
}

/// A dependency that must be fetched.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MissingDependency {
    pub filename: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha256: String,
    pub size: u64,
    /// Candidate URLs that passed admission (may be empty when every
    /// declared source is forbidden)
    pub urls: Vec<String>,
    pub requires_auth: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_provider: Option<String>,
}

/// A dependency satisfied by content already on disk.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ExistingDependency {
    pub filename: String,
    /// Base-relative location of the bytes that satisfy the entry
    pub exists_at: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha256: String,
    pub size: u64,
    pub action: DependencyAction,
}

/// Resolver output for one manifest.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DependencyResolution {
    pub missing: Vec<MissingDependency>,
    pub existing: Vec<ExistingDependency>,
    pub total_download_size: u64,
    pub total_saved_size: u64,
}
