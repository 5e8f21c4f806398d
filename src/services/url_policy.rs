//! URL admission - host allowlisting and credential-parameter stripping.
//!
//! Download sources are restricted to a configured set of host suffixes.
//! Admitted URLs are sanitized before persistence: query parameters with
//! credential-like names never reach the catalog or the logs. The original
//! (unsanitized) URL is still what the fetch uses.

use url::Url;

use crate::error::{AppError, Result};

/// Query parameter names treated as credentials (case-insensitive).
const CREDENTIAL_PARAMS: &[&str] = &["token", "api_key", "key", "access_token"];

/// A URL that passed admission.
#[derive(Debug, Clone)]
pub struct AdmittedUrl {
    /// URL to fetch, exactly as supplied
    pub fetch: Url,
    /// Sanitized rendering safe to persist and log
    pub persisted: String,
}

/// Host allowlist for download sources.
#[derive(Clone)]
pub struct UrlPolicy {
    allowed_suffixes: Vec<String>,
}

impl UrlPolicy {
    pub fn new(allowed_suffixes: &[String]) -> Self {
        Self {
            allowed_suffixes: allowed_suffixes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
        }
    }

    /// Whether a host matches the allowlist: exact match or subdomain of a
    /// listed suffix.
    pub fn host_allowed(&self, host: &str) -> bool {
        host_matches(&self.allowed_suffixes, host)
    }

    /// The configured suffixes, for building the redirect policy.
    pub fn allowed_suffixes(&self) -> &[String] {
        &self.allowed_suffixes
    }

    /// Parse and admit a URL. Rejects non-HTTP schemes and hosts outside
    /// the allowlist.
    pub fn admit(&self, raw: &str) -> Result<AdmittedUrl> {
        let url = Url::parse(raw.trim())
            .map_err(|e| AppError::Validation(format!("invalid URL '{raw}': {e}")))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(AppError::UrlForbidden(format!(
                "scheme '{}' is not allowed",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| AppError::UrlForbidden("URL has no host".into()))?;

        if !self.host_allowed(host) {
            return Err(AppError::UrlForbidden(format!(
                "host '{host}' is not on the download allowlist"
            )));
        }

        Ok(AdmittedUrl {
            persisted: sanitize_url(&url),
            fetch: url,
        })
    }
}

/// Whether `host` is an exact match or subdomain of one of the suffixes.
pub fn host_matches(suffixes: &[String], host: &str) -> bool {
    let host = host.to_ascii_lowercase();
    suffixes
        .iter()
        .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
}

/// Render a URL with credential-named query parameters removed.
pub fn sanitize_url(url: &Url) -> String {
    let mut clean = url.clone();

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| {
            !CREDENTIAL_PARAMS
                .iter()
                .any(|p| name.eq_ignore_ascii_case(p))
        })
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        clean.set_query(None);
    } else {
        let mut pairs = clean.query_pairs_mut();
        pairs.clear();
        for (name, value) in &kept {
            pairs.append_pair(name, value);
        }
        drop(pairs);
    }

    clean.to_string()
}

/// Extract a filename from a URL's last path segment, ignoring query and
/// fragment. Returns None when the path carries no usable segment.
pub fn filename_from_url(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .last()
        .map(|s| s.to_string())
}
