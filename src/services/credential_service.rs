//! Credential broker - ephemeral per-request download tokens.
//!
//! Tokens live only in process memory, keyed by `(request_id, provider)`.
//! The broker exposes no read API beyond attaching credentials to an
//! outbound request; token bytes are zeroed when scrubbed, and every entry
//! carries a hard one-hour lifetime ceiling regardless of activity.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;
use url::Url;
use uuid::Uuid;

/// Hard ceiling on credential lifetime.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Supported authentication providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Huggingface,
    Civitai,
}

impl fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Huggingface => write!(f, "huggingface"),
            Self::Civitai => write!(f, "civitai"),
        }
    }
}

struct CredentialEntry {
    token: Vec<u8>,
    expires_at: Instant,
}

impl CredentialEntry {
    fn zero(&mut self) {
        for b in self.token.iter_mut() {
            *b = 0;
        }
        self.token.clear();
    }
}

/// In-memory broker for ephemeral download credentials.
#[derive(Default)]
pub struct CredentialBroker {
    entries: Mutex<HashMap<(Uuid, AuthProvider), CredentialEntry>>,
}

impl CredentialBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a token for one request. Overwrites (and zeroes) any previous
    /// token for the same key.
    pub fn store(&self, request_id: Uuid, provider: AuthProvider, token: String) {
        let mut entries = self.entries.lock().expect("credential broker poisoned");
        purge_expired(&mut entries);

        if let Some(mut old) = entries.insert(
            (request_id, provider),
            CredentialEntry {
                token: token.into_bytes(),
                expires_at: Instant::now() + MAX_TOKEN_LIFETIME,
            },
        ) {
            old.zero();
        }

        tracing::debug!(%request_id, provider = %provider, has_token = true, "Stored download credential");
    }

    /// Whether any credential is held for the request.
    pub fn has_token(&self, request_id: Uuid) -> bool {
        let entries = self.entries.lock().expect("credential broker poisoned");
        entries
            .iter()
            .any(|((id, _), e)| *id == request_id && !e.token.is_empty())
    }

    /// Build an authenticated GET request for `url`: a HuggingFace token
    /// becomes a bearer header, a CivitAI token is merged into the query.
    /// Callers cannot read tokens back; this is the only use site.
    pub fn authorize_get(
        &self,
        client: &reqwest::Client,
        request_id: Uuid,
        url: &Url,
    ) -> reqwest::RequestBuilder {
        let mut fetch_url = url.clone();
        let mut bearer: Option<String> = None;

        {
            let mut entries = self.entries.lock().expect("credential broker poisoned");
            purge_expired(&mut entries);

            if let Some(entry) = entries.get(&(request_id, AuthProvider::Huggingface)) {
                if !entry.token.is_empty() {
                    bearer = String::from_utf8(entry.token.clone()).ok();
                }
            }
            if let Some(entry) = entries.get(&(request_id, AuthProvider::Civitai)) {
                if let Ok(token) = std::str::from_utf8(&entry.token) {
                    if !token.is_empty() {
                        fetch_url.query_pairs_mut().append_pair("token", token);
                    }
                }
            }
        }

        let mut builder = client.get(fetch_url);
        if let Some(token) = bearer {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    /// Zero and drop every credential held for the request. Called on
    /// request completion regardless of outcome.
    pub fn scrub(&self, request_id: Uuid) {
        let mut entries = self.entries.lock().expect("credential broker poisoned");
        let keys: Vec<(Uuid, AuthProvider)> = entries
            .keys()
            .filter(|(id, _)| *id == request_id)
            .copied()
            .collect();
        for key in keys {
            if let Some(mut entry) = entries.remove(&key) {
                entry.zero();
            }
        }
    }
}

fn purge_expired(entries: &mut HashMap<(Uuid, AuthProvider), CredentialEntry>) {
    let now = Instant::now();
    let expired: Vec<(Uuid, AuthProvider)> = entries
        .iter()
        .filter(|(_, e)| e.expires_at <= now)
        .map(|(k, _)| *k)
        .collect();
    for key in expired {
        if let Some(mut entry) = entries.remove(&key) {
            entry.zero();
            tracing::debug!(request_id = %key.0, provider = %key.1, "Expired download credential");
        }
    }
}
