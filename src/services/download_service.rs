//! Download engine - authenticated streaming fetch with verification,
//! atomic publish, and catalog registration.
//!
//! A download streams to a temp file under `<base>/.cache/tmp/`, hashing
//! as it writes. On completion the byte count and SHA-256 are verified,
//! the file is renamed into place, and the catalog row is inserted before
//! the terminal event is emitted. Concurrent requests for the same hash
//! coalesce onto a single fetch through a broadcast fan-out; the fetch is
//! cancelled when its last subscriber disconnects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::NewModelFile;
use crate::paths::{PathPolicy, ResolvedDest};
use crate::services::alias_service::AliasService;
use crate::services::catalog_service::{self, CatalogService};
use crate::services::credential_service::{AuthProvider, CredentialBroker};
use crate::services::url_policy::{self, AdmittedUrl, UrlPolicy};

/// Progress step for downloads with an unknown total size.
const UNKNOWN_TOTAL_STEP: u64 = 8 * 1024 * 1024;

/// Broadcast channel capacity for progress fan-out.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One NDJSON progress frame. Serialized shapes are part of the wire
/// protocol consumed by existing frontends; field sets must not change.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProgressEvent {
    /// Initial (and priming) frame
    Started {
        message: String,
        bytes: u64,
        total_bytes: u64,
    },
    /// Incremental frame, monotonically non-decreasing in `bytes`
    Progress {
        progress: f64,
        bytes: u64,
        total_bytes: u64,
    },
    /// Terminal success frame
    Completed {
        message: String,
        path: String,
        sha256: String,
    },
    /// Terminal failure frame
    Failed { error: String },
}

impl ProgressEvent {
    fn started(message: impl Into<String>, bytes: u64, total_bytes: u64) -> Self {
        Self::Started {
            message: message.into(),
            bytes,
            total_bytes,
        }
    }

    fn progress(bytes: u64, total_bytes: u64) -> Self {
        let progress = if total_bytes > 0 {
            (bytes as f64 / total_bytes as f64).min(1.0)
        } else {
            0.0
        };
        Self::Progress {
            progress,
            bytes,
            total_bytes,
        }
    }

    fn completed(message: impl Into<String>, path: &Path, sha256: &str) -> Self {
        Self::Completed {
            message: message.into(),
            path: path.to_string_lossy().into_owned(),
            sha256: sha256.to_string(),
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }
}

/// Stream of progress events for one caller.
pub type EventStream = BoxStream<'static, ProgressEvent>;

/// A download request as seen by the engine. The HTTP layer supplies a
/// single URL; the resolver may supply several candidates that are rotated
/// through on connection failure.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub request_id: Uuid,
    pub urls: Vec<String>,
    pub kind: String,
    /// Destination filename; derived from the URL when absent
    pub filename: Option<String>,
    pub expected_sha256: Option<String>,
    pub expected_size: Option<u64>,
    pub display_name: Option<String>,
    pub tokens: Vec<(AuthProvider, String)>,
}

/// In-flight fetch shared by coalesced callers.
#[derive(Clone)]
struct Inflight {
    events: broadcast::Sender<ProgressEvent>,
    bytes: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
}

/// Failure reasons inside an already-open progress stream.
#[derive(Debug, Error)]
enum DownloadFailure {
    #[error("Network timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Disk full while writing download")]
    DiskFull,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Catalog unavailable: {0}")]
    Catalog(String),

    /// Last subscriber disconnected; no terminal frame is deliverable.
    #[error("Download cancelled")]
    Cancelled,
}

impl From<std::io::Error> for DownloadFailure {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::StorageFull {
            Self::DiskFull
        } else {
            Self::Io(e.to_string())
        }
    }
}

/// Removes the temp file on drop unless the download published it.
struct TempFileGuard {
    path: PathBuf,
    armed: bool,
}

impl TempFileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// The download engine.
#[derive(Clone)]
pub struct DownloadService {
    catalog: CatalogService,
    paths: PathPolicy,
    urls: UrlPolicy,
    aliaser: AliasService,
    broker: Arc<CredentialBroker>,
    client: reqwest::Client,
    temp_dir: PathBuf,
    idle_timeout: Duration,
    inflight: Arc<Mutex<HashMap<String, Inflight>>>,
}

impl DownloadService {
    pub fn new(
        config: &Config,
        catalog: CatalogService,
        paths: PathPolicy,
        urls: UrlPolicy,
        aliaser: AliasService,
        broker: Arc<CredentialBroker>,
    ) -> Result<Self> {
        // Redirects are followed only while they stay on the allowlist.
        let suffixes = urls.allowed_suffixes().to_vec();
        let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
            let allowed = attempt
                .url()
                .host_str()
                .map(|host| url_policy::host_matches(&suffixes, host))
                .unwrap_or(false);
            if allowed {
                attempt.follow()
            } else {
                attempt.error("redirect target not in download allowlist")
            }
        });

        let client = reqwest::Client::builder()
            .redirect(redirect_policy)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            catalog,
            paths,
            urls,
            aliaser,
            broker,
            client,
            temp_dir: config.temp_dir(),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            inflight: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Admit, resolve, and either short-circuit, join an in-flight fetch,
    /// or start a new one. Errors returned here surface as HTTP statuses;
    /// failures after the stream opens surface as in-stream `error` frames.
    pub async fn begin(&self, req: DownloadRequest) -> Result<EventStream> {
        if req.urls.is_empty() {
            return Err(AppError::Validation(
                "at least one source URL is required".into(),
            ));
        }
        let admitted: Vec<AdmittedUrl> = req
            .urls
            .iter()
            .map(|u| self.urls.admit(u))
            .collect::<Result<_>>()?;

        let expected_sha = req
            .expected_sha256
            .as_deref()
            .map(normalize_sha256)
            .transpose()?;

        let filename = match &req.filename {
            Some(name) => name.clone(),
            None => url_policy::filename_from_url(&admitted[0].fetch).ok_or_else(|| {
                AppError::Validation("cannot derive a filename from the URL".into())
            })?,
        };
        let dest = self.paths.resolve(&req.kind, &filename)?;

        // Pre-check by hash: identical content may already be registered
        // under any filename.
        if let Some(hash) = &expected_sha {
            if let Some(row) = self.catalog.get_by_hash(hash).await? {
                let canonical_abs = self.paths.abs_from_rel(&row.file_path);
                if file_intact(&canonical_abs, row.size_bytes).await {
                    return self.short_circuit_known_hash(hash, &row.file_path, &canonical_abs, &dest).await;
                }
                tracing::warn!(
                    sha256 = %catalog_service::short_hash(hash),
                    path = %row.file_path,
                    "Canonical file missing or corrupt, refetching"
                );
            }
        }

        // Pre-check by destination path: ingest files that appeared outside
        // the registry.
        if tokio::fs::symlink_metadata(&dest.abs).await.is_ok() {
            return self
                .ingest_existing_destination(&dest, expected_sha.as_deref(), &admitted[0], &req)
                .await;
        }

        // Coalesce on hash (or destination when no hash was supplied).
        let key = expected_sha
            .clone()
            .unwrap_or_else(|| dest.abs.to_string_lossy().into_owned());

        let (tx, rx, counters) = {
            let mut inflight = self.inflight.lock().expect("pending downloads poisoned");
            if let Some(existing) = inflight.get(&key) {
                let rx = existing.events.subscribe();
                let bytes = existing.bytes.load(Ordering::Relaxed);
                let total = existing.total.load(Ordering::Relaxed);
                tracing::debug!(key = %key, joined_at = bytes, "Joined in-flight download");
                // Late joiners missed the initial frame; prime them with
                // the current byte count.
                return Ok(self.subscriber_stream(rx, Some((bytes, total)), dest));
            }

            let (tx, rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
            let entry = Inflight {
                events: tx.clone(),
                bytes: Arc::new(AtomicU64::new(0)),
                total: Arc::new(AtomicU64::new(0)),
            };
            inflight.insert(key.clone(), entry.clone());
            (tx, rx, entry)
        };

        for (provider, token) in &req.tokens {
            self.broker.store(req.request_id, *provider, token.clone());
        }
        tracing::info!(
            url = %admitted[0].persisted,
            dest = %dest.rel,
            has_token = !req.tokens.is_empty(),
            "Starting download"
        );

        let response = match self.open_source(req.request_id, &admitted).await {
            Ok(response) => response,
            Err(err) => {
                let _ = tx.send(ProgressEvent::failed(err.to_string()));
                self.remove_inflight(&key);
                self.broker.scrub(req.request_id);
                return Err(err);
            }
        };

        let total = req
            .expected_size
            .or(response.content_length())
            .unwrap_or(0);
        counters.total.store(total, Ordering::Relaxed);

        let producer = Producer {
            service: self.clone(),
            key,
            request_id: req.request_id,
            dest: dest.clone(),
            filename,
            expected_sha,
            expected_size: req.expected_size,
            source_persisted: admitted[0].persisted.clone(),
            display_name: req.display_name.clone(),
            tx,
            counters,
            total,
        };
        tokio::spawn(producer.run(response));

        Ok(self.subscriber_stream(rx, None, dest))
    }

    /// Hash already registered and intact: alias or no-op.
    async fn short_circuit_known_hash(
        &self,
        hash: &str,
        canonical_rel: &str,
        canonical_abs: &Path,
        dest: &ResolvedDest,
    ) -> Result<EventStream> {
        if canonical_rel == dest.rel {
            tracing::debug!(sha256 = %catalog_service::short_hash(hash), "Model already exists");
            return Ok(ready_stream(ProgressEvent::completed(
                "Model already exists",
                canonical_abs,
                hash,
            )));
        }

        if let Some((row, _)) = self.catalog.get_by_path(&dest.rel).await? {
            if row.sha256 == hash {
                return Ok(ready_stream(ProgressEvent::completed(
                    "Model already exists",
                    &dest.abs,
                    hash,
                )));
            }
            return Err(AppError::AliasCollision(format!(
                "'{}' already contains different content",
                dest.rel
            )));
        }

        self.aliaser
            .create_alias(hash, canonical_abs, &dest.abs, &dest.rel)
            .await?;
        Ok(ready_stream(ProgressEvent::completed(
            "Alias created",
            &dest.abs,
            hash,
        )))
    }

    /// Destination file already on disk: verify against the expected hash
    /// when given, register, and short-circuit.
    async fn ingest_existing_destination(
        &self,
        dest: &ResolvedDest,
        expected_sha: Option<&str>,
        source: &AdmittedUrl,
        req: &DownloadRequest,
    ) -> Result<EventStream> {
        let actual = catalog_service::sha256_file(&dest.abs).await?;
        if let Some(expected) = expected_sha {
            if actual != expected {
                return Err(AppError::AliasCollision(format!(
                    "'{}' exists with different content",
                    dest.rel
                )));
            }
        }

        let size = tokio::fs::metadata(&dest.abs).await?.len() as i64;
        let inserted = self
            .catalog
            .insert_artifact(&NewModelFile {
                sha256: actual.clone(),
                file_path: dest.rel.clone(),
                size_bytes: size,
                source_url: Some(source.persisted.clone()),
                metadata: metadata_blob(&dest.kind, dest.rel_filename(), req.display_name.as_deref()),
            })
            .await?;
        if !inserted {
            // Hash registered elsewhere; this file is a pre-existing duplicate.
            self.catalog.insert_alias(&actual, &dest.rel).await?;
        }

        Ok(ready_stream(ProgressEvent::completed(
            "Model already exists",
            &dest.abs,
            &actual,
        )))
    }

    /// Open the outbound request. A connection failure before any byte is
    /// read is retried once; multiple candidate URLs are rotated in order.
    async fn open_source(
        &self,
        request_id: Uuid,
        admitted: &[AdmittedUrl],
    ) -> Result<reqwest::Response> {
        let attempts: Vec<&AdmittedUrl> = if admitted.len() == 1 {
            vec![&admitted[0], &admitted[0]]
        } else {
            admitted.iter().collect()
        };

        let mut last_err = None;
        for (attempt, candidate) in attempts.iter().enumerate() {
            if attempt > 0 {
                tracing::debug!(attempt, url = %candidate.persisted, "Retrying download request");
            }

            let builder = self
                .broker
                .authorize_get(&self.client, request_id, &candidate.fetch);

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    return Err(match status.as_u16() {
                        401 => AppError::Unauthorized(format!(
                            "source '{}' requires credentials",
                            candidate.persisted
                        )),
                        403 => AppError::Forbidden(format!(
                            "source '{}' rejected the request",
                            candidate.persisted
                        )),
                        _ => AppError::Upstream(format!(
                            "source '{}' returned status {status}",
                            candidate.persisted
                        )),
                    });
                }
                Err(e) if e.is_redirect() => {
                    return Err(AppError::UrlForbidden(
                        "redirect outside the download allowlist".into(),
                    ));
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_err = Some(AppError::Upstream(format!(
                        "request to '{}' failed: {e}",
                        candidate.persisted
                    )));
                }
                Err(e) => {
                    return Err(AppError::Upstream(format!(
                        "request to '{}' failed: {e}",
                        candidate.persisted
                    )));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| AppError::Upstream("no source URL succeeded".into())))
    }

    /// Relay broadcast events to one caller. After a shared terminal
    /// `Completed` frame, a caller whose destination differs from the
    /// published path gets its alias materialized and one extra frame.
    fn subscriber_stream(
        &self,
        mut rx: broadcast::Receiver<ProgressEvent>,
        priming: Option<(u64, u64)>,
        dest: ResolvedDest,
    ) -> EventStream {
        let catalog = self.catalog.clone();
        let paths = self.paths.clone();
        let aliaser = self.aliaser.clone();

        let stream = async_stream::stream! {
            if let Some((bytes, total)) = priming {
                yield ProgressEvent::started(
                    format!("Download in progress ({bytes} bytes so far)"),
                    bytes,
                    total,
                );
            }

            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let completed = match &event {
                            ProgressEvent::Completed { path, sha256, .. } => {
                                Some((PathBuf::from(path), sha256.clone()))
                            }
                            _ => None,
                        };
                        let failed = matches!(event, ProgressEvent::Failed { .. });

                        yield event;

                        if let Some((published, sha)) = completed {
                            if published != dest.abs {
                                match ensure_caller_alias(&catalog, &paths, &aliaser, &sha, &dest).await {
                                    Ok(extra) => yield extra,
                                    Err(e) => yield ProgressEvent::failed(e.to_string()),
                                }
                            }
                            break;
                        }
                        if failed {
                            break;
                        }
                    }
                    // Skipping lagged frames preserves byte monotonicity.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        yield ProgressEvent::failed("Download cancelled");
                        break;
                    }
                }
            }
        };

        stream.boxed()
    }

    fn remove_inflight(&self, key: &str) {
        self.inflight
            .lock()
            .expect("pending downloads poisoned")
            .remove(key);
    }
}

/// The single producer task behind a coalesced download.
struct Producer {
    service: DownloadService,
    key: String,
    request_id: Uuid,
    dest: ResolvedDest,
    filename: String,
    expected_sha: Option<String>,
    expected_size: Option<u64>,
    source_persisted: String,
    display_name: Option<String>,
    tx: broadcast::Sender<ProgressEvent>,
    counters: Inflight,
    total: u64,
}

impl Producer {
    async fn run(self, response: reqwest::Response) {
        match self.fetch_and_publish(response).await {
            Ok(sha256) => {
                tracing::info!(
                    sha256 = %catalog_service::short_hash(&sha256),
                    path = %self.dest.rel,
                    "Download complete"
                );
                let _ = self.tx.send(ProgressEvent::completed(
                    "Download complete",
                    &self.dest.abs,
                    &sha256,
                ));
            }
            Err(DownloadFailure::Cancelled) => {
                tracing::info!(dest = %self.dest.rel, "Download cancelled by last subscriber");
            }
            Err(failure) => {
                tracing::warn!(
                    dest = %self.dest.rel,
                    url = %self.source_persisted,
                    error = %failure,
                    "Download failed"
                );
                let _ = self.tx.send(ProgressEvent::failed(failure.to_string()));
            }
        }

        self.service.remove_inflight(&self.key);
        self.service.broker.scrub(self.request_id);
    }

    async fn fetch_and_publish(
        &self,
        response: reqwest::Response,
    ) -> std::result::Result<String, DownloadFailure> {
        tokio::fs::create_dir_all(&self.service.temp_dir).await?;
        let temp_path = self
            .service
            .temp_dir
            .join(format!("{}.part", Uuid::new_v4()));
        let guard = TempFileGuard::new(temp_path.clone());

        let mut file = tokio::fs::File::create(&temp_path).await?;
        let mut hasher = Sha256::new();
        let mut bytes_written: u64 = 0;

        self.emit(ProgressEvent::started(
            format!("Downloading {}", self.filename),
            0,
            self.total,
        ))?;

        let step = if self.total > 0 {
            (self.total / 100).max(1)
        } else {
            UNKNOWN_TOTAL_STEP
        };
        let mut next_emit = step;

        let mut body = response.bytes_stream();
        loop {
            let chunk = match tokio::time::timeout(self.service.idle_timeout, body.next()).await {
                Err(_) => {
                    return Err(DownloadFailure::Timeout(
                        self.service.idle_timeout.as_secs(),
                    ))
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => return Err(DownloadFailure::Network(e.to_string())),
                Ok(Some(Ok(chunk))) => chunk,
            };

            file.write_all(&chunk).await?;
            hasher.update(&chunk);
            bytes_written += chunk.len() as u64;
            self.counters.bytes.store(bytes_written, Ordering::Relaxed);

            if bytes_written >= next_emit {
                while next_emit <= bytes_written {
                    next_emit += step;
                }
                self.emit(ProgressEvent::progress(bytes_written, self.total))?;
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if self.total > 0 {
            self.emit(ProgressEvent::progress(bytes_written, self.total))?;
        }

        if let Some(expected) = self.expected_size {
            if bytes_written != expected {
                return Err(DownloadFailure::SizeMismatch {
                    expected,
                    actual: bytes_written,
                });
            }
        }

        let actual_sha = format!("{:x}", hasher.finalize());
        if let Some(expected) = &self.expected_sha {
            if actual_sha != *expected {
                return Err(DownloadFailure::HashMismatch {
                    expected: expected.clone(),
                    actual: actual_sha,
                });
            }
        }

        publish(&temp_path, &self.dest.abs).await?;
        guard.disarm();

        self.register(&actual_sha, bytes_written as i64)
            .await
            .map_err(|e| DownloadFailure::Catalog(e.to_string()))?;

        Ok(actual_sha)
    }

    /// Insert the catalog row before the terminal frame is emitted so that
    /// `get_by_hash` observes the artifact as soon as `Complete` is seen.
    async fn register(&self, sha256: &str, size: i64) -> Result<()> {
        let inserted = self
            .service
            .catalog
            .insert_artifact(&NewModelFile {
                sha256: sha256.to_string(),
                file_path: self.dest.rel.clone(),
                size_bytes: size,
                source_url: Some(self.source_persisted.clone()),
                metadata: metadata_blob(
                    &self.dest.kind,
                    &self.filename,
                    self.display_name.as_deref(),
                ),
            })
            .await?;

        if !inserted {
            let row = self
                .service
                .catalog
                .get_by_hash(sha256)
                .await?
                .ok_or_else(|| AppError::Internal("hash row vanished during publish".into()))?;
            if row.file_path == self.dest.rel {
                return Ok(());
            }
            let canonical_abs = self.service.paths.abs_from_rel(&row.file_path);
            if file_intact(&canonical_abs, row.size_bytes).await {
                // Someone published the same bytes first; ours becomes an alias.
                self.service.catalog.insert_alias(sha256, &self.dest.rel).await?;
            } else {
                self.service
                    .catalog
                    .rebind_canonical(sha256, &self.dest.rel, size)
                    .await?;
            }
        }
        Ok(())
    }

    fn emit(&self, event: ProgressEvent) -> std::result::Result<(), DownloadFailure> {
        self.tx
            .send(event)
            .map(|_| ())
            .map_err(|_| DownloadFailure::Cancelled)
    }
}

/// Rename the temp file onto the destination. When the temp directory lives
/// on a different filesystem the rename fails; stage an adjacent part file
/// and rename that, so the publish is atomic on the destination filesystem.
async fn publish(temp: &Path, dst: &Path) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(temp, dst).await {
        Ok(()) => Ok(()),
        Err(_) => {
            let file_name = dst
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "download".into());
            let staged = dst.with_file_name(format!("{file_name}.part0"));
            tokio::fs::copy(temp, &staged).await?;
            tokio::fs::rename(&staged, dst).await?;
            let _ = tokio::fs::remove_file(temp).await;
            Ok(())
        }
    }
}

/// Create the caller-side alias after a coalesced download completes.
async fn ensure_caller_alias(
    catalog: &CatalogService,
    paths: &PathPolicy,
    aliaser: &AliasService,
    sha256: &str,
    dest: &ResolvedDest,
) -> Result<ProgressEvent> {
    if let Some((row, _)) = catalog.get_by_path(&dest.rel).await? {
        if row.sha256 == sha256 {
            return Ok(ProgressEvent::completed(
                "Model already exists",
                &dest.abs,
                sha256,
            ));
        }
        return Err(AppError::AliasCollision(format!(
            "'{}' already contains different content",
            dest.rel
        )));
    }

    let row = catalog
        .get_by_hash(sha256)
        .await?
        .ok_or_else(|| AppError::Internal("completed hash missing from catalog".into()))?;
    let canonical_abs = paths.abs_from_rel(&row.file_path);

    match aliaser
        .create_alias(sha256, &canonical_abs, &dest.abs, &dest.rel)
        .await
    {
        Ok(_) => Ok(ProgressEvent::completed("Alias created", &dest.abs, sha256)),
        // A sibling subscriber may have raced us to the same destination.
        Err(AppError::AliasCollision(msg)) => match catalog.get_by_path(&dest.rel).await? {
            Some((row, _)) if row.sha256 == sha256 => Ok(ProgressEvent::completed(
                "Model already exists",
                &dest.abs,
                sha256,
            )),
            _ => Err(AppError::AliasCollision(msg)),
        },
        Err(e) => Err(e),
    }
}

async fn file_intact(path: &Path, expected_size: i64) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file() && meta.len() == expected_size as u64,
        Err(_) => false,
    }
}

fn ready_stream(event: ProgressEvent) -> EventStream {
    futures::stream::iter(vec![event]).boxed()
}

fn metadata_blob(kind: &str, filename: &str, display_name: Option<&str>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("filename".into(), filename.into());
    map.insert("folder".into(), kind.into());
    if let Some(name) = display_name {
        map.insert("display_name".into(), name.into());
    }
    serde_json::Value::Object(map)
}

/// Validate and normalize a SHA-256 hex string to lowercase.
pub fn normalize_sha256(raw: &str) -> Result<String> {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.len() != 64 || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(AppError::Validation(format!(
            "'{raw}' is not a 64-character SHA-256 hex digest"
        )));
    }
    Ok(normalized)
}

impl ResolvedDest {
    /// Leaf filename of the destination.
    fn rel_filename(&self) -> &str {
        self.rel.rsplit('/').next().unwrap_or(&self.rel)
    }
}
