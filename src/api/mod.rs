//! API module - HTTP handlers, routes, and shared state.

pub mod dto;
pub mod handlers;
pub mod openapi;
pub mod routes;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::Result;
use crate::paths::PathPolicy;
use crate::services::alias_service::AliasService;
use crate::services::catalog_service::CatalogService;
use crate::services::credential_service::CredentialBroker;
use crate::services::download_service::DownloadService;
use crate::services::migration_service::MigrationService;
use crate::services::resolver_service::DependencyResolver;
use crate::services::url_policy::UrlPolicy;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: SqlitePool,
    pub catalog: CatalogService,
    pub paths: PathPolicy,
    pub urls: UrlPolicy,
    pub broker: Arc<CredentialBroker>,
    pub downloads: DownloadService,
    pub resolver: DependencyResolver,
    pub migration: MigrationService,
}

impl AppState {
    pub fn new(config: Config, db: SqlitePool) -> Result<Self> {
        let catalog = CatalogService::new(db.clone());
        let paths = PathPolicy::new(&config.base_path, &config.allowed_extensions)?;
        let urls = UrlPolicy::new(&config.allowed_hosts);
        let broker = Arc::new(CredentialBroker::new());
        let aliaser = AliasService::new(catalog.clone());

        let downloads = DownloadService::new(
            &config,
            catalog.clone(),
            paths.clone(),
            urls.clone(),
            aliaser,
            broker.clone(),
        )?;
        let resolver = DependencyResolver::new(catalog.clone(), paths.clone(), urls.clone());
        let migration = MigrationService::new(catalog.clone(), paths.clone());

        Ok(Self {
            config,
            db,
            catalog,
            paths,
            urls,
            broker,
            downloads,
            resolver,
            migration,
        })
    }
}

pub type SharedState = Arc<AppState>;
