//! Entity service: stores mappings between caller supplied ids and OSM element
//! ids and serves them over HTTP.

pub mod api;
pub mod config;
pub mod errors;
pub mod manager;
pub mod metrics_defs;
pub mod sqlite_store;
pub mod store;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testutils;

use config::Config;
use errors::EntityError;
use manager::EntityManager;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use sqlite_store::SqliteStore;
use std::sync::Arc;
use store::StoreError;

#[derive(thiserror::Error, Debug)]
pub enum EntityServiceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Config(#[from] config::ValidationError),

    #[error("could not open database: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Entity(#[from] EntityError),
}

fn open_store(config: &Config) -> Result<SqliteStore, EntityServiceError> {
    tracing::info!(path = %config.database.path.display(), "opening entity database");
    Ok(SqliteStore::open(&config.database.path)?)
}

/// Creates the schema without starting the service.
pub fn migrate(config: &Config) -> Result<(), EntityServiceError> {
    config.validate()?;
    open_store(config)?;
    tracing::info!("entity schema is up to date");
    Ok(())
}

pub async fn run(config: Config) -> Result<(), EntityServiceError> {
    config.validate()?;

    let store = Arc::new(open_store(&config)?);
    let manager = EntityManager::new(store, config.allow_duplicate_osm_id);
    let stored = manager.sync_entity_gauge()?;
    tracing::info!(stored, "starting entity service");

    let probe = manager.clone();
    let admin = AdminService::new(move || probe.is_ready());

    tokio::try_join!(
        api::serve(&config.listener, manager),
        run_http_service(
            &config.admin_listener.host,
            config.admin_listener.port,
            admin
        ),
    )?;

    Ok(())
}
