use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::IdentityGate;
use crate::error::Result;
use crate::services::AppServices;
use telemetry_store::Store;

/// Paths needed to run the telemetry backend.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub db_path: PathBuf,
}

/// Application state shared by embedding frontends.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub services: AppServices,
}

impl AppState {
    pub fn new(db_path: PathBuf, auth: Arc<dyn IdentityGate>) -> Self {
        let config = AppConfig { db_path };
        let services = AppServices::new(&config, auth);
        Self { config, services }
    }

    pub fn setup_store(&self) -> Result<()> {
        setup_store(&self.config.db_path)
    }

    pub fn open_store(&self) -> Result<Store> {
        Ok(Store::open(&self.config.db_path)?)
    }
}

pub fn setup_store(path: &std::path::Path) -> Result<()> {
    let mut store = Store::open(path)?;
    store.migrate()?;
    Ok(())
}
