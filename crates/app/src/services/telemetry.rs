use chrono::Utc;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::services::{SharedAuth, SharedConfig, open_store};
use crate::validate::{RecordInput, resolve_limit, validate_record, validate_run_id};
use telemetry_core::TelemetryRecord;
use telemetry_store::{RowSource, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecordedId {
    pub id: i64,
}

/// Write path and indexed reads for telemetry rows.
#[derive(Clone)]
pub struct TelemetryService {
    config: SharedConfig,
    auth: SharedAuth,
}

impl TelemetryService {
    pub(super) fn new(config: SharedConfig, auth: SharedAuth) -> Self {
        Self { config, auth }
    }

    fn store(&self) -> Result<Store> {
        open_store(&self.config)
    }

    /// Validates and appends one record. The identity check runs before any
    /// field validation; nothing is written unless every check passes.
    pub fn record(&self, input: &RecordInput) -> Result<RecordedId> {
        self.auth
            .current_identity()
            .ok_or(AppError::Unauthenticated)?;
        let record = validate_record(input, Utc::now().timestamp_millis())?;
        let mut store = self.store()?;
        let id = store.insert(&record)?;
        Ok(RecordedId { id })
    }

    pub fn list_by_task(&self, task_id: &str, limit: Option<f64>) -> Result<Vec<TelemetryRecord>> {
        let limit = resolve_limit(limit)?;
        let store = self.store()?;
        Ok(store.query_by_task(task_id, limit)?)
    }

    pub fn list_by_run(&self, run_id: &str, limit: Option<f64>) -> Result<Vec<TelemetryRecord>> {
        let run_id = validate_run_id(run_id)?;
        let limit = resolve_limit(limit)?;
        let store = self.store()?;
        Ok(store.query_by_run(&run_id, limit)?)
    }
}
