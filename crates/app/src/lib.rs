pub mod app;
pub mod auth;
pub mod error;
pub mod services;
pub mod validate;

pub use app::{AppConfig, AppState};
pub use auth::{Anonymous, Identity, IdentityGate, StaticIdentity};
pub use error::{ApiError, AppError, Result};
pub use services::{
    AnalyticsParams, AnalyticsResponse, AnalyticsService, AnalyticsTotals, AnomalyResponse,
    AppServices, RecordedId, TelemetryService, analytics_snapshot, anomaly_snapshot,
};
pub use validate::{RecordInput, resolve_limit, validate_record, validate_run_id};
