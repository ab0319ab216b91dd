mod analytics;
mod telemetry;

use std::sync::Arc;

use crate::app::AppConfig;
use crate::auth::IdentityGate;
use crate::error::Result;
use telemetry_store::Store;

pub use analytics::{
    AnalyticsParams, AnalyticsResponse, AnalyticsService, AnalyticsTotals, AnomalyResponse,
    analytics_snapshot, anomaly_snapshot,
};
pub use telemetry::{RecordedId, TelemetryService};

type SharedConfig = Arc<AppConfig>;
type SharedAuth = Arc<dyn IdentityGate>;

/// Service registry for app-level operations.
#[derive(Clone)]
pub struct AppServices {
    pub telemetry: TelemetryService,
    pub analytics: AnalyticsService,
}

impl AppServices {
    pub fn new(config: &AppConfig, auth: SharedAuth) -> Self {
        let shared = Arc::new(config.clone());
        Self {
            telemetry: TelemetryService::new(shared.clone(), auth),
            analytics: AnalyticsService::new(shared),
        }
    }
}

fn open_store(config: &SharedConfig) -> Result<Store> {
    Ok(Store::open(&config.db_path)?)
}
