use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::services::{SharedConfig, open_store};
use telemetry_core::{
    Anomaly, CategoryBucket, CategoryType, Granularity, PeriodBucket, ProjectBucket,
    TelemetryRecord, aggregate_by_category, aggregate_by_project, bucket_periods,
    detect_anomalies,
};
use telemetry_store::{ProjectResolver, RowSource};

pub const DEFAULT_WINDOW_MS: i64 = 7 * 86_400_000;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsParams {
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
    pub granularity: Option<Granularity>,
    pub category_type: Option<CategoryType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsTotals {
    pub entries: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    pub unique_projects: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub totals: AnalyticsTotals,
    pub period: Vec<PeriodBucket>,
    pub projects: Vec<ProjectBucket>,
    pub categories: Vec<CategoryBucket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyResponse {
    pub anomalies: Vec<Anomaly>,
}

/// Read-path facade: one range query, one resolver lookup, then pure
/// aggregation. Every call recomputes from raw rows; nothing is cached.
#[derive(Clone)]
pub struct AnalyticsService {
    config: SharedConfig,
}

impl AnalyticsService {
    pub(super) fn new(config: SharedConfig) -> Self {
        Self { config }
    }

    pub fn query(&self, params: &AnalyticsParams) -> Result<AnalyticsResponse> {
        let store = open_store(&self.config)?;
        analytics_snapshot(&store, &store, params, Utc::now().timestamp_millis())
    }

    pub fn anomalies(&self, params: &AnalyticsParams) -> Result<AnomalyResponse> {
        let store = open_store(&self.config)?;
        anomaly_snapshot(&store, &store, params, Utc::now().timestamp_millis())
    }
}

/// Builds the full analytics snapshot over any row source and resolver pair.
pub fn analytics_snapshot(
    rows: &dyn RowSource,
    resolver: &dyn ProjectResolver,
    params: &AnalyticsParams,
    now_ms: i64,
) -> Result<AnalyticsResponse> {
    let (start_ms, end_ms) = resolve_window(params, now_ms)?;
    let granularity = params.granularity.unwrap_or_default();
    let category_type = params.category_type.unwrap_or_default();

    let matched = rows.query_range(start_ms, end_ms)?;
    let projects_by_task = resolver.resolve_projects(&distinct_task_ids(&matched))?;

    let period = bucket_periods(&matched, granularity, start_ms, end_ms);
    let projects = aggregate_by_project(&matched, &projects_by_task);
    let categories = aggregate_by_category(&matched, category_type);

    let totals = AnalyticsTotals {
        entries: matched.len() as u64,
        input_tokens: matched.iter().map(|row| row.input_tokens).sum(),
        output_tokens: matched.iter().map(|row| row.output_tokens).sum(),
        cost_usd: matched.iter().map(|row| row.estimated_cost_usd).sum(),
        unique_projects: projects.len() as u64,
    };

    Ok(AnalyticsResponse {
        totals,
        period,
        projects,
        categories,
    })
}

/// Same window resolution and aggregation as the analytics snapshot, fed
/// into the anomaly detector.
pub fn anomaly_snapshot(
    rows: &dyn RowSource,
    resolver: &dyn ProjectResolver,
    params: &AnalyticsParams,
    now_ms: i64,
) -> Result<AnomalyResponse> {
    let snapshot = analytics_snapshot(rows, resolver, params, now_ms)?;
    let anomalies = detect_anomalies(
        &snapshot.period,
        &snapshot.projects,
        &snapshot.categories,
        params.category_type.unwrap_or_default(),
    );
    Ok(AnomalyResponse { anomalies })
}

fn resolve_window(params: &AnalyticsParams, now_ms: i64) -> Result<(i64, i64)> {
    let end_ms = params.end_ms.unwrap_or(now_ms);
    let start_ms = params.start_ms.unwrap_or(end_ms - DEFAULT_WINDOW_MS);
    if start_ms > end_ms {
        return Err(AppError::InvalidInput(
            "startMs must be <= endMs".to_string(),
        ));
    }
    Ok((start_ms, end_ms))
}

fn distinct_task_ids(rows: &[TelemetryRecord]) -> Vec<String> {
    let mut ids: Vec<String> = rows.iter().map(|row| row.task_id.clone()).collect();
    ids.sort();
    ids.dedup();
    ids
}
