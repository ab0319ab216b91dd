use crate::{
    Anomaly, AnomalyKind, CategoryBucket, CategoryType, PeriodBucket, ProjectBucket, Severity,
};

const MIN_PERIOD_BUCKETS: usize = 3;
const Z_SCORE_THRESHOLD: f64 = 2.0;
const HIGH_SEVERITY_SCORE: f64 = 3.5;
const MEDIUM_SEVERITY_SCORE: f64 = 2.5;
// A project is an outlier at >= 2.5x the mean, a category at >= 2.25x.
const PROJECT_OUTLIER_DELTA: f64 = 1.5;
const CATEGORY_OUTLIER_DELTA: f64 = 1.25;

/// Runs the three detection heuristics over already-aggregated buckets and
/// returns the merged list, sorted descending by score. Pure and one-shot;
/// nothing is cached or persisted.
pub fn detect_anomalies(
    period: &[PeriodBucket],
    projects: &[ProjectBucket],
    categories: &[CategoryBucket],
    category_type: CategoryType,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    detect_period_shift(period, &mut anomalies);
    detect_project_outliers(projects, &mut anomalies);
    detect_category_outliers(categories, category_type, &mut anomalies);
    anomalies.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    anomalies
}

/// Normalized deviation of an observed cost from an expected cost.
pub fn to_percent_delta(observed: f64, expected: f64) -> f64 {
    if expected <= 0.0 {
        if observed <= 0.0 { 0.0 } else { 1.0 }
    } else {
        (observed - expected) / expected
    }
}

/// Scores the latest bucket against the population mean and standard
/// deviation of all earlier buckets.
fn detect_period_shift(period: &[PeriodBucket], out: &mut Vec<Anomaly>) {
    if period.len() < MIN_PERIOD_BUCKETS {
        return;
    }
    let observed = &period[period.len() - 1];
    let historical = &period[..period.len() - 1];
    let costs: Vec<f64> = historical.iter().map(|bucket| bucket.cost_usd).collect();
    let mean = costs.iter().sum::<f64>() / costs.len() as f64;
    let variance = costs.iter().map(|cost| (cost - mean).powi(2)).sum::<f64>() / costs.len() as f64;
    let std_dev = variance.sqrt();
    // A flat history cannot be scored meaningfully.
    if std_dev == 0.0 {
        return;
    }
    let z_score = (observed.cost_usd - mean) / std_dev;
    if z_score.abs() < Z_SCORE_THRESHOLD {
        return;
    }
    let score = z_score.abs();
    out.push(Anomaly {
        kind: if z_score > 0.0 {
            AnomalyKind::Spike
        } else {
            AnomalyKind::Drop
        },
        severity: severity_for(score),
        score,
        bucket_start: Some(observed.bucket_start),
        timestamp: Some(observed.bucket_end),
        project: None,
        category: None,
        category_type: None,
        expected_cost_usd: mean,
        observed_cost_usd: observed.cost_usd,
        delta_cost_usd: observed.cost_usd - mean,
        percent_delta: to_percent_delta(observed.cost_usd, mean),
    });
}

fn detect_project_outliers(projects: &[ProjectBucket], out: &mut Vec<Anomaly>) {
    if projects.is_empty() {
        return;
    }
    // The mean includes each candidate; it is invariant across the loop, so
    // a non-positive mean means nothing can be flagged this round.
    let mean = projects.iter().map(|bucket| bucket.cost_usd).sum::<f64>() / projects.len() as f64;
    if mean <= 0.0 {
        return;
    }
    for bucket in projects {
        let percent_delta = to_percent_delta(bucket.cost_usd, mean);
        if percent_delta < PROJECT_OUTLIER_DELTA {
            continue;
        }
        let score = (percent_delta * 2.0).max(2.0);
        out.push(Anomaly {
            kind: AnomalyKind::ProjectOutlier,
            severity: severity_for(score),
            score,
            bucket_start: None,
            timestamp: None,
            project: Some(bucket.project.clone()),
            category: None,
            category_type: None,
            expected_cost_usd: mean,
            observed_cost_usd: bucket.cost_usd,
            delta_cost_usd: bucket.cost_usd - mean,
            percent_delta,
        });
    }
}

fn detect_category_outliers(
    categories: &[CategoryBucket],
    category_type: CategoryType,
    out: &mut Vec<Anomaly>,
) {
    if categories.is_empty() {
        return;
    }
    let mean =
        categories.iter().map(|bucket| bucket.cost_usd).sum::<f64>() / categories.len() as f64;
    if mean <= 0.0 {
        return;
    }
    for bucket in categories {
        let percent_delta = to_percent_delta(bucket.cost_usd, mean);
        if percent_delta < CATEGORY_OUTLIER_DELTA {
            continue;
        }
        let score = (percent_delta * 2.0).max(2.0);
        out.push(Anomaly {
            kind: AnomalyKind::CategoryOutlier,
            severity: severity_for(score),
            score,
            bucket_start: None,
            timestamp: None,
            project: None,
            category: Some(bucket.category.clone()),
            category_type: Some(category_type),
            expected_cost_usd: mean,
            observed_cost_usd: bucket.cost_usd,
            delta_cost_usd: bucket.cost_usd - mean,
            percent_delta,
        });
    }
}

fn severity_for(score: f64) -> Severity {
    if score >= HIGH_SEVERITY_SCORE {
        Severity::High
    } else if score >= MEDIUM_SEVERITY_SCORE {
        Severity::Medium
    } else {
        Severity::Low
    }
}
