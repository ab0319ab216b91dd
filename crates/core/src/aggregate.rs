use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::{
    CategoryBucket, CategoryType, Granularity, PeriodBucket, ProjectBucket, TelemetryRecord,
};

/// Grouping key for rows whose task has no known project.
pub const UNASSIGNED_PROJECT: &str = "unassigned";

/// Buckets `rows` into a contiguous, gap-free series of fixed-width
/// intervals covering the inclusive range `[start_ms, end_ms]`.
///
/// Bucket boundaries align to the epoch, not to `start_ms`, so the first
/// bucket can begin before the requested range. Rows with timestamps
/// outside the range are dropped silently.
pub fn bucket_periods(
    rows: &[TelemetryRecord],
    granularity: Granularity,
    start_ms: i64,
    end_ms: i64,
) -> Vec<PeriodBucket> {
    let width = granularity.bucket_size_ms();
    let mut buckets = Vec::new();
    let mut slots: HashMap<i64, usize> = HashMap::new();
    let mut bucket_start = start_ms.div_euclid(width) * width;
    while bucket_start <= end_ms {
        slots.insert(bucket_start, buckets.len());
        buckets.push(PeriodBucket {
            bucket_start,
            bucket_end: bucket_start + width - 1,
            label: bucket_label(bucket_start, granularity),
            entries: 0,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
        });
        bucket_start = match bucket_start.checked_add(width) {
            Some(next) => next,
            None => break,
        };
    }
    for row in rows {
        if row.timestamp < start_ms || row.timestamp > end_ms {
            continue;
        }
        let key = row.timestamp.div_euclid(width) * width;
        // Every in-range row has a generated bucket; skip rather than panic
        // if that invariant is ever broken.
        let Some(&slot) = slots.get(&key) else {
            continue;
        };
        let bucket = &mut buckets[slot];
        bucket.entries += 1;
        bucket.input_tokens += row.input_tokens;
        bucket.output_tokens += row.output_tokens;
        bucket.cost_usd += row.estimated_cost_usd;
    }
    buckets
}

fn bucket_label(bucket_start: i64, granularity: Granularity) -> String {
    let ts = DateTime::<Utc>::from_timestamp_millis(bucket_start).unwrap_or_default();
    match granularity {
        Granularity::Hour => ts.format("%Y-%m-%dT%H:00:00Z").to_string(),
        Granularity::Day | Granularity::Week => ts.format("%Y-%m-%d").to_string(),
    }
}

/// Groups rows by the project their task resolves to, falling back to
/// [`UNASSIGNED_PROJECT`] for tasks absent from `projects`. No range
/// filtering happens here; the caller scopes the rows.
pub fn aggregate_by_project(
    rows: &[TelemetryRecord],
    projects: &HashMap<String, String>,
) -> Vec<ProjectBucket> {
    let mut grouped: BTreeMap<&str, Sums> = BTreeMap::new();
    for row in rows {
        let key = projects
            .get(&row.task_id)
            .map_or(UNASSIGNED_PROJECT, String::as_str);
        grouped.entry(key).or_default().absorb(row);
    }
    let mut buckets: Vec<ProjectBucket> = grouped
        .into_iter()
        .map(|(project, sums)| ProjectBucket {
            project: project.to_string(),
            entries: sums.entries,
            input_tokens: sums.input_tokens,
            output_tokens: sums.output_tokens,
            cost_usd: sums.cost_usd,
        })
        .collect();
    sort_by_cost_desc(&mut buckets, |bucket| bucket.cost_usd);
    buckets
}

/// Groups rows by agent or model name, per `category_type`.
pub fn aggregate_by_category(
    rows: &[TelemetryRecord],
    category_type: CategoryType,
) -> Vec<CategoryBucket> {
    let mut grouped: BTreeMap<&str, Sums> = BTreeMap::new();
    for row in rows {
        grouped
            .entry(category_type.key(row))
            .or_default()
            .absorb(row);
    }
    let mut buckets: Vec<CategoryBucket> = grouped
        .into_iter()
        .map(|(category, sums)| CategoryBucket {
            category: category.to_string(),
            entries: sums.entries,
            input_tokens: sums.input_tokens,
            output_tokens: sums.output_tokens,
            cost_usd: sums.cost_usd,
        })
        .collect();
    sort_by_cost_desc(&mut buckets, |bucket| bucket.cost_usd);
    buckets
}

#[derive(Default)]
struct Sums {
    entries: u64,
    input_tokens: u64,
    output_tokens: u64,
    cost_usd: f64,
}

impl Sums {
    fn absorb(&mut self, row: &TelemetryRecord) {
        self.entries += 1;
        self.input_tokens += row.input_tokens;
        self.output_tokens += row.output_tokens;
        self.cost_usd += row.estimated_cost_usd;
    }
}

// Ties keep the ordered-map insertion order; the sort is stable.
fn sort_by_cost_desc<T>(buckets: &mut [T], cost: impl Fn(&T) -> f64) {
    buckets.sort_by(|a, b| {
        cost(b)
            .partial_cmp(&cost(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
