#![allow(dead_code)]

use std::path::PathBuf;

use telemetry_core::NewTelemetryRecord;
use telemetry_store::{RowSource, Store};
use tempfile::TempDir;

pub struct TestStore {
    pub _dir: TempDir,
    pub store: Store,
    pub path: PathBuf,
}

pub fn setup_store() -> TestStore {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("test.sqlite");
    let mut store = Store::open(&path).expect("open store");
    store.migrate().expect("migrate store");
    TestStore {
        _dir: dir,
        store,
        path,
    }
}

pub fn make_record(task_id: &str, agent: &str, model: &str, cost: f64, ts: i64) -> NewTelemetryRecord {
    NewTelemetryRecord {
        task_id: task_id.to_string(),
        agent: agent.to_string(),
        model: model.to_string(),
        input_tokens: 1_000,
        output_tokens: 200,
        estimated_cost_usd: cost,
        timestamp: ts,
        run_id: None,
        session_key: None,
    }
}

pub fn insert_all(store: &mut Store, records: Vec<NewTelemetryRecord>) -> Vec<i64> {
    records
        .into_iter()
        .map(|record| store.insert(&record).expect("insert record"))
        .collect()
}
