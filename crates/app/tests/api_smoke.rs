use std::sync::Arc;

use telemetry_app::{
    AnalyticsParams, Anonymous, AppError, AppState, RecordInput, StaticIdentity,
};
use telemetry_core::{AnomalyKind, UNASSIGNED_PROJECT};
use tempfile::tempdir;

const DAY_MS: i64 = 86_400_000;
const BASE_MS: i64 = 1_700_000_000_000;

fn setup_app(auth: Arc<dyn telemetry_app::IdentityGate>) -> (tempfile::TempDir, AppState) {
    let dir = tempdir().expect("temp dir");
    let db_path = dir.path().join("telemetry.sqlite");
    let app_state = AppState::new(db_path, auth);
    app_state.setup_store().expect("setup store");
    (dir, app_state)
}

fn record_input(task_id: &str, agent: &str, model: &str, cost: f64, ts: i64) -> RecordInput {
    RecordInput {
        task_id: task_id.to_string(),
        agent: agent.to_string(),
        model: model.to_string(),
        input_tokens: 1_000.0,
        output_tokens: 250.0,
        estimated_cost_usd: cost,
        timestamp: Some(ts as f64),
        run_id: None,
        session_key: None,
    }
}

#[test]
fn record_then_analytics_roundtrip() {
    let (_dir, app_state) = setup_app(Arc::new(StaticIdentity("tester".to_string())));
    let store = app_state.open_store().expect("open store");
    store.upsert_task_project("t1", "atlas").expect("map t1");
    store.upsert_task_project("t2", "borealis").expect("map t2");

    let telemetry = &app_state.services.telemetry;
    telemetry
        .record(&record_input("t1", "planner", "gpt-5", 0.75, BASE_MS))
        .expect("record t1");
    telemetry
        .record(&record_input("t2", "coder", "gpt-5-mini", 0.25, BASE_MS + 60_000))
        .expect("record t2");

    let params = AnalyticsParams {
        start_ms: Some(BASE_MS - DAY_MS),
        end_ms: Some(BASE_MS + DAY_MS),
        ..Default::default()
    };
    let response = app_state.services.analytics.query(&params).expect("analytics");

    assert_eq!(response.totals.entries, 2);
    assert!((response.totals.cost_usd - 1.0).abs() < 1e-9);
    assert_eq!(response.totals.input_tokens, 2_000);
    assert_eq!(response.totals.unique_projects, 2);

    let populated: u64 = response.period.iter().map(|bucket| bucket.entries).sum();
    assert_eq!(populated, 2);
    assert_eq!(response.projects.len(), 2);
    assert_eq!(response.projects[0].project, "atlas");
    assert_eq!(response.categories.len(), 2);
    assert_eq!(response.categories[0].category, "planner");
}

#[test]
fn unmapped_tasks_fall_back_to_unassigned() {
    let (_dir, app_state) = setup_app(Arc::new(StaticIdentity("tester".to_string())));
    app_state
        .services
        .telemetry
        .record(&record_input("ghost-task", "planner", "gpt-5", 0.5, BASE_MS))
        .expect("record");

    let params = AnalyticsParams {
        start_ms: Some(BASE_MS - DAY_MS),
        end_ms: Some(BASE_MS + DAY_MS),
        ..Default::default()
    };
    let response = app_state.services.analytics.query(&params).expect("analytics");
    assert_eq!(response.projects.len(), 1);
    assert_eq!(response.projects[0].project, UNASSIGNED_PROJECT);
    assert_eq!(response.totals.unique_projects, 1);
}

#[test]
fn record_without_identity_fails_closed() {
    let (_dir, app_state) = setup_app(Arc::new(Anonymous));
    let err = app_state
        .services
        .telemetry
        .record(&record_input("t1", "planner", "gpt-5", 0.5, BASE_MS))
        .expect_err("must fail");
    assert!(matches!(err, AppError::Unauthenticated));

    // Nothing may have been written.
    let rows = app_state
        .services
        .telemetry
        .list_by_task("t1", None)
        .expect("list");
    assert!(rows.is_empty());
}

#[test]
fn invalid_record_writes_nothing() {
    let (_dir, app_state) = setup_app(Arc::new(StaticIdentity("tester".to_string())));
    let mut input = record_input("t1", "planner", "gpt-5", 0.5, BASE_MS);
    input.input_tokens = 1.5;
    let err = app_state
        .services
        .telemetry
        .record(&input)
        .expect_err("must fail");
    assert!(matches!(err, AppError::InvalidInput(_)));

    let rows = app_state
        .services
        .telemetry
        .list_by_task("t1", None)
        .expect("list");
    assert!(rows.is_empty());
}

#[test]
fn list_by_run_roundtrip() {
    let (_dir, app_state) = setup_app(Arc::new(StaticIdentity("tester".to_string())));
    let telemetry = &app_state.services.telemetry;
    let mut input = record_input("t1", "planner", "gpt-5", 0.5, BASE_MS);
    input.run_id = Some("run-42".to_string());
    telemetry.record(&input).expect("record");
    telemetry
        .record(&record_input("t1", "planner", "gpt-5", 0.1, BASE_MS + 1))
        .expect("record untagged");

    let rows = telemetry.list_by_run("run-42", None).expect("list by run");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].run_id.as_deref(), Some("run-42"));

    let err = telemetry
        .list_by_run("run-42", Some(0.0))
        .expect_err("limit must fail");
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[test]
fn analytics_rejects_inverted_range() {
    let (_dir, app_state) = setup_app(Arc::new(StaticIdentity("tester".to_string())));
    let params = AnalyticsParams {
        start_ms: Some(BASE_MS),
        end_ms: Some(BASE_MS - 1),
        ..Default::default()
    };
    let err = app_state
        .services
        .analytics
        .query(&params)
        .expect_err("must fail");
    match err {
        AppError::InvalidInput(message) => assert_eq!(message, "startMs must be <= endMs"),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn anomaly_query_flags_dominant_project() {
    let (_dir, app_state) = setup_app(Arc::new(StaticIdentity("tester".to_string())));
    let store = app_state.open_store().expect("open store");
    for (task, project) in [("t1", "alpha"), ("t2", "beta"), ("t3", "gamma")] {
        store.upsert_task_project(task, project).expect("map task");
    }

    let telemetry = &app_state.services.telemetry;
    telemetry
        .record(&record_input("t1", "planner", "gpt-5", 200.0, BASE_MS))
        .expect("record");
    telemetry
        .record(&record_input("t2", "coder", "gpt-5", 10.0, BASE_MS + 1_000))
        .expect("record");
    telemetry
        .record(&record_input("t3", "reviewer", "gpt-5", 10.0, BASE_MS + 2_000))
        .expect("record");

    let params = AnalyticsParams {
        start_ms: Some(BASE_MS - DAY_MS),
        end_ms: Some(BASE_MS + DAY_MS),
        ..Default::default()
    };
    let response = app_state
        .services
        .analytics
        .anomalies(&params)
        .expect("anomalies");

    let outlier = response
        .anomalies
        .iter()
        .find(|anomaly| anomaly.kind == AnomalyKind::ProjectOutlier)
        .expect("project outlier");
    assert_eq!(outlier.project.as_deref(), Some("alpha"));
    for pair in response.anomalies.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn analytics_response_uses_camel_case_wire_names() {
    let (_dir, app_state) = setup_app(Arc::new(StaticIdentity("tester".to_string())));
    let params = AnalyticsParams {
        start_ms: Some(BASE_MS),
        end_ms: Some(BASE_MS),
        ..Default::default()
    };
    let response = app_state.services.analytics.query(&params).expect("analytics");
    let json = serde_json::to_value(&response).expect("serialize");

    let totals = json.get("totals").expect("totals");
    assert!(totals.get("costUsd").is_some());
    assert!(totals.get("uniqueProjects").is_some());
    assert!(totals.get("inputTokens").is_some());
    let period = json.get("period").expect("period").as_array().expect("array");
    assert!(!period.is_empty());
    assert!(period[0].get("bucketStart").is_some());
}
