// Whatever is saved must come back unchanged from list_results.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use rusqlite::Connection;
use tabprof_core::{AnalysisResult, RuleOutcome, RuleValue, TaskStatus};
use tabprof_store::{ResultStore, SqliteResultStore, StoreError};

fn sample(id: &str, connection_id: &str, offset_secs: i64) -> AnalysisResult {
    let started = Utc::now() + Duration::seconds(offset_secs);
    let completed = started + Duration::milliseconds(1_250);

    let mut fractions = BTreeMap::new();
    fractions.insert("email".to_string(), 0.95);
    fractions.insert("id".to_string(), 1.0);

    let mut results = BTreeMap::new();
    results.insert("row_count".to_string(), RuleOutcome::Value(RuleValue::Count(100)));
    results.insert(
        "non_null_rate".to_string(),
        RuleOutcome::Value(RuleValue::Fractions(fractions)),
    );

    AnalysisResult {
        id: id.to_string(),
        connection_id: connection_id.to_string(),
        table_name: "contacts".to_string(),
        status: TaskStatus::Completed,
        rules: vec!["non_null_rate".to_string(), "row_count".to_string()],
        results,
        error: None,
        started_at: Some(started),
        completed_at: Some(completed),
        duration_ms: Some(1_250),
        created_at: completed,
    }
}

fn store() -> SqliteResultStore {
    SqliteResultStore::new(Connection::open_in_memory().unwrap()).unwrap()
}

#[test]
fn saved_result_round_trips() {
    let store = store();
    let result = sample("task-1", "crm", 0);
    store.save_result(&result).unwrap();

    let listed = store.list_results("crm").unwrap();
    assert_eq!(listed, vec![result]);
}

#[test]
fn failed_result_with_rule_errors_round_trips() {
    let store = store();
    let mut result = sample("task-2", "crm", 0);
    result.status = TaskStatus::Failed;
    result.error = Some("all 1 rules failed".to_string());
    result.results.clear();
    result
        .results
        .insert("row_count".to_string(), RuleOutcome::Error("no such table: x".into()));
    store.save_result(&result).unwrap();

    assert_eq!(store.list_results("crm").unwrap(), vec![result]);
}

#[test]
fn never_started_result_round_trips() {
    let store = store();
    let mut result = sample("task-3", "crm", 0);
    result.status = TaskStatus::Cancelled;
    result.started_at = None;
    result.duration_ms = None;
    result.results.clear();
    store.save_result(&result).unwrap();

    assert_eq!(store.list_results("crm").unwrap(), vec![result]);
}

#[test]
fn list_filters_by_connection_newest_first() {
    let store = store();
    let older = sample("a", "crm", -60);
    let newer = sample("b", "crm", 0);
    let other = sample("c", "billing", 0);
    store.save_result(&older).unwrap();
    store.save_result(&newer).unwrap();
    store.save_result(&other).unwrap();

    let ids: Vec<String> = store
        .list_results("crm")
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert!(store.list_results("unknown").unwrap().is_empty());
}

#[test]
fn saving_same_id_replaces() {
    let store = store();
    let mut result = sample("task-4", "crm", 0);
    store.save_result(&result).unwrap();
    result.status = TaskStatus::Failed;
    store.save_result(&result).unwrap();

    let listed = store.list_results("crm").unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, TaskStatus::Failed);
}

#[test]
fn delete_removes_and_reports_missing() {
    let store = store();
    store.save_result(&sample("task-5", "crm", 0)).unwrap();

    store.delete_result("task-5").unwrap();
    assert!(store.list_results("crm").unwrap().is_empty());

    let err = store.delete_result("task-5").unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results.db");
    let path = path.to_str().unwrap();
    let result = sample("task-6", "crm", 0);

    SqliteResultStore::open(path).unwrap().save_result(&result).unwrap();
    let reopened = SqliteResultStore::open(path).unwrap();
    assert_eq!(reopened.list_results("crm").unwrap(), vec![result]);
}

#[test]
fn non_null_fractions_keep_every_bit() {
    let store = store();
    let mut result = sample("task-7", "crm", 0);

    let mut fractions = BTreeMap::new();
    for n in [3u32, 7, 11, 13, 97, 399] {
        for k in 1..n {
            fractions.insert(format!("c_{k}_{n}"), f64::from(k) / f64::from(n));
        }
    }
    result.results.insert(
        "non_null_rate".to_string(),
        RuleOutcome::Value(RuleValue::Fractions(fractions)),
    );
    store.save_result(&result).unwrap();

    let listed = store.list_results("crm").unwrap();
    let Some(RuleValue::Fractions(back)) = listed[0].results["non_null_rate"].value() else {
        panic!("fractions lost: {:?}", listed[0].results);
    };
    assert_eq!(back["c_1_11"].to_bits(), (1.0f64 / 11.0).to_bits());
    assert_eq!(listed, vec![result]);
}
