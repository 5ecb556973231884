#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tabprof_core::{AnalysisResult, ConnectionConfig, RuleValue, SchedulerConfig};
use tabprof_rules::{
    AnalysisEngine, AnalysisRule, ConnectionError, ConnectionProvider, QueryError, RuleError,
    TableConnection,
};
use tabprof_scheduler::{AnalysisTask, TaskManager};
use tabprof_store::{ResultStore, StoreError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub fn scheduler_config(max_workers: usize, queue_capacity: usize) -> SchedulerConfig {
    SchedulerConfig {
        max_workers,
        queue_capacity,
        cancel_grace_ms: 2_000,
        stop_grace_ms: 2_000,
    }
}

pub fn connection(id: &str) -> ConnectionConfig {
    ConnectionConfig::new(id, id.to_uppercase(), format!("/tmp/{id}.db"))
}

pub fn task(id: &str, database: &str) -> AnalysisTask {
    AnalysisTask::with_id(id, "contacts", connection(database))
}

pub fn manager(
    config: SchedulerConfig,
    engine: AnalysisEngine,
    provider: Arc<dyn ConnectionProvider>,
    store: Arc<dyn ResultStore>,
) -> TaskManager {
    TaskManager::new(config, Arc::new(engine), provider, store)
}

/// Poll `cond` every few milliseconds; panic after five seconds.
pub async fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Hands out a connection that answers catalog calls with nothing.
pub struct StubProvider;

struct StubConnection;

#[async_trait]
impl TableConnection for StubConnection {
    async fn list_tables(&self, _cancel: &CancellationToken) -> Result<Vec<String>, QueryError> {
        Ok(Vec::new())
    }

    async fn columns(
        &self,
        _table: &str,
        _cancel: &CancellationToken,
    ) -> Result<Vec<String>, QueryError> {
        Ok(Vec::new())
    }

    async fn query_counts(
        &self,
        _sql: &str,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Option<i64>>, QueryError> {
        Err(QueryError::Backend("stub connection runs no SQL".into()))
    }
}

#[async_trait]
impl ConnectionProvider for StubProvider {
    async fn get_connection(
        &self,
        _config: &ConnectionConfig,
    ) -> Result<Arc<dyn TableConnection>, ConnectionError> {
        Ok(Arc::new(StubConnection))
    }
}

/// Never yields a connection.
pub struct DownProvider;

#[async_trait]
impl ConnectionProvider for DownProvider {
    async fn get_connection(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn TableConnection>, ConnectionError> {
        Err(ConnectionError::Unavailable(format!("{} is down", config.id)))
    }
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingStore {
    pub saved: Mutex<Vec<AnalysisResult>>,
    pub fail: bool,
}

impl RecordingStore {
    pub fn failing() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn saved(&self) -> Vec<AnalysisResult> {
        self.saved.lock().unwrap().clone()
    }
}

impl ResultStore for RecordingStore {
    fn save_result(&self, result: &AnalysisResult) -> Result<(), StoreError> {
        if self.fail {
            return Err(StoreError::Corrupt {
                id: result.id.clone(),
                reason: "disk full".into(),
            });
        }
        self.saved.lock().unwrap().push(result.clone());
        Ok(())
    }

    fn delete_result(&self, id: &str) -> Result<(), StoreError> {
        let mut saved = self.saved.lock().unwrap();
        let before = saved.len();
        saved.retain(|r| r.id != id);
        if saved.len() == before {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }

    fn list_results(&self, connection_id: &str) -> Result<Vec<AnalysisResult>, StoreError> {
        Ok(self
            .saved()
            .into_iter()
            .filter(|r| r.connection_id == connection_id)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// Returns `Count(1)` and counts its invocations.
#[derive(Default)]
pub struct CountingRule {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AnalysisRule for CountingRule {
    fn name(&self) -> &str {
        "counting"
    }

    fn description(&self) -> &str {
        "counts invocations"
    }

    async fn execute(
        &self,
        _conn: &dyn TableConnection,
        _table: &str,
        _config: &ConnectionConfig,
        _cancel: &CancellationToken,
    ) -> Result<RuleValue, RuleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(RuleValue::Count(1))
    }
}

/// Always errors.
pub struct BrokenRule;

#[async_trait]
impl AnalysisRule for BrokenRule {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "always errors"
    }

    async fn execute(
        &self,
        _conn: &dyn TableConnection,
        _table: &str,
        _config: &ConnectionConfig,
        _cancel: &CancellationToken,
    ) -> Result<RuleValue, RuleError> {
        Err(QueryError::Backend("broken on purpose".into()).into())
    }
}

/// Blocks until the test releases a gate permit.
///
/// Tracks how many executions are inside the rule at once. With
/// `honor_cancel` the rule also returns as soon as its token fires.
pub struct GateRule {
    pub gate: Semaphore,
    pub honor_cancel: bool,
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl GateRule {
    pub fn new(honor_cancel: bool) -> Self {
        Self {
            gate: Semaphore::new(0),
            honor_cancel,
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    async fn pass(&self) {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
    }
}

#[async_trait]
impl AnalysisRule for GateRule {
    fn name(&self) -> &str {
        "gate"
    }

    fn description(&self) -> &str {
        "blocks until released"
    }

    async fn execute(
        &self,
        _conn: &dyn TableConnection,
        _table: &str,
        _config: &ConnectionConfig,
        cancel: &CancellationToken,
    ) -> Result<RuleValue, RuleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let result = if self.honor_cancel {
            tokio::select! {
                _ = cancel.cancelled() => Err(QueryError::Cancelled.into()),
                _ = self.pass() => Ok(RuleValue::Count(1)),
            }
        } else {
            self.pass().await;
            Ok(RuleValue::Count(1))
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Sleeps for a per-table delay, returning early on cancellation.
pub struct SleepRule;

#[async_trait]
impl AnalysisRule for SleepRule {
    fn name(&self) -> &str {
        "sleep"
    }

    fn description(&self) -> &str {
        "sleeps for the number of milliseconds in the table name"
    }

    async fn execute(
        &self,
        _conn: &dyn TableConnection,
        table: &str,
        _config: &ConnectionConfig,
        cancel: &CancellationToken,
    ) -> Result<RuleValue, RuleError> {
        let ms: u64 = table.parse().unwrap_or(1);
        tokio::select! {
            _ = cancel.cancelled() => Err(QueryError::Cancelled.into()),
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(RuleValue::Count(ms)),
        }
    }
}
