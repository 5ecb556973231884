use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabprof_core::{AnalysisResult, ConnectionConfig, RuleResults, TaskStatus};
use uuid::Uuid;

/// Coarse execution phase of a task.
///
/// Progress is reported as a percentage only through [`TaskPhase::percent`],
/// so phases can be added without renumbering callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// Waiting in the submission queue.
    Queued,
    /// Acquiring a database handle.
    Connecting,
    /// Rules are executing.
    Analyzing,
    /// Rules returned; computing the terminal status.
    Finalizing,
    /// Terminal status recorded.
    Done,
}

impl TaskPhase {
    pub fn percent(self) -> u8 {
        match self {
            TaskPhase::Queued => 0,
            TaskPhase::Connecting => 10,
            TaskPhase::Analyzing => 30,
            TaskPhase::Finalizing => 80,
            TaskPhase::Done => 100,
        }
    }
}

/// One request to profile a single table under a single connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTask {
    /// Unique for the lifetime of the task manager.
    pub id: String,
    pub table_name: String,
    /// Id of the source database; matches `connection.id`.
    pub database_id: String,
    /// Connection settings captured at submission.
    pub connection: ConnectionConfig,
    pub status: TaskStatus,
    pub phase: TaskPhase,
    /// Rule names the execution asked the engine for.
    pub rules: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Set on the transition to `running`.
    pub started_at: Option<DateTime<Utc>>,
    /// Set on any terminal transition.
    pub completed_at: Option<DateTime<Utc>>,
    /// Only set for `failed` and `cancelled`.
    pub error: Option<String>,
    /// Only set for `completed` and `failed` executions.
    pub results: Option<RuleResults>,
}

impl AnalysisTask {
    /// A pending task with a fresh UUID v4 id.
    pub fn new(table_name: impl Into<String>, connection: ConnectionConfig) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), table_name, connection)
    }

    /// A pending task with a caller-chosen id.
    pub fn with_id(
        id: impl Into<String>,
        table_name: impl Into<String>,
        connection: ConnectionConfig,
    ) -> Self {
        Self {
            id: id.into(),
            table_name: table_name.into(),
            database_id: connection.id.clone(),
            connection,
            status: TaskStatus::Pending,
            phase: TaskPhase::Queued,
            rules: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            results: None,
        }
    }

    /// Percentage in [0, 100]; never decreases over the task's lifetime.
    pub fn progress(&self) -> u8 {
        self.phase.percent()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `completed_at - started_at`, once both are known.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.completed_at? - self.started_at?)
    }

    /// The record handed to the result store.
    pub fn to_result(&self) -> AnalysisResult {
        AnalysisResult {
            id: self.id.clone(),
            connection_id: self.database_id.clone(),
            table_name: self.table_name.clone(),
            status: self.status,
            rules: self.rules.clone(),
            results: self.results.clone().unwrap_or_default(),
            error: self.error.clone(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            duration_ms: self.duration().map(|d| d.num_milliseconds()),
            created_at: self.completed_at.unwrap_or(self.created_at),
        }
    }

    /// Move forward to `phase`; earlier phases are ignored.
    pub(crate) fn advance(&mut self, phase: TaskPhase) {
        if phase > self.phase {
            self.phase = phase;
        }
    }
}

/// Task counts per status, taken from one consistent snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl TaskStats {
    pub(crate) fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed + self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> ConnectionConfig {
        ConnectionConfig::new("crm", "CRM", "/tmp/crm.db")
    }

    #[test]
    fn new_task_is_pending_and_queued() {
        let task = AnalysisTask::new("contacts", connection());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress(), 0);
        assert_eq!(task.database_id, "crm");
        assert!(task.duration().is_none());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = AnalysisTask::new("t", connection());
        let b = AnalysisTask::new("t", connection());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn phases_never_move_backwards() {
        let mut task = AnalysisTask::new("t", connection());
        task.advance(TaskPhase::Analyzing);
        task.advance(TaskPhase::Connecting);
        assert_eq!(task.phase, TaskPhase::Analyzing);
        assert_eq!(task.progress(), 30);
        task.advance(TaskPhase::Done);
        assert_eq!(task.progress(), 100);
    }

    #[test]
    fn duration_spans_start_to_completion() {
        let mut task = AnalysisTask::new("t", connection());
        let start = Utc::now();
        task.started_at = Some(start);
        task.completed_at = Some(start + chrono::Duration::milliseconds(1500));
        assert_eq!(task.duration().unwrap().num_milliseconds(), 1500);
        assert_eq!(task.to_result().duration_ms, Some(1500));
    }

    #[test]
    fn stats_total_counts_every_status() {
        let mut stats = TaskStats::default();
        stats.record(TaskStatus::Pending);
        stats.record(TaskStatus::Completed);
        stats.record(TaskStatus::Completed);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.total(), 3);
    }
}
