use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A source database that tables can be profiled against.
///
/// Tasks keep a clone of this taken at submission time, so editing the
/// configured connection never changes a task that is already queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Stable identifier, used as the task's database id.
    pub id: String,
    /// Human-readable label.
    pub name: String,
    /// Path to the SQLite database file.
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl ConnectionConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Lifecycle state of an analysis task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted, waiting in the queue.
    Pending,
    /// Holding a worker slot and executing.
    Running,
    /// At least one rule produced a value.
    Completed,
    /// No connection, no rules, or every rule failed.
    Failed,
    /// Cancelled before dispatch, or the execution observed a cancel request.
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// The statistic a rule computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    /// Number of rows.
    Count(u64),
    /// Column name -> fraction of non-null values in [0, 1].
    Fractions(BTreeMap<String, f64>),
}

/// Per-rule entry of a result map: `{"value": ...}` or `{"error": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOutcome {
    Value(RuleValue),
    Error(String),
}

impl RuleOutcome {
    pub fn is_value(&self) -> bool {
        matches!(self, RuleOutcome::Value(_))
    }

    pub fn value(&self) -> Option<&RuleValue> {
        match self {
            RuleOutcome::Value(v) => Some(v),
            RuleOutcome::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            RuleOutcome::Value(_) => None,
            RuleOutcome::Error(e) => Some(e),
        }
    }
}

/// Rule name -> outcome. Ordered so serialised payloads are stable.
pub type RuleResults = BTreeMap<String, RuleOutcome>;

/// A finished task as handed to the result store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Id of the task that produced this result.
    pub id: String,
    pub connection_id: String,
    pub table_name: String,
    /// Terminal status of the task.
    pub status: TaskStatus,
    /// Rule names the task asked for.
    pub rules: Vec<String>,
    pub results: RuleResults,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}
