use tabprof_core::TaskStatus;
use thiserror::Error;

/// Errors returned by the task manager API.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task with this id was already submitted.
    #[error("Duplicate task: {id}")]
    DuplicateTask { id: String },

    /// The submission queue is saturated; the caller must resubmit later or
    /// shed load.
    #[error("Submission queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The submitted record is not a fresh pending task.
    #[error("Invalid task {id}: {reason}")]
    InvalidTask { id: String, reason: String },

    /// No task with the given id exists.
    #[error("Task not found: {id}")]
    TaskNotFound { id: String },

    /// The task already reached a terminal status.
    #[error("Task {id} is already {status}")]
    AlreadyTerminal { id: String, status: TaskStatus },

    /// The running task did not acknowledge cancellation within the grace
    /// period. It is still running and will finalize on its own.
    #[error("Task {id} did not stop within the cancellation grace period")]
    CancelTimeout { id: String },

    #[error("Task manager already started")]
    AlreadyStarted,

    #[error("Task manager is stopped")]
    Stopped,
}

impl SchedulerError {
    /// Short error code string for callers that branch on error kind.
    pub fn code(&self) -> &'static str {
        match self {
            SchedulerError::DuplicateTask { .. } => "DUPLICATE_TASK",
            SchedulerError::QueueFull { .. } => "QUEUE_FULL",
            SchedulerError::InvalidTask { .. } => "INVALID_TASK",
            SchedulerError::TaskNotFound { .. } => "TASK_NOT_FOUND",
            SchedulerError::AlreadyTerminal { .. } => "ALREADY_TERMINAL",
            SchedulerError::CancelTimeout { .. } => "CANCEL_TIMEOUT",
            SchedulerError::AlreadyStarted => "ALREADY_STARTED",
            SchedulerError::Stopped => "STOPPED",
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
