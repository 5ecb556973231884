//! Bounded, cancellable execution of table profiling tasks.
//!
//! # Overview
//!
//! [`TaskManager::submit`] records a task and pushes its id onto a bounded
//! FIFO queue. A single dispatcher drains the queue, waits for one of
//! `max_workers` pool permits, marks the task running and spawns its
//! execution. The execution connects through a
//! [`ConnectionProvider`](tabprof_rules::ConnectionProvider), runs every rule
//! registered on the [`AnalysisEngine`](tabprof_rules::AnalysisEngine),
//! finalizes the record and hands it to the
//! [`ResultStore`](tabprof_store::ResultStore).
//!
//! # Task lifecycle
//!
//! | From      | To          | When                                           |
//! |-----------|-------------|------------------------------------------------|
//! | `pending` | `running`   | Dispatcher acquired a worker permit            |
//! | `pending` | `cancelled` | `cancel()` or `stop()` before dispatch         |
//! | `running` | `completed` | At least one rule produced a value             |
//! | `running` | `failed`    | No connection, no rules, or every rule failed  |
//! | `running` | `cancelled` | The execution observed its cancellation token  |
//!
//! Terminal statuses are final: every write checks the current status under
//! the task map's write lock.

pub mod error;
mod execute;
pub mod manager;
pub mod types;

pub use error::{Result, SchedulerError};
pub use manager::TaskManager;
pub use types::{AnalysisTask, TaskPhase, TaskStats};
