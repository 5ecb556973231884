//! Configuration, errors and data types shared by every
//! `tabprof` crate.

pub mod config;
pub mod error;
pub mod types;

pub use config::{DatabaseConfig, ProfilerConfig, SchedulerConfig};
pub use error::{ProfilerError, Result};
pub use types::{AnalysisResult, ConnectionConfig, RuleOutcome, RuleResults, RuleValue, TaskStatus};
