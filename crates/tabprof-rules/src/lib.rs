//! Analysis rules and the engine that runs them.
//!
//! # Built-in rules
//!
//! | Name            | Value                                         |
//! |-----------------|-----------------------------------------------|
//! | `row_count`     | Integer row count (`COUNT(*)`)                |
//! | `non_null_rate` | Column -> non-null fraction, one scan per table |
//!
//! Rules talk to the source database through [`TableConnection`]; the crate
//! ships a SQLite implementation ([`SqliteProvider`]) whose queries can be
//! interrupted through a [`tokio_util::sync::CancellationToken`].

pub mod connection;
pub mod engine;
pub mod error;
pub mod ident;
pub mod rule;
pub mod rules;
pub mod sqlite;

pub use connection::{ConnectionProvider, TableConnection};
pub use engine::{AnalysisEngine, AnalysisReport};
pub use error::{ConnectionError, EngineError, QueryError, RuleError};
pub use rule::AnalysisRule;
pub use rules::{NonNullRate, RowCount, NON_NULL_RATE, ROW_COUNT};
pub use sqlite::{SqliteConnection, SqliteProvider};
