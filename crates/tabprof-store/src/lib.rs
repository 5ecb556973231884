//! SQLite persistence for finished analysis tasks.
//!
//! Each finished task becomes one row in `analysis_results`; the requested
//! rule list and the per-rule outcome map are stored as JSON columns so the
//! record round-trips unchanged.

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::{ResultStore, SqliteResultStore};
