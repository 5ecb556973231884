use thiserror::Error;

/// Errors raised by a [`TableConnection`](crate::connection::TableConnection) query.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Error reported by a non-SQLite backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// The query observed a cancellation request and stopped.
    #[error("query cancelled")]
    Cancelled,

    #[error("unexpected result shape: {0}")]
    Shape(String),

    #[error("query worker failed: {0}")]
    Join(String),
}

/// Errors raised while acquiring a connection from a provider.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("connection unavailable: {0}")]
    Unavailable(String),

    #[error("connection attempt cancelled")]
    Cancelled,
}

/// Errors a single rule can produce. Recorded per rule, never fatal to a task.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
}

impl RuleError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RuleError::Query(QueryError::Cancelled))
    }
}

/// Errors outside any individual rule.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid table name: {0}")]
    InvalidIdentifier(String),

    /// A cancellation request was observed between or during rules.
    #[error("analysis cancelled")]
    Cancelled,
}
