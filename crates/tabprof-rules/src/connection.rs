use std::sync::Arc;

use async_trait::async_trait;
use tabprof_core::ConnectionConfig;
use tokio_util::sync::CancellationToken;

use crate::error::{ConnectionError, QueryError};

/// A live handle to one source database.
///
/// Every method takes a [`CancellationToken`]; implementations must stop the
/// in-flight query promptly once it fires and return [`QueryError::Cancelled`].
#[async_trait]
pub trait TableConnection: Send + Sync {
    /// Names of the user tables and views, sorted.
    async fn list_tables(&self, cancel: &CancellationToken) -> Result<Vec<String>, QueryError>;

    /// Column names of `table` in declaration order.
    ///
    /// `table` is the raw (unquoted) name. Unknown tables yield an empty list.
    async fn columns(
        &self,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, QueryError>;

    /// Run `sql`, which must produce exactly one row of integer columns, and
    /// return that row. `NULL` cells come back as `None`.
    async fn query_counts(
        &self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Option<i64>>, QueryError>;
}

/// Source of live database handles. Called concurrently by every execution.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn get_connection(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn TableConnection>, ConnectionError>;
}
