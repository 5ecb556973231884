use async_trait::async_trait;
use tabprof_core::{ConnectionConfig, RuleValue};
use tokio_util::sync::CancellationToken;

use crate::{
    connection::TableConnection,
    error::{QueryError, RuleError},
    ident::quote_identifier,
    rule::AnalysisRule,
};

pub const ROW_COUNT: &str = "row_count";

/// Total number of rows, via a single `COUNT(*)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RowCount;

#[async_trait]
impl AnalysisRule for RowCount {
    fn name(&self) -> &str {
        ROW_COUNT
    }

    fn description(&self) -> &str {
        "Number of rows in the table"
    }

    async fn execute(
        &self,
        conn: &dyn TableConnection,
        table: &str,
        _config: &ConnectionConfig,
        cancel: &CancellationToken,
    ) -> Result<RuleValue, RuleError> {
        let quoted = quote_identifier(table).map_err(RuleError::InvalidIdentifier)?;
        let row = conn
            .query_counts(&format!("SELECT COUNT(*) FROM {quoted}"), cancel)
            .await?;
        let count = row
            .first()
            .copied()
            .flatten()
            .ok_or_else(|| QueryError::Shape("COUNT(*) returned NULL".into()))?;
        let count = u64::try_from(count)
            .map_err(|_| QueryError::Shape(format!("negative row count {count}")))?;
        Ok(RuleValue::Count(count))
    }
}
