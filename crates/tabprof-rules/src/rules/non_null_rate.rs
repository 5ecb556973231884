use std::collections::BTreeMap;

use async_trait::async_trait;
use tabprof_core::{ConnectionConfig, RuleValue};
use tokio_util::sync::CancellationToken;

use crate::{
    connection::TableConnection,
    error::{QueryError, RuleError},
    ident::quote_identifier,
    rule::AnalysisRule,
};

pub const NON_NULL_RATE: &str = "non_null_rate";

/// Fraction of non-null values per column.
///
/// All columns are measured by one aggregate query,
/// `SELECT COUNT(*), COUNT(c1), ..., COUNT(cn) FROM t`, so the table is
/// scanned once and every fraction comes from the same snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct NonNullRate;

/// Build the single-scan aggregate for `columns` of `table`.
pub(crate) fn build_query(table: &str, columns: &[String]) -> Result<String, RuleError> {
    let quoted_table = quote_identifier(table).map_err(RuleError::InvalidIdentifier)?;
    let mut select = vec!["COUNT(*)".to_string()];
    for column in columns {
        let quoted = quote_identifier(column).map_err(RuleError::InvalidIdentifier)?;
        select.push(format!("COUNT({quoted})"));
    }
    Ok(format!("SELECT {} FROM {quoted_table}", select.join(", ")))
}

#[async_trait]
impl AnalysisRule for NonNullRate {
    fn name(&self) -> &str {
        NON_NULL_RATE
    }

    fn description(&self) -> &str {
        "Fraction of non-null values in each column"
    }

    async fn execute(
        &self,
        conn: &dyn TableConnection,
        table: &str,
        _config: &ConnectionConfig,
        cancel: &CancellationToken,
    ) -> Result<RuleValue, RuleError> {
        let columns = conn.columns(table, cancel).await?;
        // With no columns the query degenerates to COUNT(*), which still
        // fails for a table that does not exist.
        let row = conn.query_counts(&build_query(table, &columns)?, cancel).await?;

        if row.len() != columns.len() + 1 {
            return Err(QueryError::Shape(format!(
                "expected {} aggregate columns, got {}",
                columns.len() + 1,
                row.len()
            ))
            .into());
        }

        let total = row[0].unwrap_or(0);
        let fractions = columns
            .into_iter()
            .zip(row.into_iter().skip(1))
            .map(|(column, non_null)| {
                let non_null = non_null.unwrap_or(0);
                let fraction = if total > 0 {
                    non_null as f64 / total as f64
                } else {
                    0.0
                };
                (column, fraction)
            })
            .collect::<BTreeMap<_, _>>();

        Ok(RuleValue::Fractions(fractions))
    }
}
