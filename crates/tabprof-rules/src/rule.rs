use async_trait::async_trait;
use tabprof_core::{ConnectionConfig, RuleValue};
use tokio_util::sync::CancellationToken;

use crate::{connection::TableConnection, error::RuleError};

/// A named statistic computed over one table.
///
/// Rules hold no per-run state; a single instance is shared by every task
/// through the [`AnalysisEngine`](crate::engine::AnalysisEngine) registry.
#[async_trait]
pub trait AnalysisRule: Send + Sync {
    /// Stable snake_case name; the key in registries and result maps.
    fn name(&self) -> &str;

    /// One-line human description.
    fn description(&self) -> &str;

    /// Compute the statistic for `table` (raw, unquoted name).
    ///
    /// `cancel` must be handed to every query the rule issues.
    async fn execute(
        &self,
        conn: &dyn TableConnection,
        table: &str,
        config: &ConnectionConfig,
        cancel: &CancellationToken,
    ) -> Result<RuleValue, RuleError>;
}
