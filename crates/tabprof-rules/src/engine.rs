use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tabprof_core::{ConnectionConfig, RuleOutcome, RuleResults};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    connection::TableConnection,
    error::EngineError,
    ident::validate_identifier,
    rule::AnalysisRule,
    rules::{NonNullRate, RowCount},
};

/// Outcome of one [`AnalysisEngine::execute_analysis`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisReport {
    /// One entry per requested rule that is registered.
    pub results: RuleResults,
    /// Requested names with no registered rule, in request order.
    pub skipped: Vec<String>,
}

impl AnalysisReport {
    /// True when at least one rule produced a value.
    pub fn has_value(&self) -> bool {
        self.results.values().any(RuleOutcome::is_value)
    }
}

/// Registry of analysis rules, keyed by [`AnalysisRule::name`].
///
/// Shared across all executions as `Arc<AnalysisEngine>`. The registry lock
/// is held only to clone rule handles out, never across a query.
pub struct AnalysisEngine {
    rules: RwLock<HashMap<String, Arc<dyn AnalysisRule>>>,
}

impl AnalysisEngine {
    /// Create an engine with no rules.
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Create an engine with the built-in rules registered.
    pub fn with_default_rules() -> Self {
        let engine = Self::new();
        engine.register_rule(Arc::new(RowCount));
        engine.register_rule(Arc::new(NonNullRate));
        engine
    }

    /// Register a rule. A rule with the same name is replaced.
    pub fn register_rule(&self, rule: Arc<dyn AnalysisRule>) {
        let name = rule.name().to_string();
        let mut rules = self.rules.write().expect("rule registry poisoned");
        if rules.insert(name.clone(), rule).is_some() {
            debug!(rule = %name, "rule replaced");
        } else {
            debug!(rule = %name, "rule registered");
        }
    }

    /// Remove a rule by name. Returns whether it was registered.
    pub fn unregister_rule(&self, name: &str) -> bool {
        let mut rules = self.rules.write().expect("rule registry poisoned");
        let removed = rules.remove(name).is_some();
        if removed {
            debug!(rule = name, "rule unregistered");
        }
        removed
    }

    /// Names of every registered rule, sorted.
    pub fn available_rules(&self) -> Vec<String> {
        let rules = self.rules.read().expect("rule registry poisoned");
        let mut names: Vec<String> = rules.keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, description)` for every registered rule, sorted by name.
    pub fn describe_rules(&self) -> Vec<(String, String)> {
        let rules = self.rules.read().expect("rule registry poisoned");
        let mut described: Vec<(String, String)> = rules
            .values()
            .map(|r| (r.name().to_string(), r.description().to_string()))
            .collect();
        described.sort();
        described
    }

    fn rule(&self, name: &str) -> Option<Arc<dyn AnalysisRule>> {
        let rules = self.rules.read().expect("rule registry poisoned");
        rules.get(name).cloned()
    }

    /// Run `rule_names` against `table` in request order.
    ///
    /// Unknown names land in [`AnalysisReport::skipped`]. A failing rule is
    /// recorded as an error entry and the remaining rules still run. Only a
    /// bad table name or an observed cancellation abort the whole call.
    pub async fn execute_analysis(
        &self,
        conn: &dyn TableConnection,
        table: &str,
        config: &ConnectionConfig,
        rule_names: &[String],
        cancel: &CancellationToken,
    ) -> Result<AnalysisReport, EngineError> {
        validate_identifier(table).map_err(EngineError::InvalidIdentifier)?;

        let mut report = AnalysisReport::default();
        for name in rule_names {
            let Some(rule) = self.rule(name) else {
                debug!(rule = %name, %table, "unknown rule skipped");
                report.skipped.push(name.clone());
                continue;
            };

            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let t = Instant::now();
            let result = rule.execute(conn, table, config, cancel).await;
            let elapsed_ms = t.elapsed().as_millis() as u64;

            match result {
                Ok(value) => {
                    debug!(rule = %name, %table, duration_ms = elapsed_ms, "rule completed");
                    report.results.insert(name.clone(), RuleOutcome::Value(value));
                }
                Err(e) if e.is_cancelled() || cancel.is_cancelled() => {
                    info!(rule = %name, %table, "rule stopped by cancellation");
                    return Err(EngineError::Cancelled);
                }
                Err(e) => {
                    warn!(rule = %name, %table, error = %e, "rule failed");
                    report
                        .results
                        .insert(name.clone(), RuleOutcome::Error(e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

impl Default for AnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}
