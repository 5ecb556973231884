use std::sync::Arc;

use tabprof_core::RuleResults;
use tabprof_rules::{ConnectionError, EngineError};
use tabprof_store::ResultStore;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    manager::Shared,
    types::{AnalysisTask, TaskPhase},
};

/// How an execution ended, before it is written to the task record.
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed(RuleResults),
    Failed {
        error: String,
        results: Option<RuleResults>,
    },
    Cancelled,
}

/// Body of one dispatched task. Holds the worker permit until the result
/// has been handed to the store.
pub(crate) async fn run_task(
    shared: Arc<Shared>,
    task: AnalysisTask,
    cancel: CancellationToken,
    _permit: OwnedSemaphorePermit,
) {
    let outcome = perform_table_analysis(&shared, &task, &cancel).await;
    if let Some(finished) = shared.finish(&task.id, outcome) {
        persist(Arc::clone(&shared.store), &finished).await;
    }
}

/// Connect, run every registered rule and classify the result.
pub(crate) async fn perform_table_analysis(
    shared: &Shared,
    task: &AnalysisTask,
    cancel: &CancellationToken,
) -> Outcome {
    shared.advance(&task.id, TaskPhase::Connecting);
    let conn = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Outcome::Cancelled,
        res = shared.provider.get_connection(&task.connection) => match res {
            Ok(conn) => conn,
            Err(ConnectionError::Cancelled) => return Outcome::Cancelled,
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    database = %task.database_id,
                    error = %e,
                    "no connection available"
                );
                return Outcome::Failed {
                    error: format!("no connection available: {e}"),
                    results: None,
                };
            }
        },
    };

    shared.advance(&task.id, TaskPhase::Analyzing);
    let rules = shared.engine.available_rules();
    if rules.is_empty() {
        warn!(task_id = %task.id, "no analysis rules registered");
        return Outcome::Failed {
            error: "no analysis rules registered".to_string(),
            results: None,
        };
    }
    shared.update(&task.id, |t| t.rules = rules.clone());

    let report = match shared
        .engine
        .execute_analysis(
            conn.as_ref(),
            &task.table_name,
            &task.connection,
            &rules,
            cancel,
        )
        .await
    {
        Ok(report) => report,
        Err(EngineError::Cancelled) => return Outcome::Cancelled,
        Err(e) => {
            return Outcome::Failed {
                error: e.to_string(),
                results: None,
            }
        }
    };

    shared.advance(&task.id, TaskPhase::Finalizing);
    if report.has_value() {
        Outcome::Completed(report.results)
    } else {
        Outcome::Failed {
            error: format!("all {} rules failed", report.results.len()),
            results: Some(report.results),
        }
    }
}

/// Best-effort save. Failures are logged and never change the task status.
async fn persist(store: Arc<dyn ResultStore>, task: &AnalysisTask) {
    let result = task.to_result();
    let id = task.id.clone();
    match tokio::task::spawn_blocking(move || store.save_result(&result)).await {
        Ok(Ok(())) => debug!(task_id = %id, "analysis result persisted"),
        Ok(Err(e)) => error!(task_id = %id, error = %e, "failed to persist analysis result"),
        Err(e) => error!(task_id = %id, error = %e, "persistence worker panicked"),
    }
}
