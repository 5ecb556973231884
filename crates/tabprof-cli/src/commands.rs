use std::sync::Arc;

use anyhow::Context;
use futures_util::future::join_all;
use tabprof_core::{ConnectionConfig, ProfilerConfig};
use tabprof_rules::{AnalysisEngine, ConnectionProvider, SqliteProvider};
use tabprof_scheduler::{AnalysisTask, TaskManager};
use tabprof_store::{ResultStore, SqliteResultStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub fn rules() -> anyhow::Result<()> {
    let engine = AnalysisEngine::with_default_rules();
    for (name, description) in engine.describe_rules() {
        println!("{name:<16} {description}");
    }
    Ok(())
}

pub async fn tables(config: &ProfilerConfig, connection: &str) -> anyhow::Result<()> {
    let connection = config.connection(connection)?;
    for table in list_tables(connection).await? {
        println!("{table}");
    }
    Ok(())
}

pub async fn run(
    config: &ProfilerConfig,
    connection: &str,
    tables: Vec<String>,
) -> anyhow::Result<()> {
    let connection = config.connection(connection)?.clone();
    let tables = if tables.is_empty() {
        list_tables(&connection).await?
    } else {
        tables
    };
    if tables.is_empty() {
        warn!(connection = %connection.id, "no tables to profile");
        return Ok(());
    }

    let store = Arc::new(open_store(config)?);
    let manager = TaskManager::new(
        config.scheduler.clone(),
        Arc::new(AnalysisEngine::with_default_rules()),
        Arc::new(SqliteProvider::new()),
        store,
    );
    manager.start()?;

    let mut ids = Vec::with_capacity(tables.len());
    for table in tables {
        let task = AnalysisTask::new(table, connection.clone());
        ids.push(task.id.clone());
        manager.submit(task)?;
    }
    info!(count = ids.len(), connection = %connection.id, "tasks submitted");

    tokio::select! {
        _ = join_all(ids.iter().map(|id| manager.wait(id))) => {}
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!(error = %e, "failed to listen for interrupt");
            }
            info!("interrupt received, stopping");
        }
    }
    manager.stop().await;

    let stats = manager.stats();
    for id in &ids {
        if let Some(task) = manager.get_task(id) {
            println!("{}", serde_json::to_string_pretty(&task.to_result())?);
        }
    }
    info!(
        completed = stats.completed,
        failed = stats.failed,
        cancelled = stats.cancelled,
        "run finished"
    );
    if stats.completed < ids.len() {
        anyhow::bail!("{} of {} tasks did not complete", ids.len() - stats.completed, ids.len());
    }
    Ok(())
}

pub fn results(config: &ProfilerConfig, connection: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let results = store.list_results(connection)?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

pub fn delete(config: &ProfilerConfig, id: &str) -> anyhow::Result<()> {
    let store = open_store(config)?;
    store.delete_result(id)?;
    println!("deleted {id}");
    Ok(())
}

async fn list_tables(connection: &ConnectionConfig) -> anyhow::Result<Vec<String>> {
    let conn = SqliteProvider::new()
        .get_connection(connection)
        .await
        .with_context(|| format!("connecting to {}", connection.id))?;
    Ok(conn.list_tables(&CancellationToken::new()).await?)
}

fn open_store(config: &ProfilerConfig) -> anyhow::Result<SqliteResultStore> {
    let path = &config.database.path;
    ensure_parent_dir(path);
    info!(%path, "opening result store");
    SqliteResultStore::open(path).with_context(|| format!("opening result store at {path}"))
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(dir = %parent.display(), error = %e, "failed to create result store directory");
        }
    }
}
