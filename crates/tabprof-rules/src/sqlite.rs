use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, InterruptHandle, OpenFlags};
use tabprof_core::ConnectionConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    connection::{ConnectionProvider, TableConnection},
    error::{ConnectionError, QueryError},
};

/// How often a cancelled query is re-interrupted until its worker returns.
const INTERRUPT_RETRY: Duration = Duration::from_millis(10);

/// Opens a fresh read-only SQLite connection per request.
///
/// Each execution gets its own handle, so a cancelled query only interrupts
/// the task that owns it.
#[derive(Debug, Default, Clone)]
pub struct SqliteProvider;

impl SqliteProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionProvider for SqliteProvider {
    async fn get_connection(
        &self,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn TableConnection>, ConnectionError> {
        let config = config.clone();
        let conn = tokio::task::spawn_blocking(move || SqliteConnection::open(&config))
            .await
            .map_err(|e| ConnectionError::Unavailable(e.to_string()))??;
        Ok(Arc::new(conn))
    }
}

/// A read-only SQLite handle whose queries run on the blocking pool and can
/// be interrupted mid-statement.
pub struct SqliteConnection {
    conn: Arc<Mutex<Connection>>,
    interrupt: InterruptHandle,
}

impl SqliteConnection {
    /// Open `config.path` read-only. Fails if the file does not exist.
    pub fn open(config: &ConnectionConfig) -> Result<Self, ConnectionError> {
        let open_err = |source| ConnectionError::Open {
            path: config.path.clone(),
            source,
        };
        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(open_err)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(open_err)?;
        debug!(connection = %config.id, path = %config.path, "sqlite connection opened");
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already-open connection.
    pub fn from_connection(conn: Connection) -> Self {
        let interrupt = conn.get_interrupt_handle();
        Self {
            conn: Arc::new(Mutex::new(conn)),
            interrupt,
        }
    }

    /// Run `f` against the connection on the blocking pool, racing it
    /// against `cancel`. On cancellation the running statement is
    /// interrupted (repeatedly, until it stops) and the worker is awaited
    /// before returning.
    async fn run_blocking<T, F>(&self, cancel: &CancellationToken, f: F) -> Result<T, QueryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(QueryError::Cancelled);
        }

        let conn = Arc::clone(&self.conn);
        let token = cancel.clone();
        let mut job = tokio::task::spawn_blocking(move || -> Result<T, QueryError> {
            let guard = conn
                .lock()
                .map_err(|_| QueryError::Backend("sqlite connection lock poisoned".into()))?;
            // sqlite3_interrupt is a no-op when no statement is active yet.
            if token.is_cancelled() {
                return Err(QueryError::Cancelled);
            }
            Ok(f(&guard)?)
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // An interrupt issued before the statement starts stepping is
                // cleared by SQLite, so repeat it until the worker returns.
                let mut retry = tokio::time::interval(INTERRUPT_RETRY);
                loop {
                    self.interrupt.interrupt();
                    tokio::select! {
                        res = &mut job => {
                            if let Err(e) = res {
                                warn!(error = %e, "interrupted sqlite worker panicked");
                            }
                            break;
                        }
                        _ = retry.tick() => {}
                    }
                }
                Err(QueryError::Cancelled)
            }
            res = &mut job => res.map_err(|e| QueryError::Join(e.to_string()))?,
        }
    }
}

#[async_trait]
impl TableConnection for SqliteConnection {
    async fn list_tables(&self, cancel: &CancellationToken) -> Result<Vec<String>, QueryError> {
        self.run_blocking(cancel, |conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%'
                 ORDER BY name",
            )?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
        .await
    }

    async fn columns(
        &self,
        table: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, QueryError> {
        let table = table.to_string();
        self.run_blocking(cancel, move |conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
            let names = stmt
                .query_map([&table], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
        .await
    }

    async fn query_counts(
        &self,
        sql: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Option<i64>>, QueryError> {
        let sql = sql.to_string();
        let row = self
            .run_blocking(cancel, move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let width = stmt.column_count();
                stmt.query_row([], |row| {
                    (0..width)
                        .map(|i| row.get::<_, Option<i64>>(i))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })
            })
            .await?;
        if row.is_empty() {
            return Err(QueryError::Shape("query returned no columns".into()));
        }
        Ok(row)
    }
}
