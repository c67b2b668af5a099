use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::migrate::{split_statements, CREATE_TRACKING_TABLE_SQLITE, MIGRATIONS};

/// The embedded, single-file backend. `rusqlite` is blocking, so every
/// operation runs on the blocking thread pool via `with_conn`; the pool
/// itself is capped at a single connection, matching the source system's
/// single-writer WAL setup (§4.1: "the single-file embedded backend must
/// serialize writes").
#[derive(Clone)]
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteBackend {
    pub async fn open(dsn: &str) -> trc::Result<Self> {
        let dsn = dsn.to_string();
        tokio::task::spawn_blocking(move || {
            let manager = SqliteConnectionManager::file(&dsn).with_init(|conn| {
                conn.execute_batch(
                    "PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;",
                )
            });
            let pool = Pool::builder()
                .max_size(1)
                .build(manager)
                .map_err(|e| trc::Error::fatal(format!("failed to open sqlite database: {e}")))?;
            Ok(SqliteBackend { pool })
        })
        .await
        .map_err(|e| trc::Error::fatal(format!("sqlite open task panicked: {e}")))?
    }

    pub async fn migrate(&self) -> trc::Result<()> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| trc::Error::transient(format!("failed to acquire sqlite connection: {e}")))?;
            conn.execute_batch(CREATE_TRACKING_TABLE_SQLITE)
                .map_err(|e| trc::Error::fatal(format!("failed to create schema_migrations: {e}")))?;

            for (version, sql) in MIGRATIONS {
                let applied: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM schema_migrations WHERE version = ?1",
                        [version],
                        |row| row.get(0),
                    )
                    .map_err(|e| trc::Error::fatal(format!("failed to check migration {version}: {e}")))?;
                if applied > 0 {
                    continue;
                }
                for stmt in split_statements(sql) {
                    conn.execute_batch(&stmt)
                        .map_err(|e| trc::Error::fatal(format!("migration {version} failed: {e}")))?;
                }
                conn.execute(
                    "INSERT INTO schema_migrations (version) VALUES (?1)",
                    [version],
                )
                .map_err(|e| trc::Error::fatal(format!("failed to record migration {version}: {e}")))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| trc::Error::fatal(format!("sqlite migration task panicked: {e}")))?
    }

    /// Runs `f` against a pooled connection on the blocking thread pool.
    pub(crate) async fn with_conn<F, T>(&self, f: F) -> trc::Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool
                .get()
                .map_err(|e| trc::Error::transient(format!("failed to acquire sqlite connection: {e}")))?;
            f(&conn).map_err(|e| trc::Error::transient(format!("sqlite query failed: {e}")))
        })
        .await
        .map_err(|e| trc::Error::transient(format!("sqlite task panicked: {e}")))?
    }
}
