//! Persistent store (C1): typed CRUD and stats operations over one of two
//! SQL backends, chosen at runtime by `DB_DRIVER`. Both backends share the
//! schema in `migrations/` with trivial syntactic translation applied for
//! postgres (see `migrate::translate_for_postgres`).

mod attachment;
mod delivery;
mod domain;
mod email;
mod mailbox;
mod migrate;
mod session;
mod user;
mod webhook;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "postgres")]
mod postgres;

pub use migrate::MIGRATIONS;

/// A single open connection pool, bound to one backend for the process
/// lifetime. Cloning is cheap: both variants wrap a reference-counted pool.
#[derive(Clone)]
pub enum Store {
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteBackend),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresBackend),
}

impl Store {
    /// Opens the backend named by `driver` against `dsn`. Fatal-at-startup
    /// per the error taxonomy: callers should abort the process on error.
    pub async fn open(driver: common::DbDriver, dsn: &str) -> trc::Result<Self> {
        match driver {
            #[cfg(feature = "sqlite")]
            common::DbDriver::Sqlite => {
                Ok(Store::Sqlite(sqlite::SqliteBackend::open(dsn).await?))
            }
            #[cfg(not(feature = "sqlite"))]
            common::DbDriver::Sqlite => Err(trc::Error::fatal(
                "this build was compiled without sqlite support",
            )),
            #[cfg(feature = "postgres")]
            common::DbDriver::Postgres => {
                Ok(Store::Postgres(postgres::PostgresBackend::open(dsn).await?))
            }
            #[cfg(not(feature = "postgres"))]
            common::DbDriver::Postgres => Err(trc::Error::fatal(
                "this build was compiled without postgres support",
            )),
        }
    }

    /// Applies every migration in `MIGRATIONS` not yet recorded in
    /// `schema_migrations`, in order.
    pub async fn migrate(&self) -> trc::Result<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => b.migrate().await,
            #[cfg(feature = "postgres")]
            Store::Postgres(b) => b.migrate().await,
        }
    }
}
