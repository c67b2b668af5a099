use chrono::{DateTime, Utc};
use types::{Domain, Id};

use crate::Store;

#[cfg(feature = "sqlite")]
fn row_to_domain(row: &rusqlite::Row) -> rusqlite::Result<Domain> {
    Ok(Domain {
        id: Id::new(row.get(0)?),
        name: row.get(1)?,
        is_verified: row.get::<_, i64>(2)? != 0,
        is_active: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

#[cfg(feature = "postgres")]
fn pg_row_to_domain(row: &tokio_postgres::Row) -> Domain {
    Domain {
        id: Id::new(row.get(0)),
        name: row.get(1),
        is_verified: row.get(2),
        is_active: row.get(3),
        created_at: row.get(4),
        updated_at: row.get(5),
    }
}

const COLUMNS: &str = "id, name, is_verified, is_active, created_at, updated_at";

impl Store {
    pub async fn create_domain(&self, name: &str) -> trc::Result<Domain> {
        let name = name.to_string();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!(
                            "INSERT INTO domains (name) VALUES (?1) RETURNING {COLUMNS}"
                        ),
                        [&name],
                        row_to_domain,
                    )
                })
                .await
            }
            #[cfg(feature = "postgres")]
            Store::Postgres(b) => {
                let client = b
                    .pool
                    .get()
                    .await
                    .map_err(|e| trc::Error::transient(format!("postgres pool error: {e}")))?;
                let row = client
                    .query_one(
                        &format!("INSERT INTO domains (name) VALUES ($1) RETURNING {COLUMNS}"),
                        &[&name],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("insert domain failed: {e}")))?;
                Ok(pg_row_to_domain(&row))
            }
        }
    }

    pub async fn get_domain_by_name(&self, name: &str) -> trc::Result<Option<Domain>> {
        let name = name.to_string();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!("SELECT {COLUMNS} FROM domains WHERE name = ?1"),
                        [&name],
                        row_to_domain,
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })
                })
                .await
            }
            #[cfg(feature = "postgres")]
            Store::Postgres(b) => {
                let client = b
                    .pool
                    .get()
                    .await
                    .map_err(|e| trc::Error::transient(format!("postgres pool error: {e}")))?;
                let row = client
                    .query_opt(
                        &format!("SELECT {COLUMNS} FROM domains WHERE name = $1"),
                        &[&name],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("select domain failed: {e}")))?;
                Ok(row.as_ref().map(pg_row_to_domain))
            }
        }
    }

    pub async fn get_domain_by_id(&self, id: Id) -> trc::Result<Option<Domain>> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!("SELECT {COLUMNS} FROM domains WHERE id = ?1"),
                        [id.get()],
                        row_to_domain,
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })
                })
                .await
            }
            #[cfg(feature = "postgres")]
            Store::Postgres(b) => {
                let client = b
                    .pool
                    .get()
                    .await
                    .map_err(|e| trc::Error::transient(format!("postgres pool error: {e}")))?;
                let row = client
                    .query_opt(
                        &format!("SELECT {COLUMNS} FROM domains WHERE id = $1"),
                        &[&id.get()],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("select domain failed: {e}")))?;
                Ok(row.as_ref().map(pg_row_to_domain))
            }
        }
    }

    /// Promotes a domain to verified. Idempotent, per §4.9.
    pub async fn set_domain_verified(&self, id: Id, verified: bool, now: DateTime<Utc>) -> trc::Result<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.execute(
                        "UPDATE domains SET is_verified = ?1, updated_at = ?2 WHERE id = ?3",
                        rusqlite::params![verified as i64, now, id.get()],
                    )
                    .map(|_| ())
                })
                .await
            }
            #[cfg(feature = "postgres")]
            Store::Postgres(b) => {
                let client = b
                    .pool
                    .get()
                    .await
                    .map_err(|e| trc::Error::transient(format!("postgres pool error: {e}")))?;
                client
                    .execute(
                        "UPDATE domains SET is_verified = $1, updated_at = $2 WHERE id = $3",
                        &[&verified, &now, &id.get()],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("update domain failed: {e}")))?;
                Ok(())
            }
        }
    }
}
