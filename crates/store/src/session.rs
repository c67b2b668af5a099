use chrono::{DateTime, Utc};
use types::{Id, Session};

use crate::Store;

#[cfg(feature = "sqlite")]
fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    Ok(Session {
        token: row.get(0)?,
        user_id: Id::new(row.get(1)?),
        expires_at: row.get(2)?,
    })
}

#[cfg(feature = "postgres")]
fn pg_row_to_session(row: &tokio_postgres::Row) -> Session {
    Session {
        token: row.get(0),
        user_id: Id::new(row.get(1)),
        expires_at: row.get(2),
    }
}

impl Store {
    pub async fn create_session(&self, token: &str, user_id: Id, expires_at: DateTime<Utc>) -> trc::Result<Session> {
        let token = token.to_string();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.execute(
                        "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
                        rusqlite::params![token, user_id.get(), expires_at],
                    )
                    .map(|_| Session {
                        token: token.clone(),
                        user_id,
                        expires_at,
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
                client
                    .execute(
                        "INSERT INTO sessions (token, user_id, expires_at) VALUES ($1, $2, $3)",
                        &[&token, &user_id.get(), &expires_at],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("insert session failed: {e}")))?;
                Ok(Session { token, user_id, expires_at })
            }
        }
    }

    pub async fn get_session_by_token(&self, token: &str) -> trc::Result<Option<Session>> {
        let token = token.to_string();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
                        [token],
                        row_to_session,
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
                    .query_opt("SELECT token, user_id, expires_at FROM sessions WHERE token = $1", &[&token])
                    .await
                    .map_err(|e| trc::Error::transient(format!("select session failed: {e}")))?;
                Ok(row.as_ref().map(pg_row_to_session))
            }
        }
    }

    pub async fn delete_session(&self, token: &str) -> trc::Result<()> {
        let token = token.to_string();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| conn.execute("DELETE FROM sessions WHERE token = ?1", [token]).map(|_| ()))
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
                    .execute("DELETE FROM sessions WHERE token = $1", &[&token])
                    .await
                    .map_err(|e| trc::Error::transient(format!("delete session failed: {e}")))?;
                Ok(())
            }
        }
    }

    /// Deletes expired sessions (both TTL namespaces share one table and
    /// one expiry column) — C8's hourly sweep.
    pub async fn delete_expired_sessions(&self, now: DateTime<Utc>) -> trc::Result<u64> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.execute("DELETE FROM sessions WHERE expires_at < ?1", [now]).map(|n| n as u64)
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
                let n = client
                    .execute("DELETE FROM sessions WHERE expires_at < $1", &[&now])
                    .await
                    .map_err(|e| trc::Error::transient(format!("delete expired sessions failed: {e}")))?;
                Ok(n)
            }
        }
    }
}
