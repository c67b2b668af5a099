use types::{Id, User};

use crate::Store;

const COLUMNS: &str = "id, email, is_active, created_at";

#[cfg(feature = "sqlite")]
fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: Id::new(row.get(0)?),
        email: row.get(1)?,
        is_active: row.get::<_, i64>(2)? != 0,
        created_at: row.get(3)?,
    })
}

#[cfg(feature = "postgres")]
fn pg_row_to_user(row: &tokio_postgres::Row) -> User {
    User {
        id: Id::new(row.get(0)),
        email: row.get(1),
        is_active: row.get(2),
        created_at: row.get(3),
    }
}

/// The minimal User CRUD the core itself needs: sessions reference a
/// `user_id`, so the store must be able to create and load one, even
/// though profile management lives entirely in the out-of-scope
/// administrative surface (§1).
impl Store {
    pub async fn create_user(&self, email: &str) -> trc::Result<User> {
        let email = email.to_string();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!("INSERT INTO users (email) VALUES (?1) RETURNING {COLUMNS}"),
                        [&email],
                        row_to_user,
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
                        &format!("INSERT INTO users (email) VALUES ($1) RETURNING {COLUMNS}"),
                        &[&email],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("insert user failed: {e}")))?;
                Ok(pg_row_to_user(&row))
            }
        }
    }

    pub async fn get_user_by_id(&self, id: Id) -> trc::Result<Option<User>> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(&format!("SELECT {COLUMNS} FROM users WHERE id = ?1"), [id.get()], row_to_user)
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
                    .query_opt(&format!("SELECT {COLUMNS} FROM users WHERE id = $1"), &[&id.get()])
                    .await
                    .map_err(|e| trc::Error::transient(format!("select user failed: {e}")))?;
                Ok(row.as_ref().map(pg_row_to_user))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_and_loads_a_user() {
        let store = Store::open(common::DbDriver::Sqlite, ":memory:").await.unwrap();
        store.migrate().await.unwrap();
        let user = store.create_user("owner@example.com").await.unwrap();
        let loaded = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(loaded.email, "owner@example.com");
        assert!(loaded.is_active);
    }
}
