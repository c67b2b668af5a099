use types::{Id, Mailbox};

use crate::Store;

const COLUMNS: &str = "id, slug, domain_id, owner_id, description, is_active, \
    max_email_size_mb, max_attachment_size_mb, retention_days, created_at, updated_at";

#[cfg(feature = "sqlite")]
fn row_to_mailbox(row: &rusqlite::Row) -> rusqlite::Result<Mailbox> {
    Ok(Mailbox {
        id: Id::new(row.get(0)?),
        slug: row.get(1)?,
        domain_id: Id::new(row.get(2)?),
        owner_id: row.get::<_, Option<i64>>(3)?.map(Id::new),
        description: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        max_email_size_mb: row.get(6)?,
        max_attachment_size_mb: row.get(7)?,
        retention_days: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(feature = "postgres")]
fn pg_row_to_mailbox(row: &tokio_postgres::Row) -> Mailbox {
    Mailbox {
        id: Id::new(row.get(0)),
        slug: row.get(1),
        domain_id: Id::new(row.get(2)),
        owner_id: row.get::<_, Option<i64>>(3).map(Id::new),
        description: row.get(4),
        is_active: row.get(5),
        max_email_size_mb: row.get(6),
        max_attachment_size_mb: row.get(7),
        retention_days: row.get(8),
        created_at: row.get(9),
        updated_at: row.get(10),
    }
}

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub async fn create_mailbox(
        &self,
        slug: &str,
        domain_id: Id,
        owner_id: Option<Id>,
        description: &str,
        max_email_size_mb: i64,
        max_attachment_size_mb: i64,
        retention_days: i64,
    ) -> trc::Result<Mailbox> {
        let slug = slug.to_string();
        let description = description.to_string();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!(
                            "INSERT INTO mailboxes (slug, domain_id, owner_id, description, \
                             max_email_size_mb, max_attachment_size_mb, retention_days) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING {COLUMNS}"
                        ),
                        rusqlite::params![
                            slug,
                            domain_id.get(),
                            owner_id.map(Id::get),
                            description,
                            max_email_size_mb,
                            max_attachment_size_mb,
                            retention_days
                        ],
                        row_to_mailbox,
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
                        &format!(
                            "INSERT INTO mailboxes (slug, domain_id, owner_id, description, \
                             max_email_size_mb, max_attachment_size_mb, retention_days) \
                             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {COLUMNS}"
                        ),
                        &[
                            &slug,
                            &domain_id.get(),
                            &owner_id.map(Id::get),
                            &description,
                            &max_email_size_mb,
                            &max_attachment_size_mb,
                            &retention_days,
                        ],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("insert mailbox failed: {e}")))?;
                Ok(pg_row_to_mailbox(&row))
            }
        }
    }

    pub async fn get_mailbox_by_slug(&self, domain_id: Id, slug: &str) -> trc::Result<Option<Mailbox>> {
        let slug = slug.to_string();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!("SELECT {COLUMNS} FROM mailboxes WHERE domain_id = ?1 AND slug = ?2"),
                        rusqlite::params![domain_id.get(), slug],
                        row_to_mailbox,
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
                        &format!("SELECT {COLUMNS} FROM mailboxes WHERE domain_id = $1 AND slug = $2"),
                        &[&domain_id.get(), &slug],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("select mailbox failed: {e}")))?;
                Ok(row.as_ref().map(pg_row_to_mailbox))
            }
        }
    }

    pub async fn get_mailbox_by_id(&self, id: Id) -> trc::Result<Option<Mailbox>> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!("SELECT {COLUMNS} FROM mailboxes WHERE id = ?1"),
                        [id.get()],
                        row_to_mailbox,
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
                    .query_opt(&format!("SELECT {COLUMNS} FROM mailboxes WHERE id = $1"), &[&id.get()])
                    .await
                    .map_err(|e| trc::Error::transient(format!("select mailbox failed: {e}")))?;
                Ok(row.as_ref().map(pg_row_to_mailbox))
            }
        }
    }

    /// Mailboxes whose retention sweep is enabled (`retention_days > 0`),
    /// for C8's 24h pass.
    pub async fn list_mailboxes_with_retention(&self) -> trc::Result<Vec<Mailbox>> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM mailboxes WHERE retention_days > 0"
                    ))?;
                    let rows = stmt.query_map([], row_to_mailbox)?;
                    rows.collect()
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
                let rows = client
                    .query(
                        &format!("SELECT {COLUMNS} FROM mailboxes WHERE retention_days > 0"),
                        &[],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("list mailboxes failed: {e}")))?;
                Ok(rows.iter().map(pg_row_to_mailbox).collect())
            }
        }
    }
}
