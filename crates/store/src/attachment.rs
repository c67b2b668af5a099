use types::{Attachment, Id, NewAttachment};

use crate::Store;

const COLUMNS: &str = "id, email_id, filename, content_type, size, storage_path, created_at";

#[cfg(feature = "sqlite")]
fn row_to_attachment(row: &rusqlite::Row) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: Id::new(row.get(0)?),
        email_id: Id::new(row.get(1)?),
        filename: row.get(2)?,
        content_type: row.get(3)?,
        size: row.get(4)?,
        storage_path: row.get(5)?,
        created_at: row.get(6)?,
    })
}

#[cfg(feature = "postgres")]
fn pg_row_to_attachment(row: &tokio_postgres::Row) -> Attachment {
    Attachment {
        id: Id::new(row.get(0)),
        email_id: Id::new(row.get(1)),
        filename: row.get(2),
        content_type: row.get(3),
        size: row.get(4),
        storage_path: row.get(5),
        created_at: row.get(6),
    }
}

impl Store {
    pub async fn create_attachment(&self, new: NewAttachment) -> trc::Result<Attachment> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!(
                            "INSERT INTO attachments (email_id, filename, content_type, size, storage_path) \
                             VALUES (?1, ?2, ?3, ?4, ?5) RETURNING {COLUMNS}"
                        ),
                        rusqlite::params![
                            new.email_id.get(),
                            new.filename,
                            new.content_type,
                            new.size,
                            new.storage_path,
                        ],
                        row_to_attachment,
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
                            "INSERT INTO attachments (email_id, filename, content_type, size, storage_path) \
                             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
                        ),
                        &[
                            &new.email_id.get(),
                            &new.filename,
                            &new.content_type,
                            &new.size,
                            &new.storage_path,
                        ],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("insert attachment failed: {e}")))?;
                Ok(pg_row_to_attachment(&row))
            }
        }
    }

    pub async fn list_attachments_for_email(&self, email_id: Id) -> trc::Result<Vec<Attachment>> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    let mut stmt =
                        conn.prepare(&format!("SELECT {COLUMNS} FROM attachments WHERE email_id = ?1"))?;
                    let rows = stmt.query_map([email_id.get()], row_to_attachment)?;
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
                        &format!("SELECT {COLUMNS} FROM attachments WHERE email_id = $1"),
                        &[&email_id.get()],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("list attachments failed: {e}")))?;
                Ok(rows.iter().map(pg_row_to_attachment).collect())
            }
        }
    }
}
