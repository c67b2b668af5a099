use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use types::{Email, Id, NewEmail};

use crate::Store;

const COLUMNS: &str = "id, mailbox_id, message_id, from_address, to_address, subject, \
    email_date, headers_json, text_body, html_body, raw_size, received_at, is_read";

fn headers_to_json(headers: &BTreeMap<String, String>) -> String {
    serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string())
}

fn headers_from_json(raw: &str) -> BTreeMap<String, String> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(feature = "sqlite")]
fn row_to_email(row: &rusqlite::Row) -> rusqlite::Result<Email> {
    let headers_json: String = row.get(7)?;
    Ok(Email {
        id: Id::new(row.get(0)?),
        mailbox_id: Id::new(row.get(1)?),
        message_id: row.get(2)?,
        from_address: row.get(3)?,
        to_address: row.get(4)?,
        subject: row.get(5)?,
        date: row.get(6)?,
        headers: headers_from_json(&headers_json),
        text_body: row.get(8)?,
        html_body: row.get(9)?,
        raw_size: row.get(10)?,
        received_at: row.get(11)?,
        is_read: row.get::<_, i64>(12)? != 0,
        attachments: Vec::new(),
    })
}

#[cfg(feature = "postgres")]
fn pg_row_to_email(row: &tokio_postgres::Row) -> Email {
    let headers_json: String = row.get(7);
    Email {
        id: Id::new(row.get(0)),
        mailbox_id: Id::new(row.get(1)),
        message_id: row.get(2),
        from_address: row.get(3),
        to_address: row.get(4),
        subject: row.get(5),
        date: row.get(6),
        headers: headers_from_json(&headers_json),
        text_body: row.get(8),
        html_body: row.get(9),
        raw_size: row.get(10),
        received_at: row.get(11),
        is_read: row.get(12),
        attachments: Vec::new(),
    }
}

impl Store {
    pub async fn create_email(&self, new: NewEmail) -> trc::Result<Email> {
        let headers_json = headers_to_json(&new.headers);
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!(
                            "INSERT INTO emails (mailbox_id, message_id, from_address, to_address, \
                             subject, email_date, headers_json, text_body, html_body, raw_size) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) RETURNING {COLUMNS}"
                        ),
                        rusqlite::params![
                            new.mailbox_id.get(),
                            new.message_id,
                            new.from_address,
                            new.to_address,
                            new.subject,
                            new.date,
                            headers_json,
                            new.text_body,
                            new.html_body,
                            new.raw_size,
                        ],
                        row_to_email,
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
                            "INSERT INTO emails (mailbox_id, message_id, from_address, to_address, \
                             subject, email_date, headers_json, text_body, html_body, raw_size) \
                             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING {COLUMNS}"
                        ),
                        &[
                            &new.mailbox_id.get(),
                            &new.message_id,
                            &new.from_address,
                            &new.to_address,
                            &new.subject,
                            &new.date,
                            &headers_json,
                            &new.text_body,
                            &new.html_body,
                            &new.raw_size,
                        ],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("insert email failed: {e}")))?;
                Ok(pg_row_to_email(&row))
            }
        }
    }

    /// Loads an email together with its attachments, as handed to C7 after
    /// the DATA pipeline finishes persisting parts (§4.4 step 5).
    pub async fn get_email_with_attachments(&self, id: Id) -> trc::Result<Option<Email>> {
        let email = self.get_email_by_id(id).await?;
        match email {
            Some(mut email) => {
                email.attachments = self.list_attachments_for_email(id).await?;
                Ok(Some(email))
            }
            None => Ok(None),
        }
    }

    pub async fn get_email_by_id(&self, id: Id) -> trc::Result<Option<Email>> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!("SELECT {COLUMNS} FROM emails WHERE id = ?1"),
                        [id.get()],
                        row_to_email,
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
                    .query_opt(&format!("SELECT {COLUMNS} FROM emails WHERE id = $1"), &[&id.get()])
                    .await
                    .map_err(|e| trc::Error::transient(format!("select email failed: {e}")))?;
                Ok(row.as_ref().map(pg_row_to_email))
            }
        }
    }

    /// Deletes one email; attachment rows cascade at the schema level, the
    /// caller (C8) is responsible for removing the underlying blobs first.
    pub async fn delete_email(&self, id: Id) -> trc::Result<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| conn.execute("DELETE FROM emails WHERE id = ?1", [id.get()]).map(|_| ()))
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
                    .execute("DELETE FROM emails WHERE id = $1", &[&id.get()])
                    .await
                    .map_err(|e| trc::Error::transient(format!("delete email failed: {e}")))?;
                Ok(())
            }
        }
    }

    /// Emails in `mailbox_id` received before `cutoff`, for the retention
    /// sweep (§4.8).
    pub async fn list_emails_received_before(&self, mailbox_id: Id, cutoff: DateTime<Utc>) -> trc::Result<Vec<Email>> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM emails WHERE mailbox_id = ?1 AND received_at < ?2"
                    ))?;
                    let rows = stmt.query_map(rusqlite::params![mailbox_id.get(), cutoff], row_to_email)?;
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
                        &format!("SELECT {COLUMNS} FROM emails WHERE mailbox_id = $1 AND received_at < $2"),
                        &[&mailbox_id.get(), &cutoff],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("list emails failed: {e}")))?;
                Ok(rows.iter().map(pg_row_to_email).collect())
            }
        }
    }
}
