use types::{DeliveryStatus, Id, WebhookDelivery};

use crate::Store;

const COLUMNS: &str = "id, webhook_id, email_id, attempt, status, status_code, request_body, \
    response_body, error_message, duration_ms, created_at";

/// Response bodies are truncated to this many characters before storage
/// (§3 WebhookDelivery, §4.7 step 7).
pub const RESPONSE_BODY_MAX_CHARS: usize = 1000;

pub fn truncate_response_body(body: &str) -> String {
    body.chars().take(RESPONSE_BODY_MAX_CHARS).collect()
}

#[cfg(feature = "sqlite")]
fn row_to_delivery(row: &rusqlite::Row) -> rusqlite::Result<WebhookDelivery> {
    let status: String = row.get(4)?;
    Ok(WebhookDelivery {
        id: Id::new(row.get(0)?),
        webhook_id: Id::new(row.get(1)?),
        email_id: Id::new(row.get(2)?),
        attempt: row.get(3)?,
        status: DeliveryStatus::parse(&status).unwrap_or(DeliveryStatus::Failed),
        status_code: row.get(5)?,
        request_body: row.get(6)?,
        response_body: row.get(7)?,
        error_message: row.get(8)?,
        duration_ms: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[cfg(feature = "postgres")]
fn pg_row_to_delivery(row: &tokio_postgres::Row) -> WebhookDelivery {
    let status: String = row.get(4);
    WebhookDelivery {
        id: Id::new(row.get(0)),
        webhook_id: Id::new(row.get(1)),
        email_id: Id::new(row.get(2)),
        attempt: row.get(3),
        status: DeliveryStatus::parse(&status).unwrap_or(DeliveryStatus::Failed),
        status_code: row.get(5),
        request_body: row.get(6),
        response_body: row.get(7),
        error_message: row.get(8),
        duration_ms: row.get(9),
        created_at: row.get(10),
    }
}

impl Store {
    /// Inserts a new delivery row with status `pending` — step 2 of the
    /// worker loop (§4.7).
    pub async fn create_delivery_pending(
        &self,
        webhook_id: Id,
        email_id: Id,
        attempt: i64,
        request_body: &str,
    ) -> trc::Result<WebhookDelivery> {
        let request_body = request_body.to_string();
        let status = DeliveryStatus::Pending.as_str();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!(
                            "INSERT INTO webhook_deliveries (webhook_id, email_id, attempt, status, request_body) \
                             VALUES (?1, ?2, ?3, ?4, ?5) RETURNING {COLUMNS}"
                        ),
                        rusqlite::params![webhook_id.get(), email_id.get(), attempt, status, request_body],
                        row_to_delivery,
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
                            "INSERT INTO webhook_deliveries (webhook_id, email_id, attempt, status, request_body) \
                             VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}"
                        ),
                        &[&webhook_id.get(), &email_id.get(), &attempt, &status, &request_body],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("insert delivery failed: {e}")))?;
                Ok(pg_row_to_delivery(&row))
            }
        }
    }

    /// Updates a delivery to its final status for this attempt — step 7 of
    /// the worker loop. Callers never call this on an already-terminal row
    /// (§8: terminal rows are never modified).
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_delivery(
        &self,
        id: Id,
        status: DeliveryStatus,
        status_code: Option<i32>,
        response_body: &str,
        error_message: Option<&str>,
        duration_ms: i64,
    ) -> trc::Result<()> {
        let status_str = status.as_str();
        let response_body = truncate_response_body(response_body);
        let error_message = error_message.map(str::to_string);
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.execute(
                        "UPDATE webhook_deliveries SET status = ?1, status_code = ?2, response_body = ?3, \
                         error_message = ?4, duration_ms = ?5 WHERE id = ?6",
                        rusqlite::params![status_str, status_code, response_body, error_message, duration_ms, id.get()],
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
                        "UPDATE webhook_deliveries SET status = $1, status_code = $2, response_body = $3, \
                         error_message = $4, duration_ms = $5 WHERE id = $6",
                        &[&status_str, &status_code, &response_body, &error_message, &duration_ms, &id.get()],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("update delivery failed: {e}")))?;
                Ok(())
            }
        }
    }

    /// Marks a `retrying` delivery terminal ahead of re-enqueuing the next
    /// attempt, appending `" (retry scheduled)"` to its error message — the
    /// race-avoidance scheme from §4.7/§9 open question 3.
    pub async fn mark_delivery_retry_scheduled(&self, id: Id, prior_error: Option<&str>) -> trc::Result<()> {
        let message = format!("{}{}", prior_error.unwrap_or(""), " (retry scheduled)");
        let status_str = DeliveryStatus::Failed.as_str();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.execute(
                        "UPDATE webhook_deliveries SET status = ?1, error_message = ?2 WHERE id = ?3",
                        rusqlite::params![status_str, message, id.get()],
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
                        "UPDATE webhook_deliveries SET status = $1, error_message = $2 WHERE id = $3",
                        &[&status_str, &message, &id.get()],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("update delivery failed: {e}")))?;
                Ok(())
            }
        }
    }

    /// Marks a delivery terminally `failed` with a fixed reason, without the
    /// retry-scheduled suffix (used when max retries is exhausted or the
    /// source email has been removed).
    pub async fn mark_delivery_failed(&self, id: Id, reason: &str) -> trc::Result<()> {
        let reason = reason.to_string();
        let status_str = DeliveryStatus::Failed.as_str();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.execute(
                        "UPDATE webhook_deliveries SET status = ?1, error_message = ?2 WHERE id = ?3",
                        rusqlite::params![status_str, reason, id.get()],
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
                        "UPDATE webhook_deliveries SET status = $1, error_message = $2 WHERE id = $3",
                        &[&status_str, &reason, &id.get()],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("update delivery failed: {e}")))?;
                Ok(())
            }
        }
    }

    /// Up to `limit` deliveries currently `retrying`, for the 30s retry
    /// scanner (§4.7).
    pub async fn list_retrying_deliveries(&self, limit: i64) -> trc::Result<Vec<WebhookDelivery>> {
        let status = DeliveryStatus::Retrying.as_str();
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {COLUMNS} FROM webhook_deliveries WHERE status = ?1 ORDER BY id LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(rusqlite::params![status, limit], row_to_delivery)?;
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
                        &format!(
                            "SELECT {COLUMNS} FROM webhook_deliveries WHERE status = $1 ORDER BY id LIMIT $2"
                        ),
                        &[&status, &limit],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("list retrying deliveries failed: {e}")))?;
                Ok(rows.iter().map(pg_row_to_delivery).collect())
            }
        }
    }

    pub async fn get_delivery_by_id(&self, id: Id) -> trc::Result<Option<WebhookDelivery>> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!("SELECT {COLUMNS} FROM webhook_deliveries WHERE id = ?1"),
                        [id.get()],
                        row_to_delivery,
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
                        &format!("SELECT {COLUMNS} FROM webhook_deliveries WHERE id = $1"),
                        &[&id.get()],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("select delivery failed: {e}")))?;
                Ok(row.as_ref().map(pg_row_to_delivery))
            }
        }
    }
}
