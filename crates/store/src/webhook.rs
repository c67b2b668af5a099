use std::collections::BTreeMap;

use types::{Id, PayloadType, Webhook, WebhookRule};

use crate::Store;

const WEBHOOK_COLUMNS: &str = "id, mailbox_id, name, url, method, headers_json, payload_type, \
    custom_payload, hmac_secret, timeout_sec, max_retries, include_body, include_attachments, \
    is_active, created_at, updated_at";

const RULE_COLUMNS: &str = "id, webhook_id, rule_group, field, operator, value, header_name";

fn headers_to_json(headers: &BTreeMap<String, String>) -> String {
    serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string())
}

fn headers_from_json(raw: &str) -> BTreeMap<String, String> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[cfg(feature = "sqlite")]
fn row_to_webhook(row: &rusqlite::Row) -> rusqlite::Result<Webhook> {
    let headers_json: String = row.get(5)?;
    let payload_type: String = row.get(6)?;
    Ok(Webhook {
        id: Id::new(row.get(0)?),
        mailbox_id: Id::new(row.get(1)?),
        name: row.get(2)?,
        url: row.get(3)?,
        method: row.get(4)?,
        headers: headers_from_json(&headers_json),
        payload_type: PayloadType::parse(&payload_type),
        custom_payload: row.get(7)?,
        hmac_secret: row.get(8)?,
        timeout_sec: row.get(9)?,
        max_retries: row.get(10)?,
        include_body: row.get::<_, i64>(11)? != 0,
        include_attachments: row.get::<_, i64>(12)? != 0,
        is_active: row.get::<_, i64>(13)? != 0,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
        rules: Vec::new(),
    })
}

#[cfg(feature = "sqlite")]
fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<WebhookRule> {
    Ok(WebhookRule {
        id: Id::new(row.get(0)?),
        webhook_id: Id::new(row.get(1)?),
        rule_group: row.get(2)?,
        field: row.get(3)?,
        operator: row.get(4)?,
        value: row.get(5)?,
        header_name: row.get(6)?,
    })
}

#[cfg(feature = "postgres")]
fn pg_row_to_webhook(row: &tokio_postgres::Row) -> Webhook {
    let headers_json: String = row.get(5);
    let payload_type: String = row.get(6);
    Webhook {
        id: Id::new(row.get(0)),
        mailbox_id: Id::new(row.get(1)),
        name: row.get(2),
        url: row.get(3),
        method: row.get(4),
        headers: headers_from_json(&headers_json),
        payload_type: PayloadType::parse(&payload_type),
        custom_payload: row.get(7),
        hmac_secret: row.get(8),
        timeout_sec: row.get(9),
        max_retries: row.get(10),
        include_body: row.get(11),
        include_attachments: row.get(12),
        is_active: row.get(13),
        created_at: row.get(14),
        updated_at: row.get(15),
        rules: Vec::new(),
    }
}

#[cfg(feature = "postgres")]
fn pg_row_to_rule(row: &tokio_postgres::Row) -> WebhookRule {
    WebhookRule {
        id: Id::new(row.get(0)),
        webhook_id: Id::new(row.get(1)),
        rule_group: row.get(2),
        field: row.get(3),
        operator: row.get(4),
        value: row.get(5),
        header_name: row.get(6),
    }
}

impl Store {
    /// Active webhooks for a mailbox, each with its rules loaded — the
    /// shape C5/C7 need on every incoming email.
    pub async fn list_active_webhooks_for_mailbox(&self, mailbox_id: Id) -> trc::Result<Vec<Webhook>> {
        let mut webhooks = match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE mailbox_id = ?1 AND is_active = 1"
                    ))?;
                    let rows = stmt.query_map([mailbox_id.get()], row_to_webhook)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()
                })
                .await?
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
                            "SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE mailbox_id = $1 AND is_active = true"
                        ),
                        &[&mailbox_id.get()],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("list webhooks failed: {e}")))?;
                rows.iter().map(pg_row_to_webhook).collect()
            }
        };
        for webhook in &mut webhooks {
            webhook.rules = self.list_rules_for_webhook(webhook.id).await?;
        }
        Ok(webhooks)
    }

    pub async fn get_webhook_by_id(&self, id: Id) -> trc::Result<Option<Webhook>> {
        let webhook = match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = ?1"),
                        [id.get()],
                        row_to_webhook,
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })
                })
                .await?
            }
            #[cfg(feature = "postgres")]
            Store::Postgres(b) => {
                let client = b
                    .pool
                    .get()
                    .await
                    .map_err(|e| trc::Error::transient(format!("postgres pool error: {e}")))?;
                let row = client
                    .query_opt(&format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = $1"), &[&id.get()])
                    .await
                    .map_err(|e| trc::Error::transient(format!("select webhook failed: {e}")))?;
                row.as_ref().map(pg_row_to_webhook)
            }
        };
        match webhook {
            Some(mut webhook) => {
                webhook.rules = self.list_rules_for_webhook(webhook.id).await?;
                Ok(Some(webhook))
            }
            None => Ok(None),
        }
    }

    async fn list_rules_for_webhook(&self, webhook_id: Id) -> trc::Result<Vec<WebhookRule>> {
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    let mut stmt =
                        conn.prepare(&format!("SELECT {RULE_COLUMNS} FROM webhook_rules WHERE webhook_id = ?1"))?;
                    let rows = stmt.query_map([webhook_id.get()], row_to_rule)?;
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
                        &format!("SELECT {RULE_COLUMNS} FROM webhook_rules WHERE webhook_id = $1"),
                        &[&webhook_id.get()],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("list webhook rules failed: {e}")))?;
                Ok(rows.iter().map(pg_row_to_rule).collect())
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_webhook(
        &self,
        mailbox_id: Id,
        name: &str,
        url: &str,
        method: &str,
        headers: &BTreeMap<String, String>,
        payload_type: PayloadType,
        custom_payload: Option<&str>,
        hmac_secret: Option<&str>,
        timeout_sec: i64,
        max_retries: i64,
        include_body: bool,
        include_attachments: bool,
    ) -> trc::Result<Webhook> {
        let name = name.to_string();
        let url = url.to_string();
        let method = method.to_string();
        let headers_json = headers_to_json(headers);
        let payload_type_str = payload_type.as_str().to_string();
        let custom_payload = custom_payload.map(str::to_string);
        let hmac_secret = hmac_secret.map(str::to_string);
        let webhook = match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!(
                            "INSERT INTO webhooks (mailbox_id, name, url, method, headers_json, \
                             payload_type, custom_payload, hmac_secret, timeout_sec, max_retries, \
                             include_body, include_attachments) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                             RETURNING {WEBHOOK_COLUMNS}"
                        ),
                        rusqlite::params![
                            mailbox_id.get(),
                            name,
                            url,
                            method,
                            headers_json,
                            payload_type_str,
                            custom_payload,
                            hmac_secret,
                            timeout_sec,
                            max_retries,
                            include_body as i64,
                            include_attachments as i64,
                        ],
                        row_to_webhook,
                    )
                })
                .await?
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
                            "INSERT INTO webhooks (mailbox_id, name, url, method, headers_json, \
                             payload_type, custom_payload, hmac_secret, timeout_sec, max_retries, \
                             include_body, include_attachments) \
                             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
                             RETURNING {WEBHOOK_COLUMNS}"
                        ),
                        &[
                            &mailbox_id.get(),
                            &name,
                            &url,
                            &method,
                            &headers_json,
                            &payload_type_str,
                            &custom_payload,
                            &hmac_secret,
                            &timeout_sec,
                            &max_retries,
                            &include_body,
                            &include_attachments,
                        ],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("insert webhook failed: {e}")))?;
                pg_row_to_webhook(&row)
            }
        };
        Ok(webhook)
    }

    pub async fn create_webhook_rule(
        &self,
        webhook_id: Id,
        rule_group: i64,
        field: &str,
        operator: &str,
        value: &str,
        header_name: Option<&str>,
    ) -> trc::Result<WebhookRule> {
        let field = field.to_string();
        let operator = operator.to_string();
        let value = value.to_string();
        let header_name = header_name.map(str::to_string);
        match self {
            #[cfg(feature = "sqlite")]
            Store::Sqlite(b) => {
                b.with_conn(move |conn| {
                    conn.query_row(
                        &format!(
                            "INSERT INTO webhook_rules (webhook_id, rule_group, field, operator, value, header_name) \
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6) RETURNING {RULE_COLUMNS}"
                        ),
                        rusqlite::params![webhook_id.get(), rule_group, field, operator, value, header_name],
                        row_to_rule,
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
                            "INSERT INTO webhook_rules (webhook_id, rule_group, field, operator, value, header_name) \
                             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {RULE_COLUMNS}"
                        ),
                        &[&webhook_id.get(), &rule_group, &field, &operator, &value, &header_name],
                    )
                    .await
                    .map_err(|e| trc::Error::transient(format!("insert webhook rule failed: {e}")))?;
                Ok(pg_row_to_rule(&row))
            }
        }
    }
}
