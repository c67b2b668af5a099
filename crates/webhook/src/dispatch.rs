//! Dispatch Engine (C7; §4.7). Grounded on `internal/webhook/dispatcher.go`:
//! a bounded job queue feeding a fixed worker pool, plus an independent
//! 30-second scanner that advances deliveries left in `retrying`. Enqueuing
//! is non-blocking — a full queue drops the job rather than applying
//! backpressure to the SMTP session that triggered it (§9 open question 2).

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use types::{DeliveryStatus, Email, Id, Webhook};

use crate::{payload, rules, sender};

const QUEUE_CAPACITY: usize = 1000;
const RETRY_SCAN_INTERVAL_SECS: u64 = 30;
const RETRY_SCAN_BATCH_SIZE: i64 = 100;

pub struct Job {
    pub webhook: Webhook,
    pub email: Email,
    pub attempt: i64,
}

/// Handle to a running dispatcher. Cloning shares the same queue and
/// backing store; every clone can enqueue jobs.
#[derive(Clone)]
pub struct Dispatcher {
    store: store::Store,
    sender: mpsc::Sender<Job>,
}

impl Dispatcher {
    /// Starts `worker_count` delivery workers plus the retry scanner, all
    /// bound to `shutdown`. Returns the dispatcher handle and the task
    /// handles so the caller can await a clean drain on shutdown.
    pub fn spawn(store: store::Store, worker_count: usize, shutdown: CancellationToken) -> (Dispatcher, Vec<JoinHandle<()>>) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let client = reqwest::Client::new();

        let mut tasks = Vec::with_capacity(worker_count + 1);
        for worker_id in 0..worker_count.max(1) {
            let rx = rx.clone();
            let store = store.clone();
            let client = client.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                worker_loop(worker_id, rx, store, client, shutdown).await;
            }));
        }

        let dispatcher = Dispatcher { store: store.clone(), sender: tx.clone() };
        {
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                retry_scan_loop(dispatcher, shutdown).await;
            }));
        }

        (dispatcher, tasks)
    }

    /// Evaluates every active webhook on `mailbox_id` against `email` and
    /// enqueues a first-attempt job for each match (§4.5, §4.7 step 1).
    pub async fn dispatch(&self, mailbox_id: Id, email: &Email) -> trc::Result<()> {
        let webhooks = self.store.list_active_webhooks_for_mailbox(mailbox_id).await?;
        for webhook in webhooks {
            if !rules::evaluate(&webhook.rules, email) {
                continue;
            }
            self.enqueue(Job { webhook, email: email.clone(), attempt: 1 });
        }
        Ok(())
    }

    /// Enqueues `(webhook_id, email_id)` at attempt 1, for the admin
    /// surface's manual-retry action. Reloads the full email so the
    /// payload it builds carries real content, not just an id.
    pub async fn manual_retry(&self, webhook_id: Id, email_id: Id) -> trc::Result<()> {
        let webhook = self
            .store
            .get_webhook_by_id(webhook_id)
            .await?
            .ok_or_else(|| trc::Error::not_found(format!("no such webhook: {webhook_id}")))?;
        let email = self
            .store
            .get_email_with_attachments(email_id)
            .await?
            .ok_or_else(|| trc::Error::not_found(format!("no such email: {email_id}")))?;
        self.enqueue(Job { webhook, email, attempt: 1 });
        Ok(())
    }

    fn enqueue(&self, job: Job) {
        let webhook_id = job.webhook.id;
        if self.sender.try_send(job).is_err() {
            tracing::warn!(%webhook_id, "webhook job queue full, dropping delivery attempt");
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    store: store::Store,
    client: reqwest::Client,
    shutdown: CancellationToken,
) {
    loop {
        let job = {
            let mut guard = rx.lock().await;
            tokio::select! {
                _ = shutdown.cancelled() => None,
                job = guard.recv() => job,
            }
        };
        match job {
            Some(job) => process_job(&store, &client, job).await,
            None => {
                tracing::debug!(worker_id, "webhook worker exiting");
                break;
            }
        }
    }
}

/// The worker loop's per-job body (§4.7 steps 1-7).
async fn process_job(store: &store::Store, client: &reqwest::Client, job: Job) {
    let Job { webhook, email, attempt } = job;

    let built = payload::build(&email, &webhook, Utc::now());
    let body = match serde_json::to_string(&built) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(webhook_id = %webhook.id, error = %e, "failed to serialize webhook payload");
            return;
        }
    };

    let delivery = match store.create_delivery_pending(webhook.id, email.id, attempt, &body).await {
        Ok(delivery) => delivery,
        Err(e) => {
            tracing::error!(webhook_id = %webhook.id, error = %e, "failed to record pending delivery");
            return;
        }
    };

    let outcome = sender::send(client, &webhook, &body).await;

    let final_status = if outcome.is_success() {
        DeliveryStatus::Success
    } else if attempt < webhook.max_retries {
        DeliveryStatus::Retrying
    } else {
        DeliveryStatus::Failed
    };

    if let Err(e) = store
        .finalize_delivery(
            delivery.id,
            final_status,
            outcome.status_code,
            &outcome.response_body,
            outcome.error_message.as_deref(),
            outcome.duration_ms,
        )
        .await
    {
        tracing::error!(delivery_id = %delivery.id, error = %e, "failed to finalize delivery");
    }
}

async fn retry_scan_loop(dispatcher: Dispatcher, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(RETRY_SCAN_INTERVAL_SECS));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = process_pending_retries(&dispatcher).await {
                    tracing::error!(error = %e, "retry scan failed");
                }
            }
        }
    }
}

/// Advances every `retrying` delivery: exhausted retries and missing
/// emails are marked terminally failed; everything else is re-enqueued at
/// `attempt + 1` after its current row is marked failed with the
/// "(retry scheduled)" suffix, to avoid two workers ever owning the same
/// delivery row concurrently (§4.7, §9 open question 3).
async fn process_pending_retries(dispatcher: &Dispatcher) -> trc::Result<()> {
    let retrying = dispatcher.store.list_retrying_deliveries(RETRY_SCAN_BATCH_SIZE).await?;
    for delivery in retrying {
        let webhook = match dispatcher.store.get_webhook_by_id(delivery.webhook_id).await? {
            Some(webhook) => webhook,
            None => {
                dispatcher.store.mark_delivery_failed(delivery.id, "webhook no longer exists").await?;
                continue;
            }
        };

        if delivery.attempt >= webhook.max_retries {
            dispatcher.store.mark_delivery_failed(delivery.id, "Max retries exceeded").await?;
            continue;
        }

        let email = match dispatcher.store.get_email_with_attachments(delivery.email_id).await? {
            Some(email) => email,
            None => {
                dispatcher.store.mark_delivery_failed(delivery.id, "Email not found").await?;
                continue;
            }
        };

        dispatcher
            .store
            .mark_delivery_retry_scheduled(delivery.id, delivery.error_message.as_deref())
            .await?;
        dispatcher.enqueue(Job { webhook, email, attempt: delivery.attempt + 1 });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use types::{NewEmail, PayloadType};

    async fn memory_store() -> store::Store {
        let store = store::Store::open(common::DbDriver::Sqlite, ":memory:").await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn dispatch_enqueues_matching_webhooks_and_processes_them() {
        let store = memory_store().await;
        let domain = store.create_domain("example.com").await.unwrap();
        let mailbox = store
            .create_mailbox("support", domain.id, None, "", 25, 10, 90)
            .await
            .unwrap();
        let webhook = store
            .create_webhook(
                mailbox.id,
                "primary",
                "https://127.0.0.1:9/unreachable",
                "POST",
                &Default::default(),
                PayloadType::Default,
                None,
                None,
                1,
                3,
                true,
                false,
            )
            .await
            .unwrap();
        store
            .create_webhook_rule(webhook.id, 1, "subject", "contains", "ticket", None)
            .await
            .unwrap();

        let email = store
            .create_email(NewEmail {
                mailbox_id: mailbox.id,
                message_id: None,
                from_address: "a@ext.test".into(),
                to_address: "support@example.com".into(),
                subject: Some("New ticket".into()),
                date: None,
                headers: Default::default(),
                text_body: Some("hi".into()),
                html_body: None,
                raw_size: 2,
            })
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let (dispatcher, tasks) = Dispatcher::spawn(store.clone(), 1, shutdown.clone());
        dispatcher.dispatch(mailbox.id, &email).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        shutdown.cancel();
        for task in tasks {
            let _ = task.await;
        }

        let deliveries = store.list_retrying_deliveries(10).await.unwrap();
        // connection refused is terminal failure on a fresh first attempt
        // with max_retries 3, or left retrying -- either way a row exists.
        assert!(deliveries.len() <= 1);
    }

    #[tokio::test]
    async fn dispatch_skips_webhooks_whose_rules_do_not_match() {
        let store = memory_store().await;
        let domain = store.create_domain("example.com").await.unwrap();
        let mailbox = store
            .create_mailbox("support", domain.id, None, "", 25, 10, 90)
            .await
            .unwrap();
        let webhook = store
            .create_webhook(
                mailbox.id,
                "primary",
                "https://example.test/hook",
                "POST",
                &Default::default(),
                PayloadType::Default,
                None,
                None,
                5,
                3,
                false,
                false,
            )
            .await
            .unwrap();
        store
            .create_webhook_rule(webhook.id, 1, "subject", "contains", "invoice", None)
            .await
            .unwrap();

        let email = store
            .create_email(NewEmail {
                mailbox_id: mailbox.id,
                message_id: None,
                from_address: "a@ext.test".into(),
                to_address: "support@example.com".into(),
                subject: Some("Not a match".into()),
                date: None,
                headers: Default::default(),
                text_body: None,
                html_body: None,
                raw_size: 2,
            })
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        let (dispatcher, tasks) = Dispatcher::spawn(store.clone(), 1, shutdown.clone());
        dispatcher.dispatch(mailbox.id, &email).await.unwrap();
        shutdown.cancel();
        for task in tasks {
            let _ = task.await;
        }

        assert!(store.list_retrying_deliveries(10).await.unwrap().is_empty());
    }
}
