//! Periodic Maintenance (C8; §4.8): a retention sweep over mailboxes with
//! `retention_days > 0`, and an hourly session-expiry sweep. Grounded on
//! `internal/service/mailbox_service.go`'s `PurgeExpiredEmails` and
//! `internal/service/auth_service.go`'s session cleanup from the original
//! implementation; both loops here are plain `tokio::time::interval` tasks
//! cancelled by the same root token every other long-running task in this
//! workspace observes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const SESSION_EXPIRY_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Deletes every email older than its mailbox's retention window, across
/// every mailbox that has retention enabled. Attachment blobs are removed
/// before the email row (whose removal cascades the attachment rows at the
/// schema level) so a mid-sweep failure never leaves an orphaned blob
/// outliving its row — it can instead leave a row whose blob is already
/// gone, which `blobstore::BlobStore::delete`'s idempotence tolerates on
/// the next pass. One mailbox's failure is logged and does not abort the
/// sweep for the others (§7 propagation policy).
pub async fn sweep_retention_once(store: &store::Store, blobs: &blobstore::BlobStore, now: DateTime<Utc>) -> usize {
    let mailboxes = match store.list_mailboxes_with_retention().await {
        Ok(mailboxes) => mailboxes,
        Err(e) => {
            tracing::error!(error = %e, "retention sweep: failed to list mailboxes");
            return 0;
        }
    };

    let mut deleted = 0usize;
    for mailbox in mailboxes {
        if !mailbox.retention_enabled() {
            continue;
        }
        let cutoff = now - chrono::Duration::days(mailbox.retention_days);
        match sweep_mailbox(store, blobs, mailbox.id, cutoff).await {
            Ok(count) => deleted += count,
            Err(e) => tracing::error!(mailbox_id = %mailbox.id, error = %e, "retention sweep failed for mailbox"),
        }
    }
    deleted
}

async fn sweep_mailbox(
    store: &store::Store,
    blobs: &blobstore::BlobStore,
    mailbox_id: types::Id,
    cutoff: DateTime<Utc>,
) -> trc::Result<usize> {
    let expired = store.list_emails_received_before(mailbox_id, cutoff).await?;
    let count = expired.len();
    for email in expired {
        let attachments = store.list_attachments_for_email(email.id).await?;
        for attachment in attachments {
            blobs.delete(&attachment.storage_path).await?;
        }
        store.delete_email(email.id).await?;
    }
    Ok(count)
}

/// Deletes every session (ordinary or pending-2FA) past its `expires_at`.
pub async fn sweep_sessions_once(store: &store::Store, now: DateTime<Utc>) -> u64 {
    match store.delete_expired_sessions(now).await {
        Ok(count) => count,
        Err(e) => {
            tracing::error!(error = %e, "session expiry sweep failed");
            0
        }
    }
}

/// Runs the retention sweep once at startup, then every 24h until
/// `shutdown` fires.
pub async fn retention_loop(store: store::Store, blobs: blobstore::BlobStore, shutdown: CancellationToken) {
    run_on_interval(RETENTION_SWEEP_INTERVAL, shutdown, || async {
        let deleted = sweep_retention_once(&store, &blobs, Utc::now()).await;
        tracing::info!(deleted, "retention sweep complete");
    })
    .await;
}

/// Runs the session expiry sweep every hour until `shutdown` fires.
pub async fn session_expiry_loop(store: store::Store, shutdown: CancellationToken) {
    run_on_interval(SESSION_EXPIRY_INTERVAL, shutdown, || async {
        let deleted = sweep_sessions_once(&store, Utc::now()).await;
        tracing::info!(deleted, "session expiry sweep complete");
    })
    .await;
}

/// Fires `body` immediately, then every `interval`, until `shutdown` fires.
/// Shared by both loops so startup behavior (run once immediately, §4.8)
/// stays identical between them.
async fn run_on_interval<F, Fut>(interval: Duration, shutdown: CancellationToken, mut body: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => body().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::NewEmail;

    async fn memory_store() -> store::Store {
        let store = store::Store::open(common::DbDriver::Sqlite, ":memory:").await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn retention_disabled_for_non_positive_days() {
        let store = memory_store().await;
        let blobs = blobstore::BlobStore::open(tempfile::tempdir().unwrap().path()).await.unwrap();
        let domain = store.create_domain("example.com").await.unwrap();
        let mailbox = store
            .create_mailbox("archive", domain.id, None, "", 25, 10, 0)
            .await
            .unwrap();
        store
            .create_email(NewEmail {
                mailbox_id: mailbox.id,
                message_id: None,
                from_address: "a@ext.test".into(),
                to_address: "archive@example.com".into(),
                subject: None,
                date: None,
                headers: Default::default(),
                text_body: None,
                html_body: None,
                raw_size: 10,
            })
            .await
            .unwrap();

        let deleted = sweep_retention_once(&store, &blobs, Utc::now() + chrono::Duration::days(365)).await;
        assert_eq!(deleted, 0);
    }

    /// Every test email is created "now", so instead of backdating rows the
    /// sweep's `now` argument is advanced far enough that one mailbox's
    /// (short) retention window has elapsed while the other's (long) one
    /// has not — `received_at < now - retention_days` is the only thing
    /// that matters, and both sides of that comparison are under the
    /// test's control.
    #[tokio::test]
    async fn retention_sweep_deletes_only_expired_emails() {
        let store = memory_store().await;
        let blobs = blobstore::BlobStore::open(tempfile::tempdir().unwrap().path()).await.unwrap();
        let domain = store.create_domain("example.com").await.unwrap();
        let short_lived = store.create_mailbox("logs", domain.id, None, "", 25, 10, 5).await.unwrap();
        let long_lived = store.create_mailbox("archive", domain.id, None, "", 25, 10, 15).await.unwrap();

        for mailbox_id in [short_lived.id, long_lived.id] {
            store
                .create_email(NewEmail {
                    mailbox_id,
                    message_id: None,
                    from_address: "a@ext.test".into(),
                    to_address: "x@example.com".into(),
                    subject: None,
                    date: None,
                    headers: Default::default(),
                    text_body: None,
                    html_body: None,
                    raw_size: 10,
                })
                .await
                .unwrap();
        }

        let sweep_now = Utc::now() + chrono::Duration::days(10);
        let deleted = sweep_retention_once(&store, &blobs, sweep_now).await;
        assert_eq!(deleted, 1);

        let far_future = sweep_now + chrono::Duration::days(365);
        assert!(store.list_emails_received_before(short_lived.id, far_future).await.unwrap().is_empty());
        assert_eq!(store.list_emails_received_before(long_lived.id, far_future).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn session_expiry_deletes_only_expired_sessions() {
        let store = memory_store().await;
        let user = store.create_user("owner@example.com").await.unwrap();
        store.create_session("expired-token", user.id, Utc::now() - chrono::Duration::minutes(1)).await.unwrap();
        store.create_session("live-token", user.id, Utc::now() + chrono::Duration::days(1)).await.unwrap();

        let deleted = sweep_sessions_once(&store, Utc::now()).await;
        assert_eq!(deleted, 1);
        assert!(store.get_session_by_token("expired-token").await.unwrap().is_none());
        assert!(store.get_session_by_token("live-token").await.unwrap().is_some());
    }
}
