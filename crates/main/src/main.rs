//! Binary entry point (§0, §6): loads configuration, opens the store and
//! runs its migrations, opens the blob store, starts the webhook
//! dispatcher's worker pool and retry scanner, starts the SMTP accept
//! loop, and starts the two maintenance loops (C8). Everything shares one
//! root `CancellationToken`, flipped on SIGINT/SIGTERM, and the process
//! waits for every task to drain before exiting — mirroring the teacher's
//! `Arc<Inner>` + single shutdown signal pattern generalized to this
//! crate's smaller task set.

use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    trc::init_logging();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> trc::Result<()> {
    let config = common::Config::from_env()?;
    tracing::info!(
        smtp_listen_addr = %config.smtp_listen_addr,
        db_driver = ?config.db_driver,
        "starting mailgress"
    );

    let store = store::Store::open(config.db_driver, &config.db_dsn).await?;
    store.migrate().await?;
    tracing::info!("schema migrations applied");

    let blobs = blobstore::BlobStore::open(&config.storage_path).await?;

    let core = common::build_core(config);
    let shutdown = core.shutdown.clone();

    let mut tasks = Vec::new();

    let (dispatcher, dispatch_tasks) = webhook::Dispatcher::spawn(store.clone(), core.config.webhook_workers, shutdown.clone());
    tasks.extend(dispatch_tasks);

    let session_services = Arc::new(smtp::SessionServices {
        store: store.clone(),
        blobs: blobs.clone(),
        dispatcher,
    });
    let smtp_addr = core.config.smtp_listen_addr.clone();
    let smtp_shutdown = shutdown.clone();
    let smtp_task = tokio::spawn(async move {
        if let Err(e) = smtp::run(&smtp_addr, session_services, smtp_shutdown).await {
            tracing::error!(error = %e, "SMTP server exited with an error");
        }
    });
    tasks.push(smtp_task);

    tasks.push(tokio::spawn(services::maintenance::retention_loop(
        store.clone(),
        blobs.clone(),
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(services::maintenance::session_expiry_loop(store.clone(), shutdown.clone())));

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining in-flight work");
    shutdown.cancel();

    for task in tasks {
        let _ = task.await;
    }
    tracing::info!("shutdown complete");
    Ok(())
}

/// Waits for SIGINT (or SIGTERM on unix platforms); either is treated as
/// the single root cancellation trigger (§5).
async fn wait_for_shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[allow(dead_code)]
/// Exposed for the out-of-scope admin surface's on-demand DNS verification
/// endpoint (§4.9); this binary itself never calls it.
fn build_dns_verifier() -> trc::Result<services::DnsVerifier> {
    services::DnsVerifier::from_system_conf()
}
