use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Shared state handed to every long-running task: the SMTP session
/// engine, the dispatcher, and the two maintenance loops. Mirrors the
/// teacher's `Arc<Inner>` — one reference-counted core, cloned cheaply
/// into each task, carrying the single root cancellation signal that
/// `main` flips on SIGINT/SIGTERM.
pub struct Inner {
    pub config: Config,
    pub shutdown: CancellationToken,
}

pub type Core = Arc<Inner>;

pub fn build_core(config: Config) -> Core {
    Arc::new(Inner {
        config,
        shutdown: CancellationToken::new(),
    })
}

impl Inner {
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
