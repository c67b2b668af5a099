//! SMTP accept loop (§4.4, §5). Grounded on `internal/smtp/server.go` /
//! `backend.go`: one task per accepted connection, a shared rate limiter
//! gating new connections before a session is even constructed, and a
//! `CancellationToken` that stops the accept loop and lets in-flight
//! sessions finish on their own rather than being killed mid-DATA. The
//! per-I/O read/write deadline (§4.4, §6) is applied inside `session::run`
//! to each socket operation, not around the whole connection here, so an
//! actively-transmitting session is never killed on wall-clock alone.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::rate_limiter::RateLimiter;
use crate::session::{self, SessionServices};

const RATE_LIMIT_MAX_CONNECTIONS: usize = 100;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// `SMTP_LISTEN_ADDR` follows the source system's `:port` shorthand for
/// "all interfaces"; normalize it to something `TcpListener::bind` accepts.
fn normalize_listen_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

/// Binds `listen_addr` and accepts connections until `shutdown` fires.
/// Each connection is handled on its own task; `services` is shared
/// read-only state (store, blob store, dispatcher handle).
pub async fn run(listen_addr: &str, services: Arc<SessionServices>, shutdown: CancellationToken) -> trc::Result<()> {
    let addr = normalize_listen_addr(listen_addr);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| trc::Error::fatal(format!("failed to bind SMTP listener on {addr}: {e}")))?;
    tracing::info!(%addr, "SMTP listener bound");

    let limiter = Arc::new(RateLimiter::new(RATE_LIMIT_MAX_CONNECTIONS, RATE_LIMIT_WINDOW));
    {
        let limiter = limiter.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(RateLimiter::cleanup_interval());
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => limiter.cleanup(),
                }
            }
        });
    }

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("SMTP listener shutting down, no longer accepting connections");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept SMTP connection");
                        continue;
                    }
                };
                let peer_ip = peer_addr.ip().to_string();

                if !limiter.allow(&peer_ip) {
                    tracing::warn!(peer_ip, "rejecting connection: rate limit exceeded");
                    tokio::spawn(reject_with_421(stream));
                    continue;
                }

                let services = services.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer_ip, services).await;
                });
            }
        }
    }

    Ok(())
}

async fn handle_connection(stream: tokio::net::TcpStream, peer_ip: String, services: Arc<SessionServices>) {
    if let Err(e) = session::run(stream, peer_ip.clone(), services).await {
        tracing::warn!(peer_ip, error = %e, "SMTP session ended with an I/O error");
    }
}

/// A connection rejected purely for being over the rate limit still gets a
/// proper SMTP greeting-rejection rather than a silent close (§6: `421
/// 4.7.0`).
async fn reject_with_421(mut stream: tokio::net::TcpStream) {
    use tokio::io::AsyncWriteExt;
    let _ = stream.write_all(b"421 4.7.0 too many connections, try again later\r\n").await;
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_port_to_all_interfaces() {
        assert_eq!(normalize_listen_addr(":2525"), "0.0.0.0:2525");
        assert_eq!(normalize_listen_addr("127.0.0.1:2525"), "127.0.0.1:2525");
    }
}
