//! HTTP delivery (C7, send half; §4.6-4.7). Grounded on
//! `internal/webhook/sender.go`: a per-request timeout, a small set of
//! static headers overlaid with the webhook's own, and a response body
//! read capped at 10 KiB so a misbehaving endpoint can't stall or balloon
//! a worker.

use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use types::Webhook;

use crate::signing;

const RESPONSE_BODY_CAP_BYTES: usize = 10 * 1024;
const USER_AGENT: &str = concat!("Mailgress/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub status_code: Option<i32>,
    pub response_body: String,
    pub error_message: Option<String>,
    pub duration_ms: i64,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.status_code, Some(code) if (200..300).contains(&code))
    }
}

/// Sends `body` to `webhook`'s endpoint, signing it first if the webhook
/// has an HMAC secret configured.
pub async fn send(client: &reqwest::Client, webhook: &Webhook, body: &str) -> DeliveryOutcome {
    let started = Instant::now();

    let method = match reqwest::Method::from_bytes(webhook.method.as_bytes()) {
        Ok(method) => method,
        Err(e) => {
            return DeliveryOutcome {
                status_code: None,
                response_body: String::new(),
                error_message: Some(format!("invalid method {:?}: {e}", webhook.method)),
                duration_ms: started.elapsed().as_millis() as i64,
            }
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(reqwest::header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert("X-Mailgress-Event", HeaderValue::from_static("email.received"));

    for (name, value) in &webhook.headers {
        if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            headers.insert(name, value);
        }
    }

    if let Some(secret) = webhook.hmac_secret.as_deref().filter(|s| !s.is_empty()) {
        let signature = signing::sign(body, secret, Utc::now().timestamp());
        if let Ok(value) = HeaderValue::from_str(&signature) {
            headers.insert(HeaderName::from_static("x-mailgress-signature"), value);
        }
    }

    let request = client
        .request(method, &webhook.url)
        .timeout(Duration::from_secs(webhook.timeout_sec.max(1) as u64))
        .headers(headers)
        .body(body.to_string());

    match request.send().await {
        Ok(response) => {
            let status_code = response.status().as_u16() as i32;
            let response_body = read_capped(response, RESPONSE_BODY_CAP_BYTES).await;
            let error_message = if (200..300).contains(&status_code) {
                None
            } else {
                Some("Non-2xx response".to_string())
            };
            DeliveryOutcome {
                status_code: Some(status_code),
                response_body,
                error_message,
                duration_ms: started.elapsed().as_millis() as i64,
            }
        }
        Err(e) => DeliveryOutcome {
            status_code: None,
            response_body: String::new(),
            error_message: Some(e.to_string()),
            duration_ms: started.elapsed().as_millis() as i64,
        },
    }
}

/// Reads at most `cap` bytes of `response`'s body, stopping early rather
/// than buffering an arbitrarily large response.
async fn read_capped(response: reqwest::Response, cap: usize) -> String {
    let mut buf: Vec<u8> = Vec::with_capacity(cap.min(4096));
    let mut stream = response.bytes_stream();
    while buf.len() < cap {
        let Some(chunk) = stream.next().await else { break };
        let Ok(chunk) = chunk else { break };
        let remaining = cap - buf.len();
        let take = remaining.min(chunk.len());
        buf.extend_from_slice(&chunk[..take]);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
