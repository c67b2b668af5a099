//! Per-connection SMTP session state machine (§4.4). Grounded on
//! `internal/smtp/session.go`: `MAIL FROM` resets the envelope, `RCPT TO`
//! resolves and accumulates recipients, `DATA` reads the message body,
//! parses it, persists one `Email` row (plus attachments) per recipient,
//! and dispatches webhooks for each. `RSET` clears the envelope without
//! dropping the connection; `QUIT` ends it.

use std::sync::Arc;
use std::time::Duration;

use directory::Resolved;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use types::{Mailbox, NewAttachment, NewEmail};

use crate::mime;

/// Largest message this engine will ever accept, applied when a mailbox
/// carries no smaller limit (§4.4 step 1, §9 open question 1). Also the
/// process-wide hard ceiling on the effective DATA cap: no mailbox, however
/// generously configured, can push the accepted size above this (§4.4).
const DEFAULT_MAX_EMAIL_BYTES: u64 = 100 * 1024 * 1024;
const MAX_RECIPIENTS: usize = 50;
const MAX_COMMAND_LINE_BYTES: usize = 8 * 1024;

/// Per-I/O deadline (§4.4, §6): reset on every individual read or write
/// rather than covering the whole connection, so a session that is
/// actively transmitting is never killed on wall-clock alone.
const READ_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SessionServices {
    pub store: store::Store,
    pub blobs: blobstore::BlobStore,
    pub dispatcher: webhook::Dispatcher,
}

struct Recipient {
    address: String,
    resolved: Resolved,
}

struct Envelope {
    from: Option<String>,
    recipients: Vec<Recipient>,
}

impl Envelope {
    fn new() -> Self {
        Envelope { from: None, recipients: Vec::new() }
    }
}

/// Drives one client connection to completion. `peer_ip` is used only for
/// logging; the rate-limiter decision happens before this is called.
pub async fn run<S>(stream: S, peer_ip: String, services: Arc<SessionServices>) -> std::io::Result<()>
where
    S: tokio::io::AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    timed_write_all(&mut write_half, b"220 mailgress ESMTP ready\r\n").await?;

    let mut envelope = Envelope::new();
    let mut line = Vec::new();

    loop {
        line.clear();
        let n = timed_read_until(&mut reader, &mut line).await?;
        if n == 0 {
            break; // peer closed the connection
        }
        if line.len() > MAX_COMMAND_LINE_BYTES {
            timed_write_all(&mut write_half, b"500 5.5.2 line too long\r\n").await?;
            continue;
        }
        // Command lines are protocol framing, not message content; a
        // non-ASCII byte here is still parsed rather than aborting the
        // whole connection the way an I/O error would.
        let decoded = String::from_utf8_lossy(&line);
        let command = decoded.trim_end_matches(['\r', '\n']);

        let (verb, rest) = split_command(command);
        match verb.to_ascii_uppercase().as_str() {
            "EHLO" | "HELO" => {
                timed_write_all(&mut write_half, b"250 mailgress\r\n").await?;
            }
            "MAIL" => {
                envelope = Envelope::new();
                envelope.from = Some(rest.to_string());
                timed_write_all(&mut write_half, b"250 2.1.0 OK\r\n").await?;
            }
            "RCPT" => {
                if envelope.recipients.len() >= MAX_RECIPIENTS {
                    timed_write_all(&mut write_half, b"452 4.5.3 too many recipients\r\n").await?;
                    continue;
                }
                let address = extract_rcpt_address(rest);
                match directory::resolve_recipient(&services.store, &address).await {
                    Ok(resolved) => {
                        envelope.recipients.push(Recipient { address, resolved });
                        timed_write_all(&mut write_half, b"250 2.1.5 OK\r\n").await?;
                    }
                    Err(e) if e.kind() == trc::Kind::Inactive => {
                        timed_write_all(&mut write_half, b"550 5.2.1 mailbox unavailable\r\n").await?;
                    }
                    Err(_) => {
                        timed_write_all(&mut write_half, b"550 5.1.1 unknown recipient\r\n").await?;
                    }
                }
            }
            "DATA" => {
                if envelope.from.is_none() || envelope.recipients.is_empty() {
                    timed_write_all(&mut write_half, b"503 5.5.1 MAIL and RCPT required before DATA\r\n").await?;
                    continue;
                }
                timed_write_all(&mut write_half, b"354 start mail input; end with <CRLF>.<CRLF>\r\n").await?;
                let max_size = envelope
                    .recipients
                    .iter()
                    .map(|r| r.resolved.mailbox.max_email_size_bytes().max(0) as u64)
                    .min()
                    .unwrap_or(DEFAULT_MAX_EMAIL_BYTES)
                    .min(DEFAULT_MAX_EMAIL_BYTES);
                let raw = read_dot_terminated(&mut reader, max_size).await?;
                let response = handle_data(&services, &envelope, &raw).await;
                timed_write_all(&mut write_half, response.as_bytes()).await?;
                envelope = Envelope::new();
            }
            "RSET" => {
                envelope = Envelope::new();
                timed_write_all(&mut write_half, b"250 2.0.0 OK\r\n").await?;
            }
            "NOOP" => {
                timed_write_all(&mut write_half, b"250 2.0.0 OK\r\n").await?;
            }
            "QUIT" => {
                timed_write_all(&mut write_half, b"221 2.0.0 bye\r\n").await?;
                break;
            }
            _ => {
                timed_write_all(&mut write_half, b"500 5.5.2 unrecognized command\r\n").await?;
            }
        }
    }

    tracing::debug!(peer_ip, "session ended");
    Ok(())
}

/// Applies the per-I/O deadline to a single `read_until` call.
async fn timed_read_until<R: AsyncBufReadExt + Unpin>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize> {
    tokio::time::timeout(READ_WRITE_TIMEOUT, reader.read_until(b'\n', buf))
        .await
        .unwrap_or_else(|_| Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out")))
}

/// Applies the per-I/O deadline to a single `write_all` call.
async fn timed_write_all<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> std::io::Result<()> {
    tokio::time::timeout(READ_WRITE_TIMEOUT, writer.write_all(data))
        .await
        .unwrap_or_else(|_| Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "write timed out")))
}

/// Parses, persists, and dispatches the message for every accepted
/// recipient (§4.4 step 2-5). Mixed per-recipient outcomes still report a
/// single `250` once the message itself parsed; a parse failure is the
/// only case this function reports as a hard `550 5.6.0`.
async fn handle_data(services: &SessionServices, envelope: &Envelope, raw: &[u8]) -> &'static str {
    let parsed = match mime::parse(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "rejected malformed message");
            return "550 5.6.0 malformed message\r\n";
        }
    };

    let from_address = envelope.from.clone().unwrap_or_default();
    for recipient in &envelope.recipients {
        if let Err(e) = persist_and_dispatch(services, &parsed, raw, &from_address, recipient).await {
            tracing::error!(
                error = %e,
                to = %recipient.address,
                "failed to persist or dispatch message for recipient"
            );
        }
    }
    "250 2.0.0 OK: message accepted\r\n"
}

async fn persist_and_dispatch(
    services: &SessionServices,
    parsed: &mime::ParsedMessage,
    raw: &[u8],
    from_address: &str,
    recipient: &Recipient,
) -> trc::Result<()> {
    let mailbox: &Mailbox = &recipient.resolved.mailbox;

    let new_email = NewEmail {
        mailbox_id: mailbox.id,
        message_id: parsed.message_id.clone(),
        from_address: from_address.to_string(),
        to_address: recipient.address.clone(),
        subject: parsed.subject.clone(),
        date: parsed.date,
        headers: parsed.headers.clone(),
        text_body: parsed.text_body.clone(),
        html_body: parsed.html_body.clone(),
        raw_size: raw.len() as i64,
    };
    let email = services.store.create_email(new_email).await?;

    let max_attachment_bytes = mailbox.max_attachment_size_bytes().max(0) as u64;
    for attachment in &parsed.attachments {
        let capped_len = attachment.contents.len().min(max_attachment_bytes as usize);
        let (storage_path, size) = services
            .blobs
            .store(
                email.id.get(),
                &attachment.filename,
                std::io::Cursor::new(&attachment.contents[..capped_len]),
                max_attachment_bytes,
            )
            .await?;
        services
            .store
            .create_attachment(NewAttachment {
                email_id: email.id,
                filename: attachment.filename.clone(),
                content_type: attachment.content_type.clone(),
                size: size as i64,
                storage_path,
            })
            .await?;
    }

    let full_email = services
        .store
        .get_email_with_attachments(email.id)
        .await?
        .unwrap_or(email);
    services.dispatcher.dispatch(mailbox.id, &full_email).await?;
    Ok(())
}

fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(' ') {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    }
}

/// `MAIL FROM:<addr> ...` / `RCPT TO:<addr> ...` carry parameters after
/// the address; only the bracketed address matters for routing.
fn extract_rcpt_address(rest: &str) -> String {
    let after_colon = rest.split_once(':').map(|(_, addr)| addr).unwrap_or(rest);
    let address_part = after_colon.split_whitespace().next().unwrap_or("");
    address_part.trim_start_matches('<').trim_end_matches('>').to_string()
}

/// Reads the DATA block up to the terminating `<CRLF>.<CRLF>`, capped at
/// `limit` bytes (§9 open question 1: excess bytes are silently dropped,
/// not rejected). Operates on raw bytes throughout: message content is not
/// valid UTF-8 in general (latin-1/windows-1252 bodies, 8bit/binary parts),
/// and `mail-parser` is handed these bytes unmodified to decode per-part.
async fn read_dot_terminated<R: AsyncBufReadExt + Unpin>(reader: &mut R, limit: u64) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        let n = timed_read_until(reader, &mut line).await?;
        if n == 0 {
            break;
        }
        if line == b".\r\n" || line == b".\n" {
            break;
        }
        let unstuffed: &[u8] = if let Some(rest) = line.strip_prefix(b".") { rest } else { &line };
        if (buf.len() as u64) < limit {
            let remaining = limit - buf.len() as u64;
            let take = (unstuffed.len() as u64).min(remaining) as usize;
            buf.extend_from_slice(&unstuffed[..take]);
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_address_from_rcpt_params() {
        assert_eq!(extract_rcpt_address("TO:<support@example.com>"), "support@example.com");
        assert_eq!(extract_rcpt_address("TO:<a@b.com> SIZE=1000"), "a@b.com");
    }

    #[test]
    fn splits_verb_and_rest() {
        assert_eq!(split_command("MAIL FROM:<a@b.com>"), ("MAIL", "FROM:<a@b.com>"));
        assert_eq!(split_command("QUIT"), ("QUIT", ""));
    }

    #[tokio::test]
    async fn reads_up_to_the_dot_terminator() {
        let input = b"Subject: hi\r\n\r\nbody\r\n.\r\n".to_vec();
        let mut reader = BufReader::new(&input[..]);
        let body = read_dot_terminated(&mut reader, 1024).await.unwrap();
        assert_eq!(body, b"Subject: hi\r\n\r\nbody\r\n");
    }

    #[tokio::test]
    async fn truncates_at_the_size_limit() {
        let input = b"aaaaaaaaaa\r\n.\r\n".to_vec();
        let mut reader = BufReader::new(&input[..]);
        let body = read_dot_terminated(&mut reader, 5).await.unwrap();
        assert_eq!(body.len(), 5);
    }

    #[tokio::test]
    async fn preserves_non_utf8_body_bytes() {
        // A latin-1 body (e.g. an 8bit-encoded part) contains bytes that
        // are not valid UTF-8; the reader must pass them through untouched
        // rather than erroring the way `read_line` into a `String` would.
        let mut input = b"Subject: caf\xe9\r\n\r\nbody: \xe9\r\n".to_vec();
        input.extend_from_slice(b".\r\n");
        let mut reader = BufReader::new(&input[..]);
        let body = read_dot_terminated(&mut reader, 1024).await.unwrap();
        assert_eq!(body, b"Subject: caf\xe9\r\n\r\nbody: \xe9\r\n");
    }

    #[tokio::test]
    async fn data_cap_never_exceeds_the_process_wide_hard_cap() {
        let oversized_mailbox_cap = DEFAULT_MAX_EMAIL_BYTES * 2;
        let effective = Some(oversized_mailbox_cap)
            .into_iter()
            .min()
            .unwrap_or(DEFAULT_MAX_EMAIL_BYTES)
            .min(DEFAULT_MAX_EMAIL_BYTES);
        assert_eq!(effective, DEFAULT_MAX_EMAIL_BYTES);
    }
}
