//! Payload Builder (C6, payload half): constructs the canonical JSON body
//! sent to a webhook endpoint (§4.6). Grounded on
//! `internal/webhook/payload.go`; the placeholder substitution pass is
//! grounded on the supplement described in SPEC_FULL.md §14 — only string
//! leaves of the parsed metadata object are substituted, nested
//! objects/arrays are walked but otherwise left alone.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use types::{Email, PayloadType, Webhook};

#[derive(Debug, Clone, Serialize)]
pub struct AttachmentPayload {
    pub id: i64,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailPayload {
    pub id: i64,
    pub mailbox_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
    pub size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentPayload>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    pub email: EmailPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Builds the payload for a real delivery; `now` is injected so tests and
/// the retry scanner (which stamps each attempt independently) don't rely
/// on wall-clock reads happening inside this function.
pub fn build(email: &Email, webhook: &Webhook, now: DateTime<Utc>) -> Payload {
    let mut email_payload = EmailPayload {
        id: email.id.get(),
        mailbox_id: email.mailbox_id.get(),
        message_id: email.message_id.clone(),
        from: email.from_address.clone(),
        to: email.to_address.clone(),
        subject: email.subject.clone(),
        date: email.date,
        received_at: email.received_at,
        size: email.raw_size,
        text_body: None,
        html_body: None,
        headers: None,
        attachments: None,
    };

    if webhook.include_body {
        email_payload.text_body = email.text_body.clone();
        email_payload.html_body = email.html_body.clone();
        email_payload.headers = Some(email.headers.clone());
    }

    if webhook.include_attachments && !email.attachments.is_empty() {
        email_payload.attachments = Some(
            email
                .attachments
                .iter()
                .map(|a| AttachmentPayload {
                    id: a.id.get(),
                    filename: a.filename.clone(),
                    content_type: a.content_type.clone(),
                    size: a.size,
                })
                .collect(),
        );
    }

    let metadata = build_metadata(webhook, email);

    Payload {
        event: "email.received".to_string(),
        timestamp: now,
        email: email_payload,
        metadata,
    }
}

/// A synthetic payload used by the admin surface's "send test webhook"
/// action; not tied to any stored email.
pub fn build_test(now: DateTime<Utc>) -> Payload {
    Payload {
        event: "test".to_string(),
        timestamp: now,
        email: EmailPayload {
            id: 0,
            mailbox_id: 0,
            message_id: Some("<test@mailgress.local>".to_string()),
            from: "test@example.com".to_string(),
            to: "mailbox@mailgress.local".to_string(),
            subject: Some("Test webhook delivery".to_string()),
            date: Some(now),
            received_at: now,
            size: 1024,
            text_body: Some("This is a test webhook delivery from Mailgress.".to_string()),
            html_body: Some("<p>This is a test webhook delivery from Mailgress.</p>".to_string()),
            headers: None,
            attachments: None,
        },
        metadata: None,
    }
}

/// Interprets `webhook.custom_payload` per `webhook.payload_type` (§4.6).
/// A malformed custom payload is treated the same as an absent one: the
/// delivery still goes out, just without metadata.
fn build_metadata(webhook: &Webhook, email: &Email) -> Option<Value> {
    let raw = webhook.custom_payload.as_deref()?;
    let mut metadata = match webhook.payload_type {
        PayloadType::Json => serde_json::from_str::<Value>(raw).ok().filter(Value::is_object)?,
        PayloadType::KeyValue => key_value_pairs_to_object(raw)?,
        PayloadType::Default => return None,
    };
    substitute_placeholders(&mut metadata, email);
    Some(metadata)
}

#[derive(serde::Deserialize)]
struct KeyValuePair {
    key: String,
    value: String,
}

fn key_value_pairs_to_object(raw: &str) -> Option<Value> {
    let pairs: Vec<KeyValuePair> = serde_json::from_str(raw).ok()?;
    let mut map = serde_json::Map::new();
    for pair in pairs {
        map.insert(pair.key, Value::String(pair.value));
    }
    Some(Value::Object(map))
}

/// Substitutes `{{email.<attr>}}` tokens in every string leaf of `value`,
/// recursing through objects and arrays without otherwise touching their
/// shape.
fn substitute_placeholders(value: &mut Value, email: &Email) {
    match value {
        Value::String(s) => *s = substitute_in_string(s, email),
        Value::Array(items) => {
            for item in items {
                substitute_placeholders(item, email);
            }
        }
        Value::Object(map) => {
            for v in map.values_mut() {
                substitute_placeholders(v, email);
            }
        }
        _ => {}
    }
}

fn substitute_in_string(s: &str, email: &Email) -> String {
    let attrs: [(&str, String); 9] = [
        ("id", email.id.get().to_string()),
        ("mailbox_id", email.mailbox_id.get().to_string()),
        ("message_id", email.message_id.clone().unwrap_or_default()),
        ("from", email.from_address.clone()),
        ("to", email.to_address.clone()),
        ("subject", email.subject.clone().unwrap_or_default()),
        ("address", email.to_address.clone()),
        ("size", email.raw_size.to_string()),
        ("text_body", email.text_body.clone().unwrap_or_default()),
    ];
    let mut out = s.to_string();
    for (attr, value) in attrs {
        out = out.replace(&format!("{{{{email.{attr}}}}}"), &value);
    }
    out = out.replace("{{email.html_body}}", &email.html_body.clone().unwrap_or_default());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::Id;

    fn sample_email() -> Email {
        Email {
            id: Id::new(7),
            mailbox_id: Id::new(3),
            message_id: Some("<abc@ext>".into()),
            from_address: "a@ext.test".into(),
            to_address: "support+42@example.com".into(),
            subject: Some("Hi there".into()),
            date: None,
            headers: Default::default(),
            text_body: Some("body text".into()),
            html_body: None,
            raw_size: 512,
            received_at: Utc::now(),
            is_read: false,
            attachments: Vec::new(),
        }
    }

    fn sample_webhook(include_body: bool, include_attachments: bool) -> Webhook {
        Webhook {
            id: Id::new(1),
            mailbox_id: Id::new(3),
            name: "n".into(),
            url: "https://example.test/hook".into(),
            method: "POST".into(),
            headers: Default::default(),
            payload_type: PayloadType::Default,
            custom_payload: None,
            hmac_secret: None,
            timeout_sec: 10,
            max_retries: 3,
            include_body,
            include_attachments,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            rules: Vec::new(),
        }
    }

    #[test]
    fn omits_body_fields_unless_included() {
        let payload = build(&sample_email(), &sample_webhook(false, false), Utc::now());
        assert!(payload.email.text_body.is_none());
        assert!(payload.email.headers.is_none());
        let json = serde_json::to_string(&payload).unwrap();
        assert!(!json.contains("text_body"));
    }

    #[test]
    fn includes_body_fields_when_requested() {
        let payload = build(&sample_email(), &sample_webhook(true, false), Utc::now());
        assert_eq!(payload.email.text_body.as_deref(), Some("body text"));
    }

    #[test]
    fn key_value_metadata_substitutes_placeholders() {
        let mut webhook = sample_webhook(false, false);
        webhook.payload_type = PayloadType::KeyValue;
        webhook.custom_payload = Some(r#"[{"key":"ticket_for","value":"{{email.to}}"}]"#.to_string());
        let payload = build(&sample_email(), &webhook, Utc::now());
        let metadata = payload.metadata.unwrap();
        assert_eq!(metadata["ticket_for"], "support+42@example.com");
    }

    #[test]
    fn json_metadata_requires_an_object() {
        let mut webhook = sample_webhook(false, false);
        webhook.payload_type = PayloadType::Json;
        webhook.custom_payload = Some(r#"["not", "an", "object"]"#.to_string());
        let payload = build(&sample_email(), &webhook, Utc::now());
        assert!(payload.metadata.is_none());
    }

    #[test]
    fn nested_metadata_values_get_substituted() {
        let mut webhook = sample_webhook(false, false);
        webhook.payload_type = PayloadType::Json;
        webhook.custom_payload =
            Some(r#"{"ticket": {"subject": "{{email.subject}}", "tags": ["{{email.from}}"]}}"#.to_string());
        let payload = build(&sample_email(), &webhook, Utc::now());
        let metadata = payload.metadata.unwrap();
        assert_eq!(metadata["ticket"]["subject"], "Hi there");
        assert_eq!(metadata["ticket"]["tags"][0], "a@ext.test");
    }
}
