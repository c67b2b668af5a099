//! Internet Message parsing (C4 DATA pipeline, steps 2-4; §4.4). Grounded
//! on `internal/smtp/session.go`'s `extractBodies`/`processAttachments`:
//! the first `text/plain` part becomes the text body, the first
//! `text/html` part becomes the html body, and any part carrying a
//! filename is treated as an attachment rather than a body part. Parsing
//! itself is handed to `mail_parser`, which already resolves first-body
//! selection recursively through nested multiparts per RFC 8621 — we read
//! its resolved `text_body`/`html_body` index lists rather than re-walking
//! the MIME tree by hand.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use mail_parser::{HeaderName, HeaderValue, MessageParser, MimeHeaders};

pub struct ParsedAttachment {
    pub filename: String,
    pub content_type: String,
    pub contents: Vec<u8>,
}

pub struct ParsedMessage {
    pub headers: BTreeMap<String, String>,
    pub subject: Option<String>,
    pub message_id: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub attachments: Vec<ParsedAttachment>,
}

/// Parses `raw` as an Internet Message. A malformed message is the
/// `550 5.6.0` case at the SMTP layer (§4.4 step 2).
pub fn parse(raw: &[u8]) -> trc::Result<ParsedMessage> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| trc::Error::parse("could not parse message as a valid Internet Message"))?;

    let mut headers = BTreeMap::new();
    if let Some(root) = message.parts.first() {
        for header in &root.headers {
            let name = header_name_to_string(&header.name);
            // First value per header name wins (§9 open question 4).
            headers.entry(name).or_insert_with(|| header_value_to_string(&header.value));
        }
    }

    // Only trust a body slot mail_parser actually found a part for; its
    // body_text/body_html helpers otherwise synthesize one representation
    // from the other, which would fabricate content the message never had.
    let text_body = (!message.text_body.is_empty())
        .then(|| message.body_text(0))
        .flatten()
        .map(|c| c.into_owned());
    let html_body = (!message.html_body.is_empty())
        .then(|| message.body_html(0))
        .flatten()
        .map(|c| c.into_owned());

    let mut attachments = Vec::new();
    for index in 0..message.attachments.len() {
        let Some(part) = message.attachment(index) else { continue };
        let filename = match part.attachment_name() {
            Some(name) => name.to_string(),
            None => continue,
        };
        let content_type = part
            .content_type()
            .map(|ct| match ct.c_subtype.as_deref() {
                Some(subtype) => format!("{}/{}", ct.c_type, subtype),
                None => ct.c_type.to_string(),
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());
        attachments.push(ParsedAttachment {
            filename,
            content_type,
            contents: part.contents().to_vec(),
        });
    }

    Ok(ParsedMessage {
        subject: message.subject().map(str::to_string),
        message_id: message.message_id().map(str::to_string),
        date: message.date().and_then(convert_date),
        text_body,
        html_body,
        headers,
        attachments,
    })
}

fn convert_date(date: &mail_parser::DateTime) -> Option<DateTime<Utc>> {
    let naive_local = chrono::NaiveDate::from_ymd_opt(date.year as i32, date.month as u32, date.day as u32)?
        .and_hms_opt(date.hour as u32, date.minute as u32, date.second as u32)?;
    let offset_seconds = (date.tz_hour as i64 * 3600 + date.tz_minute as i64 * 60)
        * if date.tz_before_gmt { -1 } else { 1 };
    let naive_utc = naive_local - chrono::Duration::seconds(offset_seconds);
    Some(Utc.from_utc_datetime(&naive_utc))
}

fn header_name_to_string(name: &HeaderName) -> String {
    match name {
        HeaderName::Subject => "Subject".to_string(),
        HeaderName::From => "From".to_string(),
        HeaderName::To => "To".to_string(),
        HeaderName::Cc => "Cc".to_string(),
        HeaderName::Date => "Date".to_string(),
        HeaderName::Bcc => "Bcc".to_string(),
        HeaderName::ReplyTo => "Reply-To".to_string(),
        HeaderName::Sender => "Sender".to_string(),
        HeaderName::Comments => "Comments".to_string(),
        HeaderName::InReplyTo => "In-Reply-To".to_string(),
        HeaderName::Keywords => "Keywords".to_string(),
        HeaderName::Received => "Received".to_string(),
        HeaderName::MessageId => "Message-ID".to_string(),
        HeaderName::References => "References".to_string(),
        HeaderName::ReturnPath => "Return-Path".to_string(),
        HeaderName::MimeVersion => "MIME-Version".to_string(),
        HeaderName::ContentDescription => "Content-Description".to_string(),
        HeaderName::ContentId => "Content-ID".to_string(),
        HeaderName::ContentLanguage => "Content-Language".to_string(),
        HeaderName::ContentLocation => "Content-Location".to_string(),
        HeaderName::ContentTransferEncoding => "Content-Transfer-Encoding".to_string(),
        HeaderName::ContentType => "Content-Type".to_string(),
        HeaderName::ContentDisposition => "Content-Disposition".to_string(),
        HeaderName::ResentTo => "Resent-To".to_string(),
        HeaderName::ResentFrom => "Resent-From".to_string(),
        HeaderName::ResentBcc => "Resent-Bcc".to_string(),
        HeaderName::ResentCc => "Resent-Cc".to_string(),
        HeaderName::ResentSender => "Resent-Sender".to_string(),
        HeaderName::ResentDate => "Resent-Date".to_string(),
        HeaderName::ResentMessageId => "Resent-Message-ID".to_string(),
        HeaderName::ListArchive => "List-Archive".to_string(),
        HeaderName::ListHelp => "List-Help".to_string(),
        HeaderName::ListId => "List-Id".to_string(),
        HeaderName::ListOwner => "List-Owner".to_string(),
        HeaderName::ListPost => "List-Post".to_string(),
        HeaderName::ListSubscribe => "List-Subscribe".to_string(),
        HeaderName::ListUnsubscribe => "List-Unsubscribe".to_string(),
        HeaderName::Other(name) => name.to_string(),
    }
}

fn header_value_to_string(value: &HeaderValue) -> String {
    match value {
        HeaderValue::Text(s) => s.to_string(),
        HeaderValue::TextList(items) => items.join(", "),
        HeaderValue::DateTime(dt) => dt.to_rfc3339(),
        HeaderValue::Address(addr) => address_to_string(addr),
        HeaderValue::ContentType(ct) => match ct.c_subtype.as_deref() {
            Some(subtype) => format!("{}/{}", ct.c_type, subtype),
            None => ct.c_type.to_string(),
        },
        HeaderValue::Received(_) => String::new(),
        HeaderValue::Empty => String::new(),
    }
}

fn address_to_string(address: &mail_parser::Address) -> String {
    match address {
        mail_parser::Address::List(addrs) => addrs.iter().map(addr_to_string).collect::<Vec<_>>().join(", "),
        mail_parser::Address::Group(groups) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .map(addr_to_string)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn addr_to_string(addr: &mail_parser::Addr) -> String {
    match (&addr.name, &addr.address) {
        (Some(name), Some(address)) => format!("{name} <{address}>"),
        (None, Some(address)) => address.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => String::new(),
    }
}
