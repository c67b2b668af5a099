use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;
use crate::id::Id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: Id,
    pub mailbox_id: Id,
    pub message_id: Option<String>,
    pub from_address: String,
    pub to_address: String,
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
    /// First value per header name, as received. See §9: duplicate header
    /// values beyond the first are not retained.
    pub headers: BTreeMap<String, String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub raw_size: i64,
    pub received_at: DateTime<Utc>,
    pub is_read: bool,
    /// Populated when the email is loaded with its attachments (e.g. right
    /// before being handed to the dispatcher); absent from a bare row read.
    pub attachments: Vec<Attachment>,
}

impl Email {
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// `body` field extraction for the rule evaluator: text body, falling
    /// back to html body when text is empty.
    pub fn rule_body(&self) -> &str {
        match self.text_body.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => self.html_body.as_deref().unwrap_or(""),
        }
    }
}

/// Parameters for persisting one Email row during the SMTP DATA pipeline.
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub mailbox_id: Id,
    pub message_id: Option<String>,
    pub from_address: String,
    pub to_address: String,
    pub subject: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub headers: BTreeMap<String, String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub raw_size: i64,
}
