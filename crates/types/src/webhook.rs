use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadType {
    Default,
    Json,
    KeyValue,
}

impl Default for PayloadType {
    fn default() -> Self {
        PayloadType::Default
    }
}

impl PayloadType {
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => PayloadType::Json,
            "key_value" => PayloadType::KeyValue,
            _ => PayloadType::Default,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PayloadType::Default => "default",
            PayloadType::Json => "json",
            PayloadType::KeyValue => "key_value",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Id,
    pub mailbox_id: Id,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub payload_type: PayloadType,
    pub custom_payload: Option<String>,
    pub hmac_secret: Option<String>,
    pub timeout_sec: i64,
    pub max_retries: i64,
    pub include_body: bool,
    pub include_attachments: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Populated alongside the webhook when rule evaluation needs it.
    pub rules: Vec<WebhookRule>,
}

/// The field × operator tag-union from §9 design notes, modeled here as a
/// sum type; unknown field/operator combinations from storage evaluate to
/// `false` rather than erroring (see `webhook::rules`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleField {
    Subject,
    From,
    To,
    Body,
    Header,
    HasAttachments,
    Size,
}

impl RuleField {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "subject" => RuleField::Subject,
            "from" => RuleField::From,
            "to" => RuleField::To,
            "body" => RuleField::Body,
            "header" => RuleField::Header,
            "has_attachments" => RuleField::HasAttachments,
            "size" => RuleField::Size,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleField::Subject => "subject",
            RuleField::From => "from",
            RuleField::To => "to",
            RuleField::Body => "body",
            RuleField::Header => "header",
            RuleField::HasAttachments => "has_attachments",
            RuleField::Size => "size",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOperator {
    Contains,
    NotContains,
    Equals,
    Regex,
    Gt,
    Lt,
}

impl RuleOperator {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "contains" => RuleOperator::Contains,
            "not_contains" => RuleOperator::NotContains,
            "equals" => RuleOperator::Equals,
            "regex" => RuleOperator::Regex,
            "gt" => RuleOperator::Gt,
            "lt" => RuleOperator::Lt,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RuleOperator::Contains => "contains",
            RuleOperator::NotContains => "not_contains",
            RuleOperator::Equals => "equals",
            RuleOperator::Regex => "regex",
            RuleOperator::Gt => "gt",
            RuleOperator::Lt => "lt",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRule {
    pub id: Id,
    pub webhook_id: Id,
    pub rule_group: i64,
    pub field: String,
    pub operator: String,
    pub value: String,
    pub header_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Success,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Retrying => "retrying",
            DeliveryStatus::Success => "success",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => DeliveryStatus::Pending,
            "retrying" => DeliveryStatus::Retrying,
            "success" => DeliveryStatus::Success,
            "failed" => DeliveryStatus::Failed,
            _ => return None,
        })
    }

    /// `success`/`failed` are terminal: once reached a row is never
    /// mutated again.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Success | DeliveryStatus::Failed)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Id,
    pub webhook_id: Id,
    pub email_id: Id,
    pub attempt: i64,
    pub status: DeliveryStatus,
    pub status_code: Option<i32>,
    pub request_body: String,
    /// Truncated to 1000 chars at write time.
    pub response_body: String,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}
