use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

pub const DEFAULT_MAX_EMAIL_SIZE_MB: i64 = 25;
pub const DEFAULT_MAX_ATTACHMENT_SIZE_MB: i64 = 10;
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: Id,
    /// Lowercase, `[a-z0-9]([a-z0-9-]*[a-z0-9])?`. Unique together with
    /// `domain_id`.
    pub slug: String,
    pub domain_id: Id,
    pub owner_id: Option<Id>,
    pub description: String,
    pub is_active: bool,
    pub max_email_size_mb: i64,
    pub max_attachment_size_mb: i64,
    /// `<= 0` disables retention entirely.
    pub retention_days: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mailbox {
    pub fn max_email_size_bytes(&self) -> i64 {
        self.max_email_size_mb * 1024 * 1024
    }

    pub fn max_attachment_size_bytes(&self) -> i64 {
        self.max_attachment_size_mb * 1024 * 1024
    }

    pub fn retention_enabled(&self) -> bool {
        self.retention_days > 0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailboxDefaults {
    pub max_email_size_mb: i64,
    pub max_attachment_size_mb: i64,
    pub retention_days: i64,
}

impl MailboxDefaults {
    pub fn standard() -> Self {
        MailboxDefaults {
            max_email_size_mb: DEFAULT_MAX_EMAIL_SIZE_MB,
            max_attachment_size_mb: DEFAULT_MAX_ATTACHMENT_SIZE_MB,
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}
