use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Id,
    pub email_id: Id,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    /// Relative to the blob store's base path; stable for the blob's
    /// lifetime.
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub email_id: Id,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub storage_path: String,
}
