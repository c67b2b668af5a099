use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

/// Minimal shape needed by the core: owning a mailbox and a session.
/// Profile fields (avatar, TOTP enrollment, …) belong to the out-of-scope
/// administrative surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}
