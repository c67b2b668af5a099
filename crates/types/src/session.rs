use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

pub const SESSION_TTL_DAYS: i64 = 7;
pub const PENDING_2FA_TTL_MINUTES: i64 = 5;
pub const PENDING_2FA_PREFIX: &str = "2fa_";

/// An opaque 64-hex-character authentication token. Ordinary session
/// tokens and pending-2FA tokens (prefixed `2fa_`) share the same table
/// and row shape; only the prefix and TTL used at creation time differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: Id,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_pending_2fa(&self) -> bool {
        self.token.starts_with(PENDING_2FA_PREFIX)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
