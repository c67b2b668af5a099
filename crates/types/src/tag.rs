use crate::id::Id;
use serde::{Deserialize, Serialize};

/// Labels attached to mailboxes/emails by the (out-of-scope) admin surface.
/// Carried here only so the store's schema is self-consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub name: String,
}
