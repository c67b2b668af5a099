use serde::{Deserialize, Serialize};

/// A single key/value row in the settings table, managed by the
/// (out-of-scope) admin surface and read by the core where it affects
/// behavior (none, at present).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}
