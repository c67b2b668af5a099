use std::fmt;

/// An opaque, monotonic row identifier. Every entity in the data model is
/// keyed by one of these; the underlying representation (`i64`, matching
/// both sqlite's `INTEGER PRIMARY KEY` and postgres' `BIGSERIAL`) is not
/// meant to be relied on by callers beyond equality and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Id(pub i64);

impl Id {
    pub fn new(id: i64) -> Self {
        Id(id)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Id {
    fn from(id: i64) -> Self {
        Id(id)
    }
}
