use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::Id;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub id: Id,
    /// Lowercase, RFC 1035 label dot-form. Globally unique.
    pub name: String,
    pub is_verified: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A DNS record this domain is expected to publish, for display and for
/// [`crate::Domain`] verification (see `services::dns`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsRecord {
    pub record_type: &'static str,
    pub name: String,
    pub value: String,
    pub priority: Option<u16>,
    pub ttl: u32,
}

impl Domain {
    /// The records an operator is expected to publish for this domain to
    /// receive mail and pass SPF: an MX pointing at `mail.<domain>` and an
    /// SPF TXT record authorizing it.
    pub fn expected_dns_records(&self) -> Vec<DnsRecord> {
        let mail_host = format!("mail.{}", self.name);
        vec![
            DnsRecord {
                record_type: "MX",
                name: self.name.clone(),
                value: mail_host,
                priority: Some(10),
                ttl: 3600,
            },
            DnsRecord {
                record_type: "TXT",
                name: self.name.clone(),
                value: "v=spf1 mx ~all".to_string(),
                priority: None,
                ttl: 3600,
            },
        ]
    }
}
