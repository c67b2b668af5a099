//! DNS Verifier (C9; §4.9). Grounded on `internal/service/dns_service.go`:
//! constructs the MX/TXT records a domain is expected to publish, performs
//! the lookups through `hickory-resolver`, and reports whether each
//! matched. Invoked on demand by the (out-of-scope) admin surface; this
//! crate owns only the lookup/compare logic and the idempotent "promote to
//! verified" write it gates.

use chrono::Utc;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use types::{Domain, Id};

/// One expected-vs-found DNS check (§4.9: "Return both result triples
/// `{expected, found[], valid, error?}`").
#[derive(Debug, Clone, Default)]
pub struct RecordCheck {
    pub expected: String,
    pub found: Vec<String>,
    pub valid: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DomainCheckResult {
    pub mx: RecordCheck,
    pub txt: RecordCheck,
}

impl DomainCheckResult {
    pub fn both_valid(&self) -> bool {
        self.mx.valid && self.txt.valid
    }
}

/// Wraps a resolver handle; cheap to clone, shared by the admin surface's
/// on-demand verification endpoint.
#[derive(Clone)]
pub struct DnsVerifier {
    resolver: TokioAsyncResolver,
}

impl DnsVerifier {
    /// Builds a resolver from the system's `/etc/resolv.conf` (or platform
    /// equivalent). Fails only if the system configuration itself cannot be
    /// read, which is a startup-time concern, not a per-lookup one.
    pub fn from_system_conf() -> trc::Result<Self> {
        let resolver = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|e| trc::Error::fatal(format!("failed to read system DNS configuration: {e}")))?;
        Ok(DnsVerifier { resolver })
    }

    #[cfg(test)]
    fn with_config(config: ResolverConfig, opts: ResolverOpts) -> Self {
        DnsVerifier { resolver: TokioAsyncResolver::tokio(config, opts) }
    }

    /// Looks up `domain`'s MX and SPF-TXT records and compares them against
    /// the expected `mail.<domain>` MX and `v=spf1 mx ~all` TXT (§4.9).
    pub async fn check(&self, domain: &Domain) -> DomainCheckResult {
        let expected = domain.expected_dns_records();
        let expected_mx = expected
            .iter()
            .find(|r| r.record_type == "MX")
            .map(|r| r.value.clone())
            .unwrap_or_default();
        let expected_txt = expected
            .iter()
            .find(|r| r.record_type == "TXT")
            .map(|r| r.value.clone())
            .unwrap_or_default();

        DomainCheckResult {
            mx: self.check_mx(&domain.name, &expected_mx).await,
            txt: self.check_txt(&domain.name, &expected_txt).await,
        }
    }

    async fn check_mx(&self, domain_name: &str, expected: &str) -> RecordCheck {
        let mut check = RecordCheck { expected: expected.to_string(), ..Default::default() };

        let response = match self.resolver.mx_lookup(domain_name).await {
            Ok(response) => response,
            Err(_) => {
                check.error = Some("no MX records found".to_string());
                return check;
            }
        };

        for record in response.iter() {
            let host = record.exchange().to_ascii().trim_end_matches('.').to_lowercase();
            check.found.push(host.clone());
            if host.eq_ignore_ascii_case(expected) {
                check.valid = true;
            }
        }

        if !check.valid && !check.found.is_empty() {
            check.error = Some("MX record does not match expected value".to_string());
        }
        check
    }

    async fn check_txt(&self, domain_name: &str, expected: &str) -> RecordCheck {
        let mut check = RecordCheck { expected: expected.to_string(), ..Default::default() };

        let response = match self.resolver.txt_lookup(domain_name).await {
            Ok(response) => response,
            Err(_) => {
                check.error = Some("no SPF record found".to_string());
                return check;
            }
        };

        for record in response.iter() {
            let text = record
                .txt_data()
                .iter()
                .map(|chunk| String::from_utf8_lossy(chunk))
                .collect::<String>();
            // SPF version token is case-sensitive per RFC 7208.
            if !text.starts_with("v=spf1") {
                continue;
            }
            check.found.push(text.clone());
            if text.contains("mx") {
                check.valid = true;
            }
        }

        if !check.valid {
            check.error = Some(if check.found.is_empty() {
                "no SPF record found".to_string()
            } else {
                "SPF record does not include mx".to_string()
            });
        }
        check
    }
}

/// Runs the verifier against `domain_id` and, if both records validate,
/// idempotently promotes the domain to verified (§4.9).
pub async fn verify_and_promote(
    verifier: &DnsVerifier,
    store: &store::Store,
    domain_id: Id,
) -> trc::Result<DomainCheckResult> {
    let domain = store
        .get_domain_by_id(domain_id)
        .await?
        .ok_or_else(|| trc::Error::not_found(format!("no such domain: {domain_id}")))?;

    let result = verifier.check(&domain).await;
    if result.both_valid() && !domain.is_verified {
        store.set_domain_verified(domain.id, true, Utc::now()).await?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc as ChronoUtc;
    use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};

    fn unreachable_verifier() -> DnsVerifier {
        // Points at a non-routable TEST-NET-1 address (RFC 5737) with a
        // short timeout, so lookups deterministically fail fast without
        // depending on real network access in CI.
        let mut opts = ResolverOpts::default();
        opts.timeout = std::time::Duration::from_millis(200);
        opts.attempts = 1;
        let config = ResolverConfig::from_parts(
            None,
            vec![],
            NameServerConfigGroup::from_ips_clear(&["192.0.2.1".parse().unwrap()], 53, true),
        );
        DnsVerifier::with_config(config, opts)
    }

    fn sample_domain(name: &str, verified: bool) -> Domain {
        Domain {
            id: Id::new(1),
            name: name.to_string(),
            is_verified: verified,
            is_active: true,
            created_at: ChronoUtc::now(),
            updated_at: ChronoUtc::now(),
        }
    }

    #[tokio::test]
    async fn unreachable_resolver_reports_invalid_not_panic() {
        let verifier = unreachable_verifier();
        let domain = sample_domain("example.com", false);
        let result = verifier.check(&domain).await;
        assert!(!result.mx.valid);
        assert!(!result.txt.valid);
        assert!(result.mx.error.is_some());
        assert!(result.txt.error.is_some());
    }

    #[test]
    fn expected_records_match_the_spec_shape() {
        let domain = sample_domain("example.com", false);
        let records = domain.expected_dns_records();
        assert_eq!(records[0].record_type, "MX");
        assert_eq!(records[0].value, "mail.example.com");
        assert_eq!(records[1].record_type, "TXT");
        assert_eq!(records[1].value, "v=spf1 mx ~all");
    }
}
