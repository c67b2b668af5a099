//! Routing Service (C3): resolves `local+tag@domain` addresses to a
//! mailbox, the same rules applying whether the caller is the SMTP engine
//! or the (out-of-scope) admin surface's "open by email address" lookup
//! (§4.3). Grounded on `internal/smtp/session.go`'s `parseAddress` /
//! `ExtractSlug` and `internal/service/mailbox_service.go`'s
//! `GetByEmail` from the original implementation.

use store::Store;
use types::{Domain, Mailbox};

/// A successfully resolved recipient: the domain and mailbox it routes to,
/// plus the plus-tag-stripped slug that matched.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub domain: Domain,
    pub mailbox: Mailbox,
    pub slug: String,
}

/// Splits `addr` into `(local_part, domain)` on the final `@`, trimming
/// surrounding whitespace and angle brackets first. Both sides are
/// required to be non-empty.
pub fn parse_address(addr: &str) -> trc::Result<(String, String)> {
    let trimmed = addr.trim().trim_start_matches('<').trim_end_matches('>');
    let (local, domain) = trimmed
        .rsplit_once('@')
        .ok_or_else(|| trc::Error::validation(format!("address {addr:?} is missing '@'")))?;
    if local.is_empty() || domain.is_empty() {
        return Err(trc::Error::validation(format!("address {addr:?} has an empty local or domain part")));
    }
    Ok((local.to_string(), domain.to_string()))
}

/// Extracts the routing slug from a local part: everything before the
/// first `+`, lowercased. Plus-tag equivalence: `extract_slug("a+x") ==
/// extract_slug("a+y") == extract_slug("a")`.
pub fn extract_slug(local_part: &str) -> String {
    match local_part.split_once('+') {
        Some((slug, _tag)) => slug.to_lowercase(),
        None => local_part.to_lowercase(),
    }
}

/// Resolves `local+tag@domain` to its mailbox (§4.3):
///
/// 1. split on the final `@`;
/// 2. look up the lowercased domain, failing if absent or inactive;
/// 3. extract the slug (local part before the first `+`, lowercased);
/// 4. look up `(slug, domain_id)`, failing if absent or inactive.
pub async fn resolve_recipient(store: &Store, address: &str) -> trc::Result<Resolved> {
    let (local_part, domain_name) = parse_address(address)?;
    let domain_name = domain_name.to_lowercase();

    let domain = store
        .get_domain_by_name(&domain_name)
        .await?
        .ok_or_else(|| trc::Error::not_found(format!("no such domain: {domain_name}")))?;
    if !domain.is_active {
        return Err(trc::Error::inactive(format!("domain is inactive: {domain_name}")));
    }

    let slug = extract_slug(&local_part);
    let mailbox = store
        .get_mailbox_by_slug(domain.id, &slug)
        .await?
        .ok_or_else(|| trc::Error::not_found(format!("no such mailbox: {slug}@{domain_name}")))?;
    if !mailbox.is_active {
        return Err(trc::Error::inactive(format!("mailbox is inactive: {slug}@{domain_name}")));
    }

    Ok(Resolved { domain, mailbox, slug })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_address() {
        let (local, domain) = parse_address("support@example.com").unwrap();
        assert_eq!(local, "support");
        assert_eq!(domain, "example.com");
    }

    #[test]
    fn trims_angle_brackets_and_whitespace() {
        let (local, domain) = parse_address("  <a@ext.com>  ").unwrap();
        assert_eq!(local, "a");
        assert_eq!(domain, "ext.com");
    }

    #[test]
    fn rejects_addresses_without_at() {
        assert!(parse_address("not-an-address").is_err());
    }

    #[test]
    fn rejects_empty_local_or_domain() {
        assert!(parse_address("@example.com").is_err());
        assert!(parse_address("local@").is_err());
    }

    #[test]
    fn plus_tag_equivalence() {
        assert_eq!(extract_slug("support+ticket-42"), "support");
        assert_eq!(extract_slug("Support+other"), "support");
        assert_eq!(extract_slug("support"), "support");
        assert_eq!(extract_slug("SUPPORT"), "support");
    }

    #[tokio::test]
    async fn resolves_plus_tagged_recipient() {
        let store = store::Store::open(common::DbDriver::Sqlite, ":memory:").await.unwrap();
        store.migrate().await.unwrap();
        let domain = store.create_domain("example.com").await.unwrap();
        store
            .create_mailbox("support", domain.id, None, "", 25, 10, 90)
            .await
            .unwrap();

        let resolved = resolve_recipient(&store, "support+ticket-42@example.com").await.unwrap();
        assert_eq!(resolved.mailbox.slug, "support");
        assert_eq!(resolved.slug, "support");

        let plain = resolve_recipient(&store, "support@example.com").await.unwrap();
        assert_eq!(plain.mailbox.id, resolved.mailbox.id);
    }

    #[tokio::test]
    async fn rejects_unknown_domain() {
        let store = store::Store::open(common::DbDriver::Sqlite, ":memory:").await.unwrap();
        store.migrate().await.unwrap();

        let err = resolve_recipient(&store, "a@nowhere.test").await.unwrap_err();
        assert_eq!(err.kind(), trc::Kind::NotFound);
    }

    #[tokio::test]
    async fn rejects_unknown_mailbox_on_a_known_domain() {
        let store = store::Store::open(common::DbDriver::Sqlite, ":memory:").await.unwrap();
        store.migrate().await.unwrap();
        store.create_domain("example.com").await.unwrap();

        let err = resolve_recipient(&store, "nobody@example.com").await.unwrap_err();
        assert_eq!(err.kind(), trc::Kind::NotFound);
    }
}
