//! Periodic Maintenance (C8) and DNS Verifier (C9) — §4.8-4.9. Both
//! background loops are started from `crates/main` alongside the SMTP
//! server and the dispatcher, sharing the same root `CancellationToken`.
//! The DNS verifier itself is invoked on demand by the (out-of-scope)
//! admin surface; this crate only supplies the lookup/compare logic and
//! the idempotent "promote to verified" write.

pub mod dns;
pub mod maintenance;

pub use dns::DnsVerifier;
