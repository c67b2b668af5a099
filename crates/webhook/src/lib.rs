//! Webhook dispatch: rule evaluation (C5), payload construction and HMAC
//! signing (C6), and the bounded-queue delivery engine with its retry
//! scanner (C7). See `dispatch::Dispatcher` for the entry point the SMTP
//! engine and the (out-of-scope) admin surface call into.

pub mod dispatch;
pub mod payload;
pub mod rules;
pub mod sender;
pub mod signing;

pub use dispatch::{Dispatcher, Job};
