pub mod config;
pub mod core;

pub use config::{Config, DbDriver, Environment};
pub use core::{build_core, Core, Inner};
