//! Core of the following-change tracker: domain types, persistence, the
//! diff engine and the reconciliation loop.
//!
//! Framework-agnostic. The social-graph API, Discord and Telegram live
//! behind ports (traits) implemented in adapter crates.

pub mod config;
pub mod diff;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod notify;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod upstream;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
