//! TradeOS 1C client - HTTP access to the external catalog/ERP system.
//!
//! The crate exposes:
//! - [`OneCClient`]: a pooled reqwest client with per-attempt timeouts,
//!   exponential backoff and typed error classification
//! - [`OneCApi`]: the trait the sync engine depends on, so tests and other
//!   transports can stand in for the HTTP client
//! - wire models for nomenclature, stock and order payloads

mod client;
mod credentials;
pub mod errors;
mod models;
mod traits;

pub use client::{ClientConfig, OneCClient, RetryPolicy, DEFAULT_MAX_RETRIES, DEFAULT_TIMEOUT_SECS};
pub use credentials::Credential;
pub use errors::{ErrorKind, OneCError, Result, RetryClass};
pub use models::*;
pub use traits::OneCApi;
