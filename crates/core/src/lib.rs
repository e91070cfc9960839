//! TradeOS sync engine.
//!
//! Pulls product and stock data from 1C endpoints, reconciles it against the
//! local catalog and streams progress to real-time subscribers. Storage and
//! transport live in sibling crates behind the repository traits defined
//! here.

pub mod catalog;
pub mod errors;
pub mod events;
pub mod integrations;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, ErrorKind, Result};
