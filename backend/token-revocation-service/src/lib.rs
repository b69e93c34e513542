//! Token revocation service
//!
//! Consumes account-compromise alerts and revokes the affected user's tokens:
//! an audit trail and session flip in PostgreSQL, plus blacklist entries in
//! Redis. Redelivered alerts are applied exactly once.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod kafka;
pub mod metrics;
pub mod models;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, RevocationError};
pub use models::{Alert, RevocationOutcome, TokenRevocation};
pub use services::{AlertClassifier, BlacklistBackfill, RevocationCoordinator};
