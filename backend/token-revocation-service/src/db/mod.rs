//! Revocation ledger: the durable source of truth
//!
//! Every write for one alert goes through a single [`LedgerTransaction`] so that
//! the idempotency marker, the audit rows and the session flip commit or roll
//! back together.

mod pool;
mod postgres;

pub use pool::create_pool;
pub use postgres::PgRevocationLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;

use crate::error::Result;
use crate::models::TokenRevocation;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Transactional store backing the revocation coordinator
#[async_trait]
pub trait RevocationLedger: Send + Sync {
    /// Open a new transaction. Dropping it without commit rolls it back.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>>;

    /// Revocations recorded at or after `since`, oldest first
    async fn revocations_since(&self, since: DateTime<Utc>) -> Result<Vec<TokenRevocation>>;
}

/// One atomic unit of work against the ledger
#[async_trait]
pub trait LedgerTransaction: Send {
    /// Block until the per-user advisory lock is held. Released on commit or rollback.
    async fn lock_user(&mut self, user_id: &str) -> Result<()>;

    /// Insert the idempotency marker. Returns `false` when the alert id already exists.
    async fn insert_processed_alert(&mut self, alert_id: &str) -> Result<bool>;

    /// `jwt_id` of every unrevoked session of the user
    async fn active_session_jtis(&mut self, user_id: &str) -> Result<Vec<String>>;

    async fn record_revocation(&mut self, revocation: &TokenRevocation) -> Result<()>;

    /// Flip every unrevoked session of the user; returns rows changed
    async fn revoke_all_sessions(&mut self, user_id: &str) -> Result<u64>;

    /// Flip the one session holding `jti`; returns rows changed
    async fn revoke_session(&mut self, user_id: &str, jti: &str) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
