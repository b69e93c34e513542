//! In-memory ledger and blacklist used by unit tests
//!
//! The ledger mirrors the PostgreSQL semantics the coordinator relies on: a
//! per-user lock held until commit/rollback, and writes that only become
//! visible on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

use crate::cache::TokenBlacklist;
use crate::db::{LedgerTransaction, RevocationLedger};
use crate::error::{RevocationError, Result};
use crate::models::TokenRevocation;

#[derive(Debug, Clone)]
struct SessionRow {
    user_id: String,
    jti: String,
    revoked: bool,
}

#[derive(Default)]
struct LedgerState {
    processed: Vec<String>,
    sessions: Vec<SessionRow>,
    revocations: Vec<TokenRevocation>,
}

#[derive(Default)]
struct LedgerInner {
    state: Mutex<LedgerState>,
    user_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    fail_next_commit: AtomicBool,
}

#[derive(Default, Clone)]
pub struct InMemoryLedger {
    inner: Arc<LedgerInner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self, user_id: &str, jti: &str) {
        self.push_session(user_id, jti, false);
    }

    pub fn add_revoked_session(&self, user_id: &str, jti: &str) {
        self.push_session(user_id, jti, true);
    }

    fn push_session(&self, user_id: &str, jti: &str, revoked: bool) {
        self.inner.state.lock().unwrap().sessions.push(SessionRow {
            user_id: user_id.to_string(),
            jti: jti.to_string(),
            revoked,
        });
    }

    pub fn add_revocation(&self, revocation: TokenRevocation) {
        self.inner.state.lock().unwrap().revocations.push(revocation);
    }

    pub fn session_revoked(&self, user_id: &str, jti: &str) -> Option<bool> {
        self.inner
            .state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|s| s.user_id == user_id && s.jti == jti)
            .map(|s| s.revoked)
    }

    pub fn processed_alerts(&self) -> Vec<String> {
        self.inner.state.lock().unwrap().processed.clone()
    }

    pub fn revocations(&self) -> Vec<TokenRevocation> {
        self.inner.state.lock().unwrap().revocations.clone()
    }

    pub fn fail_next_commit(&self) {
        self.inner.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn user_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .user_locks
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl RevocationLedger for InMemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            ledger: self.clone(),
            guards: Vec::new(),
            processed: Vec::new(),
            revocations: Vec::new(),
            flips: Vec::new(),
        }))
    }

    async fn revocations_since(&self, since: DateTime<Utc>) -> Result<Vec<TokenRevocation>> {
        let mut rows: Vec<TokenRevocation> = self
            .revocations()
            .into_iter()
            .filter(|r| r.revoked_at >= since)
            .collect();
        rows.sort_by_key(|r| r.revoked_at);
        Ok(rows)
    }
}

enum SessionFlip {
    All { user_id: String },
    One { user_id: String, jti: String },
}

struct InMemoryTransaction {
    ledger: InMemoryLedger,
    guards: Vec<OwnedMutexGuard<()>>,
    processed: Vec<String>,
    revocations: Vec<TokenRevocation>,
    flips: Vec<SessionFlip>,
}

#[async_trait]
impl LedgerTransaction for InMemoryTransaction {
    async fn lock_user(&mut self, user_id: &str) -> Result<()> {
        let guard = self.ledger.user_lock(user_id).lock_owned().await;
        self.guards.push(guard);
        Ok(())
    }

    async fn insert_processed_alert(&mut self, alert_id: &str) -> Result<bool> {
        // Callers hold the user lock, so no other open transaction can be
        // inserting the same alert id concurrently.
        let committed = self
            .ledger
            .inner
            .state
            .lock()
            .unwrap()
            .processed
            .iter()
            .any(|id| id == alert_id);
        if committed || self.processed.iter().any(|id| id == alert_id) {
            return Ok(false);
        }
        self.processed.push(alert_id.to_string());
        Ok(true)
    }

    async fn active_session_jtis(&mut self, user_id: &str) -> Result<Vec<String>> {
        let mut jtis: Vec<String> = self
            .ledger
            .inner
            .state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && !s.revoked)
            .map(|s| s.jti.clone())
            .collect();
        jtis.sort();
        Ok(jtis)
    }

    async fn record_revocation(&mut self, revocation: &TokenRevocation) -> Result<()> {
        self.revocations.push(revocation.clone());
        Ok(())
    }

    async fn revoke_all_sessions(&mut self, user_id: &str) -> Result<u64> {
        let count = self.active_session_jtis(user_id).await?.len() as u64;
        self.flips.push(SessionFlip::All {
            user_id: user_id.to_string(),
        });
        Ok(count)
    }

    async fn revoke_session(&mut self, user_id: &str, jti: &str) -> Result<u64> {
        let count = self
            .active_session_jtis(user_id)
            .await?
            .iter()
            .filter(|active| active.as_str() == jti)
            .count() as u64;
        self.flips.push(SessionFlip::One {
            user_id: user_id.to_string(),
            jti: jti.to_string(),
        });
        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        if this.ledger.inner.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(RevocationError::Database(sqlx::Error::Protocol(
                "simulated commit failure".to_string(),
            )));
        }

        let mut state = this.ledger.inner.state.lock().unwrap();
        state.processed.extend(this.processed);
        state.revocations.extend(this.revocations);
        for flip in this.flips {
            for session in state.sessions.iter_mut() {
                let matches = match &flip {
                    SessionFlip::All { user_id } => &session.user_id == user_id,
                    SessionFlip::One { user_id, jti } => {
                        &session.user_id == user_id && &session.jti == jti
                    }
                };
                if matches {
                    session.revoked = true;
                }
            }
        }
        drop(state);
        drop(this.guards);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Blacklist that records TTLs and can be told to fail for given tokens
#[derive(Default)]
pub struct InMemoryBlacklist {
    entries: Mutex<HashMap<String, Duration>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, jti: &str) {
        self.failing.lock().unwrap().insert(jti.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn contains(&self, jti: &str) -> bool {
        self.entries.lock().unwrap().contains_key(jti)
    }

    pub fn ttl_of(&self, jti: &str) -> Option<Duration> {
        self.entries.lock().unwrap().get(jti).copied()
    }

    pub fn entries(&self) -> HashMap<String, Duration> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenBlacklist for InMemoryBlacklist {
    async fn blacklist(&self, jti: &str, ttl: Duration) -> Result<()> {
        if self.failing.lock().unwrap().contains(jti) {
            return Err(RevocationError::Cache(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "simulated blacklist failure",
            ))));
        }
        self.entries.lock().unwrap().insert(jti.to_string(), ttl);
        Ok(())
    }
}
