//! Restore blacklist entries from the ledger
//!
//! The ledger is the source of truth. After a cache flush or failover, every
//! revocation still inside the TTL window is written back with whatever TTL it
//! has left.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::TokenBlacklist;
use crate::db::RevocationLedger;
use crate::error::{RevocationError, Result};

pub struct BlacklistBackfill {
    ledger: Arc<dyn RevocationLedger>,
    blacklist: Arc<dyn TokenBlacklist>,
    ttl: Duration,
}

impl BlacklistBackfill {
    pub fn new(
        ledger: Arc<dyn RevocationLedger>,
        blacklist: Arc<dyn TokenBlacklist>,
        ttl: Duration,
    ) -> Self {
        Self {
            ledger,
            blacklist,
            ttl,
        }
    }

    /// Re-blacklist recent revocations. Returns the number of entries written.
    pub async fn run(&self) -> Result<u64> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<u64> {
        let window = chrono::Duration::from_std(self.ttl)
            .map_err(|e| RevocationError::Config(format!("Invalid blacklist TTL: {}", e)))?;
        let since = now - window;

        let revocations = self.ledger.revocations_since(since).await?;
        let mut restored = 0u64;

        for revocation in &revocations {
            let Some(remaining) = remaining_ttl(self.ttl, revocation.revoked_at, now) else {
                continue;
            };
            if let Err(e) = self.blacklist.blacklist(&revocation.jti, remaining).await {
                warn!(
                    jti = %revocation.jti,
                    error = %e,
                    "Failed to restore blacklist entry"
                );
                return Err(e);
            }
            restored += 1;
        }

        info!(
            restored = restored,
            since = %since,
            "Blacklist backfill completed"
        );
        Ok(restored)
    }
}

/// TTL left for an entry revoked at `revoked_at`, or `None` once it has lapsed
fn remaining_ttl(ttl: Duration, revoked_at: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
    // Clock skew can put revoked_at slightly in the future; treat it as "just now".
    let age = (now - revoked_at).to_std().unwrap_or(Duration::ZERO);
    ttl.checked_sub(age).filter(|left| !left.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenRevocation;
    use crate::testing::{InMemoryBlacklist, InMemoryLedger};
    use uuid::Uuid;

    fn revocation(jti: &str, revoked_at: DateTime<Utc>) -> TokenRevocation {
        TokenRevocation {
            id: Uuid::new_v4(),
            jti: jti.to_string(),
            user_id: "u1".to_string(),
            alert_id: "a1".to_string(),
            revoked_at,
        }
    }

    #[test]
    fn test_remaining_ttl() {
        let now = Utc::now();
        let ttl = Duration::from_secs(100);

        assert_eq!(remaining_ttl(ttl, now, now), Some(ttl));
        assert_eq!(
            remaining_ttl(ttl, now - chrono::Duration::seconds(40), now),
            Some(Duration::from_secs(60))
        );
        assert_eq!(remaining_ttl(ttl, now - chrono::Duration::seconds(100), now), None);
        assert_eq!(remaining_ttl(ttl, now - chrono::Duration::seconds(500), now), None);
        assert_eq!(remaining_ttl(ttl, now + chrono::Duration::seconds(5), now), Some(ttl));
    }

    #[tokio::test]
    async fn test_backfill_restores_only_live_entries() {
        let now = Utc::now();
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.add_revocation(revocation("fresh", now - chrono::Duration::hours(1)));
        ledger.add_revocation(revocation("older", now - chrono::Duration::hours(23)));
        ledger.add_revocation(revocation("expired", now - chrono::Duration::hours(25)));
        let blacklist = Arc::new(InMemoryBlacklist::new());

        let backfill = BlacklistBackfill::new(
            ledger.clone(),
            blacklist.clone(),
            Duration::from_secs(24 * 3600),
        );
        let restored = backfill.run_at(now).await.unwrap();

        assert_eq!(restored, 2);
        assert_eq!(blacklist.ttl_of("fresh"), Some(Duration::from_secs(23 * 3600)));
        assert_eq!(blacklist.ttl_of("older"), Some(Duration::from_secs(3600)));
        assert!(!blacklist.contains("expired"));
    }

    #[tokio::test]
    async fn test_backfill_stops_on_cache_error() {
        let now = Utc::now();
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.add_revocation(revocation("j1", now - chrono::Duration::minutes(5)));
        let blacklist = Arc::new(InMemoryBlacklist::new());
        blacklist.fail_on("j1");

        let backfill =
            BlacklistBackfill::new(ledger, blacklist.clone(), Duration::from_secs(24 * 3600));
        let err = backfill.run_at(now).await.unwrap_err();

        assert_eq!(err.kind(), "cache");
        assert!(blacklist.entries().is_empty());
    }
}
