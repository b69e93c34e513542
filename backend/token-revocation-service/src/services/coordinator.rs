//! Revocation coordinator
//!
//! Applies one accepted alert as a single ledger transaction:
//!
//! ```text
//! BEGIN
//!   pg_advisory_xact_lock(hashtext(user_id))     -- per-user serialization
//!   INSERT revoked_alerts ... ON CONFLICT NOTHING -- idempotency gate
//!   resolve targets (alert.jti | active sessions)
//!   for each jti: SET jwt:blacklist:<jti> EX ttl; INSERT token_revocations
//!   UPDATE sessions SET revoked = TRUE
//! COMMIT
//! ```
//!
//! The blacklist is written before the ledger commits. A failure in between
//! leaves a blacklisted token without an audit row, which over-blocks but never
//! lets a revoked token through. Any error rolls back the whole transaction,
//! including the idempotency marker, so redelivery retries the alert in full.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

use crate::cache::{TokenBlacklist, BLACKLIST_TTL};
use crate::db::{LedgerTransaction, RevocationLedger};
use crate::error::Result;
use crate::metrics;
use crate::models::{Alert, RevocationOutcome, RevocationTarget, TokenRevocation, REVOCATION_REASON};
use crate::services::AlertClassifier;

pub struct RevocationCoordinator {
    ledger: Arc<dyn RevocationLedger>,
    blacklist: Arc<dyn TokenBlacklist>,
    classifier: AlertClassifier,
    ttl: Duration,
    reason: String,
}

impl RevocationCoordinator {
    pub fn new(ledger: Arc<dyn RevocationLedger>, blacklist: Arc<dyn TokenBlacklist>) -> Self {
        Self {
            ledger,
            blacklist,
            classifier: AlertClassifier::new(),
            ttl: BLACKLIST_TTL,
            reason: REVOCATION_REASON.to_string(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Per-test label on `tokens_revoked_total`, which is a process-wide counter
    #[cfg(test)]
    pub(crate) fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Classify, then process if accepted. Rejected alerts touch neither store.
    pub async fn handle(&self, alert: &Alert) -> Result<RevocationOutcome> {
        if !self.classifier.accept(alert) {
            debug!(
                alert_id = %alert.id,
                class = %alert.class,
                severity = %alert.severity,
                "Alert not eligible for revocation"
            );
            return Ok(RevocationOutcome::Rejected);
        }
        self.process(alert).await
    }

    /// Apply an alert exactly once. Returns `AlreadyProcessed` on redelivery.
    pub async fn process(&self, alert: &Alert) -> Result<RevocationOutcome> {
        let span = tracing::info_span!(
            "revoke_alert",
            alert_id = %alert.id,
            user_id = %alert.user_id
        );

        let start = Instant::now();
        let result = self.process_inner(alert).instrument(span).await;

        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "failed",
        };
        metrics::observe_processing(label, start.elapsed());

        if let Ok(outcome) = &result {
            // Only committed revocations are counted.
            metrics::record_tokens_revoked(&self.reason, outcome.revoked_count());
        }

        result
    }

    async fn process_inner(&self, alert: &Alert) -> Result<RevocationOutcome> {
        let mut tx = self.ledger.begin().await?;

        match self.apply(&mut *tx, alert).await {
            Ok(outcome) => {
                tx.commit().await?;
                match &outcome {
                    RevocationOutcome::Revoked { jtis } => info!(
                        revoked = jtis.len(),
                        "Alert applied, tokens revoked"
                    ),
                    RevocationOutcome::AlreadyProcessed => {
                        debug!("Alert already processed, skipping")
                    }
                    RevocationOutcome::Rejected => {}
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, "Revocation failed, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut dyn LedgerTransaction,
        alert: &Alert,
    ) -> Result<RevocationOutcome> {
        tx.lock_user(&alert.user_id).await?;

        if !tx.insert_processed_alert(&alert.id).await? {
            return Ok(RevocationOutcome::AlreadyProcessed);
        }

        let target = alert.target();
        let jtis = match &target {
            RevocationTarget::Token(jti) => vec![jti.clone()],
            RevocationTarget::AllSessions => dedup(tx.active_session_jtis(&alert.user_id).await?),
        };

        for jti in &jtis {
            self.blacklist.blacklist(jti, self.ttl).await?;
            tx.record_revocation(&TokenRevocation::new(jti.as_str(), alert))
                .await?;
        }

        let flipped = match &target {
            RevocationTarget::Token(jti) => tx.revoke_session(&alert.user_id, jti).await?,
            RevocationTarget::AllSessions => tx.revoke_all_sessions(&alert.user_id).await?,
        };
        debug!(sessions = flipped, "Sessions marked revoked");

        Ok(RevocationOutcome::Revoked { jtis })
    }
}

fn dedup(jtis: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::with_capacity(jtis.len());
    jtis.into_iter()
        .filter(|jti| seen.insert(jti.clone()))
        .collect()
}
