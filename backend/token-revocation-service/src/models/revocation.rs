use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Alert;

/// Label value for the revocation counter
pub const REVOCATION_REASON: &str = "account_compromise";

/// Append-only audit row, one per revoked token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRevocation {
    pub id: Uuid,
    pub jti: String,
    pub user_id: String,
    pub alert_id: String,
    pub revoked_at: DateTime<Utc>,
}

impl TokenRevocation {
    pub fn new(jti: impl Into<String>, alert: &Alert) -> Self {
        Self {
            id: Uuid::new_v4(),
            jti: jti.into(),
            user_id: alert.user_id.clone(),
            alert_id: alert.id.clone(),
            revoked_at: Utc::now(),
        }
    }
}

/// Result of handing one alert to the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationOutcome {
    /// Alert applied for the first time; lists the tokens revoked (possibly none)
    Revoked { jtis: Vec<String> },

    /// Alert id was already in the ledger; nothing was written
    AlreadyProcessed,

    /// Classifier declined the alert
    Rejected,
}

impl RevocationOutcome {
    pub fn revoked_count(&self) -> usize {
        match self {
            RevocationOutcome::Revoked { jtis } => jtis.len(),
            _ => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RevocationOutcome::Revoked { .. } => "revoked",
            RevocationOutcome::AlreadyProcessed => "duplicate",
            RevocationOutcome::Rejected => "rejected",
        }
    }
}
