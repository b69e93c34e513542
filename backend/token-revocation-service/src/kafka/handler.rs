use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::metrics;
use crate::models::{Alert, RevocationOutcome};
use crate::services::RevocationCoordinator;

/// What happened to one bus message. Every variant is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Message had no payload
    Empty,
    /// Payload was not a usable alert
    DecodeFailed,
    /// Classifier declined the alert
    Rejected,
    /// Alert applied; number of tokens revoked
    Revoked(usize),
    /// Alert id already in the ledger
    Duplicate,
    /// Processing failed and was rolled back
    Failed,
}

impl IntakeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            IntakeOutcome::Empty => "empty",
            IntakeOutcome::DecodeFailed => "decode_error",
            IntakeOutcome::Rejected => "rejected",
            IntakeOutcome::Revoked(_) => "revoked",
            IntakeOutcome::Duplicate => "duplicate",
            IntakeOutcome::Failed => "failed",
        }
    }
}

/// Bus-agnostic part of the intake loop: decode, classify, coordinate
#[derive(Clone)]
pub struct AlertHandler {
    coordinator: Arc<RevocationCoordinator>,
}

impl AlertHandler {
    pub fn new(coordinator: Arc<RevocationCoordinator>) -> Self {
        Self { coordinator }
    }

    /// Never fails: errors are logged and counted, and the caller acknowledges regardless.
    pub async fn handle_payload(&self, payload: Option<&[u8]>) -> IntakeOutcome {
        let outcome = self.handle_inner(payload).await;
        metrics::record_alert(outcome.label());
        outcome
    }

    async fn handle_inner(&self, payload: Option<&[u8]>) -> IntakeOutcome {
        let Some(payload) = payload else {
            debug!("Empty message payload, skipping");
            return IntakeOutcome::Empty;
        };

        let alert = match Alert::from_slice(payload) {
            Ok(alert) => alert,
            Err(e) => {
                warn!(error = %e, "Failed to decode alert, skipping");
                return IntakeOutcome::DecodeFailed;
            }
        };

        match self.coordinator.handle(&alert).await {
            Ok(RevocationOutcome::Revoked { jtis }) => IntakeOutcome::Revoked(jtis.len()),
            Ok(RevocationOutcome::AlreadyProcessed) => IntakeOutcome::Duplicate,
            Ok(RevocationOutcome::Rejected) => IntakeOutcome::Rejected,
            Err(e) => {
                error!(
                    alert_id = %alert.id,
                    user_id = %alert.user_id,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to process alert"
                );
                IntakeOutcome::Failed
            }
        }
    }
}
