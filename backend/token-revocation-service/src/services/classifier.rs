//! Static rule deciding which alerts warrant token revocation

use crate::models::Alert;

pub const ACCOUNT_COMPROMISE_CLASS: &str = "Account Compromise";

pub const ACCEPTED_SEVERITIES: [&str; 2] = ["High", "Critical"];

/// Pure predicate over alerts. Unknown classes or severities are simply not accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertClassifier;

impl AlertClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn accept(&self, alert: &Alert) -> bool {
        alert.class == ACCOUNT_COMPROMISE_CLASS
            && ACCEPTED_SEVERITIES.contains(&alert.severity.as_str())
    }
}
