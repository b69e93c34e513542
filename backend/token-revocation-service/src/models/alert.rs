use serde::{Deserialize, Serialize};

use crate::error::{RevocationError, Result};

/// Security alert consumed from the `alerts` topic
///
/// `id` is the idempotency key for the alert itself. An absent, null or empty
/// `jti` means "every active session of `user_id`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub class: String,
    pub severity: String,
    pub user_id: String,
    #[serde(default)]
    pub jti: Option<String>,
}

/// What a single alert asks to revoke
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevocationTarget {
    /// One specific token
    Token(String),
    /// Every unrevoked session of the user
    AllSessions,
}

impl Alert {
    /// Decode an alert from a raw bus payload
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        let alert: Alert = serde_json::from_slice(payload)?;
        if alert.id.trim().is_empty() {
            return Err(RevocationError::InvalidAlert("alert id is empty".to_string()));
        }
        if alert.user_id.trim().is_empty() {
            return Err(RevocationError::InvalidAlert(format!(
                "alert {} has no user_id",
                alert.id
            )));
        }
        Ok(alert)
    }

    /// Explicit token named by the alert, passed through verbatim.
    /// Only a missing or empty `jti` means "all sessions".
    pub fn target_jti(&self) -> Option<&str> {
        self.jti.as_deref().filter(|jti| !jti.is_empty())
    }

    pub fn target(&self) -> RevocationTarget {
        match self.target_jti() {
            Some(jti) => RevocationTarget::Token(jti.to_string()),
            None => RevocationTarget::AllSessions,
        }
    }
}
