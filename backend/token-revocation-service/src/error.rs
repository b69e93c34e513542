//! Error types for the token revocation pipeline

use thiserror::Error;

/// Result type for revocation operations
pub type Result<T> = std::result::Result<T, RevocationError>;

/// Errors that can occur while revoking tokens for an alert
#[derive(Error, Debug)]
pub enum RevocationError {
    /// Ledger operation failed (lock, query, commit, pool acquisition)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Blacklist write failed
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Alert payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Message bus client error
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Schema migration failed at startup
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Alert decoded but is not usable (missing id or user)
    #[error("Invalid alert: {0}")]
    InvalidAlert(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RevocationError {
    /// Check if error is transient, i.e. a redelivery of the same alert may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            RevocationError::Database(sqlx_err) => matches!(
                sqlx_err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            RevocationError::Cache(redis_err) => {
                redis_err.is_io_error() || redis_err.is_timeout() || redis_err.is_connection_dropped()
            }
            RevocationError::Kafka(_) => true,
            _ => false,
        }
    }

    /// Short label used for the outcome metric
    pub fn kind(&self) -> &'static str {
        match self {
            RevocationError::Database(_) => "database",
            RevocationError::Cache(_) => "cache",
            RevocationError::Decode(_) => "decode",
            RevocationError::Kafka(_) => "kafka",
            RevocationError::Migration(_) => "migration",
            RevocationError::InvalidAlert(_) => "invalid_alert",
            RevocationError::Config(_) => "config",
        }
    }
}
