pub mod backfill;
pub mod classifier;
pub mod coordinator;

pub use backfill::BlacklistBackfill;
pub use classifier::{AlertClassifier, ACCEPTED_SEVERITIES, ACCOUNT_COMPROMISE_CLASS};
pub use coordinator::RevocationCoordinator;
