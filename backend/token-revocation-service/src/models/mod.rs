pub mod alert;
pub mod revocation;

pub use alert::{Alert, RevocationTarget};
pub use revocation::{RevocationOutcome, TokenRevocation, REVOCATION_REASON};
