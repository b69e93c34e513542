//! Alert intake from the `alerts` topic

mod consumer;
mod handler;

pub use consumer::AlertConsumer;
pub use handler::{AlertHandler, IntakeOutcome};
