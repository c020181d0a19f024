//! Master side of the field bus: which device to poll next, one transaction
//! per poll, and the classification of whatever came back.

pub mod engine;
pub mod statistics;

pub use engine::{PollOutcome, PollingEngine};
pub use statistics::PollStatistics;
