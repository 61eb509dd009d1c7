//! Casting votes and counting them.

mod service;
mod tally;

pub use service::VotingService;
pub use tally::{tally, CandidateTally, ElectionTally};
