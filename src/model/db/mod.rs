//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs and datetimes are serialised in MongoDB's own format.

use chrono::{DateTime, SubsecRound, Utc};

mod candidate;
pub use candidate::{Candidate, CandidateCore, NewCandidate};

mod election;
pub use election::{Election, ElectionCore, NewElection};

mod vote;
pub use vote::{NewVote, Vote, VoteCore};

/// Cut a datetime to what a BSON date can hold: milliseconds.
///
/// Anything stored must go through this first, or it reads back different.
pub fn db_time(time: DateTime<Utc>) -> DateTime<Utc> {
    time.trunc_subsecs(3)
}
