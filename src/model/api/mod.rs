//! API-friendly types: request bodies and response documents.
//!
//! IDs are hex strings and datetimes RFC 3339, whatever the database uses.

mod candidate;
mod election;
mod id;
mod results;
mod vote;

pub use candidate::{CandidateDescription, CandidatePatch, CandidateSpec};
pub use election::{ElectionDescription, ElectionPatch, ElectionSpec};
pub use id::ApiId;
pub use results::{CandidateResult, ElectionResults};
pub use vote::{VoteReceipt, VoteRequest};
