use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{api::id::ApiId, common::ElectionState};
use crate::voting::ElectionTally;

/// One row of an election's results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub candidate_id: ApiId,
    pub name: String,
    pub votes: u64,
}

/// The results of an election, ranked by votes (most first), ties broken by
/// candidate ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub election_id: ApiId,
    pub title: String,
    /// Lifecycle state when the results were computed; results of an open
    /// election are provisional.
    pub state: ElectionState,
    pub total_votes: u64,
    pub results: Vec<CandidateResult>,
    /// Every candidate with the top count. Empty if nobody has voted.
    pub winners: Vec<ApiId>,
}

impl ElectionResults {
    pub fn new(tally: ElectionTally, now: DateTime<Utc>) -> Self {
        let total_votes = tally.total_votes();
        let winners = tally.winners().map(|c| c.id.into()).collect();
        let state = tally.election.state(now);
        let results = tally
            .results
            .into_iter()
            .map(|row| CandidateResult {
                candidate_id: row.candidate.id.into(),
                name: row.candidate.candidate.name,
                votes: row.votes,
            })
            .collect();
        Self {
            election_id: tally.election.id.into(),
            title: tally.election.election.title,
            state,
            total_votes,
            results,
            winners,
        }
    }
}
