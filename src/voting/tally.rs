use std::collections::HashMap;

use crate::error::Result;
use crate::model::{
    db::{Candidate, Election},
    mongodb::Id,
};
use crate::store::Store;

/// One candidate and the votes committed for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTally {
    pub candidate: Candidate,
    pub votes: u64,
}

/// Every candidate of an election with their vote count, most votes first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionTally {
    pub election: Election,
    pub results: Vec<CandidateTally>,
}

impl ElectionTally {
    /// Rank the given counts. Candidates missing from `counts` got no votes.
    pub fn new(
        election: Election,
        candidates: Vec<Candidate>,
        counts: &HashMap<Id, u64>,
    ) -> Self {
        let mut results = candidates
            .into_iter()
            .map(|candidate| CandidateTally {
                votes: counts.get(&candidate.id).copied().unwrap_or(0),
                candidate,
            })
            .collect::<Vec<_>>();
        results.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then_with(|| a.candidate.id.cmp(&b.candidate.id))
        });
        Self { election, results }
    }

    pub fn total_votes(&self) -> u64 {
        self.results.iter().map(|row| row.votes).sum()
    }

    /// Every candidate sharing the highest count, or none if nobody voted.
    pub fn winners(&self) -> impl Iterator<Item = &Candidate> {
        let top = self.results.first().map(|row| row.votes).unwrap_or(0);
        self.results
            .iter()
            .take_while(move |row| top > 0 && row.votes == top)
            .map(|row| &row.candidate)
    }
}

/// Count the committed votes of an election.
pub async fn tally(store: &Store, election_id: Id) -> Result<ElectionTally> {
    let election = store.elections.election(election_id).await?;
    let candidates = store.candidates.candidates_for(election_id).await?;
    let counts = store.votes.tally(election_id).await?;
    Ok(ElectionTally::new(election, candidates, &counts))
}
