use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};

use super::tally::tally;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::model::{
    api::{CandidateDescription, ElectionDescription, ElectionResults},
    db::{db_time, Candidate, Election, NewVote, Vote},
    mongodb::Id,
};
use crate::store::{LedgerError, Store};

/// The voting core: the stores plus the clock that decides whether an
/// election is open. This is managed state for the server.
#[derive(Clone)]
pub struct VotingService {
    store: Store,
    clock: Arc<dyn Clock>,
}

impl VotingService {
    pub fn new(store: Store, clock: impl Clock + 'static) -> Self {
        Self {
            store,
            clock: Arc::new(clock),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Record `voter_id`'s vote for `candidate_id` in `election_id`.
    ///
    /// Nothing is written unless every check passes. A voter gets exactly one
    /// vote per election, however many requests race to cast it.
    pub async fn cast_vote(&self, voter_id: Id, election_id: Id, candidate_id: Id) -> Result<Vote> {
        let result = self.try_cast_vote(voter_id, election_id, candidate_id).await;
        match &result {
            Ok(vote) => info!(
                "Voter {voter_id} voted for {candidate_id} in {election_id} (vote {})",
                vote.id
            ),
            Err(err) if err.status().code < 500 => {
                warn!("Rejected vote by {voter_id} in {election_id}: {err}")
            }
            Err(_) => {}
        }
        result
    }

    async fn try_cast_vote(&self, voter_id: Id, election_id: Id, candidate_id: Id) -> Result<Vote> {
        let election = self.store.elections.election(election_id).await?;

        let now = self.now();
        if !election.is_open(now) {
            return Err(Error::ElectionClosed(election_id));
        }

        let invalid_candidate = || Error::InvalidCandidate {
            election: election_id,
            candidate: candidate_id,
        };
        let candidate = match self.store.candidates.candidate(candidate_id).await {
            Ok(candidate) => candidate,
            Err(Error::NotFound(_)) => return Err(invalid_candidate()),
            Err(err) => return Err(err),
        };
        if candidate.election_id != election_id {
            return Err(invalid_candidate());
        }

        let already_voted = || Error::AlreadyVoted {
            election: election_id,
            voter: voter_id,
        };
        // Fast path only; the ledger has the final say.
        if self.store.votes.exists(election_id, voter_id).await? {
            return Err(already_voted());
        }

        let vote = NewVote {
            election_id,
            candidate_id,
            voter_id,
            timestamp: db_time(now),
        };
        match self.store.votes.insert(vote).await {
            Ok(vote) => Ok(vote),
            Err(LedgerError::DuplicateVote) => Err(already_voted()),
            Err(LedgerError::Other(err)) => Err(err),
        }
    }

    /// The vote `voter_id` cast in `election_id`.
    pub async fn vote_of(&self, election_id: Id, voter_id: Id) -> Result<Vote> {
        self.store.elections.election(election_id).await?;
        self.store
            .votes
            .find(election_id, voter_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Vote by {voter_id} in election {election_id}")))
    }

    /// The candidates of an election with their current vote counts, in ID
    /// order.
    pub async fn candidate_descriptions(&self, election_id: Id) -> Result<Vec<CandidateDescription>> {
        let candidates = self.store.candidates.candidates_for(election_id).await?;
        let counts = self.store.votes.tally(election_id).await?;
        Ok(candidates
            .into_iter()
            .map(|candidate| {
                let count = counts.get(&candidate.id).copied().unwrap_or(0);
                CandidateDescription::new(candidate, count)
            })
            .collect())
    }

    /// One candidate with its current vote count.
    pub async fn describe_candidate(&self, candidate: Candidate) -> Result<CandidateDescription> {
        let counts = self.store.votes.tally(candidate.election_id).await?;
        let count = counts.get(&candidate.id).copied().unwrap_or(0);
        Ok(CandidateDescription::new(candidate, count))
    }

    /// Every candidate of every election with their vote counts, in ID order.
    pub async fn all_candidate_descriptions(&self) -> Result<Vec<CandidateDescription>> {
        let candidates = self.store.candidates.candidates().await?;

        // One tally per election, however many candidates it has.
        let mut tallies: HashMap<Id, HashMap<Id, u64>> = HashMap::new();
        let mut descriptions = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !tallies.contains_key(&candidate.election_id) {
                let tally = self.store.votes.tally(candidate.election_id).await?;
                tallies.insert(candidate.election_id, tally);
            }
            let count = tallies
                .get(&candidate.election_id)
                .and_then(|tally| tally.get(&candidate.id))
                .copied()
                .unwrap_or(0);
            descriptions.push(CandidateDescription::new(candidate, count));
        }
        Ok(descriptions)
    }

    /// Everything a voter sees about an election, from `viewer`'s point of
    /// view.
    pub async fn describe(&self, election: Election, viewer: Id) -> Result<ElectionDescription> {
        let candidates = self.candidate_descriptions(election.id).await?;
        let has_voted = self.store.votes.exists(election.id, viewer).await?;
        Ok(ElectionDescription::new(
            election,
            self.now(),
            candidates,
            has_voted,
        ))
    }

    /// The ranked results of an election as of now.
    pub async fn results(&self, election_id: Id) -> Result<ElectionResults> {
        let tally = tally(&self.store, election_id).await?;
        Ok(ElectionResults::new(tally, self.now()))
    }
}
