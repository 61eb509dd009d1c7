use std::collections::{BTreeMap, HashMap};

use log::info;
use rocket::tokio::sync::RwLock;

use super::{
    candidate_has_votes, candidate_not_found, candidate_not_standing, election_not_found,
    CandidateStore, ElectionStore, LedgerError, VoteLedger,
};
use crate::error::Result;
use crate::model::{
    api::{CandidatePatch, ElectionPatch},
    db::{Candidate, Election, NewCandidate, NewElection, NewVote, Vote},
    mongodb::Id,
};

/// Stores held in process memory. Nothing survives a restart.
///
/// A single lock guards everything, so every operation is atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Default)]
struct State {
    elections: BTreeMap<Id, Election>,
    candidates: BTreeMap<Id, Candidate>,
    votes: BTreeMap<Id, Vote>,
    /// `(election_id, voter_id)` to vote ID.
    voted: HashMap<(Id, Id), Id>,
}

impl State {
    fn votes_in(&self, election_id: Id) -> impl Iterator<Item = &Vote> {
        self.votes
            .values()
            .filter(move |vote| vote.election_id == election_id)
    }
}

#[rocket::async_trait]
impl ElectionStore for MemoryStore {
    async fn create_election(&self, election: NewElection) -> Result<Election> {
        let election = Election::new(election);
        self.state
            .write()
            .await
            .elections
            .insert(election.id, election.clone());
        Ok(election)
    }

    async fn election(&self, id: Id) -> Result<Election> {
        self.state
            .read()
            .await
            .elections
            .get(&id)
            .cloned()
            .ok_or_else(|| election_not_found(id))
    }

    async fn elections(&self) -> Result<Vec<Election>> {
        Ok(self.state.read().await.elections.values().cloned().collect())
    }

    async fn update_election(&self, id: Id, patch: ElectionPatch) -> Result<Election> {
        let mut state = self.state.write().await;
        let stored = state
            .elections
            .get_mut(&id)
            .ok_or_else(|| election_not_found(id))?;
        stored.election = patch.apply(stored.election.clone())?;
        Ok(stored.clone())
    }

    async fn delete_election(&self, id: Id) -> Result<()> {
        let mut state = self.state.write().await;
        if state.elections.remove(&id).is_none() {
            return Err(election_not_found(id));
        }

        let candidates_before = state.candidates.len();
        state.candidates.retain(|_, c| c.election_id != id);
        let votes_before = state.votes.len();
        state.votes.retain(|_, v| v.election_id != id);
        state.voted.retain(|(election_id, _), _| *election_id != id);

        info!(
            "Deleted election {id} with {} candidate(s) and {} vote(s)",
            candidates_before - state.candidates.len(),
            votes_before - state.votes.len()
        );
        Ok(())
    }
}

#[rocket::async_trait]
impl CandidateStore for MemoryStore {
    async fn create_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let mut state = self.state.write().await;
        if !state.elections.contains_key(&candidate.election_id) {
            return Err(election_not_found(candidate.election_id));
        }
        let candidate = Candidate::new(candidate);
        state.candidates.insert(candidate.id, candidate.clone());
        Ok(candidate)
    }

    async fn candidate(&self, id: Id) -> Result<Candidate> {
        self.state
            .read()
            .await
            .candidates
            .get(&id)
            .cloned()
            .ok_or_else(|| candidate_not_found(id))
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self.state.read().await.candidates.values().cloned().collect())
    }

    async fn candidates_for(&self, election_id: Id) -> Result<Vec<Candidate>> {
        Ok(self
            .state
            .read()
            .await
            .candidates
            .values()
            .filter(|c| c.election_id == election_id)
            .cloned()
            .collect())
    }

    async fn update_candidate(&self, id: Id, patch: CandidatePatch) -> Result<Candidate> {
        let mut state = self.state.write().await;
        let stored = state
            .candidates
            .get_mut(&id)
            .ok_or_else(|| candidate_not_found(id))?;
        stored.candidate = patch.apply(stored.candidate.clone())?;
        Ok(stored.clone())
    }

    async fn delete_candidate(&self, id: Id) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.candidates.contains_key(&id) {
            return Err(candidate_not_found(id));
        }
        let votes = state
            .votes
            .values()
            .filter(|v| v.candidate_id == id)
            .count() as u64;
        if votes > 0 {
            return Err(candidate_has_votes(id, votes));
        }
        state.candidates.remove(&id);
        Ok(())
    }
}

#[rocket::async_trait]
impl VoteLedger for MemoryStore {
    async fn exists(&self, election_id: Id, voter_id: Id) -> Result<bool> {
        Ok(self
            .state
            .read()
            .await
            .voted
            .contains_key(&(election_id, voter_id)))
    }

    async fn find(&self, election_id: Id, voter_id: Id) -> Result<Option<Vote>> {
        let state = self.state.read().await;
        Ok(state
            .voted
            .get(&(election_id, voter_id))
            .and_then(|id| state.votes.get(id))
            .cloned())
    }

    async fn insert(&self, vote: NewVote) -> std::result::Result<Vote, LedgerError> {
        // Check and write under the same guard.
        let mut state = self.state.write().await;
        if !state.elections.contains_key(&vote.election_id) {
            return Err(election_not_found(vote.election_id).into());
        }
        match state.candidates.get(&vote.candidate_id) {
            Some(candidate) if candidate.election_id == vote.election_id => {}
            _ => return Err(candidate_not_standing(vote.election_id, vote.candidate_id).into()),
        }
        let key = (vote.election_id, vote.voter_id);
        if state.voted.contains_key(&key) {
            return Err(LedgerError::DuplicateVote);
        }
        let vote = Vote::new(vote);
        state.voted.insert(key, vote.id);
        state.votes.insert(vote.id, vote.clone());
        Ok(vote)
    }

    async fn tally(&self, election_id: Id) -> Result<HashMap<Id, u64>> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for vote in state.votes_in(election_id) {
            *counts.entry(vote.candidate_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn count(&self, election_id: Id) -> Result<u64> {
        Ok(self.state.read().await.votes_in(election_id).count() as u64)
    }
}
