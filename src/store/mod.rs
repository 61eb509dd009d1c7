//! Persistence for elections, candidates and votes.
//!
//! Each store is a trait so the voting logic runs unchanged against MongoDB
//! in production and against memory in development and tests.

use std::collections::HashMap;
use std::sync::Arc;

use mongodb::{error::Error as DbError, Client, Database};
use thiserror::Error;

use crate::error::{Error, Result};
use crate::model::{
    api::{CandidatePatch, ElectionPatch},
    db::{Candidate, Election, NewCandidate, NewElection, NewVote, Vote},
    mongodb::Id,
};

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[rocket::async_trait]
pub trait ElectionStore: Send + Sync {
    /// Store a new election, allocating its ID.
    async fn create_election(&self, election: NewElection) -> Result<Election>;

    /// Fetch one election, failing with `NotFound` if it doesn't exist.
    async fn election(&self, id: Id) -> Result<Election>;

    /// Every election, in ID order.
    async fn elections(&self) -> Result<Vec<Election>>;

    /// Apply a partial update. Concurrent patches to the same election are
    /// applied one after the other, never over each other.
    async fn update_election(&self, id: Id, patch: ElectionPatch) -> Result<Election>;

    /// Delete an election together with its candidates and votes.
    async fn delete_election(&self, id: Id) -> Result<()>;
}

#[rocket::async_trait]
pub trait CandidateStore: Send + Sync {
    /// Store a new candidate. Fails with `NotFound` if its election doesn't
    /// exist.
    async fn create_candidate(&self, candidate: NewCandidate) -> Result<Candidate>;

    /// Fetch one candidate, failing with `NotFound` if it doesn't exist.
    async fn candidate(&self, id: Id) -> Result<Candidate>;

    /// Every candidate of every election, in ID order.
    async fn candidates(&self) -> Result<Vec<Candidate>>;

    /// The candidates standing in one election, in ID order.
    async fn candidates_for(&self, election_id: Id) -> Result<Vec<Candidate>>;

    /// Apply a partial update, with the same guarantee as
    /// [`ElectionStore::update_election`].
    async fn update_candidate(&self, id: Id, patch: CandidatePatch) -> Result<Candidate>;

    /// Delete a candidate. Fails with `Conflict` while votes reference it.
    async fn delete_candidate(&self, id: Id) -> Result<()>;
}

/// Why the ledger refused a vote.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("The voter already has a vote in this election")]
    DuplicateVote,
    #[error(transparent)]
    Other(#[from] Error),
}

impl From<DbError> for LedgerError {
    fn from(err: DbError) -> Self {
        Self::Other(err.into())
    }
}

/// The append-only record of votes.
#[rocket::async_trait]
pub trait VoteLedger: Send + Sync {
    /// Has this voter voted in this election?
    async fn exists(&self, election_id: Id, voter_id: Id) -> Result<bool>;

    /// This voter's vote in this election, if any.
    async fn find(&self, election_id: Id, voter_id: Id) -> Result<Option<Vote>>;

    /// Append a vote. This is the only place uniqueness of
    /// `(election_id, voter_id)` is decided: implementations must make the
    /// check and the write a single atomic step.
    ///
    /// The election and candidate must still exist at the moment of writing,
    /// else this fails with `NotFound` or `InvalidCandidate`. A vote never
    /// outlives what it points at.
    async fn insert(&self, vote: NewVote) -> std::result::Result<Vote, LedgerError>;

    /// Vote counts per candidate for one election. Candidates without
    /// votes are absent.
    async fn tally(&self, election_id: Id) -> Result<HashMap<Id, u64>>;

    /// Total votes in one election.
    async fn count(&self, election_id: Id) -> Result<u64>;
}

/// Handles on all three stores.
#[derive(Clone)]
pub struct Store {
    pub elections: Arc<dyn ElectionStore>,
    pub candidates: Arc<dyn CandidateStore>,
    pub votes: Arc<dyn VoteLedger>,
}

impl Store {
    /// A fresh, empty, in-memory store.
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::default());
        Self {
            elections: store.clone(),
            candidates: store.clone(),
            votes: store,
        }
    }

    /// A store backed by the given database, creating its indexes if needed.
    pub async fn mongodb(client: Client, db: &Database) -> std::result::Result<Self, DbError> {
        let store = Arc::new(MongoStore::new(client, db).await?);
        Ok(Self {
            elections: store.clone(),
            candidates: store.clone(),
            votes: store,
        })
    }
}

fn election_not_found(id: Id) -> Error {
    Error::not_found(format!("Election {id}"))
}

fn candidate_not_found(id: Id) -> Error {
    Error::not_found(format!("Candidate {id}"))
}

fn candidate_has_votes(id: Id, votes: u64) -> Error {
    Error::Conflict(format!(
        "Candidate {id} has {votes} vote(s); delete the election to remove them"
    ))
}

fn candidate_not_standing(election: Id, candidate: Id) -> Error {
    Error::InvalidCandidate {
        election,
        candidate,
    }
}
