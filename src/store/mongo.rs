use std::collections::HashMap;
use std::fmt::Display;
use std::time::{Duration, Instant};

use log::{debug, info};
use mongodb::{
    bson::{self, doc, Bson, Document},
    error::Error as DbError,
    options::FindOptions,
    Client, ClientSession, Database,
};
use rocket::futures::TryStreamExt;
use serde::Serialize;

use super::{
    candidate_has_votes, candidate_not_found, candidate_not_standing, election_not_found,
    CandidateStore, ElectionStore, LedgerError, VoteLedger,
};
use crate::error::{Error, Result};
use crate::model::{
    api::{CandidatePatch, ElectionPatch},
    db::{Candidate, Election, NewCandidate, NewElection, NewVote, Vote},
    mongodb::{
        ensure_indexes_exist, is_duplicate_key_error, is_transient_transaction_error, Coll, Id,
    },
};

/// How long to keep rerunning a transaction that loses write conflicts.
const TRANSACTION_RETRY_WINDOW: Duration = Duration::from_secs(10);

/// Stores backed by MongoDB.
///
/// Multi-document changes run in transactions, so the server must be a
/// replica set. Reads inside a transaction take no locks, so a transaction
/// that depends on a parent document existing writes to it first: a
/// concurrent delete of that parent then conflicts with it instead of
/// slipping past.
pub struct MongoStore {
    client: Client,
    elections: Coll<Election>,
    candidates: Coll<Candidate>,
    votes: Coll<Vote>,
}

impl MongoStore {
    pub async fn new(client: Client, db: &Database) -> std::result::Result<Self, DbError> {
        ensure_indexes_exist(db).await?;
        Ok(Self {
            client,
            elections: Coll::from_db(db),
            candidates: Coll::from_db(db),
            votes: Coll::from_db(db),
        })
    }

    async fn transaction(&self) -> Result<ClientSession> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;
        Ok(session)
    }

    async fn cascade_delete(&self, id: Id, session: &mut ClientSession) -> Result<()> {
        let result = self
            .elections
            .delete_one_with_session(id.as_doc(), None, session)
            .await?;
        if result.deleted_count == 0 {
            session.abort_transaction().await?;
            return Err(election_not_found(id));
        }

        // Take the candidates and votes with it.
        let candidates = self
            .candidates
            .delete_many_with_session(in_election(id), None, session)
            .await?;
        let votes = self
            .votes
            .delete_many_with_session(in_election(id), None, session)
            .await?;

        session.commit_transaction().await?;
        info!(
            "Deleted election {id} with {} candidate(s) and {} vote(s)",
            candidates.deleted_count, votes.deleted_count
        );
        Ok(())
    }

    async fn insert_candidate(
        &self,
        candidate: &Candidate,
        session: &mut ClientSession,
    ) -> Result<()> {
        let election_id = candidate.election_id;
        let claimed = self
            .elections
            .update_one_with_session(election_id.as_doc(), claim(), None, session)
            .await?;
        if claimed.matched_count == 0 {
            session.abort_transaction().await?;
            return Err(election_not_found(election_id));
        }

        self.candidates
            .insert_one_with_session(candidate, None, session)
            .await?;
        session.commit_transaction().await?;
        Ok(())
    }

    async fn remove_candidate(&self, id: Id, session: &mut ClientSession) -> Result<()> {
        let votes = self
            .votes
            .count_documents_with_session(doc! { "candidate_id": id }, None, session)
            .await?;
        if votes > 0 {
            session.abort_transaction().await?;
            return Err(candidate_has_votes(id, votes));
        }

        // A vote committed since the count claimed this document, so the
        // delete conflicts with it.
        let result = self
            .candidates
            .delete_one_with_session(id.as_doc(), None, session)
            .await?;
        if result.deleted_count == 0 {
            session.abort_transaction().await?;
            return Err(candidate_not_found(id));
        }

        session.commit_transaction().await?;
        Ok(())
    }

    async fn insert_vote(
        &self,
        vote: &Vote,
        session: &mut ClientSession,
    ) -> std::result::Result<(), LedgerError> {
        // Deleting the election deletes the candidate too, so claiming the
        // candidate guards against both.
        let standing = doc! {
            "_id": vote.candidate_id,
            "election_id": vote.election_id,
        };
        let claimed = self
            .candidates
            .update_one_with_session(standing, claim(), None, session)
            .await?;
        if claimed.matched_count == 0 {
            let election = self
                .elections
                .find_one_with_session(vote.election_id.as_doc(), None, session)
                .await?;
            session.abort_transaction().await?;
            return Err(match election {
                None => election_not_found(vote.election_id),
                Some(_) => candidate_not_standing(vote.election_id, vote.candidate_id),
            }
            .into());
        }

        match self.votes.insert_one_with_session(vote, None, session).await {
            Ok(_) => {}
            // The unique (election_id, voter_id) index refused it. The
            // server has already aborted the transaction.
            Err(err) if is_duplicate_key_error(&err) => {
                debug!("Duplicate vote by {} in {}", vote.voter_id, vote.election_id);
                return Err(LedgerError::DuplicateVote);
            }
            Err(err) => return Err(err.into()),
        }

        session.commit_transaction().await?;
        Ok(())
    }
}

/// An update that changes nothing readable but counts as a write, so that
/// transactions touching the same document conflict.
fn claim() -> Document {
    doc! { "$inc": { "revision": 1 } }
}

fn in_id_order() -> FindOptions {
    FindOptions::builder().sort(doc! { "_id": 1 }).build()
}

fn in_election(election_id: Id) -> Document {
    doc! { "election_id": election_id }
}

fn to_document(value: &impl Serialize) -> Result<Document> {
    bson::to_document(value).map_err(|err| Error::Internal(format!("Unserialisable record: {err}")))
}

/// Errors a transaction can end with, some of which mean "just run it again".
trait TransactionError: Display {
    fn is_transient(&self) -> bool;
}

impl TransactionError for Error {
    fn is_transient(&self) -> bool {
        matches!(self, Error::Db(err) if is_transient_transaction_error(err))
    }
}

impl TransactionError for LedgerError {
    fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Other(err) if err.is_transient())
    }
}

fn should_retry(err: &impl TransactionError, started: Instant) -> bool {
    let retry = err.is_transient() && started.elapsed() < TRANSACTION_RETRY_WINDOW;
    if retry {
        debug!("Rerunning transaction: {err}");
    }
    retry
}

#[rocket::async_trait]
impl ElectionStore for MongoStore {
    async fn create_election(&self, election: NewElection) -> Result<Election> {
        let election = Election::new(election);
        self.elections.insert_one(&election, None).await?;
        Ok(election)
    }

    async fn election(&self, id: Id) -> Result<Election> {
        self.elections
            .find_one(id.as_doc(), None)
            .await?
            .ok_or_else(|| election_not_found(id))
    }

    async fn elections(&self) -> Result<Vec<Election>> {
        Ok(self
            .elections
            .find(None, in_id_order())
            .await?
            .try_collect()
            .await?)
    }

    async fn update_election(&self, id: Id, patch: ElectionPatch) -> Result<Election> {
        loop {
            let current = self.election(id).await?;
            let updated = patch.clone().apply(current.election.clone())?;

            // Only write over the version the patch was applied to.
            let result = self
                .elections
                .update_one(to_document(&current)?, doc! { "$set": to_document(&updated)? }, None)
                .await?;
            if result.matched_count == 1 {
                return Ok(Election {
                    id,
                    election: updated,
                });
            }
            debug!("Election {id} changed while being patched, patching again");
        }
    }

    async fn delete_election(&self, id: Id) -> Result<()> {
        let started = Instant::now();
        loop {
            let mut session = self.transaction().await?;
            match self.cascade_delete(id, &mut session).await {
                Err(err) if should_retry(&err, started) => {}
                result => return result,
            }
        }
    }
}

#[rocket::async_trait]
impl CandidateStore for MongoStore {
    async fn create_candidate(&self, candidate: NewCandidate) -> Result<Candidate> {
        let candidate = Candidate::new(candidate);
        let started = Instant::now();
        loop {
            let mut session = self.transaction().await?;
            match self.insert_candidate(&candidate, &mut session).await {
                Err(err) if should_retry(&err, started) => {}
                result => return result.map(|()| candidate),
            }
        }
    }

    async fn candidate(&self, id: Id) -> Result<Candidate> {
        self.candidates
            .find_one(id.as_doc(), None)
            .await?
            .ok_or_else(|| candidate_not_found(id))
    }

    async fn candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self
            .candidates
            .find(None, in_id_order())
            .await?
            .try_collect()
            .await?)
    }

    async fn candidates_for(&self, election_id: Id) -> Result<Vec<Candidate>> {
        Ok(self
            .candidates
            .find(in_election(election_id), in_id_order())
            .await?
            .try_collect()
            .await?)
    }

    async fn update_candidate(&self, id: Id, patch: CandidatePatch) -> Result<Candidate> {
        loop {
            let current = self.candidate(id).await?;
            let updated = patch.clone().apply(current.candidate.clone())?;

            let result = self
                .candidates
                .update_one(to_document(&current)?, doc! { "$set": to_document(&updated)? }, None)
                .await?;
            if result.matched_count == 1 {
                return Ok(Candidate {
                    id,
                    candidate: updated,
                });
            }
            debug!("Candidate {id} changed while being patched, patching again");
        }
    }

    async fn delete_candidate(&self, id: Id) -> Result<()> {
        let started = Instant::now();
        loop {
            let mut session = self.transaction().await?;
            match self.remove_candidate(id, &mut session).await {
                Err(err) if should_retry(&err, started) => {}
                result => return result,
            }
        }
    }
}

#[rocket::async_trait]
impl VoteLedger for MongoStore {
    async fn exists(&self, election_id: Id, voter_id: Id) -> Result<bool> {
        Ok(self.find(election_id, voter_id).await?.is_some())
    }

    async fn find(&self, election_id: Id, voter_id: Id) -> Result<Option<Vote>> {
        let filter = doc! {
            "election_id": election_id,
            "voter_id": voter_id,
        };
        Ok(self.votes.find_one(filter, None).await?)
    }

    async fn insert(&self, vote: NewVote) -> std::result::Result<Vote, LedgerError> {
        let vote = Vote::new(vote);
        let started = Instant::now();
        loop {
            let mut session = self.transaction().await?;
            match self.insert_vote(&vote, &mut session).await {
                Err(err) if should_retry(&err, started) => {}
                result => return result.map(|()| vote),
            }
        }
    }

    async fn tally(&self, election_id: Id) -> Result<HashMap<Id, u64>> {
        let pipeline = [
            doc! { "$match": in_election(election_id) },
            doc! { "$group": { "_id": "$candidate_id", "count": { "$sum": 1 } } },
        ];
        let mut rows = self.votes.aggregate(pipeline, None).await?;

        let mut counts = HashMap::new();
        while let Some(row) = rows.try_next().await? {
            let candidate_id = row
                .get_object_id("_id")
                .map_err(|err| Error::Internal(format!("Malformed tally row: {err}")))?;
            // `$sum` yields the narrowest integer type that fits.
            let count = match row.get("count") {
                Some(Bson::Int32(n)) => u64::try_from(*n).ok(),
                Some(Bson::Int64(n)) => u64::try_from(*n).ok(),
                _ => None,
            }
            .ok_or_else(|| Error::Internal(format!("Malformed tally count: {row}")))?;
            counts.insert(candidate_id.into(), count);
        }
        Ok(counts)
    }

    async fn count(&self, election_id: Id) -> Result<u64> {
        Ok(self
            .votes
            .count_documents(in_election(election_id), None)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::model::db::{db_time, CandidateCore, ElectionCore};
    use crate::store::Store;

    fn vote(election_id: Id, candidate_id: Id, voter_id: Id) -> NewVote {
        NewVote {
            election_id,
            candidate_id,
            voter_id,
            timestamp: db_time(Utc::now()),
        }
    }

    async fn election_with_candidates(store: &Store, names: &[&str]) -> (Election, Vec<Candidate>) {
        let election = store
            .elections
            .create_election(ElectionCore::current_example(Utc::now()))
            .await
            .unwrap();
        let mut candidates = Vec::new();
        for name in names {
            let candidate = store
                .candidates
                .create_candidate(CandidateCore::example(election.id, name))
                .await
                .unwrap();
            candidates.push(candidate);
        }
        (election, candidates)
    }

    #[backend_test]
    async fn unique_index_refuses_second_vote(store: Store) {
        let (election, candidates) = election_with_candidates(&store, &["Asha", "Ben"]).await;
        let voter = Id::new();

        let first = store
            .votes
            .insert(vote(election.id, candidates[0].id, voter))
            .await
            .unwrap();
        let second = store
            .votes
            .insert(vote(election.id, candidates[1].id, voter))
            .await;
        assert!(matches!(second, Err(LedgerError::DuplicateVote)));

        let found = store.votes.find(election.id, voter).await.unwrap();
        assert_eq!(found, Some(first));
        assert_eq!(store.votes.count(election.id).await.unwrap(), 1);
    }

    #[backend_test]
    async fn tally_groups_by_candidate(store: Store) {
        let (election, candidates) =
            election_with_candidates(&store, &["Asha", "Ben", "Chen"]).await;
        for candidate in [&candidates[0], &candidates[0], &candidates[1]] {
            store
                .votes
                .insert(vote(election.id, candidate.id, Id::new()))
                .await
                .unwrap();
        }

        let tally = store.votes.tally(election.id).await.unwrap();
        assert_eq!(tally.len(), 2);
        assert_eq!(tally[&candidates[0].id], 2);
        assert_eq!(tally[&candidates[1].id], 1);
        assert!(!tally.contains_key(&candidates[2].id));
    }

    #[backend_test]
    async fn delete_election_cascades(store: Store, db: Database) {
        let (election, candidates) = election_with_candidates(&store, &["Asha"]).await;
        let (other, _) = election_with_candidates(&store, &["Ben"]).await;
        store
            .votes
            .insert(vote(election.id, candidates[0].id, Id::new()))
            .await
            .unwrap();

        store.elections.delete_election(election.id).await.unwrap();

        assert!(matches!(
            store.elections.election(election.id).await,
            Err(Error::NotFound(_))
        ));
        let left = Coll::<Candidate>::from_db(&db)
            .count_documents(in_election(election.id), None)
            .await
            .unwrap();
        assert_eq!(left, 0);
        assert_eq!(store.votes.count(election.id).await.unwrap(), 0);
        assert_eq!(store.candidates.candidates_for(other.id).await.unwrap().len(), 1);
    }

    #[backend_test]
    async fn candidate_with_votes_cannot_be_deleted(store: Store) {
        let (election, candidates) = election_with_candidates(&store, &["Asha", "Ben"]).await;
        store
            .votes
            .insert(vote(election.id, candidates[0].id, Id::new()))
            .await
            .unwrap();

        let refused = store.candidates.delete_candidate(candidates[0].id).await;
        assert!(matches!(refused, Err(Error::Conflict(_))));
        store
            .candidates
            .delete_candidate(candidates[1].id)
            .await
            .unwrap();
        let remaining = store.candidates.candidates_for(election.id).await.unwrap();
        assert_eq!(remaining, vec![candidates[0].clone()]);
    }

    #[backend_test]
    async fn votes_for_deleted_records_are_refused(store: Store) {
        let (election, candidates) = election_with_candidates(&store, &["Asha", "Ben"]).await;

        store
            .candidates
            .delete_candidate(candidates[1].id)
            .await
            .unwrap();
        let result = store
            .votes
            .insert(vote(election.id, candidates[1].id, Id::new()))
            .await;
        assert!(matches!(
            result,
            Err(LedgerError::Other(Error::InvalidCandidate { .. }))
        ));

        store.elections.delete_election(election.id).await.unwrap();
        let result = store
            .votes
            .insert(vote(election.id, candidates[0].id, Id::new()))
            .await;
        assert!(matches!(result, Err(LedgerError::Other(Error::NotFound(_)))));
        assert_eq!(store.votes.count(election.id).await.unwrap(), 0);
    }

    #[backend_test]
    async fn vote_racing_a_cascade_leaves_nothing_behind(store: Store) {
        for _ in 0..10 {
            let (election, candidates) = election_with_candidates(&store, &["Asha"]).await;
            let (_, deleted) = rocket::tokio::join!(
                store
                    .votes
                    .insert(vote(election.id, candidates[0].id, Id::new())),
                store.elections.delete_election(election.id),
            );
            deleted.unwrap();
            assert_eq!(store.votes.count(election.id).await.unwrap(), 0);
        }
    }

    #[backend_test]
    async fn concurrent_patches_are_both_applied(store: Store) {
        let (election, candidates) = election_with_candidates(&store, &["Asha"]).await;

        let retitle = ElectionPatch {
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        let close = ElectionPatch {
            active: Some(false),
            ..Default::default()
        };
        let (retitled, closed) = rocket::tokio::join!(
            store.elections.update_election(election.id, retitle),
            store.elections.update_election(election.id, close),
        );
        retitled.unwrap();
        closed.unwrap();
        let stored = store.elections.election(election.id).await.unwrap();
        assert_eq!(stored.title, "Renamed");
        assert!(!stored.active);

        let clear_photo = CandidatePatch {
            photo: Some(None),
            ..Default::default()
        };
        let updated = store
            .candidates
            .update_candidate(candidates[0].id, clear_photo)
            .await
            .unwrap();
        assert_eq!(store.candidates.candidate(updated.id).await.unwrap(), updated);
    }

    #[backend_test]
    async fn candidate_needs_an_election(store: Store) {
        let missing = Id::new();
        let result = store
            .candidates
            .create_candidate(CandidateCore::example(missing, "Asha"))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
