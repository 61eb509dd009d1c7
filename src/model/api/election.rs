use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    api::{candidate::CandidateDescription, id::ApiId},
    common::ElectionState,
    db::{db_time, Election, ElectionCore, NewElection},
};

/// An election specification, as submitted by an admin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    /// Election title.
    pub title: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Voting opens at this time.
    pub start_time: DateTime<Utc>,
    /// Voting closes after this time.
    pub end_time: DateTime<Utc>,
    /// Whether the election is switched on. Defaults to true.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl ElectionSpec {
    /// Validate this spec and convert it into a storable election.
    pub fn into_election(self) -> Result<NewElection> {
        let election = NewElection {
            title: self.title,
            description: self.description,
            start_time: db_time(self.start_time),
            end_time: db_time(self.end_time),
            active: self.active,
        };
        validate(&election)?;
        Ok(election)
    }
}

/// A partial update to an election; absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElectionPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

impl ElectionPatch {
    /// Apply this patch to an existing election, checking that the result is
    /// still a valid election.
    pub fn apply(self, mut election: ElectionCore) -> Result<ElectionCore> {
        if let Some(title) = self.title {
            election.title = title;
        }
        if let Some(description) = self.description {
            election.description = description;
        }
        if let Some(start_time) = self.start_time {
            election.start_time = db_time(start_time);
        }
        if let Some(end_time) = self.end_time {
            election.end_time = db_time(end_time);
        }
        if let Some(active) = self.active {
            election.active = active;
        }
        validate(&election)?;
        Ok(election)
    }
}

fn validate(election: &ElectionCore) -> Result<()> {
    if election.title.trim().is_empty() {
        return Err(Error::BadRequest("Election title must not be empty".to_string()));
    }
    if election.start_time >= election.end_time {
        return Err(Error::BadRequest(format!(
            "Election must start before it ends (start {}, end {})",
            election.start_time, election.end_time
        )));
    }
    Ok(())
}

/// An API-friendly election description, as seen by a particular principal
/// at a particular time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionDescription {
    /// Election unique ID.
    pub id: ApiId,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub active: bool,
    /// Whether votes are accepted right now.
    pub is_open: bool,
    /// Lifecycle state right now.
    pub state: ElectionState,
    /// Candidates standing, with their current vote counts.
    pub candidates: Vec<CandidateDescription>,
    /// Whether the requesting principal has already voted.
    pub has_voted: bool,
}

impl ElectionDescription {
    pub fn new(
        election: Election,
        now: DateTime<Utc>,
        candidates: Vec<CandidateDescription>,
        has_voted: bool,
    ) -> Self {
        let is_open = election.is_open(now);
        let state = election.state(now);
        Self {
            id: election.id.into(),
            title: election.election.title,
            description: election.election.description,
            start_time: election.election.start_time,
            end_time: election.election.end_time,
            active: election.election.active,
            is_open,
            state,
            candidates,
            has_voted,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use mongodb::bson;
    use rocket::serde::json::{json, serde_json};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn spec_defaults_to_active() {
        let spec: ElectionSpec = serde_json::from_value(json!({
            "title": "Council",
            "start_time": "2026-03-01T09:00:00Z",
            "end_time": "2026-03-03T17:00:00Z",
        }))
        .unwrap();
        let election = spec.into_election().unwrap();
        assert!(election.active);
        assert!(election.description.is_empty());
    }

    #[test]
    fn spec_must_start_before_end() {
        let spec = ElectionSpec {
            title: "Backwards".to_string(),
            description: String::new(),
            start_time: now(),
            end_time: now(),
            active: true,
        };
        assert!(matches!(spec.into_election(), Err(Error::BadRequest(_))));
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let original = ElectionCore::current_example(now());
        let patch = ElectionPatch {
            active: Some(false),
            ..Default::default()
        };
        let patched = patch.apply(original.clone()).unwrap();
        assert!(!patched.active);
        assert_eq!(patched.title, original.title);
        assert_eq!(patched.start_time, original.start_time);
    }

    #[test]
    fn times_are_kept_to_the_millisecond() {
        let start = now() + Duration::nanoseconds(1_234_567);
        let spec = ElectionSpec {
            title: "Council".to_string(),
            description: String::new(),
            start_time: start,
            end_time: start + Duration::days(1),
            active: true,
        };
        let election = spec.into_election().unwrap();
        assert_eq!(election.start_time, now() + Duration::milliseconds(1));

        let patch = ElectionPatch {
            end_time: Some(start + Duration::days(2)),
            ..Default::default()
        };
        let patched = patch.apply(election).unwrap();
        assert_eq!(patched.end_time, now() + Duration::days(2) + Duration::milliseconds(1));

        let stored = Election::new(patched);
        let read_back: Election =
            bson::from_document(bson::to_document(&stored).unwrap()).unwrap();
        assert_eq!(read_back, stored);
    }

    #[test]
    fn patch_cannot_invert_window() {
        let original = ElectionCore::current_example(now());
        let patch = ElectionPatch {
            end_time: Some(original.start_time - Duration::hours(1)),
            ..Default::default()
        };
        assert!(matches!(patch.apply(original), Err(Error::BadRequest(_))));
    }

    #[test]
    fn description_derives_state_from_now() {
        let election = Election::new(ElectionCore::future_example(now()));
        let desc = ElectionDescription::new(election.clone(), now(), Vec::new(), false);
        assert!(!desc.is_open);
        assert_eq!(desc.state, ElectionState::Scheduled);

        let later = election.start_time + Duration::minutes(1);
        let desc = ElectionDescription::new(election, later, Vec::new(), false);
        assert!(desc.is_open);
        assert_eq!(desc.state, ElectionState::Open);
    }
}
