use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::{is_open, ElectionState},
    mongodb::Id,
};

/// Core election data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ElectionCore {
    /// Election title.
    pub title: String,
    /// Free-text description.
    pub description: String,
    /// Voting opens at this time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub start_time: DateTime<Utc>,
    /// Voting closes after this time.
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub end_time: DateTime<Utc>,
    /// Admin kill-switch; an inactive election is closed whatever the time.
    pub active: bool,
}

impl ElectionCore {
    /// Can votes be cast at time `now`?
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        is_open(self.active, self.start_time, self.end_time, now)
    }

    /// The lifecycle state at time `now`.
    pub fn state(&self, now: DateTime<Utc>) -> ElectionState {
        ElectionState::at(self.active, self.start_time, self.end_time, now)
    }
}

/// An election without an ID.
pub type NewElection = ElectionCore;

/// An election from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    #[serde(flatten)]
    pub election: ElectionCore,
}

impl Election {
    /// Give a new election its ID.
    pub fn new(election: NewElection) -> Self {
        Self {
            id: Id::new(),
            election,
        }
    }
}

impl Deref for Election {
    type Target = ElectionCore;

    fn deref(&self) -> &Self::Target {
        &self.election
    }
}

impl DerefMut for Election {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.election
    }
}

/// Example data for tests.
#[cfg(test)]
pub mod examples {
    use chrono::Duration;

    use super::*;

    impl ElectionCore {
        /// Open from an hour before `now` until a day after.
        pub fn current_example(now: DateTime<Utc>) -> Self {
            Self {
                title: "Student Council 2026".to_string(),
                description: "Annual council election".to_string(),
                start_time: now - Duration::hours(1),
                end_time: now + Duration::days(1),
                active: true,
            }
        }

        /// Finished a day before `now`.
        pub fn past_example(now: DateTime<Utc>) -> Self {
            Self {
                title: "Sports Captain 2025".to_string(),
                description: "Closed last week".to_string(),
                start_time: now - Duration::days(7),
                end_time: now - Duration::days(1),
                active: true,
            }
        }

        /// Starts a day after `now`.
        pub fn future_example(now: DateTime<Utc>) -> Self {
            Self {
                title: "Hostel Secretary 2026".to_string(),
                description: String::new(),
                start_time: now + Duration::days(1),
                end_time: now + Duration::days(2),
                active: true,
            }
        }
    }
}
