use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// States in the Election lifecycle.
///
/// These are never stored: they follow from the clock and the active flag,
/// so they are worked out again every time they are needed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElectionState {
    /// Voting has not started yet.
    Scheduled,
    /// Votes are being accepted.
    Open,
    /// The voting window has passed, or an admin switched the election off.
    Closed,
}

impl ElectionState {
    /// Work out the state of an election with the given window and active
    /// flag at time `now`. Both ends of the window are inclusive.
    pub fn at(
        active: bool,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        if !active || now > end_time {
            Self::Closed
        } else if now < start_time {
            Self::Scheduled
        } else {
            Self::Open
        }
    }
}

/// Whether votes may be cast at time `now`.
pub fn is_open(
    active: bool,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    ElectionState::at(active, start_time, end_time, now) == ElectionState::Open
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        (start, start + Duration::hours(8))
    }

    #[test]
    fn closed_before_start() {
        let (start, end) = window();
        let now = start - Duration::seconds(1);
        assert!(!is_open(true, start, end, now));
        assert_eq!(ElectionState::at(true, start, end, now), ElectionState::Scheduled);
    }

    #[test]
    fn open_within_window_inclusive() {
        let (start, end) = window();
        for now in [start, start + Duration::hours(4), end] {
            assert!(is_open(true, start, end, now), "{now}");
        }
    }

    #[test]
    fn closed_after_end() {
        let (start, end) = window();
        let now = end + Duration::milliseconds(1);
        assert!(!is_open(true, start, end, now));
        assert_eq!(ElectionState::at(true, start, end, now), ElectionState::Closed);
    }

    #[test]
    fn inactive_is_always_closed() {
        let (start, end) = window();
        for now in [start - Duration::days(1), start, end, end + Duration::days(1)] {
            assert!(!is_open(false, start, end, now));
            assert_eq!(ElectionState::at(false, start, end, now), ElectionState::Closed);
        }
    }
}
