//! What to write back for a job given the host's current view of it.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::db::shared_link_repo::SharedLink;
use crate::share::{ShareState, ShareStatus};

/// The write a worker performs for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The host has been `created` for too long: fail the job, touching
    /// nothing but its state.
    AgeOut,
    /// Overwrite the job with the host's view.
    Apply,
    /// Leave the job as it is, only moving it past the scan cursor.
    Heartbeat,
}

/// Decides the transition for `job`, in priority order:
///
/// 1. host reports `created` and the job was created more than `age_out`
///    before `now` → [`Transition::AgeOut`]
/// 2. host reports `ok` or `created` → [`Transition::Apply`]
/// 3. anything else → [`Transition::Heartbeat`]
pub fn decide(
    job: &SharedLink,
    status: &ShareStatus,
    now: DateTime<Utc>,
    age_out: Duration,
) -> Transition {
    match status.state {
        ShareState::Created if is_older_than(job.created_at, now, age_out) => Transition::AgeOut,
        ShareState::Ok | ShareState::Created => Transition::Apply,
        ShareState::Pending | ShareState::Error => Transition::Heartbeat,
    }
}

fn is_older_than(created_at: DateTime<Utc>, now: DateTime<Utc>, age: Duration) -> bool {
    match (now - created_at).to_std() {
        Ok(elapsed) => elapsed > age,
        // Created in the future (clock skew): not old.
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    const AGE_OUT: Duration = Duration::from_secs(48 * 60 * 60);

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-10T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn job(state: ShareState, created_at: DateTime<Utc>) -> SharedLink {
        SharedLink {
            auto_id: 1,
            user_id: "user-1".to_string(),
            state,
            host: "pikpak".to_string(),
            created_by: "api".to_string(),
            created_at,
            updated_at: created_at,
            size: 0,
            visitor: 0,
            stored: 0,
            last_visited_at: created_at,
            last_stored_at: created_at,
            revenue: 0,
            title: String::new(),
            original_link_hash: String::new(),
            host_shared_link_hash: String::new(),
            original_link: "https://src.example/a".to_string(),
            host_shared_link: String::new(),
            error: None,
        }
    }

    fn status(state: ShareState) -> ShareStatus {
        ShareStatus {
            state,
            created_by: String::new(),
            size: 0,
            visitor: 0,
            stored: 0,
            revenue: 0,
            title: String::new(),
            created_at: now(),
            host_shared_link: String::new(),
        }
    }

    #[test]
    fn test_created_within_age_is_applied() {
        let job = job(ShareState::Pending, now() - TimeDelta::hours(47));
        assert_eq!(
            decide(&job, &status(ShareState::Created), now(), AGE_OUT),
            Transition::Apply
        );
    }

    #[test]
    fn test_created_past_age_is_aged_out() {
        for from in ShareState::RECONCILABLE {
            let job = job(from, now() - TimeDelta::hours(49));
            assert_eq!(
                decide(&job, &status(ShareState::Created), now(), AGE_OUT),
                Transition::AgeOut
            );
        }
    }

    #[test]
    fn test_exactly_at_age_is_not_aged_out() {
        let job = job(ShareState::Created, now() - TimeDelta::hours(48));
        assert_eq!(
            decide(&job, &status(ShareState::Created), now(), AGE_OUT),
            Transition::Apply
        );
    }

    #[test]
    fn test_ok_is_applied_regardless_of_age() {
        let job = job(ShareState::Created, now() - TimeDelta::hours(100));
        assert_eq!(
            decide(&job, &status(ShareState::Ok), now(), AGE_OUT),
            Transition::Apply
        );
    }

    #[test]
    fn test_other_states_heartbeat() {
        let old = job(ShareState::Created, now() - TimeDelta::hours(100));
        let young = job(ShareState::Pending, now() - TimeDelta::minutes(1));
        for reported in [ShareState::Pending, ShareState::Error] {
            assert_eq!(
                decide(&old, &status(reported), now(), AGE_OUT),
                Transition::Heartbeat
            );
            assert_eq!(
                decide(&young, &status(reported), now(), AGE_OUT),
                Transition::Heartbeat
            );
        }
    }

    #[test]
    fn test_future_created_at_is_not_aged_out() {
        let job = job(ShareState::Created, now() + TimeDelta::hours(1));
        assert_eq!(
            decide(&job, &status(ShareState::Created), now(), AGE_OUT),
            Transition::Apply
        );
    }
}
