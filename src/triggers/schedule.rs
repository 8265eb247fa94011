use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tracing::instrument;

use super::{Job, SharedDispatcher};
use crate::db::models::leaderboard::Period;
use crate::rollup::window::Calendar;
use crate::util::env::Env;

/// Full recomputes trail the boundary slightly so late writes stamped just before it land.
const RECOMPUTE_AFTER_BOUNDARY: TimeDelta = TimeDelta::seconds(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Fixed delay between the end of one run and the start of the next.
    Every(Duration),
    /// A period boundary shifted by a signed delta; negative fires before the boundary.
    Boundary { period: Period, shift: TimeDelta },
}

impl Schedule {
    /// First fire time strictly after `after`.
    pub fn next_fire(&self, calendar: &Calendar, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match *self {
            Schedule::Every(interval) => {
                after.checked_add_signed(TimeDelta::from_std(interval).ok()?)
            }
            Schedule::Boundary { period, shift } => {
                let boundary = calendar.next_boundary(period, after.checked_sub_signed(shift)?)?;
                boundary.checked_add_signed(shift)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledJob {
    pub schedule: Schedule,
    pub job: Job,
}

/// Periodic and boundary-aligned recomputes for every period, plus an announcement shortly
/// before each period closes.
pub fn default_jobs(recompute_interval: Duration, announce_lead: TimeDelta) -> Vec<ScheduledJob> {
    let mut jobs = Vec::new();
    for period in Period::ALL {
        jobs.push(ScheduledJob {
            schedule: Schedule::Every(recompute_interval),
            job: Job::Recompute(period),
        });
        jobs.push(ScheduledJob {
            schedule: Schedule::Boundary {
                period,
                shift: RECOMPUTE_AFTER_BOUNDARY,
            },
            job: Job::Recompute(period),
        });
        jobs.push(ScheduledJob {
            schedule: Schedule::Boundary {
                period,
                shift: -announce_lead,
            },
            job: Job::Announce {
                period,
                force: false,
            },
        });
    }

    jobs
}

pub fn jobs_from_env(env: &Env) -> Vec<ScheduledJob> {
    default_jobs(env.recompute_interval(), env.announce_lead())
}

/// Runs `scheduled` forever on its own task. Ticks never overlap; a failed run is logged and
/// the next tick proceeds as usual.
#[instrument(skip(dispatcher))]
pub async fn run(dispatcher: SharedDispatcher, scheduled: ScheduledJob) {
    loop {
        let now = Utc::now();
        let Some(next) = scheduled.schedule.next_fire(dispatcher.calendar(), now) else {
            tracing::error!("schedule has no further fire time, stopping");
            return;
        };

        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!(next_fire = %next, wait_secs = wait.as_secs(), "waiting for next tick");
        tokio::time::sleep(wait).await;

        match dispatcher.run(scheduled.job).await {
            Ok(outcome) => tracing::debug!(?outcome, "scheduled job finished"),
            Err(e) => tracing::error!(error = ?e, "scheduled job failed"),
        }
    }
}

pub fn spawn_all(dispatcher: SharedDispatcher, jobs: Vec<ScheduledJob>) -> Vec<JoinHandle<()>> {
    tracing::info!(jobs = jobs.len(), "starting scheduler");

    jobs.into_iter()
        .map(|scheduled| tokio::spawn(run(dispatcher.clone(), scheduled)))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::testing::at;
    use chrono::FixedOffset;

    fn announce_weekly(lead_secs: i64) -> Schedule {
        Schedule::Boundary {
            period: Period::Weekly,
            shift: TimeDelta::seconds(-lead_secs),
        }
    }

    #[test]
    fn test_announce_fires_before_week_ends() {
        let calendar = Calendar::default();

        let next = announce_weekly(60).next_fire(&calendar, at("2024-05-15T10:00:00Z"));
        assert_eq!(next, Some(at("2024-05-19T23:59:00Z")));

        // exactly at the fire time moves on to the following week
        let next = announce_weekly(60).next_fire(&calendar, at("2024-05-19T23:59:00Z"));
        assert_eq!(next, Some(at("2024-05-26T23:59:00Z")));

        // inside the lead, before the boundary itself
        let next = announce_weekly(60).next_fire(&calendar, at("2024-05-19T23:59:30Z"));
        assert_eq!(next, Some(at("2024-05-26T23:59:00Z")));
    }

    #[test]
    fn test_boundary_fire_honours_display_offset() {
        let offset = FixedOffset::east_opt(3 * 3600).unwrap();
        let calendar = Calendar::new(offset);

        let next = announce_weekly(60).next_fire(&calendar, at("2024-05-15T10:00:00Z"));
        assert_eq!(next, Some(at("2024-05-19T20:59:00Z")));

        let monthly = Schedule::Boundary {
            period: Period::Monthly,
            shift: RECOMPUTE_AFTER_BOUNDARY,
        };
        let next = monthly.next_fire(&calendar, at("2024-05-15T10:00:00Z"));
        assert_eq!(next, Some(at("2024-05-31T21:00:05Z")));
    }

    #[test]
    fn test_every_adds_interval() {
        let every = Schedule::Every(Duration::from_secs(600));
        assert_eq!(
            every.next_fire(&Calendar::default(), at("2024-05-15T10:00:00Z")),
            Some(at("2024-05-15T10:10:00Z"))
        );
    }

    #[test]
    fn test_default_jobs() {
        let jobs = default_jobs(Duration::from_secs(600), TimeDelta::seconds(60));
        assert_eq!(jobs.len(), 6);

        let announces: Vec<_> = jobs
            .iter()
            .filter(|j| matches!(j.job, Job::Announce { force: false, .. }))
            .collect();
        assert_eq!(announces.len(), 2);
        assert!(announces.iter().all(|j| matches!(
            j.schedule,
            Schedule::Boundary { shift, .. } if shift == TimeDelta::seconds(-60)
        )));
    }
}
