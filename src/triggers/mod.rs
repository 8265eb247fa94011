//! Bindings from outside stimuli (change events, clock ticks, operator commands) to the jobs.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::announcer::{Announcement, WinnerAnnouncer};
use crate::db::prelude::*;
use crate::propagator::{Propagation, ProfilePropagator};
use crate::rollup::window::Calendar;
use crate::rollup::{RecomputeSummary, RollupEngine, UserRollup};

pub mod schedule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// A document change notification carrying the before and after images when they exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent<T> {
    pub user_id: UserId,
    pub change_kind: ChangeKind,
    pub before_data: Option<T>,
    pub after_data: Option<T>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    Recompute(Period),
    Announce { period: Period, force: bool },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "job", rename_all = "camelCase")]
pub enum JobOutcome {
    Recompute(RecomputeSummary),
    Announce { winner: Option<AnnouncedWinner>, fresh: bool },
}

impl From<Announcement> for JobOutcome {
    fn from(value: Announcement) -> Self {
        match value {
            Announcement::Announced(winner) => JobOutcome::Announce {
                winner: Some(winner),
                fresh: true,
            },
            Announcement::AlreadyAnnounced(winner) => JobOutcome::Announce {
                winner: Some(winner),
                fresh: false,
            },
            Announcement::NoEntries => JobOutcome::Announce {
                winner: None,
                fresh: false,
            },
        }
    }
}

/// Single entry point every adapter goes through. Each call is an independent invocation that
/// reads the wall clock once.
pub struct Dispatcher {
    engine: RollupEngine,
    announcer: WinnerAnnouncer,
    propagator: ProfilePropagator,
}

pub type SharedDispatcher = Arc<Dispatcher>;

impl Dispatcher {
    pub fn new(stores: Stores, calendar: Calendar) -> Self {
        Self {
            engine: RollupEngine::new(stores.clone(), calendar),
            announcer: WinnerAnnouncer::new(stores.clone(), calendar),
            propagator: ProfilePropagator::new(stores),
        }
    }

    pub fn calendar(&self) -> &Calendar {
        self.engine.calendar()
    }

    #[instrument(skip(self))]
    pub async fn run(&self, job: Job) -> StoreResult<JobOutcome> {
        let now = Utc::now();
        match job {
            Job::Recompute(period) => Ok(JobOutcome::Recompute(
                self.engine.recompute_window(period, now).await?,
            )),
            Job::Announce { period, force } => {
                Ok(self.announcer.announce(period, now, force).await?.into())
            }
        }
    }

    /// Any write to a user's solves, including deletion, re-derives that user's totals.
    #[instrument(skip(self, change), fields(user_id = %change.user_id, kind = ?change.change_kind))]
    pub async fn on_solve_change(
        &self,
        change: &ChangeEvent<SolveEvent>,
    ) -> StoreResult<Vec<UserRollup>> {
        self.engine.recompute_user(&change.user_id, Utc::now()).await
    }

    pub async fn on_profile_change(
        &self,
        change: &ChangeEvent<ProfileRecord>,
    ) -> StoreResult<Propagation> {
        self.propagator.propagate(change, Utc::now()).await
    }
}
