//! In-memory store doubles for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::{self, BoxStream};

use crate::db::models::leaderboard::{AnnouncedWinner, Period, RollupEntry};
use crate::db::models::solve::SolveEvent;
use crate::db::models::user::{Profile, ProfileRecord, UserId};
use crate::db::repositories::{LeaderboardStore, ProfileStore, Scope, SolveStore, WinnerStore};
use crate::db::{StoreError, StoreResult, Stores};
use crate::rollup::window::Window;

pub fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// Repositories borrow the pool for `'static`; the caller closes the original when done.
pub fn static_pool(pool: &sqlx::PgPool) -> &'static sqlx::PgPool {
    Box::leak(Box::new(pool.clone()))
}

pub fn solve(user: &str, score: i64, solved_at: &str) -> SolveEvent {
    SolveEvent::new(user, score, at(solved_at))
}

pub fn profile_record(username: &str, emoji: &str, is_premium: bool) -> ProfileRecord {
    ProfileRecord {
        username: Some(username.to_string()),
        email: None,
        emoji: Some(emoji.to_string()),
        is_premium: Some(is_premium),
    }
}

fn unavailable() -> StoreError {
    StoreError::SqlxError(sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
pub struct MemorySolves {
    events: Mutex<Vec<SolveEvent>>,
    unavailable: AtomicBool,
}

impl MemorySolves {
    pub fn push(&self, event: SolveEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl SolveStore for MemorySolves {
    fn scan(&self, scope: Scope, window: Window) -> BoxStream<'_, StoreResult<SolveEvent>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return stream::once(async { Err(unavailable()) }).boxed();
        }

        let matching: Vec<_> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| scope.user_id().is_none_or(|id| *id == e.user_id))
            .filter(|e| window.contains(e.solved_at))
            .cloned()
            .collect();

        stream::iter(matching.into_iter().map(Ok)).boxed()
    }
}

#[derive(Default)]
pub struct MemoryProfiles {
    records: Mutex<HashMap<UserId, ProfileRecord>>,
}

impl MemoryProfiles {
    pub fn set(&self, user: &str, record: ProfileRecord) {
        self.records.lock().unwrap().insert(user.into(), record);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfiles {
    async fn profile(&self, user_id: &UserId) -> StoreResult<Option<ProfileRecord>> {
        Ok(self.records.lock().unwrap().get(user_id).cloned())
    }
}

/// Keeps insertion order per period so ties surface in discovery order.
#[derive(Default)]
pub struct MemoryLeaderboards {
    periods: Mutex<HashMap<Period, Vec<RollupEntry>>>,
}

impl MemoryLeaderboards {
    pub fn snapshot(&self, period: Period) -> Vec<RollupEntry> {
        self.periods
            .lock()
            .unwrap()
            .get(&period)
            .cloned()
            .unwrap_or_default()
    }

    pub fn get(&self, period: Period, user: &str) -> Option<RollupEntry> {
        self.snapshot(period)
            .into_iter()
            .find(|e| e.user_id.as_str() == user)
    }

    pub fn seed(&self, entries: Vec<RollupEntry>) {
        let mut periods = self.periods.lock().unwrap();
        for entry in entries {
            periods.entry(entry.period).or_default().push(entry);
        }
    }
}

#[async_trait]
impl LeaderboardStore for MemoryLeaderboards {
    async fn replace_all(&self, period: Period, entries: &[RollupEntry]) -> StoreResult<()> {
        self.periods
            .lock()
            .unwrap()
            .insert(period, entries.to_vec());
        Ok(())
    }

    async fn upsert(&self, entry: &RollupEntry) -> StoreResult<()> {
        let mut periods = self.periods.lock().unwrap();
        let rows = periods.entry(entry.period).or_default();
        match rows.iter_mut().find(|e| e.user_id == entry.user_id) {
            Some(existing) => *existing = entry.clone(),
            None => rows.push(entry.clone()),
        }
        Ok(())
    }

    async fn remove(&self, period: Period, user_id: &UserId) -> StoreResult<bool> {
        let mut periods = self.periods.lock().unwrap();
        let rows = periods.entry(period).or_default();
        let before = rows.len();
        rows.retain(|e| e.user_id != *user_id);
        Ok(rows.len() != before)
    }

    async fn patch_display(
        &self,
        period: Period,
        user_id: &UserId,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut periods = self.periods.lock().unwrap();
        let entry = periods
            .get_mut(&period)
            .and_then(|rows| rows.iter_mut().find(|e| e.user_id == *user_id));

        match entry {
            Some(entry) => {
                entry.apply_profile(profile, now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn entries(&self, period: Period) -> StoreResult<Vec<RollupEntry>> {
        let mut entries = self.snapshot(period);
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(entries)
    }
}

#[derive(Default)]
pub struct MemoryWinners {
    winners: Mutex<HashMap<Period, AnnouncedWinner>>,
}

impl MemoryWinners {
    pub fn get(&self, period: Period) -> Option<AnnouncedWinner> {
        self.winners.lock().unwrap().get(&period).cloned()
    }
}

#[async_trait]
impl WinnerStore for MemoryWinners {
    async fn announce(&self, winner: &AnnouncedWinner) -> StoreResult<()> {
        self.winners
            .lock()
            .unwrap()
            .insert(winner.period, winner.clone());
        Ok(())
    }

    async fn winner(&self, period: Period) -> StoreResult<Option<AnnouncedWinner>> {
        Ok(self.get(period))
    }

    async fn patch_display_if_winner(
        &self,
        period: Period,
        user_id: &UserId,
        profile: &Profile,
    ) -> StoreResult<bool> {
        match self.winners.lock().unwrap().get_mut(&period) {
            Some(winner) if winner.user_id == *user_id => {
                winner.apply_profile(profile);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Typed handles to the doubles behind a [`Stores`].
#[derive(Default, Clone)]
pub struct MemoryBackend {
    pub solves: Arc<MemorySolves>,
    pub profiles: Arc<MemoryProfiles>,
    pub leaderboards: Arc<MemoryLeaderboards>,
    pub winners: Arc<MemoryWinners>,
}

impl MemoryBackend {
    pub fn stores(&self) -> Stores {
        Stores {
            solves: self.solves.clone(),
            profiles: self.profiles.clone(),
            leaderboards: self.leaderboards.clone(),
            winners: self.winners.clone(),
        }
    }
}
