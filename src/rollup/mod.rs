//! Windowed score rollups: scan solves, sum per user, materialize into the leaderboard store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use futures::{Stream, TryStreamExt};
use serde::Serialize;
use tracing::instrument;

use crate::db::prelude::*;
use window::{Calendar, Window};

pub mod window;

/// Per-user score sums in first-discovery order.
#[derive(Debug, Default, Clone)]
pub struct Tally {
    order: Vec<UserId>,
    totals: HashMap<UserId, i64>,
    scanned: usize,
}

impl Tally {
    /// Counts `event` towards its user's total when it falls inside `window`.
    pub fn observe(&mut self, event: &SolveEvent, window: &Window) {
        self.scanned += 1;
        if !window.contains(event.solved_at) {
            tracing::warn!(
                period = %window.period,
                user_id = %event.user_id,
                solved_at = %event.solved_at,
                "solve outside the requested window, skipped"
            );
            return;
        }

        match self.totals.get_mut(&event.user_id) {
            Some(total) => *total += event.score,
            None => {
                self.order.push(event.user_id.clone());
                self.totals.insert(event.user_id.clone(), event.score);
            }
        }
    }

    pub fn total(&self, user_id: &UserId) -> i64 {
        self.totals.get(user_id).copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Every event seen, including ones outside the window.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    /// Users with a positive total, in discovery order.
    pub fn scored(&self) -> impl Iterator<Item = (&UserId, i64)> {
        self.order
            .iter()
            .map(|id| (id, self.total(id)))
            .filter(|(_, total)| *total > 0)
    }
}

/// Sums the scores of `events` that fall inside `window`, grouped by user. The first failed
/// read aborts the whole aggregation.
pub async fn aggregate<S>(events: S, window: &Window) -> StoreResult<Tally>
where
    S: Stream<Item = StoreResult<SolveEvent>>,
{
    events
        .try_fold(Tally::default(), |mut tally, event| async move {
            tally.observe(&event, window);
            Ok(tally)
        })
        .await
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeSummary {
    pub period: Period,
    pub window_start: DateTime<Utc>,
    pub events_scanned: usize,
    pub entries_written: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRollup {
    pub period: Period,
    pub score: i64,
    /// `false` when the total was zero and the entry was removed instead.
    pub materialized: bool,
}

pub struct RollupEngine {
    stores: Stores,
    calendar: Calendar,
}

impl RollupEngine {
    pub fn new(stores: Stores, calendar: Calendar) -> Self {
        Self { stores, calendar }
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    async fn tally(&self, scope: Scope, window: Window) -> StoreResult<Tally> {
        aggregate(self.stores.solves.scan(scope, window), &window).await
    }

    /// Full-window recompute: rescans every user's solves in the current window of `period` and
    /// replaces the period's whole collection. An empty window still clears the collection.
    #[instrument(skip(self))]
    pub async fn recompute_window(
        &self,
        period: Period,
        now: DateTime<Utc>,
    ) -> StoreResult<RecomputeSummary> {
        let window = self.calendar.window(period, now);
        let tally = self.tally(Scope::AllUsers, window).await?;
        let events_scanned = tally.scanned();

        tracing::info!(
            %period,
            window_start = %window.start,
            events_scanned,
            users = tally.len(),
            "aggregated solves for window"
        );

        let mut entries = Vec::with_capacity(tally.len());
        for (user_id, score) in tally.scored() {
            let record = self.stores.profiles.profile(user_id).await?;
            entries.push(RollupEntry::new(
                period,
                user_id.clone(),
                score,
                Profile::resolve(record.as_ref()),
                window.start,
                now,
            ));
        }

        self.stores.leaderboards.replace_all(period, &entries).await?;

        tracing::info!(%period, entries = entries.len(), "leaderboard replaced");

        Ok(RecomputeSummary {
            period,
            window_start: window.start,
            events_scanned,
            entries_written: entries.len(),
        })
    }

    /// Incremental recompute for one user across every period. Only that user's entries are
    /// written; a zero total removes the entry.
    #[instrument(skip(self))]
    pub async fn recompute_user(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<UserRollup>> {
        let mut totals = Vec::with_capacity(Period::ALL.len());
        for period in Period::ALL {
            let window = self.calendar.window(period, now);
            let tally = self.tally(Scope::User(user_id.clone()), window).await?;
            totals.push((period, window, tally.total(user_id)));
        }

        let mut profile: Option<Profile> = None;
        let mut rollups = Vec::with_capacity(totals.len());
        for (period, window, score) in totals {
            if score <= 0 {
                let removed = self.stores.leaderboards.remove(period, user_id).await?;
                tracing::debug!(%period, %user_id, removed, "no positive total, entry dropped");
                rollups.push(UserRollup {
                    period,
                    score,
                    materialized: false,
                });
                continue;
            }

            let resolved = match &profile {
                Some(resolved) => resolved.clone(),
                None => {
                    let record = self.stores.profiles.profile(user_id).await?;
                    let resolved = Profile::resolve(record.as_ref());
                    profile = Some(resolved.clone());
                    resolved
                }
            };

            let entry = RollupEntry::new(period, user_id.clone(), score, resolved, window.start, now);
            self.stores.leaderboards.upsert(&entry).await?;

            tracing::debug!(%period, %user_id, score, "entry upserted");
            rollups.push(UserRollup {
                period,
                score,
                materialized: true,
            });
        }

        Ok(rollups)
    }
}

#[cfg(test)]
mod test {
    use futures::stream;

    use super::*;
    use crate::db::testing::*;

    const NOW: &str = "2024-05-17T12:00:00Z"; // Friday

    fn engine(backend: &MemoryBackend) -> RollupEngine {
        RollupEngine::new(backend.stores(), Calendar::default())
    }

    fn scores(entries: &[RollupEntry]) -> Vec<(String, i64)> {
        let mut scores: Vec<_> = entries
            .iter()
            .map(|e| (e.user_id.to_string(), e.score))
            .collect();
        scores.sort();
        scores
    }

    #[tokio::test]
    async fn test_aggregate_respects_window_bounds() {
        let window = Calendar::default().window(Period::Weekly, at(NOW));
        let events = vec![
            solve("u1", 100, "2024-05-12T23:59:59Z"), // previous Sunday
            solve("u1", 10, "2024-05-13T00:00:00Z"),  // boundary, included
            solve("u2", 7, "2024-05-19T23:59:59Z"),
            solve("u2", 50, "2024-05-20T00:00:00Z"), // next window
            solve("u3", 0, "2024-05-14T00:00:00Z"),
        ];

        let tally = aggregate(stream::iter(events.into_iter().map(Ok)), &window)
            .await
            .unwrap();
        assert_eq!(tally.total(&"u1".into()), 10);
        assert_eq!(tally.total(&"u2".into()), 7);
        assert_eq!(tally.len(), 3);
        assert_eq!(tally.scanned(), 5);

        let scored: Vec<_> = tally.scored().map(|(id, s)| (id.to_string(), s)).collect();
        assert_eq!(scored, vec![("u1".to_string(), 10), ("u2".to_string(), 7)]);
    }

    #[tokio::test]
    async fn test_aggregate_stops_on_failed_read() {
        let window = Calendar::default().window(Period::Weekly, at(NOW));
        let events = vec![
            Ok(solve("u1", 10, "2024-05-13T09:00:00Z")),
            Err(StoreError::SqlxError(sqlx::Error::PoolTimedOut)),
            Ok(solve("u1", 10, "2024-05-14T09:00:00Z")),
        ];

        let result = aggregate(stream::iter(events), &window).await;
        assert!(matches!(result, Err(StoreError::SqlxError(_))));
    }

    #[tokio::test]
    async fn test_full_recompute_scenario_then_incremental() {
        let backend = MemoryBackend::default();
        backend.solves.push(solve("u1", 10, "2024-05-13T09:00:00Z")); // Mon
        backend.solves.push(solve("u1", 20, "2024-05-15T09:00:00Z")); // Wed
        backend.solves.push(solve("u2", 5, "2024-05-14T09:00:00Z")); // Tue
        backend.profiles.set("u1", profile_record("ayse", "🦉", true));

        let engine = engine(&backend);
        let summary = engine
            .recompute_window(Period::Weekly, at(NOW))
            .await
            .unwrap();
        assert_eq!(summary.events_scanned, 3);
        assert_eq!(summary.entries_written, 2);

        let weekly = backend.leaderboards.snapshot(Period::Weekly);
        assert_eq!(
            scores(&weekly),
            vec![("u1".to_string(), 30), ("u2".to_string(), 5)]
        );

        let u1 = backend.leaderboards.get(Period::Weekly, "u1").unwrap();
        assert_eq!(u1.display_name, "ayse");
        assert!(u1.is_premium);
        let u2_before = backend.leaderboards.get(Period::Weekly, "u2").unwrap();
        assert_eq!(u2_before.display_name, crate::db::models::user::DEFAULT_DISPLAY_NAME);

        backend.solves.push(solve("u1", 15, "2024-05-16T09:00:00Z")); // Thu
        let later = at("2024-05-17T13:00:00Z");
        engine.recompute_user(&"u1".into(), later).await.unwrap();

        let weekly = backend.leaderboards.snapshot(Period::Weekly);
        assert_eq!(
            scores(&weekly),
            vec![("u1".to_string(), 45), ("u2".to_string(), 5)]
        );
        assert_eq!(
            backend.leaderboards.get(Period::Weekly, "u2").unwrap(),
            u2_before
        );
    }

    #[tokio::test]
    async fn test_full_recompute_clears_stale_entries() {
        let backend = MemoryBackend::default();
        backend.solves.push(solve("u1", 10, "2024-05-06T09:00:00Z")); // last week

        let engine = engine(&backend);
        let stale = RollupEntry::new(
            Period::Weekly,
            "u1".into(),
            10,
            Profile::default(),
            at("2024-05-06T00:00:00Z"),
            at("2024-05-10T00:00:00Z"),
        );
        backend.leaderboards.seed(vec![stale]);

        let summary = engine
            .recompute_window(Period::Weekly, at(NOW))
            .await
            .unwrap();

        assert_eq!(summary.entries_written, 0);
        assert!(backend.leaderboards.snapshot(Period::Weekly).is_empty());
    }

    #[tokio::test]
    async fn test_scan_failure_leaves_collection_untouched() {
        let backend = MemoryBackend::default();
        backend.solves.push(solve("u1", 10, "2024-05-13T09:00:00Z"));

        let engine = engine(&backend);
        engine
            .recompute_window(Period::Weekly, at(NOW))
            .await
            .unwrap();

        backend.solves.set_unavailable(true);
        let result = engine.recompute_window(Period::Weekly, at(NOW)).await;

        assert!(matches!(result, Err(StoreError::SqlxError(_))));
        assert_eq!(
            scores(&backend.leaderboards.snapshot(Period::Weekly)),
            vec![("u1".to_string(), 10)]
        );
    }

    #[tokio::test]
    async fn test_incremental_recompute_updates_both_periods() {
        let backend = MemoryBackend::default();
        backend.solves.push(solve("u1", 40, "2024-05-02T09:00:00Z")); // earlier this month
        backend.solves.push(solve("u1", 2, "2024-05-16T09:00:00Z"));

        let rollups = engine(&backend)
            .recompute_user(&"u1".into(), at(NOW))
            .await
            .unwrap();

        assert_eq!(rollups.len(), 2);
        assert_eq!(
            backend.leaderboards.get(Period::Weekly, "u1").unwrap().score,
            2
        );
        assert_eq!(
            backend.leaderboards.get(Period::Monthly, "u1").unwrap().score,
            42
        );
        assert_eq!(
            backend
                .leaderboards
                .get(Period::Monthly, "u1")
                .unwrap()
                .window_start,
            at("2024-05-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_incremental_recompute_drops_zero_total() {
        let backend = MemoryBackend::default();
        backend.leaderboards.seed(vec![
            RollupEntry::new(
                Period::Weekly,
                "u1".into(),
                10,
                Profile::default(),
                at("2024-05-13T00:00:00Z"),
                at("2024-05-14T00:00:00Z"),
            ),
            RollupEntry::new(
                Period::Weekly,
                "u2".into(),
                3,
                Profile::default(),
                at("2024-05-13T00:00:00Z"),
                at("2024-05-14T00:00:00Z"),
            ),
        ]);

        // u1's only solve was deleted from the record store
        let rollups = engine(&backend)
            .recompute_user(&"u1".into(), at(NOW))
            .await
            .unwrap();

        assert!(rollups.iter().all(|r| !r.materialized));
        assert!(backend.leaderboards.get(Period::Weekly, "u1").is_none());
        assert_eq!(
            backend.leaderboards.get(Period::Weekly, "u2").unwrap().score,
            3
        );
    }

    #[tokio::test]
    async fn test_negative_totals_never_materialize() {
        let backend = MemoryBackend::default();
        backend.solves.push(solve("u1", -4, "2024-05-13T09:00:00Z"));
        backend.solves.push(solve("u2", 6, "2024-05-13T09:00:00Z"));

        let engine = engine(&backend);
        let summary = engine
            .recompute_window(Period::Weekly, at(NOW))
            .await
            .unwrap();
        assert_eq!(summary.entries_written, 1);
        assert!(backend.leaderboards.get(Period::Weekly, "u1").is_none());

        let rollups = engine.recompute_user(&"u1".into(), at(NOW)).await.unwrap();
        assert!(rollups.iter().all(|r| !r.materialized));
        assert!(backend.leaderboards.get(Period::Weekly, "u1").is_none());
    }
}
