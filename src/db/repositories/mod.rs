use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use sqlx::{Pool, Postgres, Result as SqlxResult, Transaction};
use tracing::instrument;

use crate::db::models::leaderboard::{AnnouncedWinner, Period, RollupEntry};
use crate::db::models::solve::SolveEvent;
use crate::db::models::user::{Profile, ProfileRecord, UserId};
use crate::db::StoreResult;
use crate::rollup::window::Window;

pub mod leaderboard;
pub mod profile;
pub mod solve;
pub mod winner;

/// Which partitions of the record store a scan covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Cross-user scan over every user's solves.
    AllUsers,
    User(UserId),
}

impl Scope {
    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Scope::AllUsers => None,
            Scope::User(id) => Some(id),
        }
    }
}

/// Read side of the solve record store.
pub trait SolveStore: Send + Sync {
    /// Lazily yields every solve in `scope` whose timestamp falls inside `window`. The stream is
    /// finite and cannot be resumed once dropped.
    fn scan(&self, scope: Scope, window: Window) -> BoxStream<'_, StoreResult<SolveEvent>>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// `Ok(None)` when the user has no profile document.
    async fn profile(&self, user_id: &UserId) -> StoreResult<Option<ProfileRecord>>;
}

/// The materialized per-period leaderboard collections.
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Deletes every entry of `period` and writes `entries` in their place.
    async fn replace_all(&self, period: Period, entries: &[RollupEntry]) -> StoreResult<()>;

    /// Inserts or fully overwrites a single user's entry, leaving all other entries untouched.
    async fn upsert(&self, entry: &RollupEntry) -> StoreResult<()>;

    /// Returns whether an entry existed.
    async fn remove(&self, period: Period, user_id: &UserId) -> StoreResult<bool>;

    /// Overwrites the display fields of an existing entry. Never creates one and never touches
    /// the score. Returns whether an entry was patched.
    async fn patch_display(
        &self,
        period: Period,
        user_id: &UserId,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Entries of `period`, highest score first.
    async fn entries(&self, period: Period) -> StoreResult<Vec<RollupEntry>>;
}

/// Singleton announced winner per period.
#[async_trait]
pub trait WinnerStore: Send + Sync {
    async fn announce(&self, winner: &AnnouncedWinner) -> StoreResult<()>;

    async fn winner(&self, period: Period) -> StoreResult<Option<AnnouncedWinner>>;

    /// Patches display fields only when `user_id` is the current winner of `period`.
    async fn patch_display_if_winner(
        &self,
        period: Period,
        user_id: &UserId,
        profile: &Profile,
    ) -> StoreResult<bool>;
}

pub struct Tx<'a> {
    inner: Option<Transaction<'a, Postgres>>,
}

impl<'a> Tx<'a> {
    /// Runs `f` inside a transaction, committing only if it returns `Ok`. Dropping an uncommitted
    /// transaction rolls it back.
    #[instrument(skip(pool, f))]
    pub async fn with_tx<F, Fut, T>(pool: &'a Pool<Postgres>, f: F) -> SqlxResult<T>
    where
        F: FnOnce(Tx<'a>) -> Fut,
        Fut: Future<Output = (Tx<'a>, SqlxResult<T>)>,
    {
        let tx = Self::begin(pool).await?;
        let (mut tx, result) = f(tx).await;

        match result {
            Ok(val) => {
                tx.commit().await?;
                Ok(val)
            }
            Err(e) => {
                tracing::warn!(error = ?e, "transacted query failure, rolling back");
                Err(e)
            }
        }
    }

    #[instrument(skip(pool))]
    pub async fn begin(pool: &'a Pool<Postgres>) -> SqlxResult<Self> {
        let inner = pool.begin().await?;
        Ok(Self { inner: Some(inner) })
    }

    #[instrument(skip(self))]
    pub async fn commit(&mut self) -> SqlxResult<()> {
        if let Some(tx) = self.inner.take() {
            tx.commit().await
        } else {
            Err(sqlx::Error::Protocol(
                "Transaction already completed".into(),
            ))
        }
    }

    fn inner_mut(&mut self) -> SqlxResult<&mut Transaction<'a, Postgres>> {
        self.inner
            .as_mut()
            .ok_or_else(|| sqlx::Error::Protocol("Transaction already completed".into()))
    }

    #[instrument(skip(self))]
    pub async fn clear_period(&mut self, period: Period) -> SqlxResult<u64> {
        let res = sqlx::query("DELETE FROM leaderboard_entry WHERE period = $1")
            .bind(period.as_str())
            .execute(&mut **self.inner_mut()?)
            .await?;

        Ok(res.rows_affected())
    }

    #[instrument(skip(self, entry), fields(period = %entry.period, user_id = %entry.user_id))]
    pub async fn upsert_entry(&mut self, entry: &RollupEntry) -> SqlxResult<()> {
        sqlx::query(sql_fragment::UPSERT_ENTRY)
            .bind(entry.period.as_str())
            .bind(&entry.user_id)
            .bind(entry.score)
            .bind(&entry.display_name)
            .bind(&entry.emoji)
            .bind(entry.is_premium)
            .bind(entry.window_start)
            .bind(entry.last_updated)
            .execute(&mut **self.inner_mut()?)
            .await?;

        Ok(())
    }
}

pub mod sql_fragment {
    pub const ENTRY_FIELDS: &str = r#"
        user_id,
        score,
        display_name,
        emoji,
        is_premium,
        window_start,
        last_updated
    "#;

    pub const WINNER_FIELDS: &str = r#"
        user_id,
        display_name,
        emoji,
        score,
        is_premium,
        window_start,
        announced_at
    "#;

    pub const UPSERT_ENTRY: &str = r#"
        INSERT INTO leaderboard_entry (
            period,
            user_id,
            score,
            display_name,
            emoji,
            is_premium,
            window_start,
            last_updated
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (period, user_id)
        DO UPDATE SET
            score = EXCLUDED.score,
            display_name = EXCLUDED.display_name,
            emoji = EXCLUDED.emoji,
            is_premium = EXCLUDED.is_premium,
            window_start = EXCLUDED.window_start,
            last_updated = EXCLUDED.last_updated
    "#;
}
