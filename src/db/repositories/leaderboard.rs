use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use tracing::instrument;

use super::{LeaderboardStore, Tx, sql_fragment};
use crate::db::StoreResult;
use crate::db::models::leaderboard::{EntryRow, Period, RollupEntry};
use crate::db::models::user::{Profile, UserId};

#[derive(Debug)]
pub struct LeaderboardRepository {
    pool: &'static Pool<Postgres>,
}

impl LeaderboardRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaderboardStore for LeaderboardRepository {
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn replace_all(&self, period: Period, entries: &[RollupEntry]) -> StoreResult<()> {
        let removed = Tx::with_tx(self.pool, |mut tx| async move {
            let result = async {
                let removed = tx.clear_period(period).await?;
                for entry in entries {
                    tx.upsert_entry(entry).await?;
                }

                Ok::<u64, sqlx::Error>(removed)
            }
            .await;

            (tx, result)
        })
        .await?;

        tracing::debug!(removed, written = entries.len(), "replaced leaderboard contents");

        Ok(())
    }

    #[instrument(skip(self, entry), fields(period = %entry.period, user_id = %entry.user_id))]
    async fn upsert(&self, entry: &RollupEntry) -> StoreResult<()> {
        sqlx::query(sql_fragment::UPSERT_ENTRY)
            .bind(entry.period.as_str())
            .bind(&entry.user_id)
            .bind(entry.score)
            .bind(&entry.display_name)
            .bind(&entry.emoji)
            .bind(entry.is_premium)
            .bind(entry.window_start)
            .bind(entry.last_updated)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, period: Period, user_id: &UserId) -> StoreResult<bool> {
        let res = sqlx::query("DELETE FROM leaderboard_entry WHERE period = $1 AND user_id = $2")
            .bind(period.as_str())
            .bind(user_id)
            .execute(self.pool)
            .await?;

        Ok(res.rows_affected() > 0)
    }

    #[instrument(skip(self, profile))]
    async fn patch_display(
        &self,
        period: Period,
        user_id: &UserId,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let res = sqlx::query(
            r#"
            UPDATE leaderboard_entry
            SET display_name = $3,
                emoji = $4,
                is_premium = $5,
                last_updated = $6
            WHERE period = $1
            AND user_id = $2
            "#,
        )
        .bind(period.as_str())
        .bind(user_id)
        .bind(&profile.display_name)
        .bind(&profile.emoji)
        .bind(profile.is_premium)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn entries(&self, period: Period) -> StoreResult<Vec<RollupEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {} FROM leaderboard_entry WHERE period = $1 ORDER BY score DESC",
            sql_fragment::ENTRY_FIELDS
        ))
        .bind(period.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.into_entry(period)).collect())
    }
}

#[cfg(test)]
mod test {
    use sqlx::PgPool;

    use super::*;
    use crate::db::testing::{at, static_pool};

    fn entry(period: Period, user: &str, score: i64) -> RollupEntry {
        RollupEntry::new(
            period,
            user.into(),
            score,
            Profile::default(),
            at("2024-05-13T00:00:00Z"),
            at("2024-05-14T00:00:00Z"),
        )
    }

    fn renamed() -> Profile {
        Profile {
            display_name: "ayse".into(),
            emoji: "🦉".into(),
            is_premium: true,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a postgres server"]
    async fn test_replace_all_clears_only_its_period(pool: PgPool) {
        let repo = LeaderboardRepository::new(static_pool(&pool));

        repo.replace_all(
            Period::Weekly,
            &[entry(Period::Weekly, "u1", 10), entry(Period::Weekly, "u2", 30)],
        )
        .await
        .unwrap();
        repo.upsert(&entry(Period::Monthly, "u1", 50)).await.unwrap();

        repo.replace_all(Period::Weekly, &[entry(Period::Weekly, "u3", 5)])
            .await
            .unwrap();

        assert_eq!(
            repo.entries(Period::Weekly).await.unwrap(),
            vec![entry(Period::Weekly, "u3", 5)]
        );
        assert_eq!(repo.entries(Period::Monthly).await.unwrap().len(), 1);

        repo.replace_all(Period::Weekly, &[]).await.unwrap();
        assert!(repo.entries(Period::Weekly).await.unwrap().is_empty());
        pool.close().await;
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a postgres server"]
    async fn test_failed_replace_keeps_previous_entries(pool: PgPool) {
        let repo = LeaderboardRepository::new(static_pool(&pool));
        repo.replace_all(Period::Weekly, &[entry(Period::Weekly, "u1", 10)])
            .await
            .unwrap();

        // a zero score violates the table check halfway through the transaction
        let res = repo
            .replace_all(
                Period::Weekly,
                &[entry(Period::Weekly, "u2", 30), entry(Period::Weekly, "u3", 0)],
            )
            .await;
        assert!(res.is_err());

        assert_eq!(
            repo.entries(Period::Weekly).await.unwrap(),
            vec![entry(Period::Weekly, "u1", 10)]
        );
        pool.close().await;
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL pointing at a postgres server"]
    async fn test_patch_display_leaves_score_and_missing_rows(pool: PgPool) {
        let repo = LeaderboardRepository::new(static_pool(&pool));
        let now = at("2024-05-17T00:00:00Z");
        repo.upsert(&entry(Period::Weekly, "u1", 45)).await.unwrap();

        assert!(
            repo.patch_display(Period::Weekly, &"u1".into(), &renamed(), now)
                .await
                .unwrap()
        );
        assert!(
            !repo
                .patch_display(Period::Weekly, &"u2".into(), &renamed(), now)
                .await
                .unwrap()
        );

        let entries = repo.entries(Period::Weekly).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].score, 45);
        assert_eq!(entries[0].display_name, "ayse");
        assert_eq!(entries[0].last_updated, now);

        assert!(repo.remove(Period::Weekly, &"u1".into()).await.unwrap());
        assert!(!repo.remove(Period::Weekly, &"u1".into()).await.unwrap());
        pool.close().await;
    }
}
