use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::instrument;

use super::{WinnerStore, sql_fragment};
use crate::db::StoreResult;
use crate::db::models::leaderboard::{AnnouncedWinner, Period, WinnerRow};
use crate::db::models::user::{Profile, UserId};

#[derive(Debug)]
pub struct WinnerRepository {
    pool: &'static Pool<Postgres>,
}

impl WinnerRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WinnerStore for WinnerRepository {
    #[instrument(skip(self, winner), fields(period = %winner.period, user_id = %winner.user_id))]
    async fn announce(&self, winner: &AnnouncedWinner) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO announced_winner (
                period,
                user_id,
                display_name,
                emoji,
                score,
                is_premium,
                window_start,
                announced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (period)
            DO UPDATE SET
                user_id = EXCLUDED.user_id,
                display_name = EXCLUDED.display_name,
                emoji = EXCLUDED.emoji,
                score = EXCLUDED.score,
                is_premium = EXCLUDED.is_premium,
                window_start = EXCLUDED.window_start,
                announced_at = EXCLUDED.announced_at
            "#,
        )
        .bind(winner.period.as_str())
        .bind(&winner.user_id)
        .bind(&winner.display_name)
        .bind(&winner.emoji)
        .bind(winner.score)
        .bind(winner.is_premium)
        .bind(winner.window_start)
        .bind(winner.announced_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn winner(&self, period: Period) -> StoreResult<Option<AnnouncedWinner>> {
        let row = sqlx::query_as::<_, WinnerRow>(&format!(
            "SELECT {} FROM announced_winner WHERE period = $1",
            sql_fragment::WINNER_FIELDS
        ))
        .bind(period.as_str())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|row| row.into_winner(period)))
    }

    #[instrument(skip(self, profile))]
    async fn patch_display_if_winner(
        &self,
        period: Period,
        user_id: &UserId,
        profile: &Profile,
    ) -> StoreResult<bool> {
        // score stays frozen at its announced value
        let res = sqlx::query(
            r#"
            UPDATE announced_winner
            SET display_name = $3,
                emoji = $4,
                is_premium = $5
            WHERE period = $1
            AND user_id = $2
            "#,
        )
        .bind(period.as_str())
        .bind(user_id)
        .bind(&profile.display_name)
        .bind(&profile.emoji)
        .bind(profile.is_premium)
        .execute(self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }
}
