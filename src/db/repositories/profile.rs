use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use tracing::instrument;

use super::ProfileStore;
use crate::db::StoreResult;
use crate::db::models::user::{ProfileRecord, UserId};

#[derive(Debug)]
pub struct ProfileRepository {
    pool: &'static Pool<Postgres>,
}

impl ProfileRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for ProfileRepository {
    #[instrument(skip(self))]
    async fn profile(&self, user_id: &UserId) -> StoreResult<Option<ProfileRecord>> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            r#"
            SELECT
                username,
                email,
                emoji,
                is_premium
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;

        if record.is_none() {
            tracing::debug!(%user_id, "no profile document, display defaults apply");
        }

        Ok(record)
    }
}
