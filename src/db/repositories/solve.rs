use futures::StreamExt;
use futures::stream::BoxStream;
use sqlx::{Pool, Postgres};
use tracing::instrument;

use super::{Scope, SolveStore};
use crate::db::models::solve::{SolveEvent, SolveRow};
use crate::db::{StoreError, StoreResult};
use crate::rollup::window::Window;

const SCAN_SOLVES: &str = r#"
    SELECT
        user_id,
        score,
        solved_at
    FROM solved_quiz
    WHERE solved_at >= $1
    AND ($2::timestamptz IS NULL OR solved_at < $2)
    AND ($3::text IS NULL OR user_id = $3)
    ORDER BY solved_at ASC
"#;

#[derive(Debug)]
pub struct SolveRepository {
    pool: &'static Pool<Postgres>,
}

impl SolveRepository {
    pub fn new(pool: &'static Pool<Postgres>) -> Self {
        Self { pool }
    }
}

impl SolveStore for SolveRepository {
    #[instrument(skip(self))]
    fn scan(&self, scope: Scope, window: Window) -> BoxStream<'_, StoreResult<SolveEvent>> {
        sqlx::query_as::<_, SolveRow>(SCAN_SOLVES)
            .bind(window.start)
            .bind(window.end)
            .bind(scope.user_id().map(|id| id.0.clone()))
            .fetch(self.pool)
            .map(|row| row.map(SolveEvent::from).map_err(StoreError::from))
            .boxed()
    }
}
