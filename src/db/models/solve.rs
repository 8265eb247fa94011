use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::user::UserId;

/// A completed quiz. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveEvent {
    pub user_id: UserId,
    pub score: i64,
    pub solved_at: DateTime<Utc>,
}

/// `solved_quiz` row; a null score counts as zero.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SolveRow {
    pub user_id: UserId,
    pub score: Option<i64>,
    pub solved_at: DateTime<Utc>,
}

impl From<SolveRow> for SolveEvent {
    fn from(value: SolveRow) -> Self {
        Self {
            user_id: value.user_id,
            score: value.score.unwrap_or_default(),
            solved_at: value.solved_at,
        }
    }
}

impl SolveEvent {
    pub fn new(user_id: impl Into<UserId>, score: i64, solved_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            score,
            solved_at,
        }
    }
}
