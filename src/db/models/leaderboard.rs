use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::user::{Profile, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Weekly,
    Monthly,
}

impl Period {
    pub const ALL: [Period; 2] = [Period::Weekly, Period::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown period '{0}' (expected 'weekly' or 'monthly')")]
pub struct PeriodParseError(String);

impl FromStr for Period {
    type Err = PeriodParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" | "week" => Ok(Period::Weekly),
            "monthly" | "month" => Ok(Period::Monthly),
            _ => Err(PeriodParseError(s.to_string())),
        }
    }
}

/// One user's materialized total for the current window of a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupEntry {
    pub user_id: UserId,
    pub period: Period,
    pub score: i64,
    pub display_name: String,
    pub emoji: String,
    pub is_premium: bool,
    pub window_start: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl RollupEntry {
    pub fn new(
        period: Period,
        user_id: UserId,
        score: i64,
        profile: Profile,
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            period,
            score,
            display_name: profile.display_name,
            emoji: profile.emoji,
            is_premium: profile.is_premium,
            window_start,
            last_updated: now,
        }
    }

    /// Merges display attributes only; the score is left alone.
    pub fn apply_profile(&mut self, profile: &Profile, now: DateTime<Utc>) {
        self.display_name = profile.display_name.clone();
        self.emoji = profile.emoji.clone();
        self.is_premium = profile.is_premium;
        self.last_updated = now;
    }
}

/// The frozen top entry of a period. `score` is never rewritten after announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncedWinner {
    pub period: Period,
    pub user_id: UserId,
    pub display_name: String,
    pub emoji: String,
    pub score: i64,
    pub is_premium: bool,
    pub window_start: DateTime<Utc>,
    pub announced_at: DateTime<Utc>,
}

impl AnnouncedWinner {
    pub fn from_entry(entry: &RollupEntry, profile: Profile, now: DateTime<Utc>) -> Self {
        Self {
            period: entry.period,
            user_id: entry.user_id.clone(),
            display_name: profile.display_name,
            emoji: profile.emoji,
            score: entry.score,
            is_premium: profile.is_premium,
            window_start: entry.window_start,
            announced_at: now,
        }
    }

    pub fn apply_profile(&mut self, profile: &Profile) {
        self.display_name = profile.display_name.clone();
        self.emoji = profile.emoji.clone();
        self.is_premium = profile.is_premium;
    }
}

/// `leaderboard_entry` row; the period is implied by the query that selected it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EntryRow {
    pub user_id: UserId,
    pub score: i64,
    pub display_name: String,
    pub emoji: String,
    pub is_premium: bool,
    pub window_start: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl EntryRow {
    pub fn into_entry(self, period: Period) -> RollupEntry {
        RollupEntry {
            user_id: self.user_id,
            period,
            score: self.score,
            display_name: self.display_name,
            emoji: self.emoji,
            is_premium: self.is_premium,
            window_start: self.window_start,
            last_updated: self.last_updated,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WinnerRow {
    pub user_id: UserId,
    pub display_name: String,
    pub emoji: String,
    pub score: i64,
    pub is_premium: bool,
    pub window_start: DateTime<Utc>,
    pub announced_at: DateTime<Utc>,
}

impl WinnerRow {
    pub fn into_winner(self, period: Period) -> AnnouncedWinner {
        AnnouncedWinner {
            period,
            user_id: self.user_id,
            display_name: self.display_name,
            emoji: self.emoji,
            score: self.score,
            is_premium: self.is_premium,
            window_start: self.window_start,
            announced_at: self.announced_at,
        }
    }
}
