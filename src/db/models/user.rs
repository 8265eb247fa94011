use core::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous User";
pub const DEFAULT_EMOJI: &str = "🙂";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Raw `users` document as it is stored; every display field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub username: Option<String>,
    pub email: Option<String>,
    pub emoji: Option<String>,
    pub is_premium: Option<bool>,
}

/// Display attributes copied onto leaderboard rows and the announced winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub display_name: String,
    pub emoji: String,
    pub is_premium: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            emoji: DEFAULT_EMOJI.to_string(),
            is_premium: false,
        }
    }
}

impl Profile {
    /// Resolves a possibly-missing profile document into display attributes.
    ///
    /// The display name falls back from username to email to [`DEFAULT_DISPLAY_NAME`]; blank
    /// strings count as missing.
    pub fn resolve(record: Option<&ProfileRecord>) -> Self {
        let Some(record) = record else {
            return Self::default();
        };

        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        let display_name = non_blank(&record.username)
            .or_else(|| non_blank(&record.email))
            .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

        Self {
            display_name,
            emoji: non_blank(&record.emoji).unwrap_or_else(|| DEFAULT_EMOJI.to_string()),
            is_premium: record.is_premium.unwrap_or(false),
        }
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        UserId(value)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        UserId(value.to_string())
    }
}

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
