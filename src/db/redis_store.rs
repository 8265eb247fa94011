//! Redis-backed leaderboard collections.
//!
//! Each period is one hash, `{namespace}:{period}:entries`, mapping a user id to the JSON
//! encoded [`RollupEntry`].

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::instrument;

use crate::db::models::leaderboard::{Period, RollupEntry};
use crate::db::models::user::{Profile, UserId};
use crate::db::repositories::LeaderboardStore;
use crate::db::{StoreError, StoreResult};

const DEFAULT_NAMESPACE: &str = "leaderboard";

/// Overwrites a hash field only while it still holds the document the caller read.
/// Returns 1 when swapped, 0 when the field changed in between and -1 when it is gone.
const SWAP_IF_UNCHANGED: &str = r#"
local current = redis.call('HGET', KEYS[1], ARGV[1])
if not current then
    return -1
end
if current ~= ARGV[2] then
    return 0
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
return 1
"#;

const PATCH_ATTEMPTS: usize = 3;

pub fn entries_key(namespace: &str, period: Period) -> String {
    format!("{namespace}:{period}:entries")
}

fn encode(entry: &RollupEntry) -> StoreResult<String> {
    serde_json::to_string(entry).map_err(|source| StoreError::Document {
        key: entry.user_id.to_string(),
        source,
    })
}

fn decode(user_id: &str, raw: &str) -> StoreResult<RollupEntry> {
    serde_json::from_str(raw).map_err(|source| StoreError::Document {
        key: user_id.to_string(),
        source,
    })
}

/// The stored document with fresh display fields; everything else is carried over.
fn patched_document(
    user_id: &UserId,
    raw: &str,
    profile: &Profile,
    now: DateTime<Utc>,
) -> StoreResult<String> {
    let mut entry = decode(user_id.as_str(), raw)?;
    entry.apply_profile(profile, now);
    encode(&entry)
}

pub struct RedisLeaderboard {
    manager: ConnectionManager,
    namespace: String,
    swap: Script,
}

impl RedisLeaderboard {
    #[instrument]
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        Self::connect_namespaced(redis_url, DEFAULT_NAMESPACE).await
    }

    #[instrument]
    pub async fn connect_namespaced(redis_url: &str, namespace: &str) -> StoreResult<Self> {
        tracing::debug!(redis_url, "connecting to redis server");

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self {
            manager,
            namespace: namespace.to_string(),
            swap: Script::new(SWAP_IF_UNCHANGED),
        })
    }

    fn key(&self, period: Period) -> String {
        entries_key(&self.namespace, period)
    }
}

#[async_trait]
impl LeaderboardStore for RedisLeaderboard {
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    async fn replace_all(&self, period: Period, entries: &[RollupEntry]) -> StoreResult<()> {
        let key = self.key(period);

        let mut pipe = redis::pipe();
        pipe.atomic().del(&key).ignore();
        for entry in entries {
            pipe.hset(&key, entry.user_id.as_str(), encode(entry)?)
                .ignore();
        }

        let mut conn = self.manager.clone();
        let _: () = pipe.query_async(&mut conn).await?;

        Ok(())
    }

    #[instrument(skip(self, entry), fields(period = %entry.period, user_id = %entry.user_id))]
    async fn upsert(&self, entry: &RollupEntry) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn
            .hset(self.key(entry.period), entry.user_id.as_str(), encode(entry)?)
            .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove(&self, period: Period, user_id: &UserId) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.hdel(self.key(period), user_id.as_str()).await?;

        Ok(removed > 0)
    }

    /// Compare-and-swap on the stored document, so a patch never recreates an entry that a
    /// concurrent replace or remove dropped, and never reverts a concurrent score change.
    #[instrument(skip(self, profile))]
    async fn patch_display(
        &self,
        period: Period,
        user_id: &UserId,
        profile: &Profile,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let key = self.key(period);
        let mut conn = self.manager.clone();

        for attempt in 1..=PATCH_ATTEMPTS {
            let raw: Option<String> = conn.hget(&key, user_id.as_str()).await?;
            let Some(raw) = raw else {
                return Ok(false);
            };

            let patched = patched_document(user_id, &raw, profile, now)?;
            let swapped: i64 = self
                .swap
                .key(&key)
                .arg(user_id.as_str())
                .arg(&raw)
                .arg(&patched)
                .invoke_async(&mut conn)
                .await?;

            match swapped {
                1 => return Ok(true),
                -1 => return Ok(false),
                _ => tracing::debug!(attempt, "entry changed while patching, retrying"),
            }
        }

        tracing::warn!(%period, %user_id, "entry kept changing, display patch left to the next recompute");
        Ok(false)
    }

    #[instrument(skip(self))]
    async fn entries(&self, period: Period) -> StoreResult<Vec<RollupEntry>> {
        let mut conn = self.manager.clone();
        let all: HashMap<String, String> = conn.hgetall(self.key(period)).await?;

        let mut entries = all
            .iter()
            .map(|(user_id, raw)| decode(user_id, raw))
            .collect::<StoreResult<Vec<_>>>()?;
        entries.sort_by(|a, b| b.score.cmp(&a.score));

        Ok(entries)
    }
}
