use std::sync::{Arc, LazyLock};

use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::instrument;

use crate::util::env::{self, Env, LeaderboardBackend};

pub mod models;
pub mod redis_store;
pub mod repositories;

#[cfg(test)]
pub mod testing;

pub mod prelude {
    pub use crate::db::models::leaderboard::{AnnouncedWinner, Period, RollupEntry};
    pub use crate::db::models::solve::SolveEvent;
    pub use crate::db::models::user::{Profile, ProfileRecord, UserId};
    pub use crate::db::{StoreError, StoreResult, Stores};

    pub use crate::db::repositories::{
        LeaderboardStore, ProfileStore, Scope, SolveStore, WinnerStore,
    };
}

use repositories::leaderboard::LeaderboardRepository;
use repositories::profile::ProfileRepository;
use repositories::solve::SolveRepository;
use repositories::winner::WinnerRepository;
use repositories::{LeaderboardStore, ProfileStore, SolveStore, WinnerStore};

static DB_POOL: LazyLock<OnceCell<Db>> = LazyLock::new(OnceCell::new);
pub async fn db_pool() -> StoreResult<&'static PgPool> {
    Ok(&DB_POOL
        .get_or_try_init(|| async { Db::new_pool().await })
        .await?
        .pool)
}

struct Db {
    pool: PgPool,
}

impl Db {
    pub async fn new_pool() -> StoreResult<Self> {
        let env = env::get().await?;
        let pool = sqlx::PgPool::connect(&env.database_url).await?;

        Ok(Self { pool })
    }
}

#[instrument(skip(pool))]
pub async fn migrate(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migrations applied");

    Ok(())
}

/// Handles to every external collection the jobs read from or write to.
#[derive(Clone)]
pub struct Stores {
    pub solves: Arc<dyn SolveStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub leaderboards: Arc<dyn LeaderboardStore>,
    pub winners: Arc<dyn WinnerStore>,
}

impl Stores {
    #[instrument(skip(env), fields(backend = ?env.leaderboard_backend))]
    pub async fn connect(env: &'static Env) -> StoreResult<Self> {
        let pool = db_pool().await?;

        let leaderboards: Arc<dyn LeaderboardStore> = match env.leaderboard_backend {
            LeaderboardBackend::Postgres => Arc::new(LeaderboardRepository::new(pool)),
            LeaderboardBackend::Redis => {
                let url = env
                    .redis_url
                    .as_deref()
                    .ok_or(env::EnvErr::MissingRedisUrl)?;
                Arc::new(redis_store::RedisLeaderboard::connect(url).await?)
            }
        };

        Ok(Self {
            solves: Arc::new(SolveRepository::new(pool)),
            profiles: Arc::new(ProfileRepository::new(pool)),
            leaderboards,
            winners: Arc::new(WinnerRepository::new(pool)),
        })
    }
}

pub type StoreResult<T> = core::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),

    #[error(transparent)]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    RedisError(#[from] ::redis::RedisError),

    #[error("malformed leaderboard document '{key}': {source}")]
    Document {
        key: String,
        source: serde_json::Error,
    },

    #[error("{0}")]
    EnvError(#[from] env::EnvErr),
}
