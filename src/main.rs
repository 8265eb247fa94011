use std::sync::Arc;

use clap::Parser;
use futures::future::join_all;
use thiserror::Error;

use crate::api::server::{AppState, start_server};
use crate::args::{Cli, Command};
use crate::db::models::leaderboard::Period;
use crate::db::{StoreError, Stores};
use crate::rollup::window::Calendar;
use crate::triggers::{Dispatcher, Job, schedule};
use crate::util::env::{self, EnvErr};
use crate::util::telemetry;

mod announcer;
mod api;
mod args;
mod db;
mod propagator;
mod rollup;
mod triggers;
mod util;

#[derive(Debug, Error)]
enum RunnerErr {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Env(#[from] EnvErr),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Std(#[from] Box<dyn std::error::Error>),
}

type Result<T> = core::result::Result<T, RunnerErr>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env = env::get().await?;
    let telemetry_registry = telemetry::init(env)?;

    tracing::info!(command = ?cli.command(), "starting quiz-leaderboard");

    let result = run(cli.command(), env).await;
    if let Err(e) = &result {
        tracing::error!(error = ?e, "exiting with error");
    }

    if let Some(registry) = telemetry_registry {
        registry.shutdown();
    }

    result
}

async fn connect(env: &'static env::Env) -> Result<(Stores, Arc<Dispatcher>)> {
    let calendar = Calendar::new(env.display_offset()?);
    let stores = Stores::connect(env).await?;
    let dispatcher = Arc::new(Dispatcher::new(stores.clone(), calendar));

    Ok((stores, dispatcher))
}

async fn run(command: Command, env: &'static env::Env) -> Result<()> {
    match command {
        Command::Migrate => db::migrate(db::db_pool().await?).await?,

        Command::Serve => {
            db::migrate(db::db_pool().await?).await?;
            let (stores, dispatcher) = connect(env).await?;

            let mut handles = schedule::spawn_all(dispatcher.clone(), schedule::jobs_from_env(env));

            let state = Arc::new(AppState {
                dispatcher,
                stores,
                internal_token: env.internal_token.clone(),
            });
            handles.push(start_server(state, env.server_api_port).await?);

            _ = join_all(handles).await;
        }

        Command::Recompute { period } => {
            let (_, dispatcher) = connect(env).await?;
            let periods = period.map_or(Period::ALL.to_vec(), |p| vec![p]);
            for period in periods {
                let outcome = dispatcher.run(Job::Recompute(period)).await?;
                tracing::info!(?outcome, "recompute finished");
            }
        }

        Command::Announce { period, force } => {
            let (_, dispatcher) = connect(env).await?;
            let outcome = dispatcher.run(Job::Announce { period, force }).await?;
            tracing::info!(?outcome, "announce finished");
        }
    }

    Ok(())
}
