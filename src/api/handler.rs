use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::api::server::{AppState, JsonResult, RouteError};
use crate::db::models::{PaginatedResponse, Pagination};
use crate::db::prelude::*;
use crate::propagator::Propagation;
use crate::rollup::UserRollup;
use crate::triggers::{ChangeEvent, Job, JobOutcome};

#[derive(Debug, Serialize)]
pub struct Health {
    status: &'static str,
}

pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

#[instrument(skip(state, change), fields(user_id = %change.user_id))]
pub async fn solve_changed(
    State(state): State<Arc<AppState>>,
    Json(change): Json<ChangeEvent<SolveEvent>>,
) -> JsonResult<Vec<UserRollup>> {
    Ok(Json(state.dispatcher.on_solve_change(&change).await?))
}

#[instrument(skip(state, change), fields(user_id = %change.user_id))]
pub async fn profile_changed(
    State(state): State<Arc<AppState>>,
    Json(change): Json<ChangeEvent<ProfileRecord>>,
) -> JsonResult<Propagation> {
    Ok(Json(state.dispatcher.on_profile_change(&change).await?))
}

#[instrument(skip(state))]
pub async fn run_recompute(
    State(state): State<Arc<AppState>>,
    Path(period): Path<String>,
) -> JsonResult<JobOutcome> {
    let period = period.parse::<Period>()?;
    Ok(Json(state.dispatcher.run(Job::Recompute(period)).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnnounceParams {
    #[serde(default)]
    pub force: bool,
}

#[instrument(skip(state))]
pub async fn run_announce(
    State(state): State<Arc<AppState>>,
    Path(period): Path<String>,
    Query(params): Query<AnnounceParams>,
) -> JsonResult<JobOutcome> {
    let period = period.parse::<Period>()?;
    let job = Job::Announce {
        period,
        force: params.force,
    };

    Ok(Json(state.dispatcher.run(job).await?))
}

#[instrument(skip(state))]
pub async fn leaderboard(
    State(state): State<Arc<AppState>>,
    Path(period): Path<String>,
    Query(param): Query<Pagination>,
) -> JsonResult<PaginatedResponse<RollupEntry>> {
    let period = period.parse::<Period>()?;
    let entries = state.stores.leaderboards.entries(period).await?;

    Ok(Json(PaginatedResponse::from_all(entries, &param)))
}

#[instrument(skip(state))]
pub async fn winner(
    State(state): State<Arc<AppState>>,
    Path(period): Path<String>,
) -> JsonResult<AnnouncedWinner> {
    let period = period.parse::<Period>()?;
    match state.stores.winners.winner(period).await? {
        Some(winner) => Ok(Json(winner)),
        None => Err(RouteError::NoWinner(period)),
    }
}
