use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::StatusCode;
use http::header::AUTHORIZATION;

use crate::api::server::AppState;
use crate::util::constant_time_cmp;

/// Gate for routes that mutate leaderboards. Accepts the internal token either bare or as a
/// `Bearer` credential.
pub async fn verify_internal_ident(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let authorized_header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(StatusCode::BAD_REQUEST)?
        .to_str()
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let presented = authorized_header
        .strip_prefix("Bearer ")
        .unwrap_or(authorized_header);

    if !constant_time_cmp(presented, &state.internal_token) {
        tracing::warn!(uri = %req.uri(), "rejected internal request with bad token");
        Err(StatusCode::UNAUTHORIZED)
    } else {
        Ok(next.run(req).await)
    }
}
