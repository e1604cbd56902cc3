//! Vote handler

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use matchroom_common::db::VoteType;

use crate::error::ApiResult;
use crate::services::tmdb_client::ContentDiscovery;
use crate::services::vote_engine::VoteOutcome;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub user_id: String,
    pub movie_id: String,
    pub vote_type: VoteType,
}

/// POST /rooms/:room_id/votes
///
/// One atomic transaction per vote; a room past voting rejects with 409
/// and nothing is written.
pub async fn cast_vote<D: ContentDiscovery + 'static>(
    State(state): State<AppState<D>>,
    Path(room_id): Path<String>,
    Json(request): Json<VoteRequest>,
) -> ApiResult<Json<VoteOutcome>> {
    let outcome = state
        .votes
        .process_vote(&room_id, &request.movie_id, &request.user_id, request.vote_type)
        .await?;

    Ok(Json(outcome))
}
