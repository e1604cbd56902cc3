//! Room and cache handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use matchroom_common::db::{CacheMetadata, CachedMovieSlot, FilterCriteria, MediaType, Room};

use crate::db::rooms;
use crate::error::{ApiError, ApiResult};
use crate::services::cache_manager::{NextMovie, RepairDiagnosis};
use crate::services::tmdb_client::{ContentDiscovery, Genre};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub capacity: i64,
}

/// POST /rooms
pub async fn create_room<D: ContentDiscovery + 'static>(
    State(state): State<AppState<D>>,
    Json(request): Json<CreateRoomRequest>,
) -> ApiResult<Json<Room>> {
    if request.capacity < 2 {
        return Err(ApiError::BadRequest(format!(
            "Room capacity must be at least 2, got {}",
            request.capacity
        )));
    }

    let room = rooms::create_room(&state.db, request.capacity).await?;
    Ok(Json(room))
}

/// GET /rooms/:room_id
pub async fn get_room<D: ContentDiscovery + 'static>(
    State(state): State<AppState<D>>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<Room>> {
    let room = rooms::room_by_id(&state.db, &room_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Room {room_id} not found")))?;

    Ok(Json(room))
}

#[derive(Debug, Deserialize)]
pub struct CreateCacheRequest {
    pub media_type: MediaType,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateCacheResponse {
    pub success: bool,
    /// False when an existing cache was returned unchanged.
    pub created: bool,
    pub movie_count: i64,
    pub metadata: CacheMetadata,
}

/// POST /rooms/:room_id/cache
///
/// Idempotent; repeat calls return the existing cache without a second
/// discovery pass.
pub async fn create_cache<D: ContentDiscovery + 'static>(
    State(state): State<AppState<D>>,
    Path(room_id): Path<String>,
    Json(request): Json<CreateCacheRequest>,
) -> ApiResult<Json<CreateCacheResponse>> {
    let room = rooms::room_by_id(&state.db, &room_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Room {room_id} not found")))?;

    let criteria = FilterCriteria::new(request.media_type, request.genre_ids, room.capacity)?;
    let result = state.cache.create_room_cache(&room_id, &criteria).await?;

    Ok(Json(CreateCacheResponse {
        success: true,
        created: result.created,
        movie_count: result.movie_count,
        metadata: result.metadata,
    }))
}

#[derive(Debug, Deserialize)]
pub struct NextMovieQuery {
    pub user_id: String,
    pub index: i64,
}

#[derive(Debug, Serialize)]
pub struct NextMovieResponse {
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie: Option<CachedMovieSlot>,
}

/// GET /rooms/:room_id/movies/next?user_id=&index=
pub async fn next_movie<D: ContentDiscovery + 'static>(
    State(state): State<AppState<D>>,
    Path(room_id): Path<String>,
    Query(query): Query<NextMovieQuery>,
) -> ApiResult<Json<NextMovieResponse>> {
    if query.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".into()));
    }

    let next = state
        .cache
        .next_movie(&room_id, &query.user_id, query.index)
        .await?;

    let response = match next {
        NextMovie::Slot(slot) => NextMovieResponse {
            finished: false,
            movie: Some(slot),
        },
        NextMovie::UserFinished => NextMovieResponse {
            finished: true,
            movie: None,
        },
    };

    Ok(Json(response))
}

/// GET /rooms/:room_id/consistency
///
/// Returns the structural report together with the repair classification.
pub async fn consistency<D: ContentDiscovery + 'static>(
    State(state): State<AppState<D>>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<RepairDiagnosis>> {
    let diagnosis = state.cache.repair_sequence_consistency(&room_id).await?;
    Ok(Json(diagnosis))
}

#[derive(Debug, Deserialize)]
pub struct GenresQuery {
    pub media_type: MediaType,
}

/// GET /genres?media_type=
pub async fn list_genres<D: ContentDiscovery + 'static>(
    State(state): State<AppState<D>>,
    Query(query): Query<GenresQuery>,
) -> ApiResult<Json<Vec<Genre>>> {
    let genres = state.cache.genres(query.media_type).await?;
    Ok(Json(genres))
}
