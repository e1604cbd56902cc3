//! matchroom-engine library
//!
//! Core engine behind room-based movie matching: builds each room's fixed
//! 50-movie sequence from a rate-limited catalog API and settles member
//! votes in atomic transactions until a room reaches consensus.

use std::sync::Arc;

use axum::Router;
use sqlx::SqlitePool;

pub mod api;
pub mod db;
pub mod error;
pub mod services;

use services::cache_manager::CacheManager;
use services::tmdb_client::ContentDiscovery;
use services::vote_engine::VoteEngine;

/// Application state shared across HTTP handlers.
///
/// Generic over the discovery source so tests can drive the full HTTP
/// surface against a fixed catalog.
pub struct AppState<D> {
    pub db: SqlitePool,
    pub cache: Arc<CacheManager<D>>,
    pub votes: Arc<VoteEngine>,
}

impl<D> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            cache: Arc::clone(&self.cache),
            votes: Arc::clone(&self.votes),
        }
    }
}

impl<D> AppState<D> {
    pub fn new(db: SqlitePool, cache: CacheManager<D>, votes: VoteEngine) -> Self {
        Self {
            db,
            cache: Arc::new(cache),
            votes: Arc::new(votes),
        }
    }
}

/// Build the application router.
pub fn build_router<D: ContentDiscovery + 'static>(state: AppState<D>) -> Router {
    use axum::routing::{get, post};
    use tower_http::cors::CorsLayer;
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/rooms", post(api::create_room))
        .route("/rooms/:room_id", get(api::get_room))
        .route("/rooms/:room_id/cache", post(api::create_cache))
        .route("/rooms/:room_id/movies/next", get(api::next_movie))
        .route("/rooms/:room_id/votes", post(api::cast_vote))
        .route("/rooms/:room_id/consistency", get(api::consistency))
        .route("/genres", get(api::list_genres))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
