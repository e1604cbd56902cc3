//! HTTP API handlers for matchroom-engine

pub mod health;
pub mod rooms;
pub mod votes;

pub use health::health_routes;
pub use rooms::{consistency, create_cache, create_room, get_room, list_genres, next_movie};
pub use votes::cast_vote;
