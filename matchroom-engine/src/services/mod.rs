//! Engine service layer: catalog discovery, quality filtering, priority
//! ordering, set loading, cache storage and vote transactions.

pub mod cache_manager;
pub mod priority;
pub mod quality_filter;
pub mod set_loader;
pub mod tmdb_client;
pub mod vote_engine;
