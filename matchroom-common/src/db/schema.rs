//! Table definitions
//!
//! Two logical groups with separate owners:
//! - `room_cache` + `room_cache_metadata` belong to the cache storage
//!   manager; slots are written once per room and never mutated after.
//! - `votes` + `movie_vote_counts` belong to the vote transaction engine.
//!
//! `rooms` holds the per-room status the vote transaction conditions on.
//! `content_cache` is the cross-room criteria-keyed cache with its own
//! shorter expiry.
//!
//! TTL columns are unix epoch seconds; expiry is enforced at read time
//! since SQLite has no store-managed TTL.

use crate::Result;
use sqlx::SqlitePool;

/// Create all tables if they don't exist. Idempotent.
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rooms (
            room_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            capacity INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_cache (
            room_id TEXT NOT NULL,
            sequence_index INTEGER NOT NULL,
            movie_id TEXT NOT NULL,
            title TEXT NOT NULL,
            overview TEXT NOT NULL,
            poster_path TEXT,
            release_date TEXT NOT NULL,
            vote_average REAL NOT NULL,
            genre_ids TEXT NOT NULL,
            original_language TEXT NOT NULL,
            media_type TEXT NOT NULL,
            priority INTEGER NOT NULL,
            ttl INTEGER NOT NULL,
            PRIMARY KEY (room_id, sequence_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS room_cache_metadata (
            room_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            total_movies INTEGER NOT NULL,
            cache_complete INTEGER NOT NULL DEFAULT 0,
            media_type TEXT NOT NULL,
            genre_ids TEXT NOT NULL,
            room_capacity INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            ttl INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS votes (
            room_id TEXT NOT NULL,
            movie_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            vote_type TEXT NOT NULL,
            voted_at INTEGER NOT NULL,
            ttl INTEGER NOT NULL,
            PRIMARY KEY (room_id, movie_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS movie_vote_counts (
            room_id TEXT NOT NULL,
            movie_id TEXT NOT NULL,
            yes_vote_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (room_id, movie_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS content_cache (
            cache_key TEXT PRIMARY KEY,
            media_type TEXT NOT NULL,
            genre_ids TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            ttl INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
