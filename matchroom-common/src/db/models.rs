//! Persisted data models

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Media type a room votes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "MOVIE")]
    Movie,
    #[serde(rename = "TV")]
    Tv,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "MOVIE",
            MediaType::Tv => "TV",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "MOVIE" => Ok(MediaType::Movie),
            "TV" => Ok(MediaType::Tv),
            other => Err(Error::InvalidInput(format!("Unknown media type: {other}"))),
        }
    }
}

/// Room lifecycle status.
///
/// The vote transaction conditions on this; the engine itself never moves a
/// room into a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    #[serde(rename = "WAITING_FOR_MEMBERS")]
    WaitingForMembers,
    #[serde(rename = "VOTING_IN_PROGRESS")]
    VotingInProgress,
    #[serde(rename = "MATCHED")]
    Matched,
    #[serde(rename = "CLOSED")]
    Closed,
}

impl RoomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::WaitingForMembers => "WAITING_FOR_MEMBERS",
            RoomStatus::VotingInProgress => "VOTING_IN_PROGRESS",
            RoomStatus::Matched => "MATCHED",
            RoomStatus::Closed => "CLOSED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "WAITING_FOR_MEMBERS" => Ok(RoomStatus::WaitingForMembers),
            "VOTING_IN_PROGRESS" => Ok(RoomStatus::VotingInProgress),
            "MATCHED" => Ok(RoomStatus::Matched),
            "CLOSED" => Ok(RoomStatus::Closed),
            other => Err(Error::InvalidInput(format!("Unknown room status: {other}"))),
        }
    }
}

/// A member's vote on one movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteType {
    #[serde(rename = "YES")]
    Yes,
    #[serde(rename = "NO")]
    No,
}

impl VoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteType::Yes => "YES",
            VoteType::No => "NO",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "YES" => Ok(VoteType::Yes),
            "NO" => Ok(VoteType::No),
            other => Err(Error::InvalidInput(format!("Unknown vote type: {other}"))),
        }
    }
}

/// Immutable per-room selection input, also the identity key of the
/// cross-room content cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub media_type: MediaType,
    pub genre_ids: Vec<i64>,
    pub room_capacity: i64,
}

impl FilterCriteria {
    /// Validated constructor: up to two genres, capacity of at least two.
    /// Rejected before any I/O happens.
    pub fn new(media_type: MediaType, genre_ids: Vec<i64>, room_capacity: i64) -> Result<Self> {
        if genre_ids.len() > 2 {
            return Err(Error::InvalidInput(format!(
                "At most 2 genres may be selected, got {}",
                genre_ids.len()
            )));
        }
        if room_capacity < 2 {
            return Err(Error::InvalidInput(format!(
                "Room capacity must be at least 2, got {room_capacity}"
            )));
        }

        Ok(Self {
            media_type,
            genre_ids,
            room_capacity,
        })
    }

    /// Content-cache key: hash of media type plus sorted genre ids, so two
    /// rooms with the same selection share cached content regardless of the
    /// order genres were picked in. Room identity is deliberately excluded.
    pub fn cache_key(&self) -> String {
        let mut sorted = self.genre_ids.clone();
        sorted.sort_unstable();

        let mut hasher = Sha256::new();
        hasher.update(self.media_type.as_str().as_bytes());
        for id in &sorted {
            hasher.update(b":");
            hasher.update(id.to_string().as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }
}

/// A room record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub status: RoomStatus,
    pub capacity: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One of the 50 ordered, cached candidate titles for a room.
///
/// Created once at cache-creation time and immutable thereafter; only
/// deleted on room teardown or TTL expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedMovieSlot {
    pub room_id: String,
    pub sequence_index: i64,
    pub movie_id: String,
    pub title: String,
    pub overview: String,
    pub poster_path: Option<String>,
    pub release_date: String,
    pub vote_average: f64,
    pub genre_ids: Vec<i64>,
    pub original_language: String,
    pub media_type: MediaType,
    pub priority: i64,
    pub ttl: i64,
}

/// One record per room, written after all slots are durably stored.
///
/// Every cache-dependent operation reads this first to gate on
/// `cache_complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub room_id: String,
    pub status: String,
    pub total_movies: i64,
    pub cache_complete: bool,
    pub media_type: MediaType,
    pub genre_ids: Vec<i64>,
    pub room_capacity: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub ttl: i64,
}

/// A recorded vote row. Append-once per (room, movie, user); overwritten
/// only by the same user re-voting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub room_id: String,
    pub movie_id: String,
    pub user_id: String,
    pub vote_type: VoteType,
    pub voted_at: i64,
    pub ttl: i64,
}

/// Per-movie running tally of YES votes.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MovieVoteCount {
    pub room_id: String,
    pub movie_id: String,
    pub yes_vote_count: i64,
}
