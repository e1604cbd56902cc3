//! Vote transaction engine
//!
//! Every vote runs as one transaction: the room-status gate, the vote
//! upsert, the yes-count adjustment and the consensus check all commit or
//! roll back together. Checking consensus inside the same transaction that
//! applies the increment closes the window where two concurrent final
//! votes could both observe a pre-consensus count.

use sqlx::{Row, SqlitePool};

use matchroom_common::db::{MovieVoteCount, RoomStatus, Vote, VoteType};

use crate::error::{EngineError, EngineResult};

/// Outcome of a committed vote.
#[derive(Debug, Clone, serde::Serialize)]
pub struct VoteOutcome {
    pub room_id: String,
    pub movie_id: String,
    pub user_id: String,
    pub vote: VoteType,
    /// True when this vote completed consensus on the movie.
    pub match_found: bool,
    pub yes_vote_count: i64,
    pub room_status: RoomStatus,
}

pub struct VoteEngine {
    pool: SqlitePool,
    /// Lifetime of vote rows, in seconds.
    vote_ttl_secs: i64,
}

impl VoteEngine {
    pub fn new(pool: SqlitePool, vote_ttl_secs: i64) -> Self {
        Self {
            pool,
            vote_ttl_secs,
        }
    }

    /// Record a vote atomically and report whether it completed consensus.
    ///
    /// A re-vote replaces the user's previous vote on the movie, adjusting
    /// the yes-count by the delta between old and new rather than blindly
    /// incrementing, so a user flipping YES/NO/YES can never inflate the
    /// count past one contribution.
    pub async fn process_vote(
        &self,
        room_id: &str,
        movie_id: &str,
        user_id: &str,
        vote: VoteType,
    ) -> EngineResult<VoteOutcome> {
        if room_id.trim().is_empty() || movie_id.trim().is_empty() || user_id.trim().is_empty() {
            return Err(EngineError::Validation(
                "room_id, movie_id and user_id must all be non-empty".into(),
            ));
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        // Room-status gate. Zero rows affected means the room is missing,
        // already matched or closed; the whole vote is rejected unwritten.
        let gated = sqlx::query(
            r#"
            UPDATE rooms
            SET status = 'VOTING_IN_PROGRESS', updated_at = ?
            WHERE room_id = ? AND status IN ('WAITING_FOR_MEMBERS', 'VOTING_IN_PROGRESS')
            "#,
        )
        .bind(now)
        .bind(room_id)
        .execute(&mut *tx)
        .await?;

        if gated.rows_affected() == 0 {
            return Err(EngineError::RoomNotAvailable(format!(
                "Room {room_id} does not exist or is no longer accepting votes"
            )));
        }

        let capacity: i64 = sqlx::query("SELECT capacity FROM rooms WHERE room_id = ?")
            .bind(room_id)
            .fetch_one(&mut *tx)
            .await?
            .try_get("capacity")?;

        let previous = sqlx::query(
            "SELECT vote_type FROM votes WHERE room_id = ? AND movie_id = ? AND user_id = ?",
        )
        .bind(room_id)
        .bind(movie_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| row.try_get::<String, _>("vote_type"))
        .transpose()?
        .map(|s| VoteType::parse(&s))
        .transpose()?;

        let delta = yes_count_delta(previous, vote);

        sqlx::query(
            r#"
            INSERT INTO votes (room_id, movie_id, user_id, vote_type, voted_at, ttl)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (room_id, movie_id, user_id) DO UPDATE SET
                vote_type = excluded.vote_type,
                voted_at = excluded.voted_at,
                ttl = excluded.ttl
            "#,
        )
        .bind(room_id)
        .bind(movie_id)
        .bind(user_id)
        .bind(vote.as_str())
        .bind(now)
        .bind(now + self.vote_ttl_secs)
        .execute(&mut *tx)
        .await?;

        if delta != 0 {
            sqlx::query(
                r#"
                INSERT INTO movie_vote_counts (room_id, movie_id, yes_vote_count)
                VALUES (?, ?, ?)
                ON CONFLICT (room_id, movie_id) DO UPDATE SET
                    yes_vote_count = yes_vote_count + ?
                "#,
            )
            .bind(room_id)
            .bind(movie_id)
            .bind(delta)
            .bind(delta)
            .execute(&mut *tx)
            .await?;
        }

        let yes_vote_count = sqlx::query_as::<_, MovieVoteCount>(
            "SELECT room_id, movie_id, yes_vote_count FROM movie_vote_counts WHERE room_id = ? AND movie_id = ?",
        )
        .bind(room_id)
        .bind(movie_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(|tally| tally.yes_vote_count)
        .unwrap_or(0);

        // Consensus comparison rides in the same transaction as the
        // increment, so two concurrent final votes cannot both observe a
        // pre-consensus count. The engine only signals consensus; phase
        // transitions are the room owner's decision.
        let match_found = vote == VoteType::Yes && yes_vote_count == capacity;

        tx.commit().await?;

        if match_found {
            tracing::info!(room_id, movie_id, yes_vote_count, "Consensus reached");
        } else {
            tracing::debug!(room_id, movie_id, user_id, vote = vote.as_str(), "Vote recorded");
        }

        Ok(VoteOutcome {
            room_id: room_id.to_string(),
            movie_id: movie_id.to_string(),
            user_id: user_id.to_string(),
            vote,
            match_found,
            yes_vote_count,
            room_status: RoomStatus::VotingInProgress,
        })
    }

    /// Current yes-count for one movie in a room. Zero when nobody has
    /// voted yes yet.
    pub async fn yes_vote_count(&self, room_id: &str, movie_id: &str) -> EngineResult<i64> {
        let count = sqlx::query_as::<_, MovieVoteCount>(
            "SELECT room_id, movie_id, yes_vote_count FROM movie_vote_counts WHERE room_id = ? AND movie_id = ?",
        )
        .bind(room_id)
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?
        .map(|tally| tally.yes_vote_count)
        .unwrap_or(0);

        Ok(count)
    }

    /// One user's recorded vote on one movie, if any.
    pub async fn vote_for(
        &self,
        room_id: &str,
        movie_id: &str,
        user_id: &str,
    ) -> EngineResult<Option<Vote>> {
        let row = sqlx::query(
            r#"
            SELECT room_id, movie_id, user_id, vote_type, voted_at, ttl
            FROM votes
            WHERE room_id = ? AND movie_id = ? AND user_id = ?
            "#,
        )
        .bind(room_id)
        .bind(movie_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let vote_type: String = row.try_get("vote_type")?;
        Ok(Some(Vote {
            room_id: row.try_get("room_id")?,
            movie_id: row.try_get("movie_id")?,
            user_id: row.try_get("user_id")?,
            vote_type: VoteType::parse(&vote_type)?,
            voted_at: row.try_get("voted_at")?,
            ttl: row.try_get("ttl")?,
        }))
    }
}

/// Yes-count adjustment when `vote` replaces `previous` for one user.
fn yes_count_delta(previous: Option<VoteType>, vote: VoteType) -> i64 {
    match (previous, vote) {
        (Some(VoteType::Yes), VoteType::Yes) => 0,
        (Some(VoteType::Yes), VoteType::No) => -1,
        (_, VoteType::Yes) => 1,
        (_, VoteType::No) => 0,
    }
}
