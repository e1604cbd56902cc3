//! Room cache storage manager
//!
//! Owns the slot and metadata lifecycles. A room's cache moves
//! NO_CACHE -> ACTIVE (cache_complete) -> expiry or teardown -> NO_CACHE.
//! Slots are written once and never mutated; every member observes the
//! identical ordered sequence. Metadata flips to complete only after all
//! slots are durably written, so a partial failure leaves a retryable
//! incomplete row instead of serving a short sequence.

use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use matchroom_common::config::EngineConfig;
use matchroom_common::db::{CacheMetadata, CachedMovieSlot, FilterCriteria, MediaType};

use crate::error::{EngineError, EngineResult};
use crate::services::priority::RankedItem;
use crate::services::set_loader::{MovieSetLoader, MOVIE_SET_SIZE};
use crate::services::tmdb_client::{CatalogItem, ContentDiscovery, Genre};

/// Largest number of slots written per sub-batch, mirroring the batch
/// write limit of the store this layout was designed for.
const BATCH_WRITE_LIMIT: usize = 25;

/// Structured outcome of [`CacheManager::validate_sequence_consistency`].
///
/// A diagnosis rather than a boolean, so repair logic can branch on what
/// exactly is wrong.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ConsistencyReport {
    pub room_id: String,
    pub is_consistent: bool,
    pub total_slots: i64,
    pub missing_indices: Vec<i64>,
    pub duplicate_indices: Vec<i64>,
    /// Sequence indices whose slot is missing a required field.
    pub invalid_slots: Vec<i64>,
}

/// Classification returned by the diagnostic-only repair pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RepairAction {
    #[serde(rename = "CACHE_NOT_FOUND")]
    CacheNotFound,
    #[serde(rename = "INCOMPLETE_CACHE")]
    IncompleteCache,
    #[serde(rename = "EXCESS_MOVIES")]
    ExcessMovies,
    #[serde(rename = "SEQUENCE_INDEX_REPAIR_NEEDED")]
    SequenceIndexRepairNeeded,
    #[serde(rename = "NO_REPAIR_NEEDED")]
    NoRepairNeeded,
}

/// Outcome of [`CacheManager::repair_sequence_consistency`].
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RepairDiagnosis {
    pub room_id: String,
    pub action: RepairAction,
    pub report: ConsistencyReport,
}

/// Proof that a set of users observe the same sequence, without
/// transferring the sequence itself.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrossUserReport {
    pub room_id: String,
    pub user_ids: Vec<String>,
    /// Hash over the ordered (sequence_index, movie_id) pairs.
    pub sequence_hash: String,
    pub consistent: bool,
}

/// The next slot for a user, or the signal that they have seen all 50.
#[derive(Debug, Clone)]
pub enum NextMovie {
    Slot(CachedMovieSlot),
    UserFinished,
}

/// Outcome of a cache creation call.
#[derive(Debug, Clone)]
pub struct CreateCacheResult {
    /// False when an existing complete cache was returned unchanged.
    pub created: bool,
    pub movie_count: i64,
    pub metadata: CacheMetadata,
}

/// Cache storage manager. Exclusively owns slot and metadata lifecycles.
pub struct CacheManager<D> {
    pool: SqlitePool,
    config: EngineConfig,
    loader: MovieSetLoader<D>,
}

impl<D: ContentDiscovery> CacheManager<D> {
    pub fn new(pool: SqlitePool, config: EngineConfig, loader: MovieSetLoader<D>) -> Self {
        Self {
            pool,
            config,
            loader,
        }
    }

    /// Create a room's movie cache, idempotently and race-free.
    ///
    /// A conditional insert reserves the metadata row; whoever loses the
    /// race observes either the finished cache (returned unchanged, no
    /// second discovery spend) or the in-progress reservation (reported as
    /// not ready). The reservation is released on failure so the room can
    /// be retried; no partial cache is ever served.
    pub async fn create_room_cache(
        &self,
        room_id: &str,
        criteria: &FilterCriteria,
    ) -> EngineResult<CreateCacheResult> {
        if room_id.trim().is_empty() {
            return Err(EngineError::Validation("room_id must not be empty".into()));
        }

        let now = now_epoch();
        let ttl = now + self.config.cache_ttl_secs;

        // Expired leftovers would block the reservation
        self.purge_expired(room_id, now).await?;

        let genre_json = to_json(&criteria.genre_ids)?;
        let reserved = sqlx::query(
            r#"
            INSERT OR IGNORE INTO room_cache_metadata
                (room_id, status, total_movies, cache_complete, media_type,
                 genre_ids, room_capacity, created_at, updated_at, ttl)
            VALUES (?, 'BUILDING', 0, 0, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(room_id)
        .bind(criteria.media_type.as_str())
        .bind(&genre_json)
        .bind(criteria.room_capacity)
        .bind(now)
        .bind(now)
        .bind(ttl)
        .execute(&self.pool)
        .await?;

        if reserved.rows_affected() == 0 {
            // Someone else holds or held the reservation
            return match self.metadata(room_id).await? {
                Some(meta) if meta.cache_complete => {
                    tracing::info!(room_id, "Cache already exists, returning existing metadata");
                    Ok(CreateCacheResult {
                        created: false,
                        movie_count: meta.total_movies,
                        metadata: meta,
                    })
                }
                _ => Err(EngineError::CacheNotReady(room_id.to_string())),
            };
        }

        match self.build_and_store(room_id, criteria, ttl).await {
            Ok(metadata) => Ok(CreateCacheResult {
                created: true,
                movie_count: metadata.total_movies,
                metadata,
            }),
            Err(e) => {
                // Release the reservation so a retry can start clean
                if let Err(cleanup_err) = self.delete_room_cache(room_id).await {
                    tracing::warn!(
                        room_id,
                        error = %cleanup_err,
                        "Failed to release cache reservation after error"
                    );
                }
                Err(e)
            }
        }
    }

    async fn build_and_store(
        &self,
        room_id: &str,
        criteria: &FilterCriteria,
        ttl: i64,
    ) -> EngineResult<CacheMetadata> {
        let pool = match self.content_cache_lookup(criteria).await? {
            Some(pool) => {
                tracing::info!(room_id, "Content cache hit, skipping discovery");
                pool
            }
            None => {
                let pool = self.loader.qualified_pool(criteria).await?;
                self.content_cache_store(criteria, &pool).await?;
                pool
            }
        };

        // Ranking runs per room, never from the cache: a shared pool must
        // still produce an independently shuffled sequence for each room
        let set = self.loader.rank_pool(pool, criteria)?;

        self.store_movie_set(room_id, criteria.media_type, &set.movies, ttl)
            .await?;

        let now = now_epoch();
        sqlx::query(
            r#"
            UPDATE room_cache_metadata
            SET status = 'ACTIVE', total_movies = ?, cache_complete = 1, updated_at = ?
            WHERE room_id = ?
            "#,
        )
        .bind(set.movies.len() as i64)
        .bind(now)
        .bind(room_id)
        .execute(&self.pool)
        .await?;

        tracing::info!(room_id, movies = set.movies.len(), "Room cache created");

        self.metadata(room_id)
            .await?
            .ok_or_else(|| EngineError::CacheNotReady(room_id.to_string()))
    }

    /// Persist the ordered set as slots, in ordered sub-batches. Each
    /// sub-batch is one transaction; a crash between batches leaves the
    /// metadata incomplete and the room retryable.
    async fn store_movie_set(
        &self,
        room_id: &str,
        media_type: MediaType,
        movies: &[RankedItem],
        ttl: i64,
    ) -> EngineResult<()> {
        for (batch_index, chunk) in movies.chunks(BATCH_WRITE_LIMIT).enumerate() {
            let mut tx = self.pool.begin().await?;

            for (offset, ranked) in chunk.iter().enumerate() {
                let sequence_index = (batch_index * BATCH_WRITE_LIMIT + offset) as i64;
                let item = &ranked.item;

                sqlx::query(
                    r#"
                    INSERT OR REPLACE INTO room_cache
                        (room_id, sequence_index, movie_id, title, overview,
                         poster_path, release_date, vote_average, genre_ids,
                         original_language, media_type, priority, ttl)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(room_id)
                .bind(sequence_index)
                .bind(item.id.to_string())
                .bind(&item.title)
                .bind(&item.overview)
                .bind(&item.poster_path)
                .bind(&item.release_date)
                .bind(item.vote_average)
                .bind(to_json(&item.genre_ids)?)
                .bind(&item.original_language)
                .bind(media_type.as_str())
                .bind(ranked.genre_priority)
                .bind(ttl)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
        }

        Ok(())
    }

    /// Read the metadata row, treating an expired row as absent.
    pub async fn metadata(&self, room_id: &str) -> EngineResult<Option<CacheMetadata>> {
        let row = sqlx::query(
            r#"
            SELECT room_id, status, total_movies, cache_complete, media_type,
                   genre_ids, room_capacity, created_at, updated_at, ttl
            FROM room_cache_metadata
            WHERE room_id = ? AND ttl > ?
            "#,
        )
        .bind(room_id)
        .bind(now_epoch())
        .fetch_optional(&self.pool)
        .await?;

        row.map(metadata_from_row).transpose()
    }

    /// Fetch one slot by sequence index. `None` outside 0..49 or when the
    /// slot does not exist.
    pub async fn movie_by_index(
        &self,
        room_id: &str,
        index: i64,
    ) -> EngineResult<Option<CachedMovieSlot>> {
        if !(0..MOVIE_SET_SIZE as i64).contains(&index) {
            return Ok(None);
        }

        let row = sqlx::query(
            r#"
            SELECT room_id, sequence_index, movie_id, title, overview,
                   poster_path, release_date, vote_average, genre_ids,
                   original_language, media_type, priority, ttl
            FROM room_cache
            WHERE room_id = ? AND sequence_index = ? AND ttl > ?
            "#,
        )
        .bind(room_id)
        .bind(index)
        .bind(now_epoch())
        .fetch_optional(&self.pool)
        .await?;

        row.map(slot_from_row).transpose()
    }

    /// All slots for a room, ordered by sequence index ascending.
    pub async fn all_movies(&self, room_id: &str) -> EngineResult<Vec<CachedMovieSlot>> {
        let rows = sqlx::query(
            r#"
            SELECT room_id, sequence_index, movie_id, title, overview,
                   poster_path, release_date, vote_average, genre_ids,
                   original_language, media_type, priority, ttl
            FROM room_cache
            WHERE room_id = ? AND ttl > ?
            ORDER BY sequence_index ASC
            "#,
        )
        .bind(room_id)
        .bind(now_epoch())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(slot_from_row).collect()
    }

    /// Recompute the sequence invariant: exactly 50 slots, indices forming
    /// 0..49 with no gaps or duplicates, every slot structurally valid.
    pub async fn validate_sequence_consistency(
        &self,
        room_id: &str,
    ) -> EngineResult<ConsistencyReport> {
        let slots = self.all_movies(room_id).await?;

        let mut present = vec![0usize; MOVIE_SET_SIZE];
        let mut duplicate_indices = Vec::new();
        let mut invalid_slots = Vec::new();

        for slot in &slots {
            let index = slot.sequence_index;
            if (0..MOVIE_SET_SIZE as i64).contains(&index) {
                present[index as usize] += 1;
                if present[index as usize] == 2 {
                    duplicate_indices.push(index);
                }
            } else {
                // Out-of-range indices are duplicates of nothing but still
                // break the permutation
                duplicate_indices.push(index);
            }

            let valid = !slot.movie_id.trim().is_empty()
                && !slot.title.trim().is_empty()
                && !slot.overview.trim().is_empty()
                && !slot.original_language.trim().is_empty();
            if !valid {
                invalid_slots.push(index);
            }
        }

        let missing_indices: Vec<i64> = (0..MOVIE_SET_SIZE as i64)
            .filter(|i| present[*i as usize] == 0)
            .collect();

        let is_consistent = slots.len() == MOVIE_SET_SIZE
            && missing_indices.is_empty()
            && duplicate_indices.is_empty()
            && invalid_slots.is_empty();

        Ok(ConsistencyReport {
            room_id: room_id.to_string(),
            is_consistent,
            total_slots: slots.len() as i64,
            missing_indices,
            duplicate_indices,
            invalid_slots,
        })
    }

    /// Diagnostic-only repair pass: classifies the failure without touching
    /// the data. Silently rewriting a sequence under a member mid-vote
    /// would break the identical-sequence guarantee, so destructive repair
    /// is left to explicit teardown.
    pub async fn repair_sequence_consistency(
        &self,
        room_id: &str,
    ) -> EngineResult<RepairDiagnosis> {
        let metadata = self.metadata(room_id).await?;
        let report = self.validate_sequence_consistency(room_id).await?;

        let action = if metadata.is_none() && report.total_slots == 0 {
            RepairAction::CacheNotFound
        } else if report.total_slots < MOVIE_SET_SIZE as i64 {
            RepairAction::IncompleteCache
        } else if report.total_slots > MOVIE_SET_SIZE as i64 {
            RepairAction::ExcessMovies
        } else if !report.is_consistent {
            RepairAction::SequenceIndexRepairNeeded
        } else {
            RepairAction::NoRepairNeeded
        };

        if action != RepairAction::NoRepairNeeded {
            tracing::warn!(room_id, ?action, "Sequence repair diagnosis");
        }

        Ok(RepairDiagnosis {
            room_id: room_id.to_string(),
            action,
            report,
        })
    }

    /// Read-only gate invoked before serving any movie: the cache must be
    /// complete and structurally valid, otherwise the caller gets an
    /// explicit not-ready or inconsistency signal instead of partial data.
    pub async fn ensure_sequence_consistency(
        &self,
        room_id: &str,
    ) -> EngineResult<CacheMetadata> {
        let metadata = self
            .metadata(room_id)
            .await?
            .ok_or_else(|| EngineError::CacheNotReady(room_id.to_string()))?;

        if !metadata.cache_complete {
            return Err(EngineError::CacheNotReady(room_id.to_string()));
        }

        let report = self.validate_sequence_consistency(room_id).await?;
        if !report.is_consistent {
            return Err(EngineError::SequenceInconsistency(report));
        }

        Ok(metadata)
    }

    /// Prove that all listed users observe the same sequence via a
    /// deterministic hash of the ordered (index, movie id) pairs.
    pub async fn validate_cross_user_consistency(
        &self,
        room_id: &str,
        user_ids: &[String],
    ) -> EngineResult<CrossUserReport> {
        self.ensure_sequence_consistency(room_id).await?;

        let slots = self.all_movies(room_id).await?;
        let mut hasher = Sha256::new();
        for slot in &slots {
            hasher.update(slot.sequence_index.to_string().as_bytes());
            hasher.update(b":");
            hasher.update(slot.movie_id.as_bytes());
            hasher.update(b";");
        }

        Ok(CrossUserReport {
            room_id: room_id.to_string(),
            user_ids: user_ids.to_vec(),
            sequence_hash: format!("{:x}", hasher.finalize()),
            consistent: true,
        })
    }

    /// The next unseen slot for a user, gated on sequence consistency.
    pub async fn next_movie(
        &self,
        room_id: &str,
        user_id: &str,
        user_index: i64,
    ) -> EngineResult<NextMovie> {
        if user_index < 0 {
            return Err(EngineError::Validation(format!(
                "user movie index must be non-negative, got {user_index}"
            )));
        }

        self.ensure_sequence_consistency(room_id).await?;

        if user_index >= MOVIE_SET_SIZE as i64 {
            tracing::debug!(room_id, user_id, "User has finished the sequence");
            return Ok(NextMovie::UserFinished);
        }

        match self.movie_by_index(room_id, user_index).await? {
            Some(slot) => Ok(NextMovie::Slot(slot)),
            // ensure() just validated the sequence, so a hole here means it
            // changed under us; report it rather than guess
            None => {
                let report = self.validate_sequence_consistency(room_id).await?;
                Err(EngineError::SequenceInconsistency(report))
            }
        }
    }

    /// Extend the TTL uniformly across the room's slots and metadata.
    /// Never per-slot.
    pub async fn set_ttl(&self, room_id: &str, ttl: i64) -> EngineResult<()> {
        sqlx::query("UPDATE room_cache SET ttl = ? WHERE room_id = ?")
            .bind(ttl)
            .bind(room_id)
            .execute(&self.pool)
            .await?;

        sqlx::query("UPDATE room_cache_metadata SET ttl = ?, updated_at = ? WHERE room_id = ?")
            .bind(ttl)
            .bind(now_epoch())
            .bind(room_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Room teardown: drop slots and metadata.
    pub async fn delete_room_cache(&self, room_id: &str) -> EngineResult<()> {
        sqlx::query("DELETE FROM room_cache WHERE room_id = ?")
            .bind(room_id)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM room_cache_metadata WHERE room_id = ?")
            .bind(room_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn purge_expired(&self, room_id: &str, now: i64) -> EngineResult<()> {
        sqlx::query("DELETE FROM room_cache_metadata WHERE room_id = ? AND ttl <= ?")
            .bind(room_id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        sqlx::query("DELETE FROM room_cache WHERE room_id = ? AND ttl <= ?")
            .bind(room_id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// The discovery source's genre catalog, for criteria selection UIs.
    pub async fn genres(&self, media_type: MediaType) -> EngineResult<Vec<Genre>> {
        self.loader.genres(media_type).await
    }

    /// Cross-room content cache lookup, keyed by the criteria hash.
    ///
    /// The payload is the unordered qualified pool, never a ranked
    /// sequence; ordering is always re-derived per room. Corrupt payloads
    /// are treated as misses, not failures.
    async fn content_cache_lookup(
        &self,
        criteria: &FilterCriteria,
    ) -> EngineResult<Option<Vec<CatalogItem>>> {
        let row = sqlx::query("SELECT payload FROM content_cache WHERE cache_key = ? AND ttl > ?")
            .bind(criteria.cache_key())
            .bind(now_epoch())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: String = row.try_get("payload")?;
        match serde_json::from_str::<Vec<CatalogItem>>(&payload) {
            Ok(pool) => Ok(Some(pool)),
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable content cache entry");
                Ok(None)
            }
        }
    }

    async fn content_cache_store(
        &self,
        criteria: &FilterCriteria,
        pool: &[CatalogItem],
    ) -> EngineResult<()> {
        let now = now_epoch();
        let payload = serde_json::to_string(pool)
            .map_err(|e| EngineError::Validation(format!("Cannot serialize candidate pool: {e}")))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO content_cache
                (cache_key, media_type, genre_ids, payload, created_at, ttl)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(criteria.cache_key())
        .bind(criteria.media_type.as_str())
        .bind(to_json(&criteria.genre_ids)?)
        .bind(payload)
        .bind(now)
        .bind(now + self.config.content_cache_ttl_secs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

fn to_json(genre_ids: &[i64]) -> EngineResult<String> {
    serde_json::to_string(genre_ids)
        .map_err(|e| EngineError::Validation(format!("Cannot serialize genre ids: {e}")))
}

/// A corrupt stored genre list is surfaced, never silently replaced with
/// an empty one.
fn parse_genre_column(raw: &str) -> EngineResult<Vec<i64>> {
    serde_json::from_str(raw).map_err(|e| {
        matchroom_common::Error::Internal(format!("Corrupt genre_ids column: {e}")).into()
    })
}

fn metadata_from_row(row: sqlx::sqlite::SqliteRow) -> EngineResult<CacheMetadata> {
    let media_type: String = row.try_get("media_type")?;
    let genre_json: String = row.try_get("genre_ids")?;
    let genre_ids = parse_genre_column(&genre_json)?;

    Ok(CacheMetadata {
        room_id: row.try_get("room_id")?,
        status: row.try_get("status")?,
        total_movies: row.try_get("total_movies")?,
        cache_complete: row.try_get::<i64, _>("cache_complete")? != 0,
        media_type: MediaType::parse(&media_type)?,
        genre_ids,
        room_capacity: row.try_get("room_capacity")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        ttl: row.try_get("ttl")?,
    })
}

fn slot_from_row(row: sqlx::sqlite::SqliteRow) -> EngineResult<CachedMovieSlot> {
    let media_type: String = row.try_get("media_type")?;
    let genre_json: String = row.try_get("genre_ids")?;
    let genre_ids = parse_genre_column(&genre_json)?;

    Ok(CachedMovieSlot {
        room_id: row.try_get("room_id")?,
        sequence_index: row.try_get("sequence_index")?,
        movie_id: row.try_get("movie_id")?,
        title: row.try_get("title")?,
        overview: row.try_get("overview")?,
        poster_path: row.try_get("poster_path")?,
        release_date: row.try_get("release_date")?,
        vote_average: row.try_get("vote_average")?,
        genre_ids,
        original_language: row.try_get("original_language")?,
        media_type: MediaType::parse(&media_type)?,
        priority: row.try_get("priority")?,
        ttl: row.try_get("ttl")?,
    })
}
