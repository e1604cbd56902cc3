//! Movie set loader
//!
//! Orchestrates discovery, deduplication, quality filtering,
//! prioritization, and truncation into the fixed-size candidate set every
//! room member will swipe through. A room set is exactly
//! [`MOVIE_SET_SIZE`] titles or the whole operation fails; no partial set
//! is ever produced.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

use matchroom_common::db::{FilterCriteria, MediaType};

use crate::error::{EngineError, EngineResult};
use crate::services::priority::{prioritize, RankedItem};
use crate::services::quality_filter::QualityFilter;
use crate::services::tmdb_client::{CatalogItem, ContentDiscovery, Genre, GenreSelector};

/// Every room cache holds exactly this many titles.
pub const MOVIE_SET_SIZE: usize = 50;

/// Audit flags asserted true whenever a set is successfully produced.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct BusinessRulesApplied {
    pub western_languages_only: bool,
    pub description_required: bool,
    pub genre_prioritization: bool,
    pub exactly_fifty_movies: bool,
}

/// An assembled, ordered movie set ready for persistence.
#[derive(Debug, Clone)]
pub struct MovieSet {
    /// Exactly [`MOVIE_SET_SIZE`] ranked items; position is the sequence
    /// index.
    pub movies: Vec<RankedItem>,
    pub criteria: FilterCriteria,
    pub total_movies: usize,
    pub business_rules: BusinessRulesApplied,
}

/// Assembles movie sets from a content discovery source.
pub struct MovieSetLoader<D> {
    discovery: D,
    quality: QualityFilter,
    max_pages: u32,
    /// Fixed RNG seed for reproducible shuffles in tests. Production uses
    /// entropy.
    seed: Option<u64>,
}

impl<D: ContentDiscovery> MovieSetLoader<D> {
    pub fn new(discovery: D, quality: QualityFilter, max_pages: u32) -> Self {
        Self {
            discovery,
            quality,
            max_pages,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Build the candidate set for `criteria`: accumulate a qualified
    /// pool, then rank it.
    pub async fn create_movie_set(&self, criteria: &FilterCriteria) -> EngineResult<MovieSet> {
        let pool = self.qualified_pool(criteria).await?;
        self.rank_pool(pool, criteria)
    }

    /// Accumulate the deduplicated, quality-filtered candidate pool.
    ///
    /// Discovery runs in passes of narrowing genre strictness (ALL-match,
    /// then ANY-match, then unfiltered), paging each pass until enough
    /// qualifying volume has accumulated or pages exhaust. Deduplication
    /// is by catalog id, first occurrence wins. Quality filtering runs
    /// language-then-description and is never relaxed.
    ///
    /// The pool carries no ordering contract; it is safe to share across
    /// rooms because every room ranks it independently.
    pub async fn qualified_pool(&self, criteria: &FilterCriteria) -> EngineResult<Vec<CatalogItem>> {
        let passes = discovery_passes(&criteria.genre_ids);

        let mut pool: Vec<CatalogItem> = Vec::new();
        let mut seen: HashSet<i64> = HashSet::new();

        'passes: for selector in &passes {
            for page in 1..=self.max_pages {
                let items = self
                    .discovery
                    .discover(criteria.media_type, selector, page)
                    .await?;
                let page_exhausted = items.is_empty();

                for item in items {
                    if seen.insert(item.id) {
                        pool.push(item);
                    }
                }

                if self.qualifying_count(&pool) >= MOVIE_SET_SIZE {
                    break 'passes;
                }
                if page_exhausted {
                    break;
                }
            }
        }

        tracing::debug!(
            raw = pool.len(),
            passes = passes.len(),
            "Discovery accumulation finished"
        );

        let qualified = self.quality.apply(pool);
        if qualified.len() < MOVIE_SET_SIZE {
            return Err(EngineError::InsufficientContent {
                available: qualified.len(),
                required: MOVIE_SET_SIZE,
            });
        }

        Ok(qualified)
    }

    /// Rank a qualified pool into a fresh movie set for one room.
    ///
    /// Runs the per-bucket shuffle anew on every call, so two rooms fed
    /// the same pool still receive independently randomized sequences.
    pub fn rank_pool(
        &self,
        pool: Vec<CatalogItem>,
        criteria: &FilterCriteria,
    ) -> EngineResult<MovieSet> {
        if pool.len() < MOVIE_SET_SIZE {
            return Err(EngineError::InsufficientContent {
                available: pool.len(),
                required: MOVIE_SET_SIZE,
            });
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let buckets = prioritize(pool, &criteria.genre_ids, &mut rng);

        let movies: Vec<RankedItem> = buckets
            .into_iter()
            .flat_map(|bucket| {
                let priority = bucket.priority;
                bucket.items.into_iter().map(move |item| RankedItem {
                    item,
                    genre_priority: priority,
                })
            })
            .take(MOVIE_SET_SIZE)
            .collect();

        tracing::info!(
            media_type = criteria.media_type.as_str(),
            genres = ?criteria.genre_ids,
            total = movies.len(),
            "Assembled movie set"
        );

        Ok(MovieSet {
            movies,
            criteria: criteria.clone(),
            total_movies: MOVIE_SET_SIZE,
            business_rules: BusinessRulesApplied {
                western_languages_only: true,
                description_required: true,
                genre_prioritization: true,
                exactly_fifty_movies: true,
            },
        })
    }

    fn qualifying_count(&self, pool: &[CatalogItem]) -> usize {
        self.quality.apply(pool.to_vec()).len()
    }

    /// Passthrough to the discovery source's genre catalog.
    pub async fn genres(&self, media_type: MediaType) -> EngineResult<Vec<Genre>> {
        Ok(self.discovery.genres(media_type).await?)
    }
}

/// The genre selectors tried, strictest first.
fn discovery_passes(genre_ids: &[i64]) -> Vec<GenreSelector> {
    match genre_ids.len() {
        0 => vec![GenreSelector::Unfiltered],
        1 => vec![
            GenreSelector::Any(genre_ids.to_vec()),
            GenreSelector::Unfiltered,
        ],
        _ => vec![
            GenreSelector::All(genre_ids.to_vec()),
            GenreSelector::Any(genre_ids.to_vec()),
            GenreSelector::Unfiltered,
        ],
    }
}
