//! TMDB catalog API client
//!
//! Resilient wrapper around the external catalog: fixed-delay rate
//! limiting, one exponential-backoff retry on a rate-limit signal, and
//! fail-closed item validation. The upstream genre filter is treated as an
//! approximation; AND/OR membership is re-checked on every response.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

use matchroom_common::config::EngineConfig;
use matchroom_common::db::MediaType;

const USER_AGENT: &str = "matchroom/0.1.0 (+https://github.com/matchroom/matchroom)";

/// Catalog client errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Catalog API key is not configured")]
    MissingApiKey,
}

/// A catalog genre
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Raw catalog record as the API returns it. Every field the engine needs
/// is optional here; [`CatalogItem::try_from`] decides what is acceptable.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCatalogItem {
    pub id: i64,
    /// Movie title
    pub title: Option<String>,
    /// TV name
    pub name: Option<String>,
    pub overview: Option<String>,
    pub original_language: Option<String>,
    pub genre_ids: Option<Vec<i64>>,
    pub vote_average: Option<f64>,
    /// Movie release date
    pub release_date: Option<String>,
    /// TV first air date
    pub first_air_date: Option<String>,
    pub poster_path: Option<String>,
}

/// A validated catalog record.
///
/// Construction fails closed: an item without a title/name, a release/air
/// date, genre ids, or a vote average is rejected rather than patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: i64,
    pub title: String,
    pub overview: String,
    pub original_language: String,
    pub genre_ids: Vec<i64>,
    pub vote_average: f64,
    pub release_date: String,
    pub poster_path: Option<String>,
}

impl TryFrom<RawCatalogItem> for CatalogItem {
    type Error = CatalogError;

    fn try_from(raw: RawCatalogItem) -> Result<Self, Self::Error> {
        let title = raw
            .title
            .or(raw.name)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CatalogError::Parse(format!("item {} has no title", raw.id)))?;

        let release_date = raw
            .release_date
            .or(raw.first_air_date)
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| CatalogError::Parse(format!("item {} has no date", raw.id)))?;

        let genre_ids = raw
            .genre_ids
            .ok_or_else(|| CatalogError::Parse(format!("item {} has no genre ids", raw.id)))?;

        let vote_average = raw
            .vote_average
            .ok_or_else(|| CatalogError::Parse(format!("item {} has no vote average", raw.id)))?;

        Ok(CatalogItem {
            id: raw.id,
            title,
            overview: raw.overview.unwrap_or_default(),
            original_language: raw.original_language.unwrap_or_default(),
            genre_ids,
            vote_average,
            release_date,
            poster_path: raw.poster_path,
        })
    }
}

/// Genre filter with AND / OR semantics, expressed as the two distinct
/// query forms the catalog supports.
#[derive(Debug, Clone, PartialEq)]
pub enum GenreSelector {
    /// Every listed genre must be present (`,`-joined query form).
    All(Vec<i64>),
    /// At least one listed genre must be present (`|`-joined query form).
    Any(Vec<i64>),
    /// No genre constraint.
    Unfiltered,
}

impl GenreSelector {
    /// Render the `with_genres` query parameter value, if any.
    pub fn query_value(&self) -> Option<String> {
        match self {
            GenreSelector::All(ids) if !ids.is_empty() => Some(
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            GenreSelector::Any(ids) if !ids.is_empty() => Some(
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join("|"),
            ),
            _ => None,
        }
    }

    /// Response-side membership check. The upstream filter is an
    /// approximation, not a guarantee.
    pub fn matches(&self, genre_ids: &[i64]) -> bool {
        match self {
            GenreSelector::All(ids) => ids.iter().all(|id| genre_ids.contains(id)),
            GenreSelector::Any(ids) => {
                ids.is_empty() || ids.iter().any(|id| genre_ids.contains(id))
            }
            GenreSelector::Unfiltered => true,
        }
    }
}

/// Token-less rate limiter enforcing a minimum inter-request spacing.
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with the rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// Source of catalog content. The production implementation is
/// [`TmdbClient`]; tests substitute a fixed catalog.
#[async_trait]
pub trait ContentDiscovery: Send + Sync {
    /// Fetch one page of candidates for the media type and genre filter.
    async fn discover(
        &self,
        media_type: MediaType,
        selector: &GenreSelector,
        page: u32,
    ) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Fetch the genre catalog for a media type.
    async fn genres(&self, media_type: MediaType) -> Result<Vec<Genre>, CatalogError>;
}

#[derive(Debug, Deserialize)]
struct DiscoverResponse {
    results: Vec<RawCatalogItem>,
}

#[derive(Debug, Deserialize)]
struct GenreListResponse {
    genres: Vec<Genre>,
}

/// TMDB API client
pub struct TmdbClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    base_url: String,
    api_key: String,
    backoff_base_ms: u64,
    backoff_cap_ms: u64,
}

impl TmdbClient {
    pub fn new(config: &EngineConfig) -> Result<Self, CatalogError> {
        let api_key = config
            .catalog_api_key
            .clone()
            .ok_or(CatalogError::MissingApiKey)?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CatalogError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit_ms)),
            base_url: config.catalog_base_url.clone(),
            api_key,
            backoff_base_ms: config.backoff_base_ms,
            backoff_cap_ms: config.backoff_cap_ms,
        })
    }

    fn media_path(media_type: MediaType) -> &'static str {
        match media_type {
            MediaType::Movie => "movie",
            MediaType::Tv => "tv",
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff_base_ms.saturating_mul(1u64 << attempt);
        Duration::from_millis(delay.min(self.backoff_cap_ms))
    }

    /// Perform a GET, retrying exactly once with backoff on a rate-limit
    /// signal. Other failures propagate.
    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response, CatalogError> {
        for attempt in 0..2u32 {
            self.rate_limiter.wait().await;

            let response = self
                .http_client
                .get(url)
                .send()
                .await
                .map_err(|e| CatalogError::Network(e.to_string()))?;

            let status = response.status();

            if status.as_u16() == 429 {
                if attempt == 0 {
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(delay_ms = delay.as_millis() as u64, "Catalog rate limit hit, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(CatalogError::RateLimitExceeded);
            }

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                return Err(CatalogError::Api(status.as_u16(), error_text));
            }

            return Ok(response);
        }

        Err(CatalogError::RateLimitExceeded)
    }
}

#[async_trait]
impl ContentDiscovery for TmdbClient {
    async fn discover(
        &self,
        media_type: MediaType,
        selector: &GenreSelector,
        page: u32,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let mut url = format!(
            "{}/discover/{}?api_key={}&page={}&sort_by=popularity.desc",
            self.base_url,
            Self::media_path(media_type),
            self.api_key,
            page
        );
        if let Some(genres) = selector.query_value() {
            url.push_str("&with_genres=");
            url.push_str(&genres);
        }

        tracing::debug!(media_type = media_type.as_str(), page, "Querying catalog discover");

        let response = self.get_with_retry(&url).await?;
        let body: DiscoverResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        let total = body.results.len();
        let items: Vec<CatalogItem> = body
            .results
            .into_iter()
            .filter_map(|raw| match CatalogItem::try_from(raw) {
                Ok(item) => Some(item),
                Err(e) => {
                    // Invalid items are dropped, not retried
                    tracing::debug!(error = %e, "Dropping malformed catalog item");
                    None
                }
            })
            .filter(|item| selector.matches(&item.genre_ids))
            .collect();

        tracing::debug!(
            received = total,
            kept = items.len(),
            page,
            "Catalog discover page processed"
        );

        Ok(items)
    }

    async fn genres(&self, media_type: MediaType) -> Result<Vec<Genre>, CatalogError> {
        let url = format!(
            "{}/genre/{}/list?api_key={}",
            self.base_url,
            Self::media_path(media_type),
            self.api_key
        );

        let response = self.get_with_retry(&url).await?;
        let body: GenreListResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Parse(e.to_string()))?;

        Ok(body.genres)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_item(id: i64) -> RawCatalogItem {
        RawCatalogItem {
            id,
            title: Some("Seven Samurai".to_string()),
            name: None,
            overview: Some("A village hires seven ronin.".to_string()),
            original_language: Some("ja".to_string()),
            genre_ids: Some(vec![28, 18]),
            vote_average: Some(8.6),
            release_date: Some("1954-04-26".to_string()),
            first_air_date: None,
            poster_path: Some("/poster.jpg".to_string()),
        }
    }

    #[test]
    fn valid_item_parses() {
        let item = CatalogItem::try_from(raw_item(1)).unwrap();
        assert_eq!(item.title, "Seven Samurai");
        assert_eq!(item.genre_ids, vec![28, 18]);
    }

    #[test]
    fn tv_name_and_air_date_substitute() {
        let mut raw = raw_item(2);
        raw.title = None;
        raw.name = Some("The Wire".to_string());
        raw.release_date = None;
        raw.first_air_date = Some("2002-06-02".to_string());

        let item = CatalogItem::try_from(raw).unwrap();
        assert_eq!(item.title, "The Wire");
        assert_eq!(item.release_date, "2002-06-02");
    }

    #[test]
    fn missing_title_fails_closed() {
        let mut raw = raw_item(3);
        raw.title = None;
        raw.name = Some("   ".to_string());
        assert!(CatalogItem::try_from(raw).is_err());
    }

    #[test]
    fn missing_vote_average_fails_closed() {
        let mut raw = raw_item(4);
        raw.vote_average = None;
        assert!(CatalogItem::try_from(raw).is_err());
    }

    #[test]
    fn missing_genre_ids_fails_closed() {
        let mut raw = raw_item(5);
        raw.genre_ids = None;
        assert!(CatalogItem::try_from(raw).is_err());
    }

    #[test]
    fn missing_overview_is_tolerated_here() {
        // The description gate belongs to the quality filter, not parsing
        let mut raw = raw_item(6);
        raw.overview = None;
        let item = CatalogItem::try_from(raw).unwrap();
        assert!(item.overview.is_empty());
    }

    #[test]
    fn selector_query_forms() {
        assert_eq!(
            GenreSelector::All(vec![28, 35]).query_value(),
            Some("28,35".to_string())
        );
        assert_eq!(
            GenreSelector::Any(vec![28, 35]).query_value(),
            Some("28|35".to_string())
        );
        assert_eq!(GenreSelector::Unfiltered.query_value(), None);
        assert_eq!(GenreSelector::All(vec![]).query_value(), None);
    }

    #[test]
    fn selector_revalidates_membership() {
        let all = GenreSelector::All(vec![28, 35]);
        assert!(all.matches(&[28, 35, 12]));
        assert!(!all.matches(&[28, 12]));

        let any = GenreSelector::Any(vec![28, 35]);
        assert!(any.matches(&[35]));
        assert!(!any.matches(&[12, 16]));

        assert!(GenreSelector::Unfiltered.matches(&[]));
    }

    #[tokio::test]
    async fn rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(100);

        let start = Instant::now();

        // First request - no wait
        limiter.wait().await;
        let first_elapsed = start.elapsed();

        // Second request - should wait ~100ms
        limiter.wait().await;
        let second_elapsed = start.elapsed();

        assert!(first_elapsed < Duration::from_millis(50));
        assert!(second_elapsed >= Duration::from_millis(90));
    }
}
