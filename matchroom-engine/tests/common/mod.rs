//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;
use tempfile::TempDir;

use matchroom_common::config::EngineConfig;
use matchroom_common::db::{init_database, MediaType};
use matchroom_engine::services::cache_manager::CacheManager;
use matchroom_engine::services::quality_filter::QualityFilter;
use matchroom_engine::services::set_loader::MovieSetLoader;
use matchroom_engine::services::tmdb_client::{
    CatalogError, CatalogItem, ContentDiscovery, Genre, GenreSelector,
};

/// Fresh on-disk database in a temp directory. The directory must outlive
/// the pool, so it is returned alongside.
pub async fn setup_db() -> (SqlitePool, TempDir) {
    let dir = TempDir::new().expect("create temp dir");
    let pool = init_database(&dir.path().join("matchroom.db"))
        .await
        .expect("init database");
    (pool, dir)
}

/// Deterministic catalog stand-in. Serves `pages` pages of `per_page`
/// titles each, every one matching the requested genres, and counts how
/// many discover calls were spent.
pub struct MockCatalog {
    pub per_page: usize,
    pub pages: u32,
    calls: Arc<AtomicUsize>,
}

impl MockCatalog {
    pub fn new(per_page: usize, pages: u32) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                per_page,
                pages,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

#[async_trait]
impl ContentDiscovery for MockCatalog {
    async fn discover(
        &self,
        _media_type: MediaType,
        selector: &GenreSelector,
        page: u32,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if page > self.pages {
            return Ok(Vec::new());
        }

        let base = (page as i64 - 1) * self.per_page as i64;
        let items = (0..self.per_page as i64)
            .map(|offset| {
                let id = base + offset;
                CatalogItem {
                    id,
                    title: format!("Movie {id}"),
                    overview: format!("A sufficiently descriptive synopsis for movie {id}."),
                    original_language: "en".to_string(),
                    genre_ids: vec![28, 35],
                    vote_average: 7.0,
                    release_date: "2024-01-01".to_string(),
                    poster_path: Some(format!("/poster-{id}.jpg")),
                }
            })
            .filter(|item| selector.matches(&item.genre_ids))
            .collect();

        Ok(items)
    }

    async fn genres(&self, _media_type: MediaType) -> Result<Vec<Genre>, CatalogError> {
        Ok(vec![
            Genre {
                id: 28,
                name: "Action".to_string(),
            },
            Genre {
                id: 35,
                name: "Comedy".to_string(),
            },
        ])
    }
}

/// Cache manager over a mock catalog with a fixed shuffle seed, plus the
/// shared discover-call counter.
pub fn make_cache_manager(
    pool: SqlitePool,
    per_page: usize,
    pages: u32,
) -> (CacheManager<MockCatalog>, Arc<AtomicUsize>) {
    let config = EngineConfig::default();
    let (catalog, calls) = MockCatalog::new(per_page, pages);
    let loader = MovieSetLoader::new(
        catalog,
        QualityFilter::from_config(&config),
        config.max_discovery_pages,
    )
    .with_seed(7);

    (CacheManager::new(pool, config, loader), calls)
}

/// Like [`make_cache_manager`] but with entropy-seeded shuffles, as in
/// production.
pub fn make_entropy_cache_manager(
    pool: SqlitePool,
    per_page: usize,
    pages: u32,
) -> (CacheManager<MockCatalog>, Arc<AtomicUsize>) {
    let config = EngineConfig::default();
    let (catalog, calls) = MockCatalog::new(per_page, pages);
    let loader = MovieSetLoader::new(
        catalog,
        QualityFilter::from_config(&config),
        config.max_discovery_pages,
    );

    (CacheManager::new(pool, config, loader), calls)
}
