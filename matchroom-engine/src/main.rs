//! matchroom-engine service entry point

use anyhow::Result;
use tracing::info;

use matchroom_common::config::{
    resolve_catalog_api_key, resolve_database_path, EngineConfig, TomlConfig,
};
use matchroom_common::db::init_database;
use matchroom_engine::services::cache_manager::CacheManager;
use matchroom_engine::services::quality_filter::QualityFilter;
use matchroom_engine::services::set_loader::MovieSetLoader;
use matchroom_engine::services::tmdb_client::TmdbClient;
use matchroom_engine::services::vote_engine::VoteEngine;
use matchroom_engine::{build_router, AppState};

const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5720";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!(
        "Starting matchroom-engine v{}",
        env!("CARGO_PKG_VERSION")
    );

    let toml_config = TomlConfig::load()?;
    let mut config = EngineConfig::from_toml(&toml_config);
    config.catalog_api_key = resolve_catalog_api_key(&toml_config);

    let db_path = resolve_database_path(&toml_config);
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path).await?;
    info!("✓ Database initialized");

    let client = TmdbClient::new(&config)?;
    let quality = QualityFilter::from_config(&config);
    let loader = MovieSetLoader::new(client, quality, config.max_discovery_pages);

    let cache = CacheManager::new(pool.clone(), config.clone(), loader);
    let votes = VoteEngine::new(pool.clone(), config.cache_ttl_secs);

    let state = AppState::new(pool, cache, votes);
    let app = build_router(state);

    let bind_address = std::env::var("MATCHROOM_BIND_ADDRESS")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDRESS.to_string());
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("matchroom-engine listening on http://{}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
