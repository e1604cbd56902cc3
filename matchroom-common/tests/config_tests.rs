//! Configuration resolution tests.
//!
//! Tests that manipulate environment variables are marked with #[serial]
//! to prevent races between parallel test threads.

use std::env;
use std::io::Write;
use std::path::PathBuf;

use serial_test::serial;

use matchroom_common::config::{
    resolve_catalog_api_key, resolve_database_path, EngineConfig, TomlConfig,
    DEFAULT_RATE_LIMIT_MS,
};

#[test]
#[serial]
fn api_key_env_takes_priority_over_toml() {
    env::set_var("MATCHROOM_TMDB_API_KEY", "env-key");

    let toml_config = TomlConfig {
        catalog_api_key: Some("toml-key".to_string()),
        ..Default::default()
    };
    assert_eq!(
        resolve_catalog_api_key(&toml_config),
        Some("env-key".to_string())
    );

    env::remove_var("MATCHROOM_TMDB_API_KEY");
}

#[test]
#[serial]
fn api_key_falls_back_to_toml_then_none() {
    env::remove_var("MATCHROOM_TMDB_API_KEY");

    let toml_config = TomlConfig {
        catalog_api_key: Some("toml-key".to_string()),
        ..Default::default()
    };
    assert_eq!(
        resolve_catalog_api_key(&toml_config),
        Some("toml-key".to_string())
    );

    assert_eq!(resolve_catalog_api_key(&TomlConfig::default()), None);
}

#[test]
#[serial]
fn blank_env_key_is_ignored() {
    env::set_var("MATCHROOM_TMDB_API_KEY", "   ");

    let toml_config = TomlConfig {
        catalog_api_key: Some("toml-key".to_string()),
        ..Default::default()
    };
    assert_eq!(
        resolve_catalog_api_key(&toml_config),
        Some("toml-key".to_string())
    );

    env::remove_var("MATCHROOM_TMDB_API_KEY");
}

#[test]
#[serial]
fn database_path_priority_is_env_then_toml_then_default() {
    env::set_var("MATCHROOM_DATABASE_PATH", "/tmp/env-matchroom.db");
    let toml_config = TomlConfig {
        database_path: Some("/tmp/toml-matchroom.db".to_string()),
        ..Default::default()
    };
    assert_eq!(
        resolve_database_path(&toml_config),
        PathBuf::from("/tmp/env-matchroom.db")
    );

    env::remove_var("MATCHROOM_DATABASE_PATH");
    assert_eq!(
        resolve_database_path(&toml_config),
        PathBuf::from("/tmp/toml-matchroom.db")
    );

    let default_path = resolve_database_path(&TomlConfig::default());
    assert!(default_path.ends_with("matchroom.db"));
}

#[test]
fn toml_file_round_trip() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"
rate_limit_ms = 500
allowed_languages = ["en", "fr"]
min_overview_length = 25
"#
    )
    .expect("write config");

    let toml_config = TomlConfig::load_from(file.path()).expect("parse config");
    let config = EngineConfig::from_toml(&toml_config);

    assert_eq!(config.rate_limit_ms, 500);
    assert_eq!(config.allowed_languages, vec!["en", "fr"]);
    assert_eq!(config.min_overview_length, 25);
}

#[test]
fn malformed_toml_is_an_error() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "rate_limit_ms = \"not a number\"").expect("write config");

    assert!(TomlConfig::load_from(file.path()).is_err());
}

#[test]
fn missing_fields_keep_compiled_defaults() {
    let config = EngineConfig::from_toml(&TomlConfig::default());
    assert_eq!(config.rate_limit_ms, DEFAULT_RATE_LIMIT_MS);
}
