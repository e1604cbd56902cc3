//! # Matchroom Common Library
//!
//! Shared code for the matchroom services including:
//! - Database initialization, schema, and persisted models
//! - Error types
//! - Configuration loading and resolution

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
