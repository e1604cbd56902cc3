//! Content quality filters
//!
//! Two gates applied strictly in order (language first, then description)
//! before any genre logic runs. The gates are never relaxed:
//! an empty filtered set is a valid outcome the caller must handle, not a
//! signal to loosen constraints.

use matchroom_common::config::EngineConfig;

use crate::services::tmdb_client::CatalogItem;

/// Language and description quality gates.
pub struct QualityFilter {
    allowed_languages: Vec<String>,
    min_overview_length: usize,
}

impl QualityFilter {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            allowed_languages: config
                .allowed_languages
                .iter()
                .map(|l| l.to_lowercase())
                .collect(),
            min_overview_length: config.min_overview_length,
        }
    }

    /// Keep items whose original language is on the allow-list.
    /// Case-insensitive exact match.
    pub fn filter_language(&self, items: Vec<CatalogItem>) -> Vec<CatalogItem> {
        let before = items.len();
        let kept: Vec<CatalogItem> = items
            .into_iter()
            .filter(|item| {
                let lowered = item.original_language.to_lowercase();
                self.allowed_languages.iter().any(|l| *l == lowered)
            })
            .collect();

        tracing::debug!(before, after = kept.len(), "Language filter applied");
        kept
    }

    /// Keep items whose trimmed overview exceeds the minimum length.
    /// Empty or whitespace-only overviews are always rejected.
    pub fn filter_description(&self, items: Vec<CatalogItem>) -> Vec<CatalogItem> {
        let before = items.len();
        let kept: Vec<CatalogItem> = items
            .into_iter()
            .filter(|item| item.overview.trim().len() > self.min_overview_length)
            .collect();

        tracing::debug!(before, after = kept.len(), "Description filter applied");
        kept
    }

    /// The canonical pipeline: language, then description. Order is fixed.
    pub fn apply(&self, items: Vec<CatalogItem>) -> Vec<CatalogItem> {
        self.filter_description(self.filter_language(items))
    }
}
