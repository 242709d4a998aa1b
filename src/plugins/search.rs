use crate::constants::PROJECT_TYPE_MARKERS;
use crate::models::PluginSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The bundled plugin catalog shipped with the binary
const CATALOG_JSON: &str = include_str!("catalog.json");

/// One catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub repository: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub author: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub downloads: u64,
}

/// A ranked search hit annotated with local install state
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub entry: CatalogEntry,
    pub score: u32,
    pub installed: bool,
    pub enabled: bool,
}

/// Local index over the bundled catalog plus the installed state.
///
/// Ranking is substring matching over name, tags, description, and author,
/// with a relevance boost when the entry's languages match the project the
/// user is standing in. Keyword queries sort by relevance; an empty query
/// sorts by popularity.
pub struct PluginSearch {
    catalog: Vec<CatalogEntry>,
}

impl PluginSearch {
    pub fn new() -> Result<Self> {
        let catalog: Vec<CatalogEntry> =
            serde_json::from_str(CATALOG_JSON).context("bundled plugin catalog is malformed")?;
        Ok(Self { catalog })
    }

    #[cfg(test)]
    fn with_catalog(catalog: Vec<CatalogEntry>) -> Self {
        Self { catalog }
    }

    /// Languages hinted by marker files in the working directory
    pub fn project_languages(cwd: &Path) -> Vec<String> {
        let mut languages: Vec<String> = PROJECT_TYPE_MARKERS
            .iter()
            .filter(|(marker, _)| cwd.join(marker).exists())
            .map(|(_, language)| (*language).to_string())
            .collect();
        languages.dedup();
        languages
    }

    /// Search the catalog. An empty query matches everything.
    pub fn search(
        &self,
        query: &str,
        settings: &PluginSettings,
        project_languages: &[String],
    ) -> Vec<SearchHit> {
        let query = query.trim().to_lowercase();
        let mut hits: Vec<SearchHit> = self
            .catalog
            .iter()
            .filter_map(|entry| {
                let score = if query.is_empty() {
                    0
                } else {
                    match relevance(entry, &query) {
                        0 => return None,
                        score => score,
                    }
                };
                let boost: u32 = entry
                    .languages
                    .iter()
                    .filter(|lang| project_languages.contains(lang))
                    .count() as u32
                    * 3;

                let installed = settings.repositories.contains_key(&entry.repository);
                let enabled = settings
                    .enabled_plugins(&entry.repository)
                    .iter()
                    .any(|p| p == &entry.name);
                Some(SearchHit {
                    entry: entry.clone(),
                    score: score + boost,
                    installed,
                    enabled,
                })
            })
            .collect();

        if query.is_empty() {
            hits.sort_by(|a, b| {
                b.score
                    .cmp(&a.score)
                    .then(b.entry.downloads.cmp(&a.entry.downloads))
            });
        } else {
            hits.sort_by(|a, b| {
                b.score
                    .cmp(&a.score)
                    .then(b.entry.downloads.cmp(&a.entry.downloads))
                    .then(a.entry.name.cmp(&b.entry.name))
            });
        }
        hits
    }
}

/// Field-weighted substring relevance
fn relevance(entry: &CatalogEntry, query: &str) -> u32 {
    let mut score = 0;
    if entry.name.to_lowercase().contains(query) {
        score += 10;
    }
    if entry.tags.iter().any(|t| t.to_lowercase().contains(query)) {
        score += 5;
    }
    if entry.description.to_lowercase().contains(query) {
        score += 3;
    }
    if entry.author.to_lowercase().contains(query) {
        score += 2;
    }
    score
}
