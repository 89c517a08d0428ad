//! Centralized configuration for the search database.
//!
//! Fixed names and limits live in constant structs; per-handle tunables live
//! in [`SearchDbConfig`].

use crate::retry::RetryConfig;
use std::time::Duration;

/// Table and column names shared by the schema, pipeline, and search SQL.
pub struct DatabaseConfig;

impl DatabaseConfig {
    pub const INDEX_TABLE: &'static str = "searchindex";
    pub const METADATA_TABLE: &'static str = "searchmetadata";

    /// Physical column order of the full-text table.
    pub const INDEX_COLUMNS: [&'static str; 9] = [
        "moduleid", "entityid", "language", "boost", "weight0", "weight1", "weight2", "weight3",
        "weight4",
    ];

    /// Physical column order of the metadata table.
    pub const METADATA_COLUMNS: [&'static str; 7] = [
        "moduleid", "entityid", "title", "subtitle", "uri", "type", "imageuri",
    ];

    /// FTS4 incremental segment merge level.
    pub const DEFAULT_AUTOMERGE: u32 = 2;

    /// Extension written after the database name by `SearchManager`.
    pub const FILE_EXTENSION: &'static str = "sqlite";
}

/// Ranking constants.
pub struct RankingConfig;

impl RankingConfig {
    /// Name the ranking function is registered under.
    pub const FUNCTION_NAME: &'static str = "rank";

    /// Weights for the nine physical columns. Header columns never score.
    pub const COLUMN_WEIGHTS: [f64; 9] = [0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 10.0, 20.0, 50.0];

    /// Upper bound FTS4 accepts for snippet token counts.
    pub const MAX_SNIPPET_TOKENS: usize = 64;
}

/// Task queue constants.
pub struct TaskConfig;

impl TaskConfig {
    pub const INDEX_INFO_DIR_NAME: &'static str = "search-index-info";
    pub const MAJOR_PRIORITY: u32 = 1000;
    pub const MINOR_PRIORITY_INDEX: u32 = 1000;
    pub const MINOR_PRIORITY_REMOVE: u32 = 10000;
    pub const MAX_TASK_ATTEMPTS: u32 = 3;
}

/// Markers wrapped around matched terms in result snippets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetConfig {
    pub start_match: String,
    pub end_match: String,
    pub ellipsis: String,
}

impl Default for SnippetConfig {
    fn default() -> Self {
        Self {
            start_match: "<b>".to_string(),
            end_match: "</b>".to_string(),
            ellipsis: "...".to_string(),
        }
    }
}

/// Per-handle configuration for a [`SearchDatabase`](crate::SearchDatabase).
#[derive(Debug, Clone)]
pub struct SearchDbConfig {
    /// FTS4 `automerge` level issued on open.
    pub automerge: u32,
    /// Backoff applied while SQLite reports busy.
    pub busy_retry: RetryConfig,
    /// SQLite's own busy handler timeout. Zero leaves waiting to `busy_retry`.
    pub busy_timeout: Duration,
    pub snippet: SnippetConfig,
}

impl Default for SearchDbConfig {
    fn default() -> Self {
        Self {
            automerge: DatabaseConfig::DEFAULT_AUTOMERGE,
            busy_retry: RetryConfig::default(),
            busy_timeout: Duration::ZERO,
            snippet: SnippetConfig::default(),
        }
    }
}

impl SearchDbConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_automerge(mut self, automerge: u32) -> Self {
        self.automerge = automerge;
        self
    }

    pub fn with_busy_retry(mut self, busy_retry: RetryConfig) -> Self {
        self.busy_retry = busy_retry;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_snippet(mut self, snippet: SnippetConfig) -> Self {
        self.snippet = snippet;
        self
    }
}
