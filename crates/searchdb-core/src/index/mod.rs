//! SQLite FTS4 search index.
//!
//! This module provides:
//! - The two-table storage layout (FTS4 index + display metadata)
//! - Atomic indexing and removal under explicit transactions
//! - Query normalization and `matchinfo()`-based ranking

mod database;
mod query;
mod rank;
mod schema;
mod transaction;
mod types;

pub use database::{SearchDatabase, IN_MEMORY};
pub use query::{format_query, normalize, NormalizedQuery};
pub use rank::{rank_score, register_ranking_function, ColumnHits, MatchInfo, MatchInfoError};
pub use schema::{SchemaManager, SchemaStats};
pub use transaction::TransactionState;
pub use types::{DocumentMetadata, FieldWeight, IndexRequest, SearchResult, SearchableFields};
