//! SearchDB - embedded full-text search over SQLite FTS4.
//!
//! Documents carry five text fields of increasing importance
//! (`weight0`..`weight4`) plus display metadata. Searches are normalized into
//! prefix queries, ranked by weighted `matchinfo()` hit ratios scaled by a
//! per-document boost, and returned with highlighted snippets.
//!
//! [`SearchDatabase`] is the storage engine. [`SearchManager`] layers named
//! databases, a prioritized task queue, and favorite/backup delegates on top.
//!
//! # Example
//!
//! ```rust
//! use searchdb::{DocumentMetadata, FieldWeight, SearchDatabase, SearchableFields, IN_MEMORY};
//!
//! fn main() -> searchdb::Result<()> {
//!     let mut db = SearchDatabase::open(IN_MEMORY)?;
//!
//!     let fields = SearchableFields::new()
//!         .with(FieldWeight::Weight4, "Quarterly status report")
//!         .with(FieldWeight::Weight1, "Numbers for the third quarter");
//!     let metadata = DocumentMetadata::new("Q3 report", "docs://q3");
//!     db.index("docs", "q3", "en", 1.0, &fields, &metadata)?;
//!
//!     let results = db.search("status rep", 10, 0, false)?;
//!     assert_eq!(results[0].title, "Q3 report");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod manager;
pub mod retry;
pub mod task;

// Re-export commonly used types
pub use config::{SearchDbConfig, SnippetConfig};
pub use error::{Result, SearchDbError};
pub use index::{
    format_query, normalize, rank_score, DocumentMetadata, FieldWeight, IndexRequest, MatchInfo,
    NormalizedQuery, SearchDatabase, SearchResult, SearchableFields, TransactionState, IN_MEMORY,
};
pub use manager::{BackupSearch, FavoriteLookup, SearchManager, TaskReport};
pub use retry::RetryConfig;
pub use task::{IndexObserver, SearchTask, SearchTaskWorker};
