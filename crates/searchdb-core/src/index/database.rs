//! The search database handle: indexing pipeline and ranked search.

use crate::config::{RankingConfig, SearchDbConfig};
use crate::error::{Result, SearchDbError};
use crate::retry::retry_busy;
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::query::format_query;
use super::rank::register_ranking_function;
use super::schema::{SchemaManager, SchemaStats};
use super::transaction::{TransactionManager, TransactionState};
use super::types::{DocumentMetadata, IndexRequest, SearchResult, SearchableFields};

/// Location string that opens a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

const EXISTS_SQL: &str = "SELECT EXISTS(
    SELECT 1 FROM searchindex WHERE moduleid = ?1 AND entityid = ?2
)";

const INSERT_INDEX_SQL: &str = "INSERT INTO searchindex
    (moduleid, entityid, language, boost, weight0, weight1, weight2, weight3, weight4)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const INSERT_METADATA_SQL: &str = "INSERT INTO searchmetadata
    (moduleid, entityid, title, subtitle, uri, type, imageuri)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

const DELETE_INDEX_SQL: &str = "DELETE FROM searchindex WHERE moduleid = ?1 AND entityid = ?2";

const DELETE_METADATA_SQL: &str =
    "DELETE FROM searchmetadata WHERE moduleid = ?1 AND entityid = ?2";

/// Ranked window over the index, joined to display metadata.
///
/// Parameters: ?1 match query, ?2-?4 snippet markers, ?5 snippet tokens,
/// ?6 limit, ?7 offset.
const SEARCH_SQL: &str = "SELECT r.moduleid, r.entityid,
        COALESCE(m.title, ''), COALESCE(m.subtitle, ''), COALESCE(m.uri, ''),
        COALESCE(m.type, ''), COALESCE(m.imageuri, ''),
        r.snippet, r.score
    FROM (
        SELECT docid, moduleid, entityid,
               snippet(searchindex, ?2, ?3, ?4, -1, ?5) AS snippet,
               rank(matchinfo(searchindex), boost) AS score
        FROM searchindex
        WHERE searchindex MATCH ?1
        ORDER BY score DESC, docid ASC
        LIMIT ?6 OFFSET ?7
    ) AS r
    LEFT JOIN searchmetadata AS m
        ON m.moduleid = r.moduleid AND m.entityid = r.entityid
    ORDER BY r.score DESC, r.docid ASC";

/// A full-text search database over one SQLite file.
///
/// The handle owns its connection exclusively. Mutations take `&mut self`, so
/// a handle runs at most one transaction at a time; share it across threads
/// behind a mutex or open one handle per thread.
pub struct SearchDatabase {
    location: String,
    conn: Connection,
    config: SearchDbConfig,
    schema: SchemaManager,
    tx: TransactionManager,
}

impl SearchDatabase {
    /// Create or open a search database at `location` (a path or `:memory:`).
    pub fn open(location: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(location, SearchDbConfig::default())
    }

    /// Create or open a search database with custom configuration.
    pub fn open_with_config(location: impl AsRef<Path>, config: SearchDbConfig) -> Result<Self> {
        let path = location.as_ref();
        let location = path.display().to_string();

        let conn = Self::open_connection(path, &location)?;
        let schema = SchemaManager::new(config.automerge);

        if let Err(e) = Self::prepare_connection(&conn, &schema, &config) {
            if let Err((_, close_err)) = conn.close() {
                warn!("Failed to close {} after setup error: {}", location, close_err);
            }
            return Err(e);
        }

        info!("Opened search database at {}", location);

        Ok(Self {
            location,
            tx: TransactionManager::new(config.busy_retry.clone()),
            conn,
            config,
            schema,
        })
    }

    fn open_connection(path: &Path, location: &str) -> Result<Connection> {
        if location == IN_MEMORY {
            return Connection::open_in_memory().map_err(|e| SearchDbError::Open {
                message: e.to_string(),
                path: location.to_string(),
                source: Some(e),
            });
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| SearchDbError::io_with_path(e, parent))?;
            }
        }

        Connection::open(path).map_err(|e| SearchDbError::Open {
            message: e.to_string(),
            path: location.to_string(),
            source: Some(e),
        })
    }

    /// Busy handling, tables, merge policy, and the ranking function.
    fn prepare_connection(
        conn: &Connection,
        schema: &SchemaManager,
        config: &SearchDbConfig,
    ) -> Result<()> {
        conn.busy_timeout(config.busy_timeout)
            .map_err(|e| SearchDbError::Open {
                message: format!("Failed to set busy timeout: {}", e),
                path: String::new(),
                source: Some(e),
            })?;

        let setup_sql = schema.setup_sql();
        retry_busy(&config.busy_retry, "schema setup", || conn.execute_batch(&setup_sql))
            .map_err(|e| SearchDbError::schema("Failed to set up search tables", e))?;
        debug!("Search tables ready");

        register_ranking_function(conn)
            .map_err(|e| SearchDbError::schema("Failed to register ranking function", e))?;

        Ok(())
    }

    /// Location this database was opened from.
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn config(&self) -> &SearchDbConfig {
        &self.config
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.tx.state()
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Close the underlying connection.
    pub fn close(self) -> Result<()> {
        let location = self.location;
        self.conn
            .close()
            .map_err(|(_, e)| SearchDbError::close(&location, e))?;
        debug!("Closed search database at {}", location);
        Ok(())
    }

    /// Drop and recreate both tables, wiping every indexed document.
    pub fn reset(&mut self) -> Result<()> {
        let schema = &self.schema;
        self.tx.run(&self.conn, "reset", |conn| {
            schema.drop_tables(conn)?;
            schema.ensure_setup(conn)
        })?;

        info!("Reset search database at {}", self.location);
        Ok(())
    }

    /// Index a document, replacing any previous version with the same key.
    ///
    /// Either both the index row and the metadata row are written, or neither.
    pub fn index(
        &mut self,
        module_id: &str,
        entity_id: &str,
        language: &str,
        boost: f64,
        fields: &SearchableFields,
        metadata: &DocumentMetadata,
    ) -> Result<()> {
        if self.exists(module_id, entity_id)? {
            self.remove(module_id, entity_id)?;
        }

        self.tx.run(&self.conn, "index", |conn| {
            conn.execute(
                INSERT_INDEX_SQL,
                params![
                    module_id,
                    entity_id,
                    language,
                    boost,
                    fields.weight0,
                    fields.weight1,
                    fields.weight2,
                    fields.weight3,
                    fields.weight4,
                ],
            )?;
            conn.execute(
                INSERT_METADATA_SQL,
                params![
                    module_id,
                    entity_id,
                    metadata.title,
                    metadata.subtitle,
                    metadata.uri,
                    metadata.kind,
                    metadata.image_uri,
                ],
            )?;
            Ok(())
        })?;

        debug!("Indexed {}/{}", module_id, entity_id);
        Ok(())
    }

    /// Index a document described by an [`IndexRequest`].
    pub fn index_request(&mut self, request: &IndexRequest) -> Result<()> {
        self.index(
            &request.module_id,
            &request.entity_id,
            &request.language,
            request.boost,
            &request.fields,
            &request.metadata,
        )
    }

    /// Remove a document from both tables. Removing an absent key succeeds.
    pub fn remove(&mut self, module_id: &str, entity_id: &str) -> Result<()> {
        let removed = self.tx.run(&self.conn, "remove", |conn| {
            let index_rows = conn.execute(DELETE_INDEX_SQL, params![module_id, entity_id])?;
            conn.execute(DELETE_METADATA_SQL, params![module_id, entity_id])?;
            Ok(index_rows)
        })?;

        if removed > 0 {
            debug!("Removed {}/{}", module_id, entity_id);
        }
        Ok(())
    }

    /// Whether an index row exists for the key.
    pub fn exists(&self, module_id: &str, entity_id: &str) -> Result<bool> {
        let exists = retry_busy(self.tx.retry_config(), "exists", || {
            self.conn
                .query_row(EXISTS_SQL, params![module_id, entity_id], |row| row.get(0))
        })?;
        Ok(exists)
    }

    /// Number of indexed documents.
    pub fn count(&self) -> Result<usize> {
        let count: usize = retry_busy(self.tx.retry_config(), "count", || {
            self.conn
                .query_row("SELECT COUNT(*) FROM searchindex", [], |row| row.get(0))
        })?;
        Ok(count)
    }

    /// Row counts of both tables.
    pub fn stats(&self) -> Result<SchemaStats> {
        self.schema.get_stats(&self.conn)
    }

    /// Merge the index segments into one.
    pub fn optimize(&mut self) -> Result<()> {
        self.schema.optimize(&self.conn)
    }

    /// Search the index, returning results in descending rank order.
    ///
    /// `limit`/`offset` page through the full ranked result set; pages are
    /// stable for an unchanged index. Empty queries return nothing.
    pub fn search(
        &self,
        text: &str,
        limit: usize,
        offset: usize,
        prefer_phrase: bool,
    ) -> Result<Vec<SearchResult>> {
        let start = Instant::now();
        let query = format_query(text, prefer_phrase);

        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let snippet_tokens = query.snippet_tokens().min(RankingConfig::MAX_SNIPPET_TOKENS) as i64;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);
        let snippet = &self.config.snippet;

        // A busy step restarts the query; rows read so far are dropped.
        let results = retry_busy(self.tx.retry_config(), "search", || {
            let mut stmt = self.conn.prepare_cached(SEARCH_SQL)?;
            let rows = stmt.query_map(
                params![
                    query.formatted,
                    snippet.start_match,
                    snippet.end_match,
                    snippet.ellipsis,
                    snippet_tokens,
                    limit,
                    offset,
                ],
                Self::row_to_result,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        debug!(
            "Search {:?} returned {} results in {:.2}ms",
            query.formatted,
            results.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(results)
    }

    /// Convert a joined search row into a `SearchResult`.
    fn row_to_result(row: &Row) -> rusqlite::Result<SearchResult> {
        Ok(SearchResult {
            module_id: row.get(0)?,
            entity_id: row.get(1)?,
            title: row.get(2)?,
            subtitle: row.get(3)?,
            uri: row.get(4)?,
            kind: row.get(5)?,
            image_uri: row.get(6)?,
            snippet: row.get(7)?,
            rank: row.get(8)?,
            is_favorited: false,
        })
    }
}
