//! FTS4 index table and metadata table setup.

use crate::config::DatabaseConfig;
use crate::error::{Result, SearchDbError};
use rusqlite::Connection;
use tracing::{debug, info};

/// Creates, checks, and drops the two search tables.
pub struct SchemaManager {
    automerge: u32,
}

impl SchemaManager {
    pub fn new(automerge: u32) -> Self {
        Self { automerge }
    }

    /// Check if a table (virtual or plain) exists.
    pub fn table_exists(&self, conn: &Connection, name: &str) -> Result<bool> {
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Create both tables if missing and apply the merge policy.
    pub fn ensure_setup(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&self.setup_sql())
            .map_err(|e| SearchDbError::schema("Failed to set up search tables", e))?;
        info!(
            "Ensured search tables {} and {} (automerge={})",
            DatabaseConfig::INDEX_TABLE,
            DatabaseConfig::METADATA_TABLE,
            self.automerge
        );
        Ok(())
    }

    /// The full setup batch: both tables plus the FTS4 `automerge` command.
    ///
    /// Header columns are `notindexed`, so only `weight0..weight4` match queries.
    pub fn setup_sql(&self) -> String {
        format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {index} USING fts4(
                moduleid,
                entityid,
                language,
                boost,
                weight0,
                weight1,
                weight2,
                weight3,
                weight4,
                notindexed=moduleid,
                notindexed=entityid,
                notindexed=language,
                notindexed=boost
            );
            CREATE TABLE IF NOT EXISTS {meta} (
                moduleid TEXT NOT NULL,
                entityid TEXT NOT NULL,
                title TEXT,
                subtitle TEXT,
                uri TEXT,
                type TEXT,
                imageuri TEXT,
                PRIMARY KEY (moduleid, entityid)
            );
            INSERT INTO {index}({index}) VALUES('automerge={level}');",
            index = DatabaseConfig::INDEX_TABLE,
            meta = DatabaseConfig::METADATA_TABLE,
            level = self.automerge,
        )
    }

    /// Drop both tables, wiping all indexed content.
    pub fn drop_tables(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "DROP TABLE IF EXISTS {}; DROP TABLE IF EXISTS {};",
            DatabaseConfig::INDEX_TABLE,
            DatabaseConfig::METADATA_TABLE
        );
        conn.execute_batch(&sql)
            .map_err(|e| SearchDbError::schema("Failed to drop search tables", e))?;
        info!("Dropped search tables");
        Ok(())
    }

    /// Merge all index segments into one.
    pub fn optimize(&self, conn: &Connection) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table}({table}) VALUES('optimize')",
            table = DatabaseConfig::INDEX_TABLE
        );
        conn.execute_batch(&sql)?;
        debug!("Optimized {}", DatabaseConfig::INDEX_TABLE);
        Ok(())
    }

    /// Row counts of both tables.
    pub fn get_stats(&self, conn: &Connection) -> Result<SchemaStats> {
        let count = |table: &str| -> Result<usize> {
            let n: usize =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(n)
        };

        Ok(SchemaStats {
            index_rows: count(DatabaseConfig::INDEX_TABLE)?,
            metadata_rows: count(DatabaseConfig::METADATA_TABLE)?,
        })
    }
}

/// Row counts of the search tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaStats {
    pub index_rows: usize,
    pub metadata_rows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_db() -> (Connection, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let conn = Connection::open(temp_dir.path().join("test.db")).unwrap();
        (conn, temp_dir)
    }

    fn column_names(conn: &Connection, table: &str) -> Vec<String> {
        let stmt = conn.prepare(&format!("SELECT * FROM {}", table)).unwrap();
        stmt.column_names().into_iter().map(String::from).collect()
    }

    #[test]
    fn test_setup_creates_tables() {
        let (conn, _temp) = create_test_db();
        let schema = SchemaManager::new(2);

        assert!(!schema.table_exists(&conn, DatabaseConfig::INDEX_TABLE).unwrap());

        schema.ensure_setup(&conn).unwrap();

        assert!(schema.table_exists(&conn, DatabaseConfig::INDEX_TABLE).unwrap());
        assert!(schema.table_exists(&conn, DatabaseConfig::METADATA_TABLE).unwrap());
        assert_eq!(
            column_names(&conn, DatabaseConfig::INDEX_TABLE),
            DatabaseConfig::INDEX_COLUMNS.to_vec()
        );
        assert_eq!(
            column_names(&conn, DatabaseConfig::METADATA_TABLE),
            DatabaseConfig::METADATA_COLUMNS.to_vec()
        );
    }

    #[test]
    fn test_setup_is_repeatable() {
        let (conn, _temp) = create_test_db();
        let schema = SchemaManager::new(2);
        schema.ensure_setup(&conn).unwrap();
        schema.ensure_setup(&conn).unwrap();
        assert_eq!(
            schema.get_stats(&conn).unwrap(),
            SchemaStats {
                index_rows: 0,
                metadata_rows: 0
            }
        );
    }

    #[test]
    fn test_header_columns_not_matched() {
        let (conn, _temp) = create_test_db();
        let schema = SchemaManager::new(2);
        schema.ensure_setup(&conn).unwrap();

        conn.execute(
            "INSERT INTO searchindex (moduleid, entityid, language, boost, weight0)
             VALUES ('alpha', 'beta', 'en', 1.0, 'gamma')",
            [],
        )
        .unwrap();

        let hits = |term: &str| -> i64 {
            conn.query_row(
                "SELECT COUNT(*) FROM searchindex WHERE searchindex MATCH ?1",
                [term],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(hits("gamma"), 1);
        assert_eq!(hits("alpha"), 0);
    }

    #[test]
    fn test_drop_tables() {
        let (conn, _temp) = create_test_db();
        let schema = SchemaManager::new(2);
        schema.ensure_setup(&conn).unwrap();
        schema.optimize(&conn).unwrap();

        schema.drop_tables(&conn).unwrap();

        assert!(!schema.table_exists(&conn, DatabaseConfig::INDEX_TABLE).unwrap());
        assert!(!schema.table_exists(&conn, DatabaseConfig::METADATA_TABLE).unwrap());
    }
}
