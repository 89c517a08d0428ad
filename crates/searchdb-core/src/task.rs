//! Deferred indexing work.
//!
//! A [`SearchTask`] names a database and either a batch of index-info files
//! to index or a single document to remove. [`SearchTaskWorker`] executes one
//! task against an open [`SearchDatabase`].

use crate::config::TaskConfig;
use crate::error::{Result, SearchDbError};
use crate::index::{IndexRequest, SearchDatabase};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Notified after a task indexes documents.
pub trait IndexObserver: Send + Sync {
    /// Called once per task with every `(module_id, entity_id)` it indexed.
    fn did_index(&self, database: &str, documents: &[(String, String)]);
}

impl<F> IndexObserver for F
where
    F: Fn(&str, &[(String, String)]) + Send + Sync,
{
    fn did_index(&self, database: &str, documents: &[(String, String)]) {
        self(database, documents)
    }
}

/// One unit of queued work against a named search database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTask {
    /// Index the documents described by these index-info files.
    ///
    /// Paths are relative to the manager's root directory.
    IndexFiles { database: String, paths: Vec<String> },
    /// Remove one document.
    Remove {
        database: String,
        module_id: String,
        entity_id: String,
    },
}

impl SearchTask {
    pub fn database(&self) -> &str {
        match self {
            SearchTask::IndexFiles { database, .. } | SearchTask::Remove { database, .. } => {
                database
            }
        }
    }

    pub fn major_priority(&self) -> u32 {
        TaskConfig::MAJOR_PRIORITY
    }

    pub fn minor_priority(&self) -> u32 {
        match self {
            SearchTask::IndexFiles { .. } => TaskConfig::MINOR_PRIORITY_INDEX,
            SearchTask::Remove { .. } => TaskConfig::MINOR_PRIORITY_REMOVE,
        }
    }

    /// `(major, minor)`; larger runs first.
    pub fn priority(&self) -> (u32, u32) {
        (self.major_priority(), self.minor_priority())
    }
}

/// Executes tasks against a database.
pub struct SearchTaskWorker<'a> {
    root: &'a Path,
    observer: Option<&'a dyn IndexObserver>,
}

impl<'a> SearchTaskWorker<'a> {
    /// Create a worker resolving index-info paths against `root`.
    pub fn new(root: &'a Path) -> Self {
        Self {
            root,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn IndexObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Run `task` against `db`. Returns `true` if every part of it succeeded.
    ///
    /// For `IndexFiles`, paths that were indexed are removed from the task
    /// (and their files deleted) so a retry only redoes the failures.
    pub fn run(&self, task: &mut SearchTask, db: &mut SearchDatabase) -> bool {
        match task {
            SearchTask::Remove {
                database,
                module_id,
                entity_id,
            } => match db.remove(module_id, entity_id) {
                Ok(()) => true,
                Err(e) => {
                    error!(
                        "Failed to remove {}/{} from {}: {}",
                        module_id, entity_id, database, e
                    );
                    false
                }
            },
            SearchTask::IndexFiles { database, paths } => {
                let mut indexed = Vec::new();

                paths.retain(|path| match self.index_file(db, path) {
                    Ok(key) => {
                        indexed.push(key);
                        false
                    }
                    Err(e) => {
                        error!("Failed to index {} into {}: {}", path, database, e);
                        true
                    }
                });

                if !indexed.is_empty() {
                    if let Some(observer) = self.observer {
                        observer.did_index(database, &indexed);
                    }
                }

                debug!(
                    "Indexed {} files into {} ({} left)",
                    indexed.len(),
                    database,
                    paths.len()
                );
                paths.is_empty()
            }
        }
    }

    fn index_file(&self, db: &mut SearchDatabase, relative: &str) -> Result<(String, String)> {
        let path = self.resolve(relative);
        let request = read_index_info(&path)?;
        request.validate()?;
        db.index_request(&request)?;

        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Indexed {} but could not delete it: {}", path.display(), e);
        }

        Ok((request.module_id, request.entity_id))
    }

    fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }
}

/// Load an index-info JSON file.
pub fn read_index_info(path: &Path) -> Result<IndexRequest> {
    let content =
        std::fs::read_to_string(path).map_err(|e| SearchDbError::io_with_path(e, path))?;
    let request = serde_json::from_str(&content)?;
    Ok(request)
}
