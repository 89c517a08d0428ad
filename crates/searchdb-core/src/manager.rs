//! Named search databases plus a prioritized queue of indexing work.
//!
//! The manager owns a root directory laid out as:
//!
//! ```text
//! root/
//!   <name>.sqlite          one file per named database
//!   search-index-info/     JSON index requests waiting to be indexed
//! ```
//!
//! Work is queued with [`SearchManager::queue_index`] and friends and executed
//! synchronously by [`SearchManager::run_pending`].

use crate::config::{DatabaseConfig, SearchDbConfig, TaskConfig};
use crate::error::{Result, SearchDbError};
use crate::index::{IndexRequest, SearchDatabase, SearchResult};
use crate::task::{IndexObserver, SearchTask, SearchTaskWorker};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Answers whether a result is one of the user's favorites.
pub trait FavoriteLookup: Send + Sync {
    fn is_favorited(&self, module_id: &str, entity_id: &str) -> bool;
}

impl<F> FavoriteLookup for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn is_favorited(&self, module_id: &str, entity_id: &str) -> bool {
        self(module_id, entity_id)
    }
}

/// Fallback consulted when a local search finds nothing.
pub trait BackupSearch: Send + Sync {
    fn search(&self, text: &str, limit: usize, offset: usize) -> Result<Vec<SearchResult>>;
}

/// Outcome of one [`SearchManager::run_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskReport {
    pub completed: usize,
    /// Tasks that failed and were queued again.
    pub failed: usize,
    /// Tasks that used up their attempts during this pass.
    pub held: usize,
}

/// A task plus its queue bookkeeping.
#[derive(Debug)]
struct QueuedTask {
    sequence: u64,
    attempts: u32,
    task: SearchTask,
}

impl QueuedTask {
    fn key(&self) -> ((u32, u32), std::cmp::Reverse<u64>) {
        (self.task.priority(), std::cmp::Reverse(self.sequence))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    /// Higher priority first, then older first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Owns named search databases and the task queue that feeds them.
pub struct SearchManager {
    root: PathBuf,
    index_info_dir: PathBuf,
    config: SearchDbConfig,
    databases: HashMap<String, SearchDatabase>,
    queue: BinaryHeap<QueuedTask>,
    held: Vec<QueuedTask>,
    next_sequence: u64,
    favorites: Option<Box<dyn FavoriteLookup>>,
    backup: Option<Box<dyn BackupSearch>>,
    observer: Option<Box<dyn IndexObserver>>,
}

impl SearchManager {
    /// Create a manager rooted at `root`, creating the directory layout.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(root, SearchDbConfig::default())
    }

    /// Create a manager whose databases open with `config`.
    pub fn with_config(root: impl Into<PathBuf>, config: SearchDbConfig) -> Result<Self> {
        let root = root.into();
        let index_info_dir = root.join(TaskConfig::INDEX_INFO_DIR_NAME);
        std::fs::create_dir_all(&index_info_dir)
            .map_err(|e| SearchDbError::io_with_path(e, &index_info_dir))?;

        info!("Search manager rooted at {}", root.display());

        Ok(Self {
            root,
            index_info_dir,
            config,
            databases: HashMap::new(),
            queue: BinaryHeap::new(),
            held: Vec::new(),
            next_sequence: 0,
            favorites: None,
            backup: None,
            observer: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_info_dir(&self) -> &Path {
        &self.index_info_dir
    }

    pub fn set_favorite_lookup(&mut self, lookup: impl FavoriteLookup + 'static) {
        self.favorites = Some(Box::new(lookup));
    }

    pub fn set_backup_search(&mut self, backup: impl BackupSearch + 'static) {
        self.backup = Some(Box::new(backup));
    }

    pub fn set_index_observer(&mut self, observer: impl IndexObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    // ========================================
    // Databases
    // ========================================

    /// Open (creating if needed) the database `name` under the root.
    ///
    /// Calling this for an already open database does nothing.
    pub fn setup_search_database(&mut self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(SearchDbError::validation("database", "name must not be empty"));
        }
        if self.databases.contains_key(name) {
            return Ok(());
        }

        let path = self.database_path(name);
        let db = SearchDatabase::open_with_config(&path, self.config.clone())?;
        self.databases.insert(name.to_string(), db);
        Ok(())
    }

    /// Close the database `name`. Returns whether it was open.
    pub fn close_search_database(&mut self, name: &str) -> Result<bool> {
        match self.databases.remove(name) {
            Some(db) => {
                db.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn search_database(&self, name: &str) -> Option<&SearchDatabase> {
        self.databases.get(name)
    }

    pub fn search_database_mut(&mut self, name: &str) -> Option<&mut SearchDatabase> {
        self.databases.get_mut(name)
    }

    /// File backing the database `name`.
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}", name, DatabaseConfig::FILE_EXTENSION))
    }

    // ========================================
    // Index info files
    // ========================================

    /// Validate `request` and write it as a new index-info file.
    ///
    /// Every call gets its own file (`<module>.<entity>.<n>.json`), so saving
    /// the same key twice queues both versions. Returns the file's path
    /// relative to the root, suitable for
    /// [`queue_index_files`](Self::queue_index_files).
    pub fn save_index_info(&self, request: &IndexRequest) -> Result<String> {
        request.validate()?;

        let stem = format!(
            "{}.{}",
            file_name_part(&request.module_id),
            file_name_part(&request.entity_id)
        );
        let json = serde_json::to_string_pretty(request)?;

        let mut n: u64 = 0;
        loop {
            let file_name = format!("{}.{}.json", stem, n);
            let path = self.index_info_dir.join(&file_name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    n += 1;
                    continue;
                }
                Err(e) => return Err(SearchDbError::io_with_path(e, &path)),
            };
            file.write_all(json.as_bytes())
                .map_err(|e| SearchDbError::io_with_path(e, &path))?;

            debug!("Saved index info {}", path.display());
            return Ok(format!("{}/{}", TaskConfig::INDEX_INFO_DIR_NAME, file_name));
        }
    }

    /// Delete every pending index-info file.
    ///
    /// Queued index tasks that pointed at them will fail and be retried.
    pub fn reset_index_info_cache(&self) -> Result<()> {
        if self.index_info_dir.exists() {
            std::fs::remove_dir_all(&self.index_info_dir)
                .map_err(|e| SearchDbError::io_with_path(e, &self.index_info_dir))?;
        }
        std::fs::create_dir_all(&self.index_info_dir)
            .map_err(|e| SearchDbError::io_with_path(e, &self.index_info_dir))?;

        info!("Reset index info cache at {}", self.index_info_dir.display());
        Ok(())
    }

    // ========================================
    // Queue
    // ========================================

    /// Queue already saved index-info files for indexing into `database`.
    pub fn queue_index_files(&mut self, paths: Vec<String>, database: &str) -> Result<()> {
        require_non_empty("database", database)?;
        if paths.is_empty() {
            return Err(SearchDbError::validation("paths", "no files to index"));
        }

        self.push(SearchTask::IndexFiles {
            database: database.to_string(),
            paths,
        });
        Ok(())
    }

    /// Save `request` and queue it for indexing into `database`.
    pub fn queue_index(&mut self, request: &IndexRequest, database: &str) -> Result<()> {
        require_non_empty("database", database)?;
        let path = self.save_index_info(request)?;
        self.queue_index_files(vec![path], database)
    }

    /// Queue removal of one document from `database`.
    pub fn queue_remove(&mut self, module_id: &str, entity_id: &str, database: &str) -> Result<()> {
        require_non_empty("module_id", module_id)?;
        require_non_empty("entity_id", entity_id)?;
        require_non_empty("database", database)?;

        self.push(SearchTask::Remove {
            database: database.to_string(),
            module_id: module_id.to_string(),
            entity_id: entity_id.to_string(),
        });
        Ok(())
    }

    fn push(&mut self, task: SearchTask) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        debug!("Queued {:?} (priority {:?})", task, task.priority());
        self.queue.push(QueuedTask {
            sequence,
            attempts: 0,
            task,
        });
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// Tasks that exhausted their attempts.
    pub fn held_tasks(&self) -> impl Iterator<Item = &SearchTask> {
        self.held.iter().map(|queued| &queued.task)
    }

    /// Move held tasks back into the queue with fresh attempts.
    pub fn requeue_held(&mut self) -> usize {
        let count = self.held.len();
        for mut queued in self.held.drain(..) {
            queued.attempts = 0;
            self.queue.push(queued);
        }
        if count > 0 {
            info!("Requeued {} held tasks", count);
        }
        count
    }

    /// Run every queued task once, highest priority first.
    ///
    /// Failed tasks go back into the queue for the next pass until they have
    /// failed `MAX_TASK_ATTEMPTS` times, after which they are held.
    pub fn run_pending(&mut self) -> TaskReport {
        let mut report = TaskReport::default();
        let mut retry = Vec::new();
        let worker = SearchTaskWorker::new(&self.root).with_observer(self.observer.as_deref());

        while let Some(mut queued) = self.queue.pop() {
            let succeeded = match self.databases.get_mut(queued.task.database()) {
                Some(db) => worker.run(&mut queued.task, db),
                None => {
                    warn!(
                        "Task for {} skipped: database is not set up",
                        queued.task.database()
                    );
                    false
                }
            };

            if succeeded {
                report.completed += 1;
                continue;
            }

            queued.attempts += 1;
            if queued.attempts >= TaskConfig::MAX_TASK_ATTEMPTS {
                warn!(
                    "Holding task for {} after {} attempts",
                    queued.task.database(),
                    queued.attempts
                );
                report.held += 1;
                self.held.push(queued);
            } else {
                report.failed += 1;
                retry.push(queued);
            }
        }

        self.queue.extend(retry);

        debug!(
            "Task pass: {} completed, {} failed, {} held",
            report.completed, report.failed, report.held
        );
        report
    }

    // ========================================
    // Search
    // ========================================

    /// Phrase search over the database `name`.
    ///
    /// Hits are marked with the favorite lookup. When nothing matches, the
    /// backup search (if set) answers instead.
    pub fn local_search(
        &self,
        text: &str,
        limit: usize,
        offset: usize,
        database: &str,
    ) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let db = self
            .databases
            .get(database)
            .ok_or_else(|| SearchDbError::DatabaseNotFound {
                name: database.to_string(),
            })?;

        let mut results = db.search(text, limit, offset, true)?;

        if results.is_empty() {
            if let Some(backup) = &self.backup {
                debug!("No local results for {:?}, using backup search", text);
                return backup.search(text, limit, offset);
            }
            return Ok(results);
        }

        if let Some(favorites) = &self.favorites {
            for result in &mut results {
                result.is_favorited = favorites.is_favorited(&result.module_id, &result.entity_id);
            }
        }

        Ok(results)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(SearchDbError::validation(field, "must not be empty"));
    }
    Ok(())
}

/// Percent-encode the characters that could collide or escape the info
/// directory, keeping `.` free to separate module from entity.
fn file_name_part(id: &str) -> String {
    let mut encoded = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '%' | '.' | '/' | '\\' => encoded.push_str(&format!("%{:02X}", c as u32)),
            _ => encoded.push(c),
        }
    }
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{DocumentMetadata, FieldWeight, SearchableFields};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn create_manager() -> (SearchManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut manager = SearchManager::new(temp_dir.path()).unwrap();
        manager.setup_search_database("main").unwrap();
        (manager, temp_dir)
    }

    fn request(entity_id: &str, text: &str) -> IndexRequest {
        IndexRequest::new("docs", entity_id, "en", 1.0)
            .with_fields(SearchableFields::new().with(FieldWeight::Weight4, text))
            .with_metadata(DocumentMetadata::new(entity_id, format!("docs://{}", entity_id)))
    }

    struct FixedBackup(Vec<SearchResult>);

    impl BackupSearch for FixedBackup {
        fn search(&self, _text: &str, _limit: usize, _offset: usize) -> Result<Vec<SearchResult>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_new_creates_layout() {
        let (manager, temp) = create_manager();
        assert!(temp.path().join("search-index-info").is_dir());
        assert!(temp.path().join("main.sqlite").exists());
        assert!(manager.search_database("main").is_some());
        assert!(manager.search_database("other").is_none());
    }

    #[test]
    fn test_setup_rejects_empty_name_and_is_idempotent() {
        let (mut manager, _temp) = create_manager();
        assert!(matches!(
            manager.setup_search_database(""),
            Err(SearchDbError::Validation { .. })
        ));

        manager
            .search_database_mut("main")
            .unwrap()
            .index_request(&request("a", "kept"))
            .unwrap();
        manager.setup_search_database("main").unwrap();
        assert_eq!(manager.search_database("main").unwrap().count().unwrap(), 1);
    }

    #[test]
    fn test_save_index_info_validates() {
        let (manager, temp) = create_manager();

        let path = manager.save_index_info(&request("a/b", "text")).unwrap();
        assert_eq!(path, "search-index-info/docs.a%2Fb.0.json");
        assert!(temp.path().join(&path).exists());

        let empty = IndexRequest::new("docs", "x", "en", 1.0);
        assert!(matches!(
            manager.save_index_info(&empty),
            Err(SearchDbError::Validation { .. })
        ));
        let no_language = request("x", "text");
        let no_language = IndexRequest {
            language: String::new(),
            ..no_language
        };
        assert!(manager.save_index_info(&no_language).is_err());
    }

    #[test]
    fn test_file_name_part_is_unambiguous() {
        assert_eq!(file_name_part("plain"), "plain");
        assert_eq!(file_name_part("a.b"), "a%2Eb");
        assert_eq!(file_name_part("a/b"), "a%2Fb");
        assert_eq!(file_name_part("a\\b"), "a%5Cb");
        assert_eq!(file_name_part("50%"), "50%25");
        assert_ne!(file_name_part("a/b"), file_name_part("a_b"));
    }

    #[test]
    fn test_colliding_keys_get_distinct_files() {
        let (mut manager, _temp) = create_manager();

        let first = manager.save_index_info(&request("a.b", "text")).unwrap();
        let second = manager
            .save_index_info(&IndexRequest {
                module_id: "docs.a".to_string(),
                ..request("b", "text")
            })
            .unwrap();
        assert_ne!(first, second);

        let keys = [("x.y", "z"), ("x", "y.z")];
        for (module_id, entity_id) in keys {
            let request = IndexRequest::new(module_id, entity_id, "en", 1.0)
                .with_fields(SearchableFields::new().with(FieldWeight::Weight2, "shared"));
            manager.queue_index(&request, "main").unwrap();
        }

        let report = manager.run_pending();
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 0);
        let db = manager.search_database("main").unwrap();
        for (module_id, entity_id) in keys {
            assert!(db.exists(module_id, entity_id).unwrap());
        }
    }

    #[test]
    fn test_same_key_queued_twice_keeps_latest() {
        let (mut manager, temp) = create_manager();
        manager.queue_index(&request("a", "first draft"), "main").unwrap();
        manager.queue_index(&request("a", "second draft"), "main").unwrap();

        let report = manager.run_pending();
        assert_eq!(
            report,
            TaskReport {
                completed: 2,
                failed: 0,
                held: 0
            }
        );
        assert_eq!(manager.held_count(), 0);

        let db = manager.search_database("main").unwrap();
        assert_eq!(db.count().unwrap(), 1);
        assert!(db.search("first", 10, 0, false).unwrap().is_empty());
        assert_eq!(db.search("second", 10, 0, false).unwrap().len(), 1);

        let leftovers = std::fs::read_dir(temp.path().join("search-index-info"))
            .unwrap()
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_queue_and_run() {
        let (mut manager, temp) = create_manager();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.set_index_observer(move |database: &str, docs: &[(String, String)]| {
            sink.lock().unwrap().push((database.to_string(), docs.len()));
        });

        manager.queue_index(&request("a", "harbor lights"), "main").unwrap();
        manager.queue_index(&request("b", "harbor fog"), "main").unwrap();
        assert_eq!(manager.pending_count(), 2);

        let report = manager.run_pending();
        assert_eq!(
            report,
            TaskReport {
                completed: 2,
                failed: 0,
                held: 0
            }
        );
        assert_eq!(manager.pending_count(), 0);
        assert!(!temp.path().join("search-index-info/docs.a.0.json").exists());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("main".to_string(), 1), ("main".to_string(), 1)]
        );

        let results = manager.local_search("harbor", 10, 0, "main").unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_remove_runs_before_index() {
        let (mut manager, _temp) = create_manager();
        manager
            .search_database_mut("main")
            .unwrap()
            .index_request(&request("a", "old text"))
            .unwrap();

        // queued first, but remove has the higher minor priority
        manager.queue_index(&request("a", "new text"), "main").unwrap();
        manager.queue_remove("docs", "a", "main").unwrap();
        manager.run_pending();

        let db = manager.search_database("main").unwrap();
        assert!(db.exists("docs", "a").unwrap());
        assert_eq!(db.search("new", 10, 0, false).unwrap().len(), 1);
    }

    #[test]
    fn test_queue_ordering_is_fifo_within_priority() {
        let mut heap = BinaryHeap::new();
        for (sequence, entity) in ["first", "second", "third"].iter().enumerate() {
            heap.push(QueuedTask {
                sequence: sequence as u64,
                attempts: 0,
                task: SearchTask::Remove {
                    database: "main".into(),
                    module_id: "docs".into(),
                    entity_id: entity.to_string(),
                },
            });
        }
        heap.push(QueuedTask {
            sequence: 3,
            attempts: 0,
            task: SearchTask::IndexFiles {
                database: "main".into(),
                paths: vec!["x".into()],
            },
        });

        let order: Vec<String> = std::iter::from_fn(|| heap.pop())
            .map(|queued| match queued.task {
                SearchTask::Remove { entity_id, .. } => entity_id,
                SearchTask::IndexFiles { .. } => "index".to_string(),
            })
            .collect();
        assert_eq!(order, vec!["first", "second", "third", "index"]);
    }

    #[test]
    fn test_failed_task_is_held_then_requeued() {
        let (mut manager, temp) = create_manager();
        manager
            .queue_index_files(vec!["search-index-info/late.json".to_string()], "main")
            .unwrap();

        for _ in 1..TaskConfig::MAX_TASK_ATTEMPTS {
            let report = manager.run_pending();
            assert_eq!(report.failed, 1);
            assert_eq!(manager.pending_count(), 1);
        }
        let report = manager.run_pending();
        assert_eq!(report.held, 1);
        assert_eq!(manager.pending_count(), 0);
        assert_eq!(manager.held_count(), 1);

        // the file shows up, and the held task can be retried
        let path = manager.save_index_info(&request("late", "arrival")).unwrap();
        std::fs::rename(
            temp.path().join(path),
            temp.path().join("search-index-info/late.json"),
        )
        .unwrap();

        assert_eq!(manager.requeue_held(), 1);
        assert_eq!(manager.run_pending().completed, 1);
        assert!(manager
            .search_database("main")
            .unwrap()
            .exists("docs", "late")
            .unwrap());
    }

    #[test]
    fn test_task_for_unknown_database_fails() {
        let (mut manager, _temp) = create_manager();
        manager.queue_remove("docs", "a", "missing").unwrap();
        assert_eq!(manager.run_pending().failed, 1);
    }

    #[test]
    fn test_queue_validation() {
        let (mut manager, _temp) = create_manager();
        assert!(manager.queue_remove("", "a", "main").is_err());
        assert!(manager.queue_remove("docs", "a", "").is_err());
        assert!(manager.queue_index_files(vec![], "main").is_err());
        assert!(manager.queue_index(&request("a", "text"), "").is_err());
        assert_eq!(manager.pending_count(), 0);
    }

    #[test]
    fn test_local_search_marks_favorites() {
        let (mut manager, _temp) = create_manager();
        let db = manager.search_database_mut("main").unwrap();
        db.index_request(&request("a", "meeting notes")).unwrap();
        db.index_request(&request("b", "meeting agenda")).unwrap();
        manager.set_favorite_lookup(|_module: &str, entity: &str| entity == "b");

        let results = manager.local_search("meeting", 10, 0, "main").unwrap();
        assert_eq!(results.len(), 2);
        for result in &results {
            assert_eq!(result.is_favorited, result.entity_id == "b");
        }
    }

    #[test]
    fn test_local_search_uses_phrase_and_backup() {
        let (mut manager, _temp) = create_manager();
        manager
            .search_database_mut("main")
            .unwrap()
            .index_request(&request("a", "notes from meeting"))
            .unwrap();

        // phrase order doesn't match and there is no backup
        assert!(manager
            .local_search("meeting notes", 10, 0, "main")
            .unwrap()
            .is_empty());

        let fallback = SearchResult {
            module_id: "remote".into(),
            entity_id: "r1".into(),
            title: "Remote".into(),
            subtitle: String::new(),
            uri: String::new(),
            kind: String::new(),
            image_uri: String::new(),
            snippet: String::new(),
            rank: 0.0,
            is_favorited: false,
        };
        manager.set_backup_search(FixedBackup(vec![fallback.clone()]));
        assert_eq!(
            manager.local_search("meeting notes", 10, 0, "main").unwrap(),
            vec![fallback]
        );
    }

    #[test]
    fn test_local_search_edges() {
        let (manager, _temp) = create_manager();
        assert!(manager.local_search("x", 0, 0, "nope").unwrap().is_empty());
        assert!(matches!(
            manager.local_search("x", 10, 0, "nope"),
            Err(SearchDbError::DatabaseNotFound { .. })
        ));
    }

    #[test]
    fn test_reset_index_info_cache() {
        let (manager, temp) = create_manager();
        let path = manager.save_index_info(&request("a", "text")).unwrap();
        manager.reset_index_info_cache().unwrap();
        assert!(!temp.path().join(path).exists());
        assert!(manager.index_info_dir().is_dir());
    }

    #[test]
    fn test_close_search_database() {
        let (mut manager, _temp) = create_manager();
        assert!(manager.close_search_database("main").unwrap());
        assert!(!manager.close_search_database("main").unwrap());
        assert!(manager.search_database("main").is_none());
    }
}
