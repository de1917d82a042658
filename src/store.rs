// Store: sole owner of the persisted snapshot

use crate::models::{
    ALL_CATEGORY_ID, Category, CategoryPatch, DEFAULT_CATEGORY_ID, ModelError, Settings, SettingsPatch, Task,
    TaskPatch,
};
use crate::record::Record;
use crate::snapshot::{self, ImportError, LoadOutcome, Snapshot};
use crate::storage::{KeyValueStorage, StorageError};
use chrono::{Local, NaiveDate};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Storage key the snapshot is kept under unless configured otherwise
pub const DEFAULT_STORAGE_KEY: &str = "todoAppData";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Duplicate id '{id}' in {collection}")]
    DuplicateId { collection: &'static str, id: String },
    #[error("Category '{0}' is reserved and cannot be deleted")]
    ReservedCategory(String),
    #[error("Failed to write export file: {0}")]
    Export(#[from] std::io::Error),
}

impl StoreError {
    /// True when the storage medium ran out of space
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StoreError::Storage(e) if e.is_quota_exceeded())
    }
}

/// Handle returned by [`Store::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A backup produced by [`Store::export_data`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub file_name: String,
    pub contents: String,
}

/// Persistent todo store over a key-value medium
///
/// Every mutation is applied to the in-memory snapshot and then persisted
/// under the store's key. If persisting fails the snapshot is rolled back,
/// so callers never observe a change that was not saved. Listeners fire
/// after each successful task or category mutation.
pub struct Store<S: KeyValueStorage> {
    storage: S,
    key: String,
    snapshot: Snapshot,
    listeners: Vec<(ListenerId, Box<dyn FnMut()>)>,
    next_listener: u64,
}

impl<S: KeyValueStorage> Store<S> {
    /// Create a store holding the default snapshot without touching storage
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
            snapshot: Snapshot::default(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    /// Create a store and load its snapshot from storage
    pub fn open(storage: S, key: impl Into<String>) -> Result<Self, StoreError> {
        let mut store = Self::new(storage, key);
        store.load()?;
        Ok(store)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    // ========================================================================
    // Load / save
    // ========================================================================

    /// Replace the in-memory snapshot with the stored one.
    ///
    /// Corrupt or unreadable data resets to defaults. Snapshots with another
    /// version tag are migrated and written back before returning.
    pub fn load(&mut self) -> Result<LoadOutcome, StoreError> {
        let raw = match self.storage.get_item(&self.key) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %self.key, error = %e, "Failed to read stored snapshot, resetting to defaults");
                self.snapshot = Snapshot::default();
                return Ok(LoadOutcome::Recovered);
            }
        };

        let (snapshot, outcome) = snapshot::decode_persisted(raw.as_deref());
        self.snapshot = snapshot;

        if outcome.needs_persist() {
            self.save()?;
            info!(key = %self.key, ?outcome, "Persisted migrated snapshot");
        }

        debug!(
            key = %self.key,
            tasks = self.snapshot.tasks.len(),
            categories = self.snapshot.categories.len(),
            ?outcome,
            "Loaded snapshot"
        );
        Ok(outcome)
    }

    /// Write the in-memory snapshot to storage
    pub fn save(&mut self) -> Result<(), StoreError> {
        let json = self.snapshot.to_json()?;
        self.storage.set_item(&self.key, &json).map_err(|e| {
            if e.is_quota_exceeded() {
                warn!(key = %self.key, bytes = json.len(), "Storage quota exceeded");
            } else {
                warn!(key = %self.key, error = %e, "Failed to save snapshot");
            }
            e
        })?;
        Ok(())
    }

    // Apply a mutation, persist it, and roll back if persisting fails
    fn commit<T>(
        &mut self,
        notify: bool,
        mutate: impl FnOnce(&mut Snapshot) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let previous = self.snapshot.clone();

        let result = match mutate(&mut self.snapshot) {
            Ok(result) => result,
            Err(e) => {
                self.snapshot = previous;
                return Err(e);
            }
        };

        if let Err(e) = self.save() {
            self.snapshot = previous;
            return Err(e);
        }

        if notify {
            self.notify_listeners();
        }
        Ok(result)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn tasks(&self) -> &[Task] {
        &self.snapshot.tasks
    }

    pub fn categories(&self) -> &[Category] {
        &self.snapshot.categories
    }

    pub fn settings(&self) -> &Settings {
        &self.snapshot.settings
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.snapshot.task_position(id).map(|i| &self.snapshot.tasks[i])
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.snapshot.category_position(id).map(|i| &self.snapshot.categories[i])
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub fn add_task(&mut self, mut task: Task) -> Result<(), StoreError> {
        if self.snapshot.task_position(&task.id).is_some() {
            return Err(StoreError::DuplicateId {
                collection: Task::collection_name(),
                id: task.id,
            });
        }
        self.resolve_category(&mut task.category);

        debug!(id = %task.id, category = %task.category, "add_task");
        self.commit(true, |snapshot| {
            snapshot.tasks.push(task);
            Ok(())
        })
    }

    /// Apply a partial update. Unknown ids are ignored and return `Ok(false)`.
    pub fn update_task(&mut self, id: &str, patch: &TaskPatch) -> Result<bool, StoreError> {
        let Some(index) = self.snapshot.task_position(id) else {
            debug!(id, "update_task: unknown id, ignoring");
            return Ok(false);
        };

        let mut patch = patch.clone();
        if let Some(category) = patch.category.as_mut() {
            self.resolve_category(category);
        }

        debug!(id, "update_task");
        self.commit(true, |snapshot| {
            snapshot.tasks[index].apply(&patch)?;
            Ok(true)
        })
    }

    /// Remove a task. Unknown ids are ignored and return `Ok(false)`.
    pub fn delete_task(&mut self, id: &str) -> Result<bool, StoreError> {
        let Some(index) = self.snapshot.task_position(id) else {
            debug!(id, "delete_task: unknown id, ignoring");
            return Ok(false);
        };

        debug!(id, "delete_task");
        self.commit(true, |snapshot| {
            snapshot.tasks.remove(index);
            Ok(true)
        })
    }

    /// Remove every completed task. Returns how many were removed.
    pub fn delete_completed_tasks(&mut self) -> Result<usize, StoreError> {
        let count = self.snapshot.tasks.iter().filter(|t| t.completed).count();
        if count == 0 {
            return Ok(0);
        }

        debug!(count, "delete_completed_tasks");
        self.commit(true, |snapshot| {
            snapshot.tasks.retain(|t| !t.completed);
            Ok(count)
        })
    }

    fn resolve_category(&self, category: &mut String) {
        if !self.snapshot.has_category(category) {
            warn!(category = %category, "Unknown category, using default");
            *category = DEFAULT_CATEGORY_ID.to_string();
        }
    }

    // ========================================================================
    // Categories
    // ========================================================================

    pub fn add_category(&mut self, category: Category) -> Result<(), StoreError> {
        if self.snapshot.category_position(&category.id).is_some() {
            return Err(StoreError::DuplicateId {
                collection: Category::collection_name(),
                id: category.id,
            });
        }

        debug!(id = %category.id, "add_category");
        self.commit(true, |snapshot| {
            snapshot.categories.push(category);
            Ok(())
        })
    }

    /// Apply a partial update. Unknown ids are ignored and return `Ok(false)`.
    pub fn update_category(&mut self, id: &str, patch: &CategoryPatch) -> Result<bool, StoreError> {
        let Some(index) = self.snapshot.category_position(id) else {
            debug!(id, "update_category: unknown id, ignoring");
            return Ok(false);
        };

        debug!(id, "update_category");
        self.commit(true, |snapshot| {
            snapshot.categories[index].apply(patch)?;
            Ok(true)
        })
    }

    /// Remove a category, moving its tasks to the default category.
    ///
    /// The reserved "all" category is refused. Unknown ids are ignored and
    /// return `Ok(false)`.
    pub fn delete_category(&mut self, id: &str) -> Result<bool, StoreError> {
        if id == ALL_CATEGORY_ID {
            return Err(StoreError::ReservedCategory(id.to_string()));
        }
        let Some(index) = self.snapshot.category_position(id) else {
            debug!(id, "delete_category: unknown id, ignoring");
            return Ok(false);
        };

        debug!(id, "delete_category");
        self.commit(true, |snapshot| {
            for task in snapshot.tasks.iter_mut().filter(|t| t.category == id) {
                task.category = DEFAULT_CATEGORY_ID.to_string();
            }
            snapshot.categories.remove(index);
            Ok(true)
        })
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Merge settings and persist. Listeners are not notified.
    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Result<(), StoreError> {
        debug!(?patch, "update_settings");
        self.commit(false, |snapshot| {
            snapshot.settings.apply(patch);
            Ok(())
        })
    }

    // ========================================================================
    // Import / export
    // ========================================================================

    /// Backup of the full snapshot named after today's date
    pub fn export_data(&self) -> Result<Export, StoreError> {
        self.export_data_on(Local::now().date_naive())
    }

    pub fn export_data_on(&self, date: NaiveDate) -> Result<Export, StoreError> {
        Ok(Export {
            file_name: format!("todo-backup-{}.json", date.format("%Y-%m-%d")),
            contents: self.snapshot.to_pretty_json()?,
        })
    }

    /// Write today's backup into `dir`, returning the file path
    pub fn write_export<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf, StoreError> {
        let export = self.export_data()?;
        fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(&export.file_name);
        fs::write(&path, export.contents)?;

        info!(path = ?path, tasks = self.snapshot.tasks.len(), "Exported snapshot");
        Ok(path)
    }

    /// Replace the snapshot with imported data.
    ///
    /// On any validation failure the current snapshot is left untouched.
    pub fn import_data(&mut self, text: &str) -> Result<(), StoreError> {
        let imported = snapshot::decode_import(text, &self.snapshot)?;

        info!(
            tasks = imported.tasks.len(),
            categories = imported.categories.len(),
            "Importing snapshot"
        );
        self.commit(true, |snapshot| {
            *snapshot = imported;
            Ok(())
        })
    }

    /// Reset everything to the default snapshot
    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        info!(key = %self.key, "Clearing all data");
        self.commit(true, |snapshot| {
            *snapshot = Snapshot::default();
            Ok(())
        })
    }

    // ========================================================================
    // Listeners
    // ========================================================================

    /// Register a callback fired after every task or category change
    pub fn subscribe(&mut self, listener: impl FnMut() + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn notify_listeners(&mut self) {
        for (_, listener) in self.listeners.iter_mut() {
            listener();
        }
    }
}
