// Synchronous key-value storage backends

use fs2::FileExt;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default quota, matching the usual browser storage allowance
pub const DEFAULT_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(
        "Storage quota exceeded writing '{key}' ({required} of {quota} bytes). Export your data and delete old tasks to free space"
    )]
    QuotaExceeded { key: String, required: u64, quota: u64 },
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// A synchronous string-to-string store, shaped like browser local storage
pub trait KeyValueStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<S: KeyValueStorage + ?Sized> KeyValueStorage for Box<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get_item(key)
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set_item(key, value)
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove_item(key)
    }
}

/// Validate a storage key. Keys end up as file names, so keep them plain.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > 128 {
        return Err(StorageError::InvalidKey(format!("{} (max 128 chars)", key)));
    }
    if key.starts_with('.') {
        return Err(StorageError::InvalidKey(format!("{} (cannot start with '.')", key)));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(StorageError::InvalidKey(format!(
            "{} (must be alphanumeric with _/-/.)",
            key
        )));
    }
    Ok(())
}

// Usage is counted as key length plus value length over all items.
fn check_quota(quota: Option<u64>, key: &str, other_items: u64, value: &str) -> Result<(), StorageError> {
    let Some(quota) = quota else {
        return Ok(());
    };

    let required = other_items + key.len() as u64 + value.len() as u64;
    if required > quota {
        return Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            required,
            quota,
        });
    }
    Ok(())
}

// ============================================================================
// In-memory backend
// ============================================================================

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    items: HashMap<String, String>,
    quota: Option<u64>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota: u64) -> Self {
        Self {
            items: HashMap::new(),
            quota: Some(quota),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let others: u64 = self
            .items
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| (k.len() + v.len()) as u64)
            .sum();
        check_quota(self.quota, key, others, value)?;

        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        self.items.remove(key);
        Ok(())
    }
}

// ============================================================================
// File backend
// ============================================================================

/// One `<key>.json` file per item inside a directory
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
    quota: Option<u64>,
}

impl FileStorage {
    /// Open or create a file store rooted at `dir`
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir, quota: None })
    }

    pub fn with_quota(mut self, quota: u64) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn item_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    fn lock(&self) -> Result<File, StorageError> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.dir.join(".lock"))?;
        lock.lock_exclusive()?;
        Ok(lock)
    }

    fn usage_excluding(&self, key: &str) -> Result<u64, StorageError> {
        let mut used = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == key {
                continue;
            }
            used += stem.len() as u64 + fs::metadata(&path)?.len();
        }
        Ok(used)
    }
}

impl KeyValueStorage for FileStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        let path = self.item_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(path)?))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;

        // Lock is released when the guard is dropped
        let _guard = self.lock()?;

        if self.quota.is_some() {
            let others = self.usage_excluding(key)?;
            check_quota(self.quota, key, others, value)?;
        }

        let path = self.item_path(key);
        let tmp = path.with_extension("json.tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;

        debug!(key, bytes = value.len(), path = ?path, "Wrote storage item");
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let _guard = self.lock()?;

        let path = self.item_path(key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SQLite backend
// ============================================================================

/// Items kept in a single SQLite table
pub struct SqliteStorage {
    db: Connection,
    quota: Option<u64>,
}

impl SqliteStorage {
    /// Open or create a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(db: Connection) -> Result<Self, StorageError> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { db, quota: None })
    }

    pub fn with_quota(mut self, quota: u64) -> Self {
        self.quota = Some(quota);
        self
    }
}

impl KeyValueStorage for SqliteStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;

        let value = self
            .db
            .query_row("SELECT value FROM items WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;

        let tx = self.db.transaction()?;

        if self.quota.is_some() {
            let others: i64 = tx.query_row(
                "SELECT COALESCE(SUM(LENGTH(CAST(key AS BLOB)) + LENGTH(CAST(value AS BLOB))), 0)
                 FROM items WHERE key != ?1",
                [key],
                |row| row.get(0),
            )?;
            check_quota(self.quota, key, others.max(0) as u64, value)?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO items (key, value) VALUES (?1, ?2)",
            rusqlite::params![key, value],
        )?;
        tx.commit()?;

        debug!(key, bytes = value.len(), "Wrote storage item to SQLite");
        Ok(())
    }

    fn remove_item(&mut self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;

        self.db.execute("DELETE FROM items WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn exercise(storage: &mut dyn KeyValueStorage) {
        assert_eq!(storage.get_item("todoAppData").unwrap(), None);

        storage.set_item("todoAppData", r#"{"version":"1.0"}"#).unwrap();
        assert_eq!(
            storage.get_item("todoAppData").unwrap().as_deref(),
            Some(r#"{"version":"1.0"}"#)
        );

        storage.set_item("todoAppData", "replaced").unwrap();
        assert_eq!(storage.get_item("todoAppData").unwrap().as_deref(), Some("replaced"));

        storage.remove_item("todoAppData").unwrap();
        assert_eq!(storage.get_item("todoAppData").unwrap(), None);

        // Removing a missing key is fine
        storage.remove_item("todoAppData").unwrap();
    }

    #[test]
    fn test_memory_storage_roundtrip() {
        let mut storage = MemoryStorage::new();
        exercise(&mut storage);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_file_storage_roundtrip() {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::open(temp.path().join("data")).unwrap();
        exercise(&mut storage);
        assert!(storage.dir().exists());
    }

    #[test]
    fn test_file_storage_persists_across_instances() {
        let temp = TempDir::new().unwrap();
        {
            let mut storage = FileStorage::open(temp.path()).unwrap();
            storage.set_item("todoAppData", "hello").unwrap();
        }
        let storage = FileStorage::open(temp.path()).unwrap();
        assert_eq!(storage.get_item("todoAppData").unwrap().as_deref(), Some("hello"));
        assert!(temp.path().join("todoAppData.json").exists());
        assert!(!temp.path().join("todoAppData.json.tmp").exists());
    }

    #[test]
    fn test_sqlite_storage_roundtrip() {
        let temp = TempDir::new().unwrap();
        let mut storage = SqliteStorage::open(temp.path().join("todo.db")).unwrap();
        exercise(&mut storage);
    }

    #[test]
    fn test_memory_quota_exceeded() {
        let mut storage = MemoryStorage::with_quota(20);
        storage.set_item("k", "0123456789").unwrap();

        let err = storage.set_item("k", &"x".repeat(50)).unwrap_err();
        assert!(err.is_quota_exceeded());
        // Previous value survives the failed write
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("0123456789"));
    }

    #[test]
    fn test_quota_counts_other_items() {
        let mut storage = MemoryStorage::with_quota(20);
        storage.set_item("a", "0123456789").unwrap();
        assert!(storage.set_item("b", "0123456789").unwrap_err().is_quota_exceeded());
    }

    #[test]
    fn test_file_quota_exceeded() {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::open(temp.path()).unwrap().with_quota(16);
        let err = storage.set_item("todoAppData", "this value is far too long").unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(storage.get_item("todoAppData").unwrap(), None);
    }

    #[test]
    fn test_sqlite_quota_exceeded() {
        let mut storage = SqliteStorage::open_in_memory().unwrap().with_quota(16);
        let err = storage.set_item("todoAppData", "this value is far too long").unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(storage.get_item("todoAppData").unwrap(), None);
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("todoAppData").is_ok());
        assert!(validate_key("todo-app.v1").is_ok());

        assert!(validate_key("").is_err());
        assert!(validate_key(".hidden").is_err());
        assert!(validate_key("../escape").is_err());
        assert!(validate_key(&"a".repeat(129)).is_err());
    }

    fn rejects_invalid_keys(storage: &mut dyn KeyValueStorage) {
        for key in ["", "../escape", ".hidden"] {
            assert!(matches!(storage.get_item(key), Err(StorageError::InvalidKey(_))));
            assert!(matches!(storage.set_item(key, "v"), Err(StorageError::InvalidKey(_))));
            assert!(matches!(storage.remove_item(key), Err(StorageError::InvalidKey(_))));
        }
    }

    #[test]
    fn test_file_storage_rejects_invalid_keys() {
        let temp = TempDir::new().unwrap();
        let mut storage = FileStorage::open(temp.path()).unwrap();
        rejects_invalid_keys(&mut storage);
    }

    #[test]
    fn test_sqlite_storage_rejects_invalid_keys() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        rejects_invalid_keys(&mut storage);
    }

    #[test]
    fn test_boxed_storage() {
        let mut storage: Box<dyn KeyValueStorage> = Box::new(MemoryStorage::new());
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));
    }
}
