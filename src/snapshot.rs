// Versioned snapshot of all persisted state, with load and import boundaries

use crate::models::{Category, DEFAULT_CATEGORY_ID, Settings, Task, default_categories};
use crate::record::{self, Record};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Version tag written into every snapshot
pub const CURRENT_VERSION: &str = "1.0";

const MIGRATED_CATEGORY_COLOR: &str = "#64748b";
const MIGRATED_CATEGORY_ICON: &str = "📁";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Import data is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Import data must be a JSON object")]
    NotAnObject,
    #[error("Import data has no tasks array")]
    MissingTasks,
    #[error("Import field '{field}' is malformed: {source}")]
    InvalidField {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid record in {collection}: {reason}")]
    InvalidRecord { collection: &'static str, reason: String },
    #[error("Duplicate id '{id}' in {collection}")]
    DuplicateId { collection: &'static str, id: String },
}

/// The single aggregate of tasks, categories and settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub tasks: Vec<Task>,
    pub categories: Vec<Category>,
    pub settings: Settings,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION.to_string(),
            tasks: Vec::new(),
            categories: default_categories(),
            settings: Settings::default(),
        }
    }
}

/// How a snapshot was obtained from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing was stored; defaults were used
    Fresh,
    /// Stored snapshot was current and well-formed
    Loaded,
    /// Stored snapshot carried another version and was upgraded
    Migrated { from: Option<String> },
    /// Stored data was unreadable and was replaced by defaults
    Recovered,
}

impl LoadOutcome {
    /// True when the result must be written back immediately
    pub fn needs_persist(&self) -> bool {
        matches!(self, LoadOutcome::Migrated { .. })
    }
}

impl Snapshot {
    pub fn task_position(&self, id: &str) -> Option<usize> {
        record::position(&self.tasks, id)
    }

    pub fn category_position(&self, id: &str) -> Option<usize> {
        record::position(&self.categories, id)
    }

    pub fn has_category(&self, id: &str) -> bool {
        id == DEFAULT_CATEGORY_ID || self.category_position(id).is_some()
    }

    /// Serialize in the compact form used for storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize in the indented form used for backups
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Restore referential invariants. Returns the number of fixes made.
    ///
    /// Drops duplicate ids (first wins), re-inserts the reserved category
    /// and points tasks with unknown categories at the default.
    pub fn repair(&mut self) -> usize {
        let mut fixes = record::dedup_by_id(&mut self.tasks) + record::dedup_by_id(&mut self.categories);

        if self.category_position(DEFAULT_CATEGORY_ID).is_none() {
            let reserved = default_categories()
                .into_iter()
                .find(|c| c.id == DEFAULT_CATEGORY_ID);
            if let Some(reserved) = reserved {
                self.categories.insert(0, reserved);
                fixes += 1;
            }
        }

        fixes + self.reassign_orphans()
    }

    fn reassign_orphans(&mut self) -> usize {
        let known: HashSet<&str> = self.categories.iter().map(|c| c.id.as_str()).collect();
        let mut fixed = 0;
        for task in self.tasks.iter_mut() {
            if task.category != DEFAULT_CATEGORY_ID && !known.contains(task.category.as_str()) {
                warn!(task = %task.id, category = %task.category, "Task references unknown category, reassigning");
                task.category = DEFAULT_CATEGORY_ID.to_string();
                fixed += 1;
            }
        }
        fixed
    }

    /// Strict checks applied to imported data
    fn validate(&self) -> Result<(), ImportError> {
        check_unique(&self.tasks)?;
        check_unique(&self.categories)?;

        if let Some(task) = self.tasks.iter().find(|t| t.title.trim().is_empty()) {
            return Err(ImportError::InvalidRecord {
                collection: Task::collection_name(),
                reason: format!("task {} has an empty title", task.id),
            });
        }
        if let Some(category) = self.categories.iter().find(|c| c.name.trim().is_empty()) {
            return Err(ImportError::InvalidRecord {
                collection: Category::collection_name(),
                reason: format!("category {} has an empty name", category.id),
            });
        }
        Ok(())
    }
}

fn check_unique<T: Record>(records: &[T]) -> Result<(), ImportError> {
    match record::first_duplicate(records) {
        Some(id) => Err(ImportError::DuplicateId {
            collection: T::collection_name(),
            id: id.to_string(),
        }),
        None => Ok(()),
    }
}

/// Decode whatever the storage medium returned for the snapshot key.
///
/// Never fails: unreadable data falls back to the default snapshot.
pub fn decode_persisted(raw: Option<&str>) -> (Snapshot, LoadOutcome) {
    let Some(raw) = raw else {
        info!("No stored snapshot, starting with defaults");
        return (Snapshot::default(), LoadOutcome::Fresh);
    };

    let object = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(object)) => object,
        Ok(_) => {
            warn!("Stored snapshot is not a JSON object, resetting to defaults");
            return (Snapshot::default(), LoadOutcome::Recovered);
        }
        Err(e) => {
            warn!(error = ?e, "Stored snapshot is corrupt, resetting to defaults");
            return (Snapshot::default(), LoadOutcome::Recovered);
        }
    };

    let version = object.get("version").and_then(Value::as_str).map(str::to_string);

    let (mut snapshot, outcome) = if version.as_deref() == Some(CURRENT_VERSION) {
        match serde_json::from_value::<Snapshot>(Value::Object(object)) {
            Ok(snapshot) => (snapshot, LoadOutcome::Loaded),
            Err(e) => {
                warn!(error = ?e, "Stored snapshot has an invalid shape, resetting to defaults");
                return (Snapshot::default(), LoadOutcome::Recovered);
            }
        }
    } else {
        info!(from = ?version, to = CURRENT_VERSION, "Migrating stored snapshot");
        (migrate(&object), LoadOutcome::Migrated { from: version })
    };

    let fixes = snapshot.repair();
    if fixes > 0 {
        warn!(fixes, "Repaired stored snapshot");
    }

    (snapshot, outcome)
}

// Overlay whatever fields survive onto a fresh snapshot
fn migrate(old: &Map<String, Value>) -> Snapshot {
    let defaults = Snapshot::default();
    Snapshot {
        version: CURRENT_VERSION.to_string(),
        tasks: migrate_array(old, "tasks", fill_task_defaults).unwrap_or(defaults.tasks),
        categories: migrate_array(old, "categories", fill_category_defaults).unwrap_or(defaults.categories),
        settings: overlay_field(old, "settings").unwrap_or(defaults.settings),
    }
}

fn overlay_field<T: DeserializeOwned>(old: &Map<String, Value>, field: &'static str) -> Option<T> {
    let value = present(old, field)?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(field, error = ?e, "Dropping unreadable field during migration");
            None
        }
    }
}

// Migrate a collection one element at a time. Only elements that still
// fail to parse after defaults are filled in are dropped.
fn migrate_array<T: DeserializeOwned>(
    old: &Map<String, Value>,
    field: &'static str,
    fill_defaults: fn(&mut Map<String, Value>),
) -> Option<Vec<T>> {
    let items = match present(old, field)? {
        Value::Array(items) => items,
        other => {
            warn!(field, value = %other, "Dropping non-array field during migration");
            return None;
        }
    };

    let migrated = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let mut item = item.clone();
            if let Value::Object(fields) = &mut item {
                fill_defaults(fields);
            }
            let id = item.get("id").cloned();
            match serde_json::from_value(item) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(field, index, id = ?id, error = ?e, "Dropping unreadable record during migration");
                    None
                }
            }
        })
        .collect();
    Some(migrated)
}

fn fill_task_defaults(fields: &mut Map<String, Value>) {
    fill_id(fields);
    fill_missing(fields, "category", || Value::from(DEFAULT_CATEGORY_ID));
    fill_missing(fields, "createdAt", || Value::from(Utc::now().to_rfc3339()));
}

fn fill_category_defaults(fields: &mut Map<String, Value>) {
    if absent(fields, "id") {
        let derived = fields
            .get("name")
            .and_then(Value::as_str)
            .and_then(|name| Category::new(name, "", "").ok())
            .map(|category| category.id);
        if let Some(id) = derived {
            fields.insert("id".to_string(), Value::from(id));
        }
    } else {
        fill_id(fields);
    }
    fill_missing(fields, "color", || Value::from(MIGRATED_CATEGORY_COLOR));
    fill_missing(fields, "icon", || Value::from(MIGRATED_CATEGORY_ICON));
}

// Older data may carry numeric ids
fn fill_id(fields: &mut Map<String, Value>) {
    match fields.get("id") {
        Some(Value::String(_)) => {}
        Some(Value::Number(n)) => {
            let id = n.to_string();
            fields.insert("id".to_string(), Value::from(id));
        }
        _ => {
            fields.insert("id".to_string(), Value::from(Uuid::now_v7().to_string()));
        }
    }
}

fn fill_missing(fields: &mut Map<String, Value>, key: &str, default: impl FnOnce() -> Value) {
    if absent(fields, key) {
        fields.insert(key.to_string(), default());
    }
}

fn absent(fields: &Map<String, Value>, key: &str) -> bool {
    fields.get(key).is_none_or(Value::is_null)
}

// `null` counts as absent
fn present<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    object.get(field).filter(|value| !value.is_null())
}

/// Decode and validate import text. Absent or `null` categories and settings
/// fall back to those of `current`; a partial settings object overrides only
/// the fields it names.
pub fn decode_import(text: &str, current: &Snapshot) -> Result<Snapshot, ImportError> {
    let object = match serde_json::from_str::<Value>(text)? {
        Value::Object(object) => object,
        _ => return Err(ImportError::NotAnObject),
    };

    let tasks = match object.get("tasks") {
        Some(value @ Value::Array(_)) => parse_field::<Vec<Task>>(value, "tasks")?,
        _ => return Err(ImportError::MissingTasks),
    };

    let categories = match present(&object, "categories") {
        Some(value) => parse_field::<Vec<Category>>(value, "categories")?,
        None => current.categories.clone(),
    };

    let settings = match present(&object, "settings") {
        Some(value) => overlay_settings(current.settings, value)?,
        None => current.settings,
    };

    let mut snapshot = Snapshot {
        version: CURRENT_VERSION.to_string(),
        tasks,
        categories,
        settings,
    };
    snapshot.validate()?;
    snapshot.repair();

    Ok(snapshot)
}

// Imported settings fields replace current ones; absent fields keep theirs
fn overlay_settings(current: Settings, value: &Value) -> Result<Settings, ImportError> {
    let Value::Object(fields) = value else {
        return parse_field(value, "settings");
    };

    let mut merged = match serde_json::to_value(current) {
        Ok(Value::Object(merged)) => merged,
        _ => Map::new(),
    };
    for (key, field) in fields.iter().filter(|(_, field)| !field.is_null()) {
        merged.insert(key.clone(), field.clone());
    }
    parse_field(&Value::Object(merged), "settings")
}

fn parse_field<T: DeserializeOwned>(value: &Value, field: &'static str) -> Result<T, ImportError> {
    serde_json::from_value(value.clone()).map_err(|source| ImportError::InvalidField { field, source })
}
