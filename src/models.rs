// Data models for todostore

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Reserved pseudo-category that means "all tasks". Never deletable.
pub const ALL_CATEGORY_ID: &str = "all";

/// Category that tasks fall back to when their category disappears.
///
/// This is the reserved "all" category, so the fallback target can never be
/// deleted out from under a task.
pub const DEFAULT_CATEGORY_ID: &str = ALL_CATEGORY_ID;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Task title cannot be empty")]
    EmptyTitle,
    #[error("Category name cannot be empty")]
    EmptyName,
    #[error("Invalid priority value: {0}")]
    InvalidPriority(String),
    #[error("Invalid theme value: {0}")]
    InvalidTheme(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    /// Sort rank, lowest first: urgent, high, medium, low.
    pub fn rank(self) -> u8 {
        match self {
            Priority::Urgent => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(ModelError::InvalidPriority(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => f.write_str("light"),
            Theme::Dark => f.write_str("dark"),
        }
    }
}

impl FromStr for Theme {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Theme::Light),
            "dark" => Ok(Theme::Dark),
            other => Err(ModelError::InvalidTheme(other.to_string())),
        }
    }
}

/// Sort order for task views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Created,
    DueDate,
    Priority,
}

impl SortKey {
    /// Lenient lookup: anything unrecognized sorts by creation time.
    pub fn from_name(name: &str) -> Self {
        match name {
            "dueDate" => SortKey::DueDate,
            "priority" => SortKey::Priority,
            _ => SortKey::Created,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Created => "created",
            SortKey::DueDate => "dueDate",
            SortKey::Priority => "priority",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single todo item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Build a task from user input, assigning a fresh id and creation time.
    pub fn new(fields: NewTask) -> Result<Self, ModelError> {
        let title = fields.title.trim().to_string();
        if title.is_empty() {
            return Err(ModelError::EmptyTitle);
        }

        Ok(Self {
            id: Uuid::now_v7().to_string(),
            title,
            description: normalize_description(fields.description),
            category: fields.category,
            priority: fields.priority,
            due_date: fields.due_date,
            completed: false,
            created_at: Utc::now(),
            completed_at: None,
        })
    }

    /// Apply a partial update. `id` and `created_at` are never touched.
    pub fn apply(&mut self, patch: &TaskPatch) -> Result<(), ModelError> {
        if let Some(title) = &patch.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(ModelError::EmptyTitle);
            }
            self.title = title.to_string();
        }
        if let Some(description) = &patch.description {
            self.description = normalize_description(description.clone());
        }
        if let Some(category) = &patch.category {
            self.category = category.clone();
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(completed) = patch.completed {
            self.set_completed(completed);
        }
        Ok(())
    }

    /// Set the completed flag, stamping or clearing `completed_at` on transitions.
    pub fn set_completed(&mut self, completed: bool) {
        match (self.completed, completed) {
            (false, true) => self.completed_at = Some(Utc::now()),
            (true, false) => self.completed_at = None,
            _ => {}
        }
        self.completed = completed;
    }

    /// True when the task is open and its due date lies before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.completed && self.due_date.is_some_and(|due| due < today)
    }
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// User-supplied fields for a new task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            category: DEFAULT_CATEGORY_ID.to_string(),
            priority: Priority::default(),
            due_date: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn due_date(mut self, due_date: NaiveDate) -> Self {
        self.due_date = Some(due_date);
        self
    }
}

/// Partial update for a task. `None` leaves a field unchanged; the nested
/// options on `description` and `due_date` allow clearing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<NaiveDate>>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }
}

/// Task grouping with display hints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
}

impl Category {
    /// Create a category whose id is derived from its name.
    pub fn new(
        name: impl Into<String>,
        color: impl Into<String>,
        icon: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ModelError::EmptyName);
        }

        let id = match slugify(&name) {
            slug if slug.is_empty() => Uuid::now_v7().to_string(),
            slug => slug,
        };

        Ok(Self {
            id,
            name,
            color: color.into(),
            icon: icon.into(),
        })
    }

    pub fn apply(&mut self, patch: &CategoryPatch) -> Result<(), ModelError> {
        if let Some(name) = &patch.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(ModelError::EmptyName);
            }
            self.name = name.to_string();
        }
        if let Some(color) = &patch.color {
            self.color = color.clone();
        }
        if let Some(icon) = &patch.icon {
            self.icon = icon.clone();
        }
        Ok(())
    }

    pub fn is_reserved(&self) -> bool {
        self.id == ALL_CATEGORY_ID
    }
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

/// User preferences stored alongside the data
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub theme: Theme,
    pub sort_by: SortKey,
}

impl Settings {
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(sort_by) = patch.sort_by {
            self.sort_by = sort_by;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    pub theme: Option<Theme>,
    pub sort_by: Option<SortKey>,
}

/// The categories every fresh snapshot starts with
pub fn default_categories() -> Vec<Category> {
    [
        (ALL_CATEGORY_ID, "All Tasks", "#6366f1", "📋"),
        ("personal", "Personal", "#10b981", "👤"),
        ("work", "Work", "#f59e0b", "💼"),
        ("shopping", "Shopping", "#ef4444", "🛒"),
    ]
    .into_iter()
    .map(|(id, name, color, icon)| Category {
        id: id.to_string(),
        name: name.to_string(),
        color: color.to_string(),
        icon: icon.to_string(),
    })
    .collect()
}
