// Transient filter/sort selection for task views

use crate::models::{ALL_CATEGORY_ID, SortKey, Task};
use std::fmt;

/// Completion-state filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl StatusFilter {
    /// Lenient lookup: anything unrecognized shows every task.
    pub fn from_name(name: &str) -> Self {
        match name {
            "active" => StatusFilter::Active,
            "completed" => StatusFilter::Completed,
            _ => StatusFilter::All,
        }
    }

    pub fn matches(self, task: &Task) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => !task.completed,
            StatusFilter::Completed => task.completed,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusFilter::All => write!(f, "all"),
            StatusFilter::Active => write!(f, "active"),
            StatusFilter::Completed => write!(f, "completed"),
        }
    }
}

/// Current UI selection. Values are kept as given and only interpreted
/// when a view is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterController {
    filter: String,
    category: String,
    search: String,
    sort_by: String,
}

impl Default for FilterController {
    fn default() -> Self {
        Self {
            filter: StatusFilter::All.to_string(),
            category: ALL_CATEGORY_ID.to_string(),
            search: String::new(),
            sort_by: SortKey::Created.to_string(),
        }
    }
}

impl FilterController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn set_category(&mut self, category: impl Into<String>) {
        self.category = category.into();
    }

    pub fn search_query(&self) -> &str {
        &self.search
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) {
        self.search = query.into();
    }

    pub fn sort_by(&self) -> &str {
        &self.sort_by
    }

    pub fn set_sort_by(&mut self, sort_by: impl Into<String>) {
        self.sort_by = sort_by.into();
    }

    /// Back to all/all/""/created
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
