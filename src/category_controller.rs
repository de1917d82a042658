// Category operations for the UI layer

use crate::models::{ALL_CATEGORY_ID, Category, CategoryPatch};
use crate::notify::{LogNotifier, Notifier};
use crate::storage::KeyValueStorage;
use crate::store::{Store, StoreError};
use std::collections::HashMap;

/// Mediates category changes against a [`Store`]
pub struct CategoryController<'a, S: KeyValueStorage> {
    store: &'a mut Store<S>,
    notifier: Box<dyn Notifier + 'a>,
}

impl<'a, S: KeyValueStorage> CategoryController<'a, S> {
    pub fn new(store: &'a mut Store<S>) -> Self {
        Self {
            store,
            notifier: Box::new(LogNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'a) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    pub fn store(&self) -> &Store<S> {
        &*self.store
    }

    fn report<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(e) = &result {
            self.notifier.error(&e.to_string());
        }
        result
    }

    /// Create a category. Returns its id.
    pub fn add_category(&mut self, name: &str, color: &str, icon: &str) -> Result<String, StoreError> {
        let result = Category::new(name, color, icon)
            .map_err(StoreError::from)
            .and_then(|category| {
                let id = category.id.clone();
                self.store.add_category(category).map(|_| id)
            });

        let id = self.report(result)?;
        self.notifier.success(&format!("Category '{}' added", name.trim()));
        Ok(id)
    }

    /// Returns false for unknown ids, which are ignored.
    pub fn update_category(&mut self, id: &str, patch: &CategoryPatch) -> Result<bool, StoreError> {
        let result = self.store.update_category(id, patch);
        let updated = self.report(result)?;
        if updated {
            self.notifier.success("Category updated");
        }
        Ok(updated)
    }

    /// Delete a category; its tasks move to the default category.
    ///
    /// The reserved "all" category is refused with an error notice.
    pub fn delete_category(&mut self, id: &str) -> Result<bool, StoreError> {
        if id == ALL_CATEGORY_ID {
            self.notifier.error("Cannot delete the \"All Tasks\" category");
            return Err(StoreError::ReservedCategory(id.to_string()));
        }

        let result = self.store.delete_category(id);
        let deleted = self.report(result)?;
        if deleted {
            self.notifier.success("Category deleted");
        }
        Ok(deleted)
    }

    /// Categories in store order with their task counts.
    ///
    /// The reserved category counts every task.
    pub fn category_counts(&self) -> Vec<(&Category, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for task in self.store.tasks() {
            *counts.entry(task.category.as_str()).or_default() += 1;
        }

        let total = self.store.tasks().len();
        self.store
            .categories()
            .iter()
            .map(|category| {
                let count = if category.is_reserved() {
                    total
                } else {
                    counts.get(category.id.as_str()).copied().unwrap_or(0)
                };
                (category, count)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_CATEGORY_ID, NewTask, Task};
    use crate::notify::NoticeLevel;
    use crate::notify::testing::RecordingNotifier;
    use crate::storage::MemoryStorage;
    use crate::store::DEFAULT_STORAGE_KEY;
    use std::rc::Rc;

    fn memory_store() -> Store<MemoryStorage> {
        Store::open(MemoryStorage::new(), DEFAULT_STORAGE_KEY).unwrap()
    }

    #[test]
    fn test_add_category() {
        let mut store = memory_store();
        let mut controller = CategoryController::new(&mut store);

        let id = controller.add_category("Side Projects", "#8b5cf6", "🚀").unwrap();
        assert_eq!(id, "side-projects");
        assert_eq!(controller.store().category(&id).unwrap().name, "Side Projects");

        // Same name again collides on the derived id
        assert!(matches!(
            controller.add_category("side projects", "#000", "x"),
            Err(StoreError::DuplicateId { .. })
        ));
    }

    #[test]
    fn test_delete_reserved_category_notifies_error() {
        let mut store = memory_store();
        let notices = Rc::new(RecordingNotifier::default());
        let mut controller = CategoryController::new(&mut store).with_notifier(Rc::clone(&notices));
        let before = controller.store().categories().to_vec();

        let err = controller.delete_category(ALL_CATEGORY_ID).unwrap_err();
        assert!(matches!(err, StoreError::ReservedCategory(_)));
        assert_eq!(controller.store().categories(), before.as_slice());
        assert_eq!(notices.levels(), vec![NoticeLevel::Error]);
    }

    #[test]
    fn test_delete_category_moves_tasks() {
        let mut store = memory_store();
        let task = Task::new(NewTask::new("Groceries").category("shopping")).unwrap();
        let task_id = task.id.clone();
        store.add_task(task).unwrap();

        let mut controller = CategoryController::new(&mut store);
        assert!(controller.delete_category("shopping").unwrap());
        assert!(!controller.delete_category("shopping").unwrap());

        assert_eq!(controller.store().task(&task_id).unwrap().category, DEFAULT_CATEGORY_ID);
    }

    #[test]
    fn test_update_category() {
        let mut store = memory_store();
        let mut controller = CategoryController::new(&mut store);
        let patch = CategoryPatch {
            name: Some("Job".to_string()),
            ..Default::default()
        };
        assert!(controller.update_category("work", &patch).unwrap());
        assert_eq!(controller.store().category("work").unwrap().name, "Job");
    }

    #[test]
    fn test_category_counts() {
        let mut store = memory_store();
        for (title, category) in [("a", "work"), ("b", "work"), ("c", "personal")] {
            store
                .add_task(Task::new(NewTask::new(title).category(category)).unwrap())
                .unwrap();
        }

        let controller = CategoryController::new(&mut store);
        let counts: Vec<(String, usize)> = controller
            .category_counts()
            .into_iter()
            .map(|(c, n)| (c.id.clone(), n))
            .collect();

        assert_eq!(
            counts,
            vec![
                ("all".to_string(), 3),
                ("personal".to_string(), 1),
                ("work".to_string(), 2),
                ("shopping".to_string(), 0),
            ]
        );
    }
}
