// Task operations and derived task views

use crate::filter::{FilterController, StatusFilter};
use crate::models::{ALL_CATEGORY_ID, NewTask, SortKey, Task, TaskPatch};
use crate::notify::{LogNotifier, Notifier};
use crate::storage::KeyValueStorage;
use crate::store::{Store, StoreError};
use chrono::{Local, NaiveDate};
use std::cmp::Ordering;
use tracing::debug;

/// Counts shown in summary views
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounts {
    pub total: usize,
    pub active: usize,
    pub completed: usize,
    pub overdue: usize,
}

/// Mediates task changes against a [`Store`] and derives filtered views.
///
/// Holds no persisted state of its own. After each successful change the
/// optional change callback runs and a success notice is sent; failures
/// are reported to the notifier and returned.
pub struct TaskController<'a, S: KeyValueStorage> {
    store: &'a mut Store<S>,
    notifier: Box<dyn Notifier + 'a>,
    on_change: Option<Box<dyn FnMut() + 'a>>,
}

impl<'a, S: KeyValueStorage> TaskController<'a, S> {
    pub fn new(store: &'a mut Store<S>) -> Self {
        Self {
            store,
            notifier: Box::new(LogNotifier),
            on_change: None,
        }
    }

    pub fn with_notifier(mut self, notifier: impl Notifier + 'a) -> Self {
        self.notifier = Box::new(notifier);
        self
    }

    /// Register the callback run after every successful change
    pub fn on_change(mut self, callback: impl FnMut() + 'a) -> Self {
        self.on_change = Some(Box::new(callback));
        self
    }

    pub fn store(&self) -> &Store<S> {
        &*self.store
    }

    fn changed(&mut self, message: &str) {
        self.notifier.success(message);
        if let Some(callback) = self.on_change.as_mut() {
            callback();
        }
    }

    fn report<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(e) = &result {
            self.notifier.error(&e.to_string());
        }
        result
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Create a task from user input. Returns the new task's id.
    pub fn add_task(&mut self, fields: NewTask) -> Result<String, StoreError> {
        let result = Task::new(fields).map_err(StoreError::from).and_then(|task| {
            let id = task.id.clone();
            self.store.add_task(task).map(|_| id)
        });

        let id = self.report(result)?;
        debug!(id = %id, "Task added");
        self.changed("Task added");
        Ok(id)
    }

    /// Returns false for unknown ids, which are ignored.
    pub fn update_task(&mut self, id: &str, patch: &TaskPatch) -> Result<bool, StoreError> {
        let result = self.store.update_task(id, patch);
        let updated = self.report(result)?;
        if updated {
            self.changed("Task updated");
        }
        Ok(updated)
    }

    /// Returns false for unknown ids, which are ignored.
    pub fn delete_task(&mut self, id: &str) -> Result<bool, StoreError> {
        let result = self.store.delete_task(id);
        let deleted = self.report(result)?;
        if deleted {
            self.changed("Task deleted");
        }
        Ok(deleted)
    }

    /// Flip the completed flag. Returns the new state, or `None` for an
    /// unknown id (no callback, no notice).
    pub fn toggle_task_complete(&mut self, id: &str) -> Result<Option<bool>, StoreError> {
        let Some(task) = self.store.task(id) else {
            debug!(id, "toggle_task_complete: unknown id, ignoring");
            return Ok(None);
        };

        let completed = !task.completed;
        let patch = TaskPatch {
            completed: Some(completed),
            ..Default::default()
        };

        let result = self.store.update_task(id, &patch);
        self.report(result)?;
        self.changed(if completed { "Task completed" } else { "Task reopened" });
        Ok(Some(completed))
    }

    /// Remove all completed tasks. Returns how many were removed.
    pub fn clear_completed(&mut self) -> Result<usize, StoreError> {
        let result = self.store.delete_completed_tasks();
        let removed = self.report(result)?;
        if removed > 0 {
            self.changed(&format!("Removed {} completed task(s)", removed));
        }
        Ok(removed)
    }

    // ========================================================================
    // Views
    // ========================================================================

    /// Derive a fresh filtered and sorted view.
    ///
    /// Filters apply in order: category (skipped for "all"), status, then a
    /// case-insensitive search over title and description (skipped when
    /// empty). Unrecognized filter or sort values show everything, newest
    /// first.
    pub fn get_filtered_tasks(&self, filter: &str, category: &str, search_query: &str, sort_by: &str) -> Vec<&Task> {
        let status = StatusFilter::from_name(filter);
        let needle = search_query.to_lowercase();

        let mut view: Vec<(usize, &Task)> = self
            .store
            .tasks()
            .iter()
            .enumerate()
            .filter(|(_, task)| category == ALL_CATEGORY_ID || task.category == category)
            .filter(|(_, task)| status.matches(task))
            .filter(|(_, task)| needle.is_empty() || matches_search(task, &needle))
            .collect();

        sort_view(&mut view, SortKey::from_name(sort_by));
        view.into_iter().map(|(_, task)| task).collect()
    }

    /// View for the current selection of a [`FilterController`]
    pub fn filtered_tasks(&self, filters: &FilterController) -> Vec<&Task> {
        self.get_filtered_tasks(
            filters.filter(),
            filters.category(),
            filters.search_query(),
            filters.sort_by(),
        )
    }

    pub fn task_counts(&self) -> TaskCounts {
        self.task_counts_on(Local::now().date_naive())
    }

    pub fn task_counts_on(&self, today: NaiveDate) -> TaskCounts {
        self.store
            .tasks()
            .iter()
            .fold(TaskCounts::default(), |mut counts, task| {
                counts.total += 1;
                if task.completed {
                    counts.completed += 1;
                } else {
                    counts.active += 1;
                }
                if task.is_overdue(today) {
                    counts.overdue += 1;
                }
                counts
            })
    }
}

fn matches_search(task: &Task, needle: &str) -> bool {
    task.title.to_lowercase().contains(needle)
        || task
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
}

// Store position breaks creation-time ties: later insertion is newer.
fn newest_first(a: &(usize, &Task), b: &(usize, &Task)) -> Ordering {
    (b.1.created_at, b.0).cmp(&(a.1.created_at, a.0))
}

fn sort_view(view: &mut [(usize, &Task)], key: SortKey) {
    match key {
        SortKey::DueDate => view.sort_by(|a, b| match (a.1.due_date, b.1.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        SortKey::Priority => view.sort_by(|a, b| {
            a.1.priority
                .rank()
                .cmp(&b.1.priority.rank())
                .then_with(|| newest_first(a, b))
        }),
        SortKey::Created => view.sort_by(newest_first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use crate::notify::NoticeLevel;
    use crate::notify::testing::RecordingNotifier;
    use crate::storage::MemoryStorage;
    use crate::store::DEFAULT_STORAGE_KEY;
    use std::cell::Cell;
    use std::rc::Rc;

    fn memory_store() -> Store<MemoryStorage> {
        Store::open(MemoryStorage::new(), DEFAULT_STORAGE_KEY).unwrap()
    }

    fn titles(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.title.clone()).collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_add_task_appears_first() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);

        controller.add_task(NewTask::new("Older")).unwrap();
        let before = controller.get_filtered_tasks("all", "all", "", "created").len();

        let id = controller.add_task(NewTask::new("Newest")).unwrap();
        let view = controller.get_filtered_tasks("all", "all", "", "created");

        assert_eq!(view.len(), before + 1);
        assert_eq!(view[0].id, id);
    }

    #[test]
    fn test_add_task_runs_callback_and_notifies() {
        let mut store = memory_store();
        let calls = Rc::new(Cell::new(0));
        let notices = Rc::new(RecordingNotifier::default());
        let c = Rc::clone(&calls);

        let mut controller = TaskController::new(&mut store)
            .with_notifier(Rc::clone(&notices))
            .on_change(move || c.set(c.get() + 1));

        controller.add_task(NewTask::new("Task")).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(notices.levels(), vec![NoticeLevel::Success]);

        assert!(controller.add_task(NewTask::new("")).is_err());
        assert_eq!(calls.get(), 1);
        assert_eq!(notices.last().map(|(level, _)| level), Some(NoticeLevel::Error));
    }

    #[test]
    fn test_toggle_task_complete() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);
        let id = controller.add_task(NewTask::new("Toggle me")).unwrap();

        assert_eq!(controller.toggle_task_complete(&id).unwrap(), Some(true));
        let task = controller.store().task(&id).unwrap();
        assert!(task.completed);
        assert!(task.completed_at.is_some());

        assert_eq!(controller.toggle_task_complete(&id).unwrap(), Some(false));
        let task = controller.store().task(&id).unwrap();
        assert!(!task.completed);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn test_toggle_unknown_task_is_silent() {
        let mut store = memory_store();
        let calls = Rc::new(Cell::new(0));
        let c = Rc::clone(&calls);
        let mut controller = TaskController::new(&mut store).on_change(move || c.set(c.get() + 1));

        assert_eq!(controller.toggle_task_complete("missing").unwrap(), None);
        assert!(!controller.update_task("missing", &TaskPatch::default()).unwrap());
        assert!(!controller.delete_task("missing").unwrap());
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_update_and_delete_pass_through() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);
        let id = controller.add_task(NewTask::new("Draft")).unwrap();

        let patch = TaskPatch {
            title: Some("Final".to_string()),
            ..Default::default()
        };
        assert!(controller.update_task(&id, &patch).unwrap());
        assert_eq!(controller.store().task(&id).unwrap().title, "Final");

        assert!(controller.delete_task(&id).unwrap());
        assert!(controller.store().task(&id).is_none());
    }

    #[test]
    fn test_search_filter() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);
        controller.add_task(NewTask::new("Buy milk")).unwrap();
        controller.add_task(NewTask::new("Call dentist")).unwrap();

        let view = controller.get_filtered_tasks("all", "all", "milk", "created");
        assert_eq!(titles(&view), vec!["Buy milk"]);

        let view = controller.get_filtered_tasks("all", "all", "MILK", "created");
        assert_eq!(titles(&view), vec!["Buy milk"]);
    }

    #[test]
    fn test_search_matches_description() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);
        controller
            .add_task(NewTask::new("Errands").description("Pick up the Dry Cleaning"))
            .unwrap();
        controller.add_task(NewTask::new("Other")).unwrap();

        let view = controller.get_filtered_tasks("all", "all", "dry clean", "created");
        assert_eq!(titles(&view), vec!["Errands"]);
    }

    #[test]
    fn test_category_and_status_filters() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);
        let done = controller.add_task(NewTask::new("Report").category("work")).unwrap();
        controller.add_task(NewTask::new("Slides").category("work")).unwrap();
        controller.add_task(NewTask::new("Groceries").category("shopping")).unwrap();
        controller.toggle_task_complete(&done).unwrap();

        let work = controller.get_filtered_tasks("all", "work", "", "created");
        assert_eq!(work.len(), 2);

        let active_work = controller.get_filtered_tasks("active", "work", "", "created");
        assert_eq!(titles(&active_work), vec!["Slides"]);

        let completed = controller.get_filtered_tasks("completed", "all", "", "created");
        assert_eq!(titles(&completed), vec!["Report"]);

        // Unknown status values keep everything
        let everything = controller.get_filtered_tasks("bogus", "all", "", "created");
        assert_eq!(everything.len(), 3);
    }

    #[test]
    fn test_sort_by_priority() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);
        for (title, priority) in [
            ("low", Priority::Low),
            ("urgent-1", Priority::Urgent),
            ("medium", Priority::Medium),
            ("urgent-2", Priority::Urgent),
        ] {
            controller.add_task(NewTask::new(title).priority(priority)).unwrap();
        }

        let view = controller.get_filtered_tasks("all", "all", "", "priority");
        assert_eq!(titles(&view), vec!["urgent-2", "urgent-1", "medium", "low"]);
    }

    #[test]
    fn test_sort_by_due_date() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);
        controller.add_task(NewTask::new("undated")).unwrap();
        controller.add_task(NewTask::new("later").due_date(date(2024, 9, 1))).unwrap();
        controller.add_task(NewTask::new("sooner").due_date(date(2024, 8, 1))).unwrap();

        let view = controller.get_filtered_tasks("all", "all", "", "dueDate");
        assert_eq!(titles(&view), vec!["sooner", "later", "undated"]);
    }

    #[test]
    fn test_unknown_sort_falls_back_to_created() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);
        controller.add_task(NewTask::new("first")).unwrap();
        controller.add_task(NewTask::new("second")).unwrap();

        let view = controller.get_filtered_tasks("all", "all", "", "alphabetical");
        assert_eq!(titles(&view), vec!["second", "first"]);
    }

    #[test]
    fn test_filtered_tasks_uses_filter_controller() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);
        controller.add_task(NewTask::new("Buy milk").category("shopping")).unwrap();
        controller.add_task(NewTask::new("Write report").category("work")).unwrap();

        let mut filters = FilterController::new();
        filters.set_category("shopping");
        assert_eq!(titles(&controller.filtered_tasks(&filters)), vec!["Buy milk"]);

        filters.reset();
        assert_eq!(controller.filtered_tasks(&filters).len(), 2);
    }

    #[test]
    fn test_task_counts_and_clear_completed() {
        let mut store = memory_store();
        let mut controller = TaskController::new(&mut store);
        let done = controller.add_task(NewTask::new("Done")).unwrap();
        controller.add_task(NewTask::new("Late").due_date(date(2024, 1, 1))).unwrap();
        controller.add_task(NewTask::new("Open")).unwrap();
        controller.toggle_task_complete(&done).unwrap();

        let counts = controller.task_counts_on(date(2024, 6, 1));
        assert_eq!(
            counts,
            TaskCounts {
                total: 3,
                active: 2,
                completed: 1,
                overdue: 1,
            }
        );

        assert_eq!(controller.clear_completed().unwrap(), 1);
        assert_eq!(controller.task_counts_on(date(2024, 6, 1)).total, 2);
    }
}
