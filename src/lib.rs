// todostore - Local-first todo store over synchronous key-value storage

pub mod category_controller;
pub mod config;
pub mod filter;
pub mod models;
pub mod notify;
pub mod record;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod task_controller;

// Re-export main types for convenience
pub use category_controller::CategoryController;
pub use config::Config;
pub use filter::{FilterController, StatusFilter};
pub use models::{
    ALL_CATEGORY_ID, Category, CategoryPatch, DEFAULT_CATEGORY_ID, NewTask, Priority, Settings, SettingsPatch,
    SortKey, Task, TaskPatch, Theme,
};
pub use notify::{LogNotifier, NoticeLevel, Notifier};
pub use record::Record;
pub use snapshot::{CURRENT_VERSION, ImportError, LoadOutcome, Snapshot};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, SqliteStorage, StorageError};
pub use store::{DEFAULT_STORAGE_KEY, Export, ListenerId, Store, StoreError};
pub use task_controller::{TaskController, TaskCounts};
