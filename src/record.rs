// Identity trait shared by the snapshot's record collections

use crate::models::{Category, Task};
use std::collections::HashSet;

/// Core trait for records held in an ordered, id-unique collection
pub trait Record {
    /// Unique identifier for this record
    fn id(&self) -> &str;

    /// Collection name used in logs and error messages (e.g., "tasks")
    fn collection_name() -> &'static str
    where
        Self: Sized;
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn collection_name() -> &'static str {
        "tasks"
    }
}

impl Record for Category {
    fn id(&self) -> &str {
        &self.id
    }

    fn collection_name() -> &'static str {
        "categories"
    }
}

/// Position of the record with the given id
pub fn position<T: Record>(records: &[T], id: &str) -> Option<usize> {
    records.iter().position(|r| r.id() == id)
}

/// First id that occurs more than once, if any
pub fn first_duplicate<T: Record>(records: &[T]) -> Option<&str> {
    let mut seen = HashSet::new();
    records.iter().map(Record::id).find(|id| !seen.insert(*id))
}

/// Drop later records whose id was already seen. Returns how many were removed.
pub fn dedup_by_id<T: Record>(records: &mut Vec<T>) -> usize {
    let before = records.len();
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.id().to_string()));
    before - records.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestRecord {
        id: String,
        name: String,
    }

    impl Record for TestRecord {
        fn id(&self) -> &str {
            &self.id
        }

        fn collection_name() -> &'static str {
            "test"
        }
    }

    fn rec(id: &str, name: &str) -> TestRecord {
        TestRecord {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_record_trait_implementation() {
        let record = rec("test-1", "Test");
        assert_eq!(record.id(), "test-1");
        assert_eq!(TestRecord::collection_name(), "test");
        assert_eq!(Task::collection_name(), "tasks");
        assert_eq!(Category::collection_name(), "categories");
    }

    #[test]
    fn test_position() {
        let records = vec![rec("a", "A"), rec("b", "B")];
        assert_eq!(position(&records, "b"), Some(1));
        assert_eq!(position(&records, "c"), None);
    }

    #[test]
    fn test_first_duplicate() {
        assert_eq!(first_duplicate(&[rec("a", "1"), rec("b", "2")]), None);
        assert_eq!(
            first_duplicate(&[rec("a", "1"), rec("b", "2"), rec("a", "3")]),
            Some("a")
        );
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let mut records = vec![rec("a", "first"), rec("b", "B"), rec("a", "second")];
        assert_eq!(dedup_by_id(&mut records), 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "first");
    }
}
