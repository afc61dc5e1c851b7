use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use thiserror::Error;

/// Errors produced by key-value store implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Requested key does not exist.
    #[error("entry not found for key: {key}")]
    NotFound { key: String },
    /// Underlying storage failure.
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

/// Local key-value surface the task collection and settings are written to.
///
/// Writes are synchronous; a caller that sees an error keeps its in-memory
/// state and decides whether to keep writing.
pub trait KvStore {
    /// Persist a value under a key, overwriting any existing entry.
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;

    /// Retrieve the value for a key.
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Remove a key and its value (idempotent).
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests and throwaway sessions. Clones share the same map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKvStore {
    inner: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    fail_writes: Rc<Cell<bool>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail, simulating a full or read-only disk.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.borrow().contains_key(key)
    }
}

impl KvStore for InMemoryKvStore {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes.get() {
            return Err(StoreError::Storage {
                reason: format!("write rejected for key: {key}"),
            });
        }
        self.inner
            .borrow_mut()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.inner
            .borrow()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                key: key.to_string(),
            })
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let store = InMemoryKvStore::new();
        let other = store.clone();
        store.put("todos", b"[]").expect("put should succeed");

        assert_eq!(other.get("todos").expect("get"), b"[]");
        assert!(other.contains("todos"));
    }

    #[test]
    fn delete_is_idempotent_and_removes_data() {
        let store = InMemoryKvStore::new();
        store.put("k", b"v").expect("put should succeed");
        store.delete("k").expect("delete should succeed");
        store.delete("k").expect("delete again should still succeed");

        let err = store.get("k").expect_err("get should fail after delete");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn failing_writes_leave_previous_value() {
        let store = InMemoryKvStore::new();
        store.put("k", b"old").expect("put should succeed");
        store.fail_writes(true);

        let err = store.put("k", b"new").expect_err("put should fail");
        assert!(matches!(err, StoreError::Storage { .. }));
        assert_eq!(store.get("k").expect("get"), b"old");
    }
}
