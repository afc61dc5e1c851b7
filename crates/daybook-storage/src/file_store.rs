use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use daybook_core::storage::{KvStore, StoreError};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

const FILE_EXTENSION: &str = "json";

/// Directory of JSON records, one file per key.
///
/// Values are expected to be JSON documents; they are validated before being
/// written so a corrupt payload never replaces a good record on disk.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{FILE_EXTENSION}", sanitize_key(key)))
    }
}

impl KvStore for JsonFileStore {
    #[instrument(skip(self, value), fields(bytes = value.len()))]
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        serde_json::from_slice::<serde_json::Value>(value).map_err(|e| StoreError::Storage {
            reason: format!("refusing to write non-JSON value: {e}"),
        })?;

        let path = self.path_for(key);
        write_atomic(&path, value)?;
        debug!(path = %path.display(), "wrote record");
        Ok(())
    }

    #[instrument(skip(self))]
    fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key);
        fs::read(&path).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound {
                    key: key.to_string(),
                }
            } else {
                storage_err(err)
            }
        })
    }

    #[instrument(skip(self))]
    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(err)),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let parent = path.parent().ok_or_else(|| StoreError::Storage {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(storage_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(storage_err)?;
    tmp.write_all(bytes).map_err(storage_err)?;
    tmp.flush().map_err(storage_err)?;
    tmp.persist(path).map_err(|e| storage_err(e.error))?;
    Ok(())
}

fn sanitize_key(key: &str) -> String {
    URL_SAFE_NO_PAD.encode(key)
}

fn storage_err<E: ToString>(err: E) -> StoreError {
    StoreError::Storage {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_json_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());

        store.put("todos", br#"[{"id":1}]"#).expect("put");
        let read = store.get("todos").expect("get");
        assert_eq!(read, br#"[{"id":1}]"#);
    }

    #[test]
    fn creates_missing_root_on_first_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path().join("nested").join("daybook"));

        store.put("settings", b"{}").expect("put");
        assert!(store.path_for("settings").exists());
    }

    #[test]
    fn keys_map_to_distinct_safe_file_names() {
        let store = JsonFileStore::new("/tmp/daybook");
        let plain = store.path_for("todos");
        let backup = store.path_for("todos.backup");
        let nasty = store.path_for("../escape");

        assert_ne!(plain, backup);
        assert_eq!(nasty.parent(), Some(Path::new("/tmp/daybook")));
    }

    #[test]
    fn rejects_non_json_and_keeps_previous_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());
        store.put("todos", b"[]").expect("put");

        let err = store.put("todos", b"not json").expect_err("should reject");
        assert!(matches!(err, StoreError::Storage { .. }));
        assert_eq!(store.get("todos").expect("get"), b"[]");
    }

    #[test]
    fn missing_keys_and_repeat_deletes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonFileStore::new(dir.path());

        let err = store.get("nope").expect_err("should be missing");
        assert_eq!(
            err,
            StoreError::NotFound {
                key: "nope".to_string()
            }
        );

        store.put("k", b"1").expect("put");
        store.delete("k").expect("delete");
        store.delete("k").expect("delete again");
        assert!(matches!(
            store.get("k").expect_err("deleted"),
            StoreError::NotFound { .. }
        ));
    }
}
