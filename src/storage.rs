use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{ContextError, ErrorKind};

/// A flat key-value store of byte blobs.
///
/// Reading or deleting a missing key is not an error: `get` returns `None` and `delete` does
/// nothing.
pub trait BlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ContextError>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ContextError>;
    fn delete(&self, key: &str) -> Result<(), ContextError>;
    /// All the keys of the store, in ascending order.
    fn list(&self) -> Result<Vec<String>, ContextError>;
}

/// Keys are restricted to ASCII letters, digits, `-` and `_`, so that they can be used as
/// file names and in URLs without escaping.
pub fn validate_key(key: &str) -> Result<(), ContextError> {
    let is_valid = !key.is_empty()
        && key
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_');
    if is_valid {
        Ok(())
    } else {
        Err(ContextError::with_context(
            ErrorKind::Storage,
            format!("The key {:?} is not a valid blob key", key),
        ))
    }
}

/// A store kept in memory, shareable across threads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn blobs(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>, ContextError> {
        self.blobs.lock().map_err(|_| {
            ContextError::with_context(
                ErrorKind::Storage,
                "The memory store was poisoned by a panicking thread",
            )
        })
    }
}

impl BlobStore for MemoryStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ContextError> {
        validate_key(key)?;
        self.blobs()?.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ContextError> {
        Ok(self.blobs()?.get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), ContextError> {
        self.blobs()?.remove(key);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, ContextError> {
        Ok(self.blobs()?.keys().cloned().collect())
    }
}

/// A store keeping one file per key inside a directory, which is created when needed.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    directory: PathBuf,
}

impl DirectoryStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        DirectoryStore {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn blob_path(&self, key: &str) -> Result<PathBuf, ContextError> {
        validate_key(key)?;
        Ok(self.directory.join(key))
    }
}

impl BlobStore for DirectoryStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), ContextError> {
        let blob_path = self.blob_path(key)?;
        std::fs::create_dir_all(&self.directory).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Storage,
                format!("Unable to create the store directory {:?}", self.directory),
                &error,
            )
        })?;
        std::fs::write(&blob_path, bytes).map_err(|error| {
            ContextError::with_error(
                ErrorKind::Storage,
                format!("Unable to write the blob {:?}", blob_path),
                &error,
            )
        })
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ContextError> {
        // Keys which cannot be stored cannot be found either
        let Ok(blob_path) = self.blob_path(key) else {
            return Ok(None);
        };
        match std::fs::read(&blob_path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(ContextError::with_error(
                ErrorKind::Storage,
                format!("Unable to read the blob {:?}", blob_path),
                &error,
            )),
        }
    }

    fn delete(&self, key: &str) -> Result<(), ContextError> {
        let Ok(blob_path) = self.blob_path(key) else {
            return Ok(());
        };
        match std::fs::remove_file(&blob_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(ContextError::with_error(
                ErrorKind::Storage,
                format!("Unable to delete the blob {:?}", blob_path),
                &error,
            )),
        }
    }

    fn list(&self) -> Result<Vec<String>, ContextError> {
        let entries = match std::fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            // Nothing was stored yet
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => {
                return Err(ContextError::with_error(
                    ErrorKind::Storage,
                    format!("Unable to list the store directory {:?}", self.directory),
                    &error,
                ))
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Storage,
                    format!("Unable to list the store directory {:?}", self.directory),
                    &error,
                )
            })?;
            if !entry.path().is_file() {
                continue;
            }
            // Files which were not written by the store are ignored
            if let Some(key) = entry.file_name().to_str() {
                if validate_key(key).is_ok() {
                    keys.push(key.to_string());
                }
            }
        }
        keys.sort();

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn BlobStore) {
        assert_eq!(store.list().unwrap(), Vec::<String>::new());
        assert_eq!(store.get("missing").unwrap(), None);

        store.put("b-2", b"second").unwrap();
        store.put("a_1", b"first").unwrap();
        store.put("b-2", b"replaced").unwrap();
        assert_eq!(store.get("b-2").unwrap(), Some(b"replaced".to_vec()));
        assert_eq!(store.list().unwrap(), vec!["a_1", "b-2"]);

        store.delete("a_1").unwrap();
        store.delete("a_1").unwrap();
        assert_eq!(store.list().unwrap(), vec!["b-2"]);

        let error = store.put("../escape", b"nope").unwrap_err();
        assert_eq!(error.kind, ErrorKind::Storage);
    }

    #[test]
    fn memory_store() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn directory_store() {
        let directory = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(directory.path().join("blobs"));
        exercise(&store);

        // Stray files are not keys
        std::fs::write(store.directory().join("notes.txt"), b"stray").unwrap();
        assert_eq!(store.list().unwrap(), vec!["b-2"]);
    }
}
