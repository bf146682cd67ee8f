//! JSON-backed embedding store.
//!
//! One file, one JSON object keyed by student identifier:
//!
//! ```json
//! { "S1023": { "embedding": [0.1, ...], "registered_image": "s1023.jpg" } }
//! ```
//!
//! The whole mapping lives in memory and the file is rewritten after every
//! mutation. The store has no internal locking; it expects a single writer
//! (the engine thread serializes all access).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to write embedding store {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to serialize embedding store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// One registered face: the embedding vector and the name of the image it
/// was extracted from. Registration keeps no history; re-registering an
/// identifier replaces this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFace {
    pub embedding: Vec<f32>,
    pub registered_image: String,
}

/// Durable identifier → embedding mapping.
#[derive(Debug)]
pub struct EmbeddingStore {
    path: PathBuf,
    entries: BTreeMap<String, StoredFace>,
}

impl EmbeddingStore {
    /// Load the store from `path`. A missing or unparseable file yields an
    /// empty store rather than a hard failure; the first successful
    /// registration will rewrite it.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "corrupt embedding store, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        tracing::info!(path = %path.display(), registered = entries.len(), "embedding store loaded");
        Self { path, entries }
    }

    /// Rewrite the backing file with the full in-memory mapping.
    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, json).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn get(&self, id: &str) -> Option<&StoredFace> {
        self.entries.get(id)
    }

    /// Insert or overwrite the embedding for `id` and persist the store.
    pub fn put(
        &mut self,
        id: &str,
        embedding: Vec<f32>,
        registered_image: &str,
    ) -> Result<(), StoreError> {
        self.entries.insert(
            id.to_string(),
            StoredFace {
                embedding,
                registered_image: registered_image.to_string(),
            },
        );
        self.save()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all (identifier, record) pairs, for 1:N identification.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &StoredFace)> {
        self.entries.iter()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::load(dir.path().join("students.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = EmbeddingStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");

        let mut store = EmbeddingStore::load(&path);
        store.put("S1023", vec![0.1, 0.2, 0.3], "s1023.jpg").unwrap();

        let reloaded = EmbeddingStore::load(&path);
        let face = reloaded.get("S1023").unwrap();
        assert_eq!(face.embedding, vec![0.1, 0.2, 0.3]);
        assert_eq!(face.registered_image, "s1023.jpg");
    }

    #[test]
    fn test_put_overwrites_previous_registration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");

        let mut store = EmbeddingStore::load(&path);
        store.put("S1023", vec![1.0, 0.0], "old.jpg").unwrap();
        store.put("S1023", vec![0.0, 1.0], "new.jpg").unwrap();

        assert_eq!(store.len(), 1);
        let face = store.get("S1023").unwrap();
        assert_eq!(face.embedding, vec![0.0, 1.0]);
        assert_eq!(face.registered_image, "new.jpg");

        // Reload sees only the newest embedding.
        let reloaded = EmbeddingStore::load(&path);
        assert_eq!(reloaded.get("S1023").unwrap().embedding, vec![0.0, 1.0]);
    }

    #[test]
    fn test_file_format_is_object_keyed_by_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("students.json");

        let mut store = EmbeddingStore::load(&path);
        store.put("S1", vec![0.5], "a.png").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["S1"]["embedding"], serde_json::json!([0.5]));
        assert_eq!(raw["S1"]["registered_image"], "a.png");
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/students.json");
        let mut store = EmbeddingStore::load(&path);
        store.put("S1", vec![1.0], "a.jpg").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_get_unknown_identifier() {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddingStore::load(dir.path().join("students.json"));
        assert!(store.get("ghost").is_none());
    }
}
