//! Favorite manuals: a flat JSON array of numeric IDs stored under one key.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;

pub const FAVORITES_KEY: &str = "favorites";

pub type ManualId = u32;

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

pub struct FileKeyValueStore {
    root: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create storage directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn value_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.value_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read stored value {:?}", path))?;
        Ok(Some(raw))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.value_path(key);
        let tmp = path.with_extension("json.tmp");
        let mut file =
            File::create(&tmp).with_context(|| format!("failed to open temp file {:?}", tmp))?;
        file.write_all(value.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryKeyValueStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

pub struct Favorites {
    store: Arc<dyn KeyValueStore>,
    ids: Vec<ManualId>,
}

impl Favorites {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let ids = match store.get(FAVORITES_KEY)? {
            Some(raw) => serde_json::from_str(&raw).context("failed to decode favorites")?,
            None => Vec::new(),
        };
        Ok(Self { store, ids })
    }

    pub fn ids(&self) -> &[ManualId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: ManualId) -> bool {
        self.ids.contains(&id)
    }

    pub fn add(&mut self, id: ManualId) -> Result<()> {
        if !self.contains(id) {
            self.ids.push(id);
            self.persist()?;
        }
        Ok(())
    }

    pub fn remove(&mut self, id: ManualId) -> Result<()> {
        let before = self.ids.len();
        self.ids.retain(|existing| *existing != id);
        if self.ids.len() != before {
            self.persist()?;
        }
        Ok(())
    }

    pub fn toggle(&mut self, id: ManualId) -> Result<bool> {
        if self.contains(id) {
            self.remove(id)?;
            Ok(false)
        } else {
            self.add(id)?;
            Ok(true)
        }
    }

    fn persist(&self) -> Result<()> {
        let payload = serde_json::to_string(&self.ids)?;
        self.store.set(FAVORITES_KEY, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn toggle_adds_then_removes() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut favorites = Favorites::load(store.clone()).unwrap();
        assert!(favorites.is_empty());

        assert!(favorites.toggle(7).unwrap());
        assert!(favorites.contains(7));
        assert!(!favorites.toggle(7).unwrap());
        assert!(!favorites.contains(7));
        assert_eq!(store.get(FAVORITES_KEY).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn duplicates_are_ignored() {
        let mut favorites = Favorites::load(Arc::new(MemoryKeyValueStore::new())).unwrap();
        favorites.add(3).unwrap();
        favorites.add(3).unwrap();
        favorites.add(1).unwrap();
        assert_eq!(favorites.ids(), &[3, 1]);
    }

    #[test]
    fn file_store_persists_json_array_under_one_key() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn KeyValueStore> =
            Arc::new(FileKeyValueStore::new(dir.path().join("storage")).unwrap());

        let mut favorites = Favorites::load(Arc::clone(&store)).unwrap();
        favorites.add(12).unwrap();
        favorites.add(4).unwrap();

        let raw = std::fs::read_to_string(dir.path().join("storage/favorites.json")).unwrap();
        assert_eq!(raw, "[12,4]");

        let restored = Favorites::load(store).unwrap();
        assert_eq!(restored.ids(), &[12, 4]);
    }
}
