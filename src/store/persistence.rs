//! JSON file persistence for the cache

use crate::error::StorageError;
use crate::store::{CacheStore, MetanetCache};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cache kept as pretty-printed JSON at a fixed path
pub struct JsonCacheStore {
    path: PathBuf,
}

impl JsonCacheStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn serialization_error(&self, e: serde_json::Error) -> StorageError {
        StorageError::Serialization {
            path: self.path.clone(),
            message: e.to_string(),
        }
    }
}

impl CacheStore for JsonCacheStore {
    fn load(&self) -> Result<MetanetCache, StorageError> {
        let contents = fs::read_to_string(&self.path)?;
        serde_json::from_str(&contents).map_err(|e| self.serialization_error(e))
    }

    /// Write to a sibling temp file, then rename over the cache.
    fn save(&self, cache: &MetanetCache) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(cache).map_err(|e| self.serialization_error(e))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "Saved cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{ExtendedPrivateKey, Network};
    use crate::tree::{Node, NodeKind};
    use crate::types::{ConfirmedId, TxRef};
    use tempfile::TempDir;

    fn cache() -> MetanetCache {
        let master = ExtendedPrivateKey::from_seed(Network::Mainnet, &[4u8; 32]).unwrap();
        let mut root = Node::root("repo");
        root.tx_id = Some(TxRef::Confirmed(ConfirmedId::parse(&"12".repeat(32)).unwrap()));
        let file = root.create_child("a.txt");
        file.kind = NodeKind::File;
        root.create_child("old").remove();
        MetanetCache::new(master, root)
    }

    #[test]
    fn test_save_then_load_is_lossless() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonCacheStore::new(temp_dir.path().join(".metapush").join("cache.json"));
        let original = cache();
        store.save(&original).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(
            loaded.master_key.to_extended_string(),
            original.master_key.to_extended_string()
        );
        assert_eq!(loaded.root.tx_id, original.root.tx_id);
        assert_eq!(loaded.root.child("a.txt").unwrap().key_path.as_str(), "m/0/0");
        assert!(loaded.root.child("old").unwrap().removed);
        assert_eq!(loaded.root.next_index(), 2);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_reads_minimal_cache_layout() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        let master = cache().master_key.to_extended_string();
        fs::write(
            &path,
            format!(
                r#"{{"masterKey":"{}","root":{{"keyPath":"m/0","index":0,"children":{{}}}}}}"#,
                master
            ),
        )
        .unwrap();

        let loaded = JsonCacheStore::new(&path).load().unwrap();
        assert!(loaded.root.children.is_empty());
        assert_eq!(loaded.root.key_path.as_str(), "m/0");
    }

    #[test]
    fn test_corrupt_cache_is_serialization_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        fs::write(&path, r#"{"masterKey":"xprvnot","root":{}}"#).unwrap();
        assert!(matches!(
            JsonCacheStore::new(&path).load(),
            Err(StorageError::Serialization { .. })
        ));
    }
}
