//! Cache store
//!
//! The cache is the only persisted state: the master derivation key and the
//! node tree. It is read at the start of a push and written once at the end
//! of a successful one.

pub mod files;
pub mod persistence;

pub use files::{FundingKeyFile, PackageInfo, WorkspacePaths};
pub use persistence::JsonCacheStore;

use crate::error::StorageError;
use crate::keys::ExtendedPrivateKey;
use crate::tree::Node;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Master key plus the root of the tree
#[derive(Debug, Clone)]
pub struct MetanetCache {
    pub master_key: ExtendedPrivateKey,
    pub root: Node,
}

impl MetanetCache {
    pub fn new(master_key: ExtendedPrivateKey, root: Node) -> Self {
        Self { master_key, root }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheFile {
    master_key: String,
    root: Node,
}

impl Serialize for MetanetCache {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        CacheFile {
            master_key: self.master_key.to_extended_string(),
            root: self.root.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MetanetCache {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let file = CacheFile::deserialize(deserializer)?;
        let master_key = file
            .master_key
            .parse()
            .map_err(|e: StorageError| serde::de::Error::custom(e.to_string()))?;
        Ok(Self {
            master_key,
            root: file.root,
        })
    }
}

/// Cache store interface
pub trait CacheStore {
    fn load(&self) -> Result<MetanetCache, StorageError>;
    fn save(&self, cache: &MetanetCache) -> Result<(), StorageError>;
}
