//! Tree nodes mirroring the local filesystem.
//!
//! A node's identity is its key path. Children are owned by their parent in
//! a name-keyed map; nothing points back up the tree, ancestry lives in the
//! key path string alone.

use crate::codec::Payload;
use crate::error::StorageError;
use crate::keys::KeyPath;
use crate::types::{ConfirmedId, Satoshis, TxRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Node variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    #[default]
    Directory,
    File,
    /// Content larger than the maximum single payload, split into parts
    ChunkedFile,
}

/// One part of a chunked file, emitted as its own transaction
#[derive(Debug, Clone)]
pub struct ChunkPart {
    pub payload: Payload,
    pub fee: Satoshis,
    pub slot: usize,
    pub tx_id: Option<ConfirmedId>,
}

/// Per-run state; never persisted.
#[derive(Debug, Clone, Default)]
pub struct Staging {
    /// Local path of the file or directory
    pub source: PathBuf,
    pub fee: Satoshis,
    /// Position in the funding fee list; `None` for the root
    pub slot: Option<usize>,
    pub payload: Option<Payload>,
    /// Chunk parts in emission order (chunked files only)
    pub parts: Vec<ChunkPart>,
}

/// A directory or file tracked in the cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub key_path: KeyPath,
    pub index: u32,
    #[serde(default)]
    pub name: String,
    #[serde(
        default,
        serialize_with = "serialize_tx_ref",
        deserialize_with = "deserialize_tx_ref"
    )]
    pub tx_id: Option<TxRef>,
    #[serde(default)]
    pub children: BTreeMap<String, Node>,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(skip)]
    pub staging: Option<Staging>,
}

impl Node {
    /// Root node at the base key path
    pub fn root(name: impl Into<String>) -> Self {
        Self::new(KeyPath::root(), 0, name.into())
    }

    fn new(key_path: KeyPath, index: u32, name: String) -> Self {
        Self {
            key_path,
            index,
            name,
            tx_id: None,
            children: BTreeMap::new(),
            removed: false,
            kind: NodeKind::Directory,
            staging: None,
        }
    }

    pub fn child_exists(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.get(name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.children.get_mut(name)
    }

    /// Create a child, allocating the next sibling index.
    ///
    /// An existing child with the same name is returned untouched so its
    /// index is never given up.
    pub fn create_child(&mut self, name: &str) -> &mut Node {
        let index = self.next_index();
        let key_path = self.key_path.child(index);
        self.children
            .entry(name.to_string())
            .or_insert_with(|| Node::new(key_path, index, name.to_string()))
    }

    /// Adopt a pre-built node, overwriting its index and key path.
    pub fn add_child(&mut self, mut node: Node) -> Result<&mut Node, StorageError> {
        if self.children.contains_key(&node.name) {
            return Err(StorageError::InvalidPath(format!(
                "{} already has a child named {:?}",
                self.key_path, node.name
            )));
        }
        let index = self.next_index();
        node.index = index;
        node.key_path = self.key_path.child(index);
        rebase_descendants(&mut node);
        let name = node.name.clone();
        Ok(self.children.entry(name).or_insert(node))
    }

    /// Soft delete; the node keeps its index so it is never reallocated.
    pub fn remove(&mut self) {
        self.removed = true;
    }

    pub fn restore(&mut self) {
        self.removed = false;
    }

    /// Names of children that take part in staging and sending, in key order
    pub fn unremoved_child_names(&self) -> Vec<String> {
        self.children
            .iter()
            .filter(|(_, child)| !child.removed)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// One past the highest index ever handed to a child, removed ones included.
    pub fn next_index(&self) -> u32 {
        self.children
            .values()
            .map(|child| child.index)
            .max()
            .map_or(0, |max| max + 1)
    }

    /// Drop every transient value below and including this node.
    pub fn clear_staging(&mut self) {
        self.staging = None;
        for child in self.children.values_mut() {
            child.clear_staging();
        }
    }

    /// Count of nodes in this subtree that are not removed, including self
    pub fn unremoved_count(&self) -> usize {
        if self.removed {
            return 0;
        }
        1 + self
            .children
            .values()
            .map(Node::unremoved_count)
            .sum::<usize>()
    }
}

fn rebase_descendants(node: &mut Node) {
    let base = node.key_path.clone();
    for child in node.children.values_mut() {
        child.key_path = base.child(child.index);
        rebase_descendants(child);
    }
}

fn serialize_tx_ref<S: Serializer>(tx_id: &Option<TxRef>, s: S) -> Result<S::Ok, S::Error> {
    tx_id.as_ref().and_then(TxRef::confirmed).serialize(s)
}

fn deserialize_tx_ref<'de, D: Deserializer<'de>>(d: D) -> Result<Option<TxRef>, D::Error> {
    Ok(Option::<ConfirmedId>::deserialize(d)?.map(TxRef::Confirmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlaceholderId;

    #[test]
    fn test_next_index_empty_is_zero() {
        let root = Node::root("repo");
        assert_eq!(root.next_index(), 0);
    }

    #[test]
    fn test_create_child_assigns_key_path() {
        let mut root = Node::root("repo");
        let a = root.create_child("a");
        assert_eq!(a.index, 0);
        assert_eq!(a.key_path.as_str(), "m/0/0");
        let b = root.create_child("b").create_child("c");
        assert_eq!(b.key_path.as_str(), "m/0/1/0");
    }

    #[test]
    fn test_create_child_is_idempotent_for_existing_name() {
        let mut root = Node::root("repo");
        root.create_child("a").remove();
        let again = root.create_child("a");
        assert_eq!(again.index, 0);
        assert!(again.removed);
        assert_eq!(root.children.len(), 1);
    }

    #[test]
    fn test_removed_siblings_keep_their_index() {
        let mut root = Node::root("repo");
        root.create_child("a");
        root.create_child("b");
        root.child_mut("b").unwrap().remove();
        assert_eq!(root.next_index(), 2);
        assert_eq!(root.create_child("c").index, 2);
        assert_eq!(root.unremoved_child_names(), vec!["a", "c"]);
    }

    #[test]
    fn test_next_index_uses_max_not_count() {
        let mut root = Node::root("repo");
        root.add_child(Node::root("x")).unwrap();
        root.children.get_mut("x").unwrap().index = 9;
        assert_eq!(root.next_index(), 10);
    }

    #[test]
    fn test_add_child_rebases_descendants() {
        let mut prebuilt = Node::root("sub");
        prebuilt.create_child("inner");
        let mut root = Node::root("repo");
        root.create_child("a");
        let sub = root.add_child(prebuilt).unwrap();
        assert_eq!(sub.key_path.as_str(), "m/0/1");
        assert_eq!(sub.child("inner").unwrap().key_path.as_str(), "m/0/1/0");
        assert!(root.add_child(Node::root("a")).is_err());
    }

    #[test]
    fn test_json_round_trip_drops_placeholders() {
        let confirmed =
            ConfirmedId::parse("e29bc8d6c7298e524756ac116bd3fb5355eec1da94666253c3f40810a4000804")
                .unwrap();
        let placeholder = PlaceholderId::parse(&"ab".repeat(32)).unwrap();

        let mut root = Node::root("repo");
        root.tx_id = Some(TxRef::Confirmed(confirmed.clone()));
        let child = root.create_child("a.txt");
        child.kind = NodeKind::File;
        child.tx_id = Some(TxRef::Placeholder(placeholder));
        root.create_child("gone").remove();

        let json = serde_json::to_string(&root).unwrap();
        assert!(json.contains("\"keyPath\":\"m/0\""));
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tx_id, Some(TxRef::Confirmed(confirmed)));
        let a = back.child("a.txt").unwrap();
        assert_eq!(a.tx_id, None);
        assert_eq!(a.kind, NodeKind::File);
        assert!(back.child("gone").unwrap().removed);
    }

    #[test]
    fn test_reads_minimal_root_json() {
        let back: Node =
            serde_json::from_str(r#"{"keyPath":"m/0","index":0,"children":{}}"#).unwrap();
        assert_eq!(back.key_path, KeyPath::root());
        assert_eq!(back.kind, NodeKind::Directory);
        assert!(back.name.is_empty());
    }

    #[test]
    fn test_unremoved_count() {
        let mut root = Node::root("repo");
        root.create_child("a").create_child("b");
        root.create_child("c").remove();
        assert_eq!(root.unremoved_count(), 3);
    }
}
