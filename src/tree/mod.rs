//! Node tree
//!
//! The in-memory mirror of the workspace: one node per directory or file,
//! each addressed by a key path derived from its position.

pub mod node;
pub mod walker;

pub use node::{ChunkPart, Node, NodeKind, Staging};
pub use walker::{Entry, Listing, Walker, WalkerConfig};
