//! Metapush: mirror a directory tree onto the ledger
//!
//! Every file and directory becomes a metanet node: a transaction whose data
//! output names its own address and its parent's transaction. A push funds
//! the whole tree from one funding transaction and broadcasts it; a clone
//! walks the graph back from a root transaction id.

pub mod chain;
pub mod cli;
pub mod clone;
pub mod codec;
pub mod config;
pub mod error;
pub mod fee;
pub mod funding;
pub mod hash;
pub mod ignore;
pub mod keys;
pub mod logging;
pub mod poll;
pub mod push;
pub mod store;
pub mod tree;
pub mod tx;
pub mod types;
