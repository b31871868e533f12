//! Core type definitions

use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Amount in satoshis
pub type Satoshis = u64;

/// Length of a transaction id in hex characters
pub const TX_ID_HEX_LEN: usize = 64;

fn parse_tx_id(s: &str) -> Result<String, CodecError> {
    if s.len() != TX_ID_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CodecError::Format(format!("not a transaction id: {:?}", s)));
    }
    Ok(s.to_ascii_lowercase())
}

/// Id of a scratch transaction built during fee estimation.
///
/// It stands in for a parent's id in a child's payload until the parent
/// has been broadcast. A payload holding one can never be signed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceholderId(String);

impl PlaceholderId {
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        parse_tx_id(s).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlaceholderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Id of a transaction that was actually signed and broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConfirmedId(String);

impl ConfirmedId {
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        parse_tx_id(s).map(Self)
    }

    /// Build from the double-SHA256 digest of a serialized transaction
    /// (internal byte order, displayed reversed).
    pub fn from_digest(digest: [u8; 32]) -> Self {
        let mut reversed = digest;
        reversed.reverse();
        Self(hex::encode(reversed))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytes in the order they appear inside a serialized outpoint.
    pub fn to_internal_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        // parse() guarantees 64 hex characters
        if let Ok(bytes) = hex::decode(&self.0) {
            out.copy_from_slice(&bytes);
        }
        out.reverse();
        out
    }
}

impl TryFrom<String> for ConfirmedId {
    type Error = CodecError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ConfirmedId::parse(&value)
    }
}

impl From<ConfirmedId> for String {
    fn from(id: ConfirmedId) -> Self {
        id.0
    }
}

impl fmt::Display for ConfirmedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node's transaction reference: estimated or real.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxRef {
    Placeholder(PlaceholderId),
    Confirmed(ConfirmedId),
}

impl TxRef {
    pub fn as_str(&self) -> &str {
        match self {
            TxRef::Placeholder(id) => id.as_str(),
            TxRef::Confirmed(id) => id.as_str(),
        }
    }

    pub fn confirmed(&self) -> Option<&ConfirmedId> {
        match self {
            TxRef::Placeholder(_) => None,
            TxRef::Confirmed(id) => Some(id),
        }
    }
}

impl From<ConfirmedId> for TxRef {
    fn from(id: ConfirmedId) -> Self {
        TxRef::Confirmed(id)
    }
}

impl From<PlaceholderId> for TxRef {
    fn from(id: PlaceholderId) -> Self {
        TxRef::Placeholder(id)
    }
}
