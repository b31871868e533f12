//! Hierarchical derivation paths (`m/0/3/1`)

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset added to an index for hardened derivation
pub const HARDENED_OFFSET: u32 = 0x8000_0000;

/// A derivation path string, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyPath(String);

impl KeyPath {
    /// Base path of every tree root
    pub fn root() -> Self {
        KeyPath("m/0".to_string())
    }

    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let path = KeyPath(s.trim().to_string());
        path.child_numbers()?;
        Ok(path)
    }

    /// Path of the child at `index` beneath this one
    pub fn child(&self, index: u32) -> KeyPath {
        KeyPath(format!("{}/{}", self.0, index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Child numbers along the path, hardened segments (`'` or `h`) offset.
    pub fn child_numbers(&self) -> Result<Vec<u32>, StorageError> {
        let mut segments = self.0.split('/');
        match segments.next() {
            Some("m") | Some("M") => {}
            _ => {
                return Err(StorageError::InvalidPath(format!(
                    "derivation path must start with m: {}",
                    self.0
                )))
            }
        }

        segments
            .map(|segment| {
                let (digits, hardened) = match segment
                    .strip_suffix('\'')
                    .or_else(|| segment.strip_suffix('h'))
                {
                    Some(digits) => (digits, true),
                    None => (segment, false),
                };
                let index: u32 = digits.parse().map_err(|_| {
                    StorageError::InvalidPath(format!(
                        "invalid segment {:?} in derivation path {}",
                        segment, self.0
                    ))
                })?;
                if index >= HARDENED_OFFSET {
                    return Err(StorageError::InvalidPath(format!(
                        "index {} out of range in {}",
                        index, self.0
                    )));
                }
                Ok(if hardened {
                    index + HARDENED_OFFSET
                } else {
                    index
                })
            })
            .collect()
    }
}

impl TryFrom<String> for KeyPath {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        KeyPath::parse(&value)
    }
}

impl From<KeyPath> for String {
    fn from(path: KeyPath) -> Self {
        path.0
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
