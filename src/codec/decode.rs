//! Inbound payloads: data script → node description.

use super::push_data::parse_fields;
use super::{
    BCAT_PART_PROTOCOL, BCAT_PROTOCOL, B_PROTOCOL, CHUNK_ID_OFFSET, DIP_PROTOCOL, GZIP_ENCODING,
    META_TAG, NULL_PARENT, OP_RETURN, SEPARATOR,
};
use crate::error::CodecError;
use crate::types::ConfirmedId;
use flate2::read::GzDecoder;
use std::io::Read;

/// Protocol named in field 4
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolType {
    File,
    ChunkedFile,
    /// Anything else; for directories this is the directory name.
    Other(String),
}

impl ProtocolType {
    pub fn from_field(value: &str) -> Self {
        match value {
            B_PROTOCOL => ProtocolType::File,
            BCAT_PROTOCOL => ProtocolType::ChunkedFile,
            other => ProtocolType::Other(other.to_string()),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, ProtocolType::File | ProtocolType::ChunkedFile)
    }
}

/// Hash trailer found after the protocol body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Integrity {
    pub algorithm: String,
    pub digest: String,
}

/// Content carried by a decoded node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    None,
    /// Inline bytes, already decompressed
    Inline(Vec<u8>),
    /// Chunk transaction ids in concatenation order
    Chunks(Vec<ConfirmedId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedNode {
    pub address: String,
    /// `None` when the node is a root (`NULL`)
    pub parent: Option<String>,
    pub protocol: ProtocolType,
    pub name: String,
    pub media_type: Option<String>,
    pub content: Content,
    pub integrity: Option<Integrity>,
}

/// Decode a metanet data script.
pub fn decode_node(script: &[u8]) -> Result<DecodedNode, CodecError> {
    let fields = parse_fields(script)?;

    if fields[0] != [OP_RETURN] {
        return Err(CodecError::Format(format!(
            "script starts with {:#04x}, not a data output",
            fields[0][0]
        )));
    }
    if text(&fields, 1)? != META_TAG {
        return Err(CodecError::Format("output is not tagged meta".to_string()));
    }

    let address = text(&fields, 2)?;
    let parent = match text(&fields, 3)? {
        NULL_PARENT => None,
        id => Some(id.to_string()),
    };
    let protocol = ProtocolType::from_field(text(&fields, 4)?);

    let mut node = DecodedNode {
        address: address.to_string(),
        parent,
        protocol: protocol.clone(),
        name: String::new(),
        media_type: None,
        content: Content::None,
        integrity: None,
    };

    match protocol {
        ProtocolType::File => {
            let data = field(&fields, 5)?;
            let media_type = text(&fields, 6)?.trim();
            let encoding = text(&fields, 7)?.trim();
            node.name = text(&fields, 8)?.to_string();
            node.media_type = (!media_type.is_empty()).then(|| media_type.to_string());
            node.content = Content::Inline(if encoding == GZIP_ENCODING {
                gunzip(data)?
            } else {
                data.to_vec()
            });
            node.integrity = integrity(&fields, 9);
        }
        ProtocolType::ChunkedFile => {
            node.name = text(&fields, 8)?.to_string();
            let ids: Vec<ConfirmedId> = fields
                .iter()
                .skip(CHUNK_ID_OFFSET)
                .map_while(|f| {
                    std::str::from_utf8(f)
                        .ok()
                        .and_then(|id| ConfirmedId::parse(id).ok())
                })
                .collect();
            node.integrity = integrity(&fields, CHUNK_ID_OFFSET + ids.len());
            node.content = Content::Chunks(ids);
        }
        ProtocolType::Other(ref value) => {
            node.name = value.clone();
        }
    }

    Ok(node)
}

/// Raw bytes of a chunk part script.
pub fn decode_chunk_part(script: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut fields = parse_fields(script)?;
    if fields[0] != [OP_RETURN] {
        return Err(CodecError::Format("chunk is not a data output".to_string()));
    }
    if text(&fields, 1)? != BCAT_PART_PROTOCOL {
        return Err(CodecError::Format(
            "chunk is not tagged with the part protocol".to_string(),
        ));
    }
    field(&fields, 2)?;
    Ok(fields.swap_remove(2))
}

fn field(fields: &[Vec<u8>], index: usize) -> Result<&[u8], CodecError> {
    fields
        .get(index)
        .map(Vec::as_slice)
        .ok_or_else(|| CodecError::Format(format!("missing field {}", index)))
}

fn text(fields: &[Vec<u8>], index: usize) -> Result<&str, CodecError> {
    std::str::from_utf8(field(fields, index)?)
        .map_err(|_| CodecError::Format(format!("field {} is not UTF-8 text", index)))
}

/// Read `| DIP algorithm digest` starting at `start`; absent or malformed means none.
fn integrity(fields: &[Vec<u8>], start: usize) -> Option<Integrity> {
    let get = |i: usize| fields.get(start + i).and_then(|f| std::str::from_utf8(f).ok());
    if get(0)? != SEPARATOR || get(1)? != DIP_PROTOCOL {
        return None;
    }
    Some(Integrity {
        algorithm: get(2)?.to_string(),
        digest: get(3)?.to_ascii_lowercase(),
    })
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| CodecError::Format(format!("gzip data is corrupt: {}", e)))?;
    Ok(out)
}
