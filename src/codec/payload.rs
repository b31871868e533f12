//! Outbound payloads.
//!
//! A [`Payload`] is built during staging with whatever parent reference is
//! known at the time, usually a placeholder. It can always be rendered for
//! size estimation, but [`Payload::seal`] only succeeds once every
//! reference in it is a confirmed transaction id.

use super::push_data::build_script;
use super::{
    BCAT_PART_PROTOCOL, BCAT_PROTOCOL, BLANK, B_PROTOCOL, DIP_PROTOCOL, ENCODING_MARKERS,
    ESTIMATE_CHUNK_ID, GZIP_ENCODING, GZIP_MEDIA_TYPE, HASH_ALGORITHM, META_TAG, NULL_PARENT,
    OP_RETURN, SEPARATOR,
};
use crate::error::CodecError;
use crate::hash::sha512_hex;
use crate::keys::Address;
use crate::types::{ConfirmedId, TxRef};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// Metanet header: the node's own address and its parent reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeHeader {
    pub address: Address,
    /// `None` for a tree root
    pub parent: Option<TxRef>,
}

/// Single-output file content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBody {
    pub name: String,
    /// Bytes as written on chain, compressed when `gzipped`
    pub data: Vec<u8>,
    pub gzipped: bool,
    /// SHA512 of the uncompressed content
    pub digest: String,
}

impl FileBody {
    /// Compress only above `gzip_threshold` and only when it actually shrinks.
    pub fn new(name: &str, content: &[u8], gzip_threshold: usize) -> Result<Self, CodecError> {
        let digest = sha512_hex(content);
        if content.len() > gzip_threshold {
            let compressed = gzip(content)?;
            if compressed.len() < content.len() {
                return Ok(Self {
                    name: name.to_string(),
                    data: compressed,
                    gzipped: true,
                    digest,
                });
            }
        }
        Ok(Self {
            name: name.to_string(),
            data: content.to_vec(),
            gzipped: false,
            digest,
        })
    }
}

/// Header of a file split over chunk transactions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedBody {
    pub name: String,
    pub digest: String,
    /// One slot per chunk, filled once that chunk has been broadcast
    pub chunk_ids: Vec<Option<ConfirmedId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Directory { name: String },
    File(FileBody),
    ChunkedFile(ChunkedBody),
}

impl Body {
    pub fn name(&self) -> &str {
        match self {
            Body::Directory { name } => name,
            Body::File(file) => &file.name,
            Body::ChunkedFile(chunked) => &chunked.name,
        }
    }
}

/// Everything that ends up in a transaction's data output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Node { header: NodeHeader, body: Body },
    ChunkPart { data: Vec<u8> },
}

/// A rendered script with no placeholder left in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedScript(Vec<u8>);

impl SealedScript {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Render {
    Estimate,
    Seal,
}

impl Payload {
    pub fn directory(header: NodeHeader, name: &str) -> Self {
        Payload::Node {
            header,
            body: Body::Directory {
                name: name.to_string(),
            },
        }
    }

    pub fn file(header: NodeHeader, body: FileBody) -> Self {
        Payload::Node {
            header,
            body: Body::File(body),
        }
    }

    /// Chunked header for `content`, with one empty id slot per chunk.
    pub fn chunked(header: NodeHeader, name: &str, content: &[u8], chunk_size: usize) -> Self {
        Payload::Node {
            header,
            body: Body::ChunkedFile(ChunkedBody {
                name: name.to_string(),
                digest: sha512_hex(content),
                chunk_ids: vec![None; chunk_count(content.len(), chunk_size)],
            }),
        }
    }

    /// Payloads of the parts of `content`, in emission order.
    pub fn chunk_parts(content: &[u8], chunk_size: usize) -> Vec<Payload> {
        content
            .chunks(chunk_size.max(1))
            .map(|chunk| Payload::ChunkPart {
                data: chunk.to_vec(),
            })
            .collect()
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Payload::Node { body, .. } => Some(body.name()),
            Payload::ChunkPart { .. } => None,
        }
    }

    pub fn header(&self) -> Option<&NodeHeader> {
        match self {
            Payload::Node { header, .. } => Some(header),
            Payload::ChunkPart { .. } => None,
        }
    }

    /// Replace the parent reference.
    pub fn set_parent(&mut self, parent: TxRef) {
        if let Payload::Node { header, .. } = self {
            header.parent = Some(parent);
        }
    }

    /// Fill the chunk id slots of a chunked header, in emission order.
    pub fn set_chunk_ids(&mut self, ids: Vec<ConfirmedId>) -> Result<(), CodecError> {
        match self {
            Payload::Node {
                body: Body::ChunkedFile(chunked),
                ..
            } => {
                if ids.len() != chunked.chunk_ids.len() {
                    return Err(CodecError::Format(format!(
                        "{} expects {} chunk ids, got {}",
                        chunked.name,
                        chunked.chunk_ids.len(),
                        ids.len()
                    )));
                }
                chunked.chunk_ids = ids.into_iter().map(Some).collect();
                Ok(())
            }
            _ => Err(CodecError::Format(
                "only chunked file headers carry chunk ids".to_string(),
            )),
        }
    }

    /// Script used for fee estimation. Unfilled references render as
    /// same-length stand-ins so the size matches the final script.
    pub fn estimate_script(&self) -> Vec<u8> {
        // Estimate rendering never fails
        self.render(Render::Estimate).unwrap_or_default()
    }

    /// Final script for signing.
    pub fn seal(&self, max_script_size: usize) -> Result<SealedScript, CodecError> {
        let script = self.render(Render::Seal)?;
        check_script_size(&script, max_script_size)?;
        Ok(SealedScript(script))
    }

    fn render(&self, mode: Render) -> Result<Vec<u8>, CodecError> {
        let fields = match self {
            Payload::ChunkPart { data } => vec![BCAT_PART_PROTOCOL.as_bytes().to_vec(), data.clone()],
            Payload::Node { header, body } => {
                let mut fields = header_fields(header, mode)?;
                match body {
                    Body::Directory { name } => fields.push(name.as_bytes().to_vec()),
                    Body::File(file) => {
                        fields.push(B_PROTOCOL.as_bytes().to_vec());
                        fields.push(file.data.clone());
                        let (media, encoding) = if file.gzipped {
                            (GZIP_MEDIA_TYPE, GZIP_ENCODING)
                        } else {
                            (BLANK, BLANK)
                        };
                        fields.push(media.as_bytes().to_vec());
                        fields.push(encoding.as_bytes().to_vec());
                        fields.push(file.name.as_bytes().to_vec());
                        fields.extend(integrity_trailer(&file.digest));
                    }
                    Body::ChunkedFile(chunked) => {
                        fields.push(BCAT_PROTOCOL.as_bytes().to_vec());
                        fields.extend([BLANK, BLANK, BLANK].map(|b| b.as_bytes().to_vec()));
                        fields.push(chunked.name.as_bytes().to_vec());
                        fields.push(BLANK.as_bytes().to_vec());
                        for (i, id) in chunked.chunk_ids.iter().enumerate() {
                            let text = match (id, mode) {
                                (Some(id), _) => id.as_str(),
                                (None, Render::Estimate) => ESTIMATE_CHUNK_ID,
                                (None, Render::Seal) => {
                                    return Err(CodecError::Unsealed(format!(
                                        "chunk {} of {}",
                                        i + 1,
                                        chunked.name
                                    )))
                                }
                            };
                            fields.push(text.as_bytes().to_vec());
                        }
                        fields.extend(integrity_trailer(&chunked.digest));
                    }
                }
                fields
            }
        };
        Ok(build_script(OP_RETURN, &fields))
    }
}

fn header_fields(header: &NodeHeader, mode: Render) -> Result<Vec<Vec<u8>>, CodecError> {
    let parent = match (&header.parent, mode) {
        (None, _) => NULL_PARENT.to_string(),
        (Some(TxRef::Confirmed(id)), _) => id.to_string(),
        (Some(TxRef::Placeholder(id)), Render::Estimate) => id.to_string(),
        (Some(TxRef::Placeholder(id)), Render::Seal) => {
            return Err(CodecError::Unsealed(id.to_string()))
        }
    };
    Ok(vec![
        META_TAG.as_bytes().to_vec(),
        header.address.to_string().into_bytes(),
        parent.into_bytes(),
    ])
}

fn integrity_trailer(digest: &str) -> Vec<Vec<u8>> {
    vec![
        SEPARATOR.as_bytes().to_vec(),
        DIP_PROTOCOL.as_bytes().to_vec(),
        HASH_ALGORITHM.as_bytes().to_vec(),
        digest.as_bytes().to_vec(),
        vec![ENCODING_MARKERS[0]],
        vec![ENCODING_MARKERS[1]],
    ]
}

/// Reject scripts above the size cap.
pub fn check_script_size(script: &[u8], limit: usize) -> Result<(), CodecError> {
    if script.len() > limit {
        return Err(CodecError::PayloadTooLarge {
            size: script.len(),
            limit,
        });
    }
    Ok(())
}

/// Number of parts `len` bytes split into
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    let chunk_size = chunk_size.max(1);
    len.div_ceil(chunk_size)
}

fn gzip(content: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(content)
        .and_then(|_| encoder.finish())
        .map_err(|e| CodecError::Format(format!("gzip failed: {}", e)))
}
