//! Metanet payload codec.
//!
//! Every node is one data output: `OP_RETURN "meta" <address> <parent>`
//! followed by a protocol body. Files use the B protocol, large files the
//! Bcat header plus one part transaction per chunk, and both end with a
//! DIP integrity trailer over the uncompressed content.

pub mod decode;
pub mod payload;
pub mod push_data;

pub use decode::{decode_chunk_part, decode_node, Content, DecodedNode, Integrity, ProtocolType};
pub use payload::{
    check_script_size, chunk_count, Body, ChunkedBody, FileBody, NodeHeader, Payload, SealedScript,
};

/// Leading opcode of every data output
pub const OP_RETURN: u8 = 0x6a;
pub const META_TAG: &str = "meta";
/// Parent reference of a tree root
pub const NULL_PARENT: &str = "NULL";

pub const B_PROTOCOL: &str = "19HxigV4QyBv3tHpQVcUEQyq1pzZVdoAut";
pub const BCAT_PROTOCOL: &str = "15DHFxWZJT58f9nhyGnsRBqrgwK4W6h4Up";
pub const BCAT_PART_PROTOCOL: &str = "1ChDHzdd1H4wSjgGMHyndZm6qxEDGjqpJL";
pub const DIP_PROTOCOL: &str = "1D1PdbxVxcjfovTATC3ginxjj4enTgxLyY";

pub const SEPARATOR: &str = "|";
pub const HASH_ALGORITHM: &str = "SHA512";
/// Explicit field encoding, then the index of the hashed B field
pub const ENCODING_MARKERS: [u8; 2] = [0x01, 0x05];

/// Empty text fields are written as one space.
pub const BLANK: &str = " ";
pub const GZIP_MEDIA_TYPE: &str = "application/x-gzip";
pub const GZIP_ENCODING: &str = "gzip";

/// Field index of the first chunk id in a Bcat header
pub const CHUNK_ID_OFFSET: usize = 10;

/// Stand-in chunk id used while sizing a Bcat header
pub const ESTIMATE_CHUNK_ID: &str =
    "e29bc8d6c7298e524756ac116bd3fb5355eec1da94666253c3f40810a4000804";
