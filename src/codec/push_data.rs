//! Push-data field framing.
//!
//! A data script is one opcode byte followed by length-prefixed fields:
//! a length in 1..=75 is the byte count itself, 76/77/78 announce a
//! 1/2/4-byte little-endian length, and 0 is an empty field.

use crate::error::CodecError;

pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;

/// Largest length written directly into the length byte
const MAX_DIRECT_PUSH: usize = 75;

/// Append `data` as one field using the shortest length form.
pub fn push(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len <= MAX_DIRECT_PUSH {
        script.push(len as u8);
    } else if len <= u8::MAX as usize {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    } else if len <= u16::MAX as usize {
        script.push(OP_PUSHDATA2);
        script.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        script.push(OP_PUSHDATA4);
        script.extend_from_slice(&(len as u32).to_le_bytes());
    }
    script.extend_from_slice(data);
}

/// Opcode followed by every field, each framed with [`push`].
pub fn build_script<F: AsRef<[u8]>>(opcode: u8, fields: &[F]) -> Vec<u8> {
    let total: usize = fields.iter().map(|f| f.as_ref().len() + 5).sum();
    let mut script = Vec::with_capacity(total + 1);
    script.push(opcode);
    for field in fields {
        push(&mut script, field.as_ref());
    }
    script
}

/// Split a script into fields. Field 0 is the leading opcode byte.
pub fn parse_fields(script: &[u8]) -> Result<Vec<Vec<u8>>, CodecError> {
    let (&opcode, mut rest) = script
        .split_first()
        .ok_or_else(|| CodecError::Format("empty script".to_string()))?;
    let mut fields = vec![vec![opcode]];

    while let Some((&length_byte, after)) = rest.split_first() {
        rest = after;
        let len = match length_byte {
            0..=75 => length_byte as usize,
            OP_PUSHDATA1 => read_le(&mut rest, 1)?,
            OP_PUSHDATA2 => read_le(&mut rest, 2)?,
            OP_PUSHDATA4 => read_le(&mut rest, 4)?,
            other => {
                return Err(CodecError::Format(format!(
                    "unexpected opcode {:#04x} at field {}",
                    other,
                    fields.len()
                )))
            }
        };
        if rest.len() < len {
            return Err(CodecError::Format(format!(
                "field {} declares {} bytes but only {} remain",
                fields.len(),
                len,
                rest.len()
            )));
        }
        let (data, after) = rest.split_at(len);
        fields.push(data.to_vec());
        rest = after;
    }

    Ok(fields)
}

fn read_le(rest: &mut &[u8], width: usize) -> Result<usize, CodecError> {
    if rest.len() < width {
        return Err(CodecError::Format("truncated push-data length".to_string()));
    }
    let (bytes, after) = rest.split_at(width);
    *rest = after;
    Ok(bytes
        .iter()
        .rev()
        .fold(0usize, |acc, &b| (acc << 8) | b as usize))
}
