//! Transaction model and wire format.

pub mod sign;

pub use sign::{sighash, sign_input, verify_input, SIGHASH_ALL_FORKID};

use crate::error::CodecError;
use crate::hash::sha256d;
use crate::types::{ConfirmedId, Satoshis};

pub const TX_VERSION: u32 = 1;
pub const FINAL_SEQUENCE: u32 = 0xffff_ffff;

/// Unlocking script length assumed for an unsigned P2PKH input:
/// push(72-byte signature) + push(33-byte compressed key).
pub const ESTIMATED_SCRIPT_SIG_LEN: usize = 107;

/// Reference to one output of a previous transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub tx_id: ConfirmedId,
    pub vout: u32,
}

/// Spendable output together with what is needed to sign for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub out_point: OutPoint,
    pub value: Satoshis,
    pub locking_script: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: Satoshis,
    pub script: Vec<u8>,
}

impl TxOut {
    /// Zero-value data output
    pub fn data(script: Vec<u8>) -> Self {
        Self { value: 0, script }
    }

    pub fn is_data(&self) -> bool {
        self.script.first() == Some(&crate::codec::OP_RETURN)
            || self.script.starts_with(&[0x00, crate::codec::OP_RETURN])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self {
            version: TX_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }
}

impl Transaction {
    /// Add an unsigned input spending `utxo`.
    pub fn add_input(&mut self, utxo: &Utxo) {
        self.inputs.push(TxIn {
            previous: utxo.out_point.clone(),
            script_sig: Vec::new(),
            sequence: FINAL_SEQUENCE,
        });
    }

    pub fn add_output(&mut self, output: TxOut) {
        self.outputs.push(output);
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.estimated_size());
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            write_out_point(&mut out, &input.previous);
            write_varint(&mut out, input.script_sig.len() as u64);
            out.extend_from_slice(&input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            write_output(&mut out, output);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.serialize())
    }

    pub fn tx_id(&self) -> ConfirmedId {
        ConfirmedId::from_digest(sha256d(&self.serialize()))
    }

    /// Size once signed: unsigned inputs count with a full unlocking script.
    pub fn estimated_size(&self) -> usize {
        let inputs: usize = self
            .inputs
            .iter()
            .map(|input| {
                let script_len = if input.script_sig.is_empty() {
                    ESTIMATED_SCRIPT_SIG_LEN
                } else {
                    input.script_sig.len()
                };
                36 + varint_len(script_len as u64) + script_len + 4
            })
            .sum();
        let outputs: usize = self
            .outputs
            .iter()
            .map(|o| 8 + varint_len(o.script.len() as u64) + o.script.len())
            .sum();
        4 + varint_len(self.inputs.len() as u64)
            + inputs
            + varint_len(self.outputs.len() as u64)
            + outputs
            + 4
    }

    /// Fee at `rate` sat/byte over the estimated size, rounded up
    pub fn fee_for_rate(&self, rate: f64) -> Satoshis {
        (self.estimated_size() as f64 * rate).ceil() as Satoshis
    }

    pub fn output_total(&self) -> Satoshis {
        self.outputs.iter().map(|o| o.value).sum()
    }

    pub fn parse_hex(raw: &str) -> Result<Self, CodecError> {
        let bytes = hex::decode(raw.trim())
            .map_err(|e| CodecError::Format(format!("transaction is not hex: {}", e)))?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader { bytes, pos: 0 };
        let version = reader.u32()?;
        let input_count = reader.varint()?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let previous = reader.out_point()?;
            let len = reader.varint()? as usize;
            let script_sig = reader.take(len)?.to_vec();
            let sequence = reader.u32()?;
            inputs.push(TxIn {
                previous,
                script_sig,
                sequence,
            });
        }
        let output_count = reader.varint()?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            let value = reader.u64()?;
            let len = reader.varint()? as usize;
            let script = reader.take(len)?.to_vec();
            outputs.push(TxOut { value, script });
        }
        let lock_time = reader.u32()?;
        if reader.pos != bytes.len() {
            return Err(CodecError::Format(format!(
                "{} trailing bytes after transaction",
                bytes.len() - reader.pos
            )));
        }
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }
}

pub(crate) fn write_out_point(out: &mut Vec<u8>, out_point: &OutPoint) {
    out.extend_from_slice(&out_point.tx_id.to_internal_bytes());
    out.extend_from_slice(&out_point.vout.to_le_bytes());
}

pub(crate) fn write_output(out: &mut Vec<u8>, output: &TxOut) {
    out.extend_from_slice(&output.value.to_le_bytes());
    write_varint(out, output.script.len() as u64);
    out.extend_from_slice(&output.script);
}

pub fn write_varint(out: &mut Vec<u8>, n: u64) {
    match n {
        0..=0xfc => out.push(n as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(n as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(n as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&n.to_le_bytes());
        }
    }
}

pub fn varint_len(n: u64) -> usize {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| CodecError::Format("truncated transaction".to_string()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn varint(&mut self) -> Result<u64, CodecError> {
        let [tag] = self.array::<1>()?;
        Ok(match tag {
            0xfd => u16::from_le_bytes(self.array()?) as u64,
            0xfe => u32::from_le_bytes(self.array()?) as u64,
            0xff => self.u64()?,
            n => n as u64,
        })
    }

    fn out_point(&mut self) -> Result<OutPoint, CodecError> {
        let internal: [u8; 32] = self.array()?;
        let vout = self.u32()?;
        Ok(OutPoint {
            tx_id: ConfirmedId::from_digest(internal),
            vout,
        })
    }
}
