//! Fee estimation against a scratch transaction.
//!
//! The scratch transaction spends a fixed dummy output and carries the
//! payload as its only output. Its id becomes the node's placeholder id,
//! which children embed as their parent reference until the real id exists.

use crate::codec::{check_script_size, Payload};
use crate::error::CodecError;
use crate::tx::{OutPoint, Transaction, TxOut, Utxo};
use crate::types::{ConfirmedId, PlaceholderId, Satoshis};

const DUMMY_TX_ID: &str = "e29bc8d6c7298e524756ac116bd3fb5355eec1da94666253c3f40810a4000804";
const DUMMY_VALUE: Satoshis = 5_000_000_000;
const DUMMY_SCRIPT: &str =
    "21034b2edef6108e596efb2955f796aa807451546025025833e555b6f9b433a4a146ac";

/// Output spent by every scratch transaction
pub fn dummy_utxo() -> Utxo {
    Utxo {
        out_point: OutPoint {
            tx_id: ConfirmedId::from_digest(dummy_internal_bytes()),
            vout: 0,
        },
        value: DUMMY_VALUE,
        locking_script: hex::decode(DUMMY_SCRIPT).unwrap_or_default(),
    }
}

fn dummy_internal_bytes() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    if let Ok(decoded) = hex::decode(DUMMY_TX_ID) {
        bytes.copy_from_slice(&decoded);
    }
    bytes.reverse();
    bytes
}

/// Result of sizing one payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Estimate {
    pub fee: Satoshis,
    pub placeholder: PlaceholderId,
    pub script_size: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct FeeEstimator {
    pub fee_rate_per_byte: f64,
    pub minimum_output_value: Satoshis,
    pub max_script_size: usize,
}

impl FeeEstimator {
    pub fn new(fee_rate_per_byte: f64, minimum_output_value: Satoshis, max_script_size: usize) -> Self {
        Self {
            fee_rate_per_byte,
            minimum_output_value,
            max_script_size,
        }
    }

    /// Fee is never below the minimum output value, since it is paid out as an output.
    pub fn estimate(&self, payload: &Payload) -> Result<Estimate, CodecError> {
        let script = payload.estimate_script();
        check_script_size(&script, self.max_script_size)?;
        let script_size = script.len();

        let mut scratch = Transaction::default();
        scratch.add_input(&dummy_utxo());
        scratch.add_output(TxOut::data(script));

        let fee = scratch
            .fee_for_rate(self.fee_rate_per_byte)
            .max(self.minimum_output_value);
        let placeholder = PlaceholderId::parse(scratch.tx_id().as_str())?;

        Ok(Estimate {
            fee,
            placeholder,
            script_size,
        })
    }
}
