//! The fan-out funding transaction.
//!
//! One output per staged node pays that node's parent address exactly the
//! node's fee, so every node transaction can be built as soon as this one
//! transaction is visible. The root payload, when present, rides along as
//! output 0.

use crate::codec::SealedScript;
use crate::error::PipelineError;
use crate::keys::{ExtendedPrivateKey, KeyPath};
use crate::tx::{sign_input, Transaction, TxOut, Utxo};
use crate::types::Satoshis;
use tracing::debug;

/// One funded node: its parent's key path and the node's fee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeEntry {
    pub parent_key_path: KeyPath,
    pub fee: Satoshis,
}

/// Signed funding transaction and where its outputs landed
#[derive(Debug, Clone)]
pub struct FundingTx {
    pub tx: Transaction,
    /// Fee paid to miners by this transaction
    pub fee: Satoshis,
    pub change: Option<Satoshis>,
    has_root: bool,
}

impl FundingTx {
    /// Output index of fee entry `slot`
    pub fn vout_for_slot(&self, slot: usize) -> u32 {
        (slot + usize::from(self.has_root)) as u32
    }

    pub fn root_vout(&self) -> Option<u32> {
        self.has_root.then_some(0)
    }
}

pub struct FundingTxBuilder<'a> {
    master_key: &'a ExtendedPrivateKey,
    funding_key: &'a ExtendedPrivateKey,
    fee_rate_per_byte: f64,
    minimum_output_value: Satoshis,
}

impl<'a> FundingTxBuilder<'a> {
    pub fn new(
        master_key: &'a ExtendedPrivateKey,
        funding_key: &'a ExtendedPrivateKey,
        fee_rate_per_byte: f64,
        minimum_output_value: Satoshis,
    ) -> Self {
        Self {
            master_key,
            funding_key,
            fee_rate_per_byte,
            minimum_output_value,
        }
    }

    /// Build and sign. `utxos` are the funding key's spendable outputs.
    pub fn build(
        &self,
        entries: &[FeeEntry],
        root: Option<&SealedScript>,
        utxos: &[Utxo],
    ) -> Result<FundingTx, PipelineError> {
        let funding_address = self.funding_key.address();
        if utxos.is_empty() {
            return Err(PipelineError::InsufficientFunds {
                address: funding_address.to_string(),
            });
        }

        let mut tx = Transaction::default();
        for utxo in utxos {
            tx.add_input(utxo);
        }
        if let Some(script) = root {
            tx.add_output(TxOut::data(script.as_bytes().to_vec()));
        }
        for entry in entries {
            let address = self
                .master_key
                .derive_path(&entry.parent_key_path)?
                .address();
            tx.add_output(TxOut {
                value: entry.fee,
                script: address.locking_script(),
            });
        }

        let total_in: Satoshis = utxos.iter().map(|u| u.value).sum();
        let spent = tx.output_total();
        let fee_without_change = tx.fee_for_rate(self.fee_rate_per_byte);
        if total_in < spent + fee_without_change {
            return Err(PipelineError::InsufficientFunds {
                address: funding_address.to_string(),
            });
        }

        let mut with_change = tx.clone();
        with_change.add_output(TxOut {
            value: 0,
            script: funding_address.locking_script(),
        });
        let fee_with_change = with_change.fee_for_rate(self.fee_rate_per_byte);
        let change = total_in
            .checked_sub(spent + fee_with_change)
            .filter(|&change| change >= self.minimum_output_value);

        if let Some(change) = change {
            if let Some(output) = with_change.outputs.last_mut() {
                output.value = change;
            }
            tx = with_change;
        }

        for (index, utxo) in utxos.iter().enumerate() {
            sign_input(&mut tx, index, utxo, self.funding_key)?;
        }

        let fee = total_in - tx.output_total();
        debug!(
            inputs = utxos.len(),
            outputs = tx.outputs.len(),
            fee,
            ?change,
            "Built funding transaction"
        );

        Ok(FundingTx {
            tx,
            fee,
            change,
            has_root: root.is_some(),
        })
    }
}
