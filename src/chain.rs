//! Ledger access.
//!
//! [`ChainClient`] talks to a node API (broadcast, fetch, unspent outputs);
//! [`ChainIndexClient`] answers metanet graph and mempool queries. Both are
//! async traits so pipelines can run against HTTP services or the
//! in-memory ledger used in tests.

pub mod http;
pub mod memory;

pub use http::{HttpChainClient, HttpIndexClient};
pub use memory::MemoryLedger;

use crate::codec::ProtocolType;
use crate::error::PipelineError;
use crate::keys::Address;
use crate::tx::{OutPoint, TxOut, Utxo};
use crate::types::{ConfirmedId, Satoshis};
use async_trait::async_trait;

/// Unspent output as reported for an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnspentOutput {
    pub tx_id: ConfirmedId,
    pub vout: u32,
    pub value: Satoshis,
}

impl UnspentOutput {
    /// Spendable form, assuming a P2PKH output to `address`.
    pub fn to_utxo(&self, address: &Address) -> Utxo {
        Utxo {
            out_point: OutPoint {
                tx_id: self.tx_id.clone(),
                vout: self.vout,
            },
            value: self.value,
            locking_script: address.locking_script(),
        }
    }
}

/// Transaction as returned by [`ChainClient::fetch_transaction`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedTransaction {
    pub tx_id: ConfirmedId,
    pub outputs: Vec<TxOut>,
    pub confirmations: Option<u32>,
}

impl FetchedTransaction {
    /// Script of the first data output
    pub fn data_script(&self) -> Option<&[u8]> {
        self.outputs
            .iter()
            .find(|o| o.is_data())
            .map(|o| o.script.as_slice())
    }
}

/// Metanet node as reported by the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedNode {
    pub tx_id: ConfirmedId,
    pub address: String,
    pub parent_tx_id: Option<ConfirmedId>,
    pub protocol: ProtocolType,
    pub name: String,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submit a raw hex transaction. A refusal is `BroadcastRejected`.
    async fn broadcast(&self, raw_tx: &str) -> Result<ConfirmedId, PipelineError>;

    async fn fetch_transaction(
        &self,
        tx_id: &ConfirmedId,
    ) -> Result<Option<FetchedTransaction>, PipelineError>;

    async fn unspent_outputs(&self, address: &Address) -> Result<Vec<UnspentOutput>, PipelineError>;
}

#[async_trait]
pub trait ChainIndexClient: Send + Sync {
    async fn node_by_tx(&self, tx_id: &ConfirmedId) -> Result<Option<IndexedNode>, PipelineError>;

    async fn children_by_parent(&self, tx_id: &ConfirmedId)
        -> Result<Vec<IndexedNode>, PipelineError>;

    /// Whether the transaction is known, confirmed or not
    async fn is_visible(&self, tx_id: &ConfirmedId) -> Result<bool, PipelineError>;

    /// Outputs of unconfirmed transactions that spend from `address`
    async fn unconfirmed_outputs(&self, address: &Address) -> Result<usize, PipelineError>;
}
