//! In-memory ledger implementing both chain traits.
//!
//! Broadcasts are validated like a relaying node would: every input must
//! exist and be unspent, every signature must verify, and inputs must
//! cover outputs. Metanet data outputs are indexed as they arrive. Poll
//! behaviour (visibility lag, mempool depth, unspent output lag) can be
//! scripted so pipeline waits are exercised without wall-clock delays.

use super::{
    ChainClient, ChainIndexClient, FetchedTransaction, IndexedNode, UnspentOutput,
};
use crate::codec::decode_node;
use crate::error::PipelineError;
use crate::keys::Address;
use crate::tx::{verify_input, OutPoint, Transaction, TxOut, Utxo};
use crate::types::{ConfirmedId, Satoshis};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<ConfirmedId, Transaction>,
    confirmed: HashSet<ConfirmedId>,
    broadcasts: Vec<ConfirmedId>,
    outputs: HashMap<OutPoint, TxOut>,
    spent: HashSet<OutPoint>,
    nodes: Vec<IndexedNode>,
    faucet_nonce: u32,
    hidden_visibility_polls: u32,
    hidden_unspent_polls: u32,
    hidden_unspent_by_address: HashMap<Address, u32>,
    unconfirmed_script: VecDeque<usize>,
    /// Broadcasts still to accept, then the rejection reason
    reject_after: Option<(usize, String)>,
    unspent_queries: usize,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a confirmed output of `value` paying `address`.
    pub fn fund(&self, address: &Address, value: Satoshis) -> ConfirmedId {
        let mut state = self.state.lock();
        state.faucet_nonce += 1;
        let tx = Transaction {
            lock_time: state.faucet_nonce,
            outputs: vec![TxOut {
                value,
                script: address.locking_script(),
            }],
            ..Transaction::default()
        };
        let tx_id = tx.tx_id();
        state.insert(tx_id.clone(), tx);
        state.confirmed.insert(tx_id.clone());
        tx_id
    }

    /// `is_visible` answers false for the next `polls` calls.
    pub fn delay_visibility(&self, polls: u32) {
        self.state.lock().hidden_visibility_polls = polls;
    }

    /// `unspent_outputs` answers empty for the next `polls` calls.
    pub fn delay_unspent(&self, polls: u32) {
        self.state.lock().hidden_unspent_polls = polls;
    }

    /// `unspent_outputs` for `address` answers empty for its next `polls` calls.
    pub fn delay_unspent_for(&self, address: &Address, polls: u32) {
        self.state
            .lock()
            .hidden_unspent_by_address
            .insert(*address, polls);
    }

    /// Answers for the next `unconfirmed_outputs` calls, in order.
    pub fn script_unconfirmed_counts(&self, counts: impl IntoIterator<Item = usize>) {
        self.state.lock().unconfirmed_script.extend(counts);
    }

    /// Refuse the next broadcast with `reason`.
    pub fn reject_next_broadcast(&self, reason: &str) {
        self.reject_broadcast_after(0, reason);
    }

    /// Accept `accepted` more broadcasts, then refuse one with `reason`.
    pub fn reject_broadcast_after(&self, accepted: usize, reason: &str) {
        self.state.lock().reject_after = Some((accepted, reason.to_string()));
    }

    pub fn confirm_all(&self) {
        let mut state = self.state.lock();
        let ids: Vec<_> = state.transactions.keys().cloned().collect();
        state.confirmed.extend(ids);
    }

    pub fn transaction(&self, tx_id: &ConfirmedId) -> Option<Transaction> {
        self.state.lock().transactions.get(tx_id).cloned()
    }

    /// Ids of accepted broadcasts, in arrival order
    pub fn broadcasts(&self) -> Vec<ConfirmedId> {
        self.state.lock().broadcasts.clone()
    }

    pub fn unspent_queries(&self) -> usize {
        self.state.lock().unspent_queries
    }

    pub fn balance(&self, address: &Address) -> Satoshis {
        let state = self.state.lock();
        state
            .unspent_for(address)
            .iter()
            .map(|u| u.value)
            .sum()
    }
}

impl LedgerState {
    fn insert(&mut self, tx_id: ConfirmedId, tx: Transaction) {
        for (vout, output) in tx.outputs.iter().enumerate() {
            self.outputs.insert(
                OutPoint {
                    tx_id: tx_id.clone(),
                    vout: vout as u32,
                },
                output.clone(),
            );
            if output.is_data() {
                if let Ok(node) = decode_node(&output.script) {
                    self.nodes.push(IndexedNode {
                        tx_id: tx_id.clone(),
                        address: node.address,
                        parent_tx_id: node.parent.and_then(|p| ConfirmedId::parse(&p).ok()),
                        protocol: node.protocol,
                        name: node.name,
                    });
                }
            }
        }
        self.transactions.insert(tx_id, tx);
    }

    fn validate(&self, tx: &Transaction) -> Result<(), String> {
        if tx.inputs.is_empty() {
            return Err("transaction has no inputs".to_string());
        }
        let mut seen = HashSet::new();
        let mut total_in: Satoshis = 0;
        for (index, input) in tx.inputs.iter().enumerate() {
            let previous = &input.previous;
            if !seen.insert(previous.clone()) || self.spent.contains(previous) {
                return Err(format!(
                    "txn-mempool-conflict: {}:{} already spent",
                    previous.tx_id, previous.vout
                ));
            }
            let output = self.outputs.get(previous).ok_or_else(|| {
                format!("Missing inputs: {}:{}", previous.tx_id, previous.vout)
            })?;
            let utxo = Utxo {
                out_point: previous.clone(),
                value: output.value,
                locking_script: output.script.clone(),
            };
            verify_input(tx, index, &utxo).map_err(|e| {
                format!("mandatory-script-verify-flag-failed: {}", e)
            })?;
            total_in += output.value;
        }
        if total_in < tx.output_total() {
            return Err(format!(
                "bad-txns-in-belowout: {} < {}",
                total_in,
                tx.output_total()
            ));
        }
        Ok(())
    }

    fn unspent_for(&self, address: &Address) -> Vec<UnspentOutput> {
        let script = address.locking_script();
        let mut unspent: Vec<UnspentOutput> = self
            .outputs
            .iter()
            .filter(|(point, out)| out.script == script && !self.spent.contains(*point))
            .map(|(point, out)| UnspentOutput {
                tx_id: point.tx_id.clone(),
                vout: point.vout,
                value: out.value,
            })
            .collect();
        unspent.sort_by(|a, b| (a.tx_id.as_str(), a.vout).cmp(&(b.tx_id.as_str(), b.vout)));
        unspent
    }

    fn count_unconfirmed_outputs(&self, address: &Address) -> usize {
        let script = address.locking_script();
        self.transactions
            .iter()
            .filter(|(id, _)| !self.confirmed.contains(*id))
            .filter(|(_, tx)| {
                tx.inputs.iter().any(|input| {
                    self.outputs
                        .get(&input.previous)
                        .is_some_and(|out| out.script == script)
                })
            })
            .map(|(_, tx)| tx.outputs.len())
            .sum()
    }
}

#[async_trait]
impl ChainClient for MemoryLedger {
    async fn broadcast(&self, raw_tx: &str) -> Result<ConfirmedId, PipelineError> {
        let tx = Transaction::parse_hex(raw_tx)?;
        let tx_id = tx.tx_id();
        let mut state = self.state.lock();

        match state.reject_after.take() {
            Some((0, reason)) => {
                return Err(PipelineError::BroadcastRejected {
                    tx_id: tx_id.to_string(),
                    reason,
                })
            }
            Some((remaining, reason)) => state.reject_after = Some((remaining - 1, reason)),
            None => {}
        }
        if state.transactions.contains_key(&tx_id) {
            return Ok(tx_id);
        }
        state
            .validate(&tx)
            .map_err(|reason| PipelineError::BroadcastRejected {
                tx_id: tx_id.to_string(),
                reason,
            })?;

        for input in &tx.inputs {
            state.spent.insert(input.previous.clone());
        }
        state.insert(tx_id.clone(), tx);
        state.broadcasts.push(tx_id.clone());
        Ok(tx_id)
    }

    async fn fetch_transaction(
        &self,
        tx_id: &ConfirmedId,
    ) -> Result<Option<FetchedTransaction>, PipelineError> {
        let state = self.state.lock();
        Ok(state.transactions.get(tx_id).map(|tx| FetchedTransaction {
            tx_id: tx_id.clone(),
            outputs: tx.outputs.clone(),
            confirmations: Some(u32::from(state.confirmed.contains(tx_id))),
        }))
    }

    async fn unspent_outputs(&self, address: &Address) -> Result<Vec<UnspentOutput>, PipelineError> {
        let mut state = self.state.lock();
        state.unspent_queries += 1;
        if state.hidden_unspent_polls > 0 {
            state.hidden_unspent_polls -= 1;
            return Ok(Vec::new());
        }
        if let Some(remaining) = state.hidden_unspent_by_address.get_mut(address) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(Vec::new());
            }
        }
        Ok(state.unspent_for(address))
    }
}

#[async_trait]
impl ChainIndexClient for MemoryLedger {
    async fn node_by_tx(&self, tx_id: &ConfirmedId) -> Result<Option<IndexedNode>, PipelineError> {
        let state = self.state.lock();
        Ok(state.nodes.iter().find(|n| &n.tx_id == tx_id).cloned())
    }

    async fn children_by_parent(
        &self,
        tx_id: &ConfirmedId,
    ) -> Result<Vec<IndexedNode>, PipelineError> {
        let state = self.state.lock();
        Ok(state
            .nodes
            .iter()
            .filter(|n| n.parent_tx_id.as_ref() == Some(tx_id))
            .cloned()
            .collect())
    }

    async fn is_visible(&self, tx_id: &ConfirmedId) -> Result<bool, PipelineError> {
        let mut state = self.state.lock();
        if state.hidden_visibility_polls > 0 {
            state.hidden_visibility_polls -= 1;
            return Ok(false);
        }
        Ok(state.transactions.contains_key(tx_id))
    }

    async fn unconfirmed_outputs(&self, address: &Address) -> Result<usize, PipelineError> {
        let mut state = self.state.lock();
        if let Some(count) = state.unconfirmed_script.pop_front() {
            return Ok(count);
        }
        Ok(state.count_unconfirmed_outputs(address))
    }
}
