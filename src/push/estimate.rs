//! Estimate: build every payload and size it, parents before children.

use crate::codec::{FileBody, NodeHeader, Payload};
use crate::error::PipelineError;
use crate::fee::FeeEstimator;
use crate::funding::FeeEntry;
use crate::keys::{ExtendedPrivateKey, KeyPath};
use crate::tree::{ChunkPart, Node, NodeKind};
use crate::types::{Satoshis, TxRef};
use std::fs;
use tracing::debug;

/// Settings that shape payloads
#[derive(Debug, Clone, Copy)]
pub struct PayloadLimits {
    pub max_file_size: usize,
    pub gzip_threshold: usize,
}

/// Fee list for the funding transaction plus the root's own fee
#[derive(Debug, Clone, Default)]
pub struct FeePlan {
    /// One entry per funded transaction, in slot order
    pub entries: Vec<FeeEntry>,
    pub root_fee: Satoshis,
}

impl FeePlan {
    /// Sum of every node and chunk fee, the root excluded
    pub fn node_fees(&self) -> Satoshis {
        self.entries.iter().map(|e| e.fee).sum()
    }
}

pub struct TreeEstimator<'a> {
    master_key: &'a ExtendedPrivateKey,
    fees: FeeEstimator,
    limits: PayloadLimits,
}

impl<'a> TreeEstimator<'a> {
    pub fn new(master_key: &'a ExtendedPrivateKey, fees: FeeEstimator, limits: PayloadLimits) -> Self {
        Self {
            master_key,
            fees,
            limits,
        }
    }

    /// Estimate the staged tree under `root`.
    ///
    /// Each node gets a placeholder id, which its children embed as their
    /// parent reference. Chunk parts take the slots right after their header.
    pub fn estimate(&self, root: &mut Node) -> Result<FeePlan, PipelineError> {
        let mut plan = FeePlan::default();

        let header = NodeHeader {
            address: self.address_of(&root.key_path)?,
            parent: None,
        };
        let payload = Payload::directory(header, &root.name);
        let estimate = self.fees.estimate(&payload)?;
        debug!(key_path = %root.key_path, fee = estimate.fee, "Estimated root");
        root.tx_id = Some(TxRef::Placeholder(estimate.placeholder));
        plan.root_fee = estimate.fee;
        let staging = root.staging.get_or_insert_with(Default::default);
        staging.fee = estimate.fee;
        staging.slot = None;
        staging.payload = Some(payload);
        staging.parts.clear();

        self.estimate_children(root, &mut plan)?;
        Ok(plan)
    }

    fn estimate_children(&self, parent: &mut Node, plan: &mut FeePlan) -> Result<(), PipelineError> {
        let parent_key_path = parent.key_path.clone();
        let parent_ref = parent.tx_id.clone().ok_or_else(|| {
            PipelineError::Format(format!("{} has no transaction id", parent_key_path))
        })?;

        for name in parent.unremoved_child_names() {
            if let Some(child) = parent.child_mut(&name) {
                self.estimate_node(child, &parent_key_path, &parent_ref, plan)?;
            }
        }
        Ok(())
    }

    fn estimate_node(
        &self,
        node: &mut Node,
        parent_key_path: &KeyPath,
        parent_ref: &TxRef,
        plan: &mut FeePlan,
    ) -> Result<(), PipelineError> {
        let header = NodeHeader {
            address: self.address_of(&node.key_path)?,
            parent: Some(parent_ref.clone()),
        };
        let staging = node.staging.as_mut().ok_or_else(|| {
            PipelineError::Format(format!("{} was not staged", node.key_path))
        })?;

        let mut parts = Vec::new();
        let payload = match node.kind {
            NodeKind::Directory => Payload::directory(header, &node.name),
            NodeKind::File => {
                let content = fs::read(&staging.source)?;
                Payload::file(
                    header,
                    FileBody::new(&node.name, &content, self.limits.gzip_threshold)?,
                )
            }
            NodeKind::ChunkedFile => {
                let content = fs::read(&staging.source)?;
                parts = Payload::chunk_parts(&content, self.limits.max_file_size);
                Payload::chunked(header, &node.name, &content, self.limits.max_file_size)
            }
        };

        let estimate = self.fees.estimate(&payload)?;
        debug!(
            key_path = %node.key_path,
            name = %node.name,
            fee = estimate.fee,
            script_size = estimate.script_size,
            "Estimated node"
        );
        staging.fee = estimate.fee;
        staging.slot = Some(plan.entries.len());
        staging.payload = Some(payload);
        plan.entries.push(FeeEntry {
            parent_key_path: parent_key_path.clone(),
            fee: estimate.fee,
        });

        staging.parts.clear();
        for part in parts {
            let part_estimate = self.fees.estimate(&part)?;
            staging.parts.push(ChunkPart {
                payload: part,
                fee: part_estimate.fee,
                slot: plan.entries.len(),
                tx_id: None,
            });
            plan.entries.push(FeeEntry {
                parent_key_path: parent_key_path.clone(),
                fee: part_estimate.fee,
            });
        }

        node.tx_id = Some(TxRef::Placeholder(estimate.placeholder));

        if node.kind == NodeKind::Directory {
            self.estimate_children(node, plan)?;
        }
        Ok(())
    }

    fn address_of(&self, key_path: &KeyPath) -> Result<crate::keys::Address, PipelineError> {
        Ok(self.master_key.derive_path(key_path)?.address())
    }
}
