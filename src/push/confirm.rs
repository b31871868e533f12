//! Operator confirmation before any money moves.

use crate::error::PipelineError;
use crate::types::Satoshis;

const SATOSHIS_PER_COIN: f64 = 100_000_000.0;

/// What the operator is asked to approve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSummary {
    /// Fees of every node and chunk transaction, root excluded
    pub node_fees: Satoshis,
    /// Number of funded transactions
    pub transactions: usize,
    pub funding_fee: Satoshis,
}

impl FeeSummary {
    pub fn total(&self) -> Satoshis {
        self.node_fees + self.funding_fee
    }
}

/// `"1234 satoshis (0.00001234 BSV)"`
pub fn format_fee(fee: Satoshis) -> String {
    format!("{} satoshis ({} BSV)", fee, fee as f64 / SATOSHIS_PER_COIN)
}

pub trait Confirm: Send + Sync {
    /// `Ok(false)` aborts the push.
    fn confirm(&self, summary: &FeeSummary) -> Result<bool, PipelineError>;
}

/// Approves everything; for `--yes` and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&self, _summary: &FeeSummary) -> Result<bool, PipelineError> {
        Ok(true)
    }
}

/// Declines everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Decline;

impl Confirm for Decline {
    fn confirm(&self, _summary: &FeeSummary) -> Result<bool, PipelineError> {
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_and_format() {
        let summary = FeeSummary {
            node_fees: 1_500,
            transactions: 3,
            funding_fee: 300,
        };
        assert_eq!(summary.total(), 1_800);
        assert_eq!(format_fee(1_800), "1800 satoshis (0.000018 BSV)");
    }
}
