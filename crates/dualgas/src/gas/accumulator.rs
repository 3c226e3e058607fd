use alloy_primitives::B256;
use tracing::trace;

/// Aggregates the gas wanted across all transactions of the current block.
///
/// Only the current block is tracked: [`Self::drain_and_reset`] hands the total to the fee
/// market at the block boundary and starts over.
#[derive(Debug, Clone, Default)]
pub struct BlockGasAccumulator {
    /// Total gas wanted by the transactions recorded in this block.
    total_gas_wanted: u64,
    /// Number of transactions recorded in this block.
    tx_count: u64,
}

impl BlockGasAccumulator {
    /// Creates an empty accumulator.
    pub const fn new() -> Self {
        Self { total_gas_wanted: 0, tx_count: 0 }
    }

    /// Records the gas wanted by a transaction.
    pub fn record_gas_wanted(&mut self, tx_hash: B256, amount: u64) {
        self.total_gas_wanted = self.total_gas_wanted.saturating_add(amount);
        self.tx_count += 1;
        trace!(
            target: "dualgas::gas",
            %tx_hash,
            amount,
            total = self.total_gas_wanted,
            "record gas wanted"
        );
    }

    /// Returns the total and zeroes the accumulator.
    pub fn drain_and_reset(&mut self) -> u64 {
        let total = self.total_gas_wanted;
        *self = Self::new();
        total
    }

    /// Returns the gas wanted so far.
    pub const fn total(&self) -> u64 {
        self.total_gas_wanted
    }

    /// Returns the number of recorded transactions.
    pub const fn tx_count(&self) -> u64 {
        self.tx_count
    }

    /// Returns `true` if nothing was recorded in this block.
    pub const fn is_empty(&self) -> bool {
        self.tx_count == 0
    }
}
