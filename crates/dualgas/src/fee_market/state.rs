use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::constants::fee_market::BPS_DENOMINATOR;

/// The fee market state persisted at every block boundary. It is the only durable artifact of
/// the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockFeeState {
    /// The base fee enforced on the next block's admissions.
    pub base_fee: U256,
    /// The aggregated gas wanted of the last committed block.
    pub gas_wanted_last_block: u64,
    /// The minimum gas price. `base_fee >= min_gas_price` always holds.
    pub min_gas_price: U256,
    /// The height of the last committed block, `0` at genesis.
    pub height: u64,
}

impl BlockFeeState {
    /// Creates the genesis state.
    pub fn genesis(base_fee: U256, min_gas_price: U256) -> Self {
        Self {
            base_fee: base_fee.max(min_gas_price),
            gas_wanted_last_block: 0,
            min_gas_price,
            height: 0,
        }
    }

    /// Returns `true` if `base_fee >= min_gas_price`.
    pub fn is_consistent(&self) -> bool {
        self.base_fee >= self.min_gas_price
    }

    /// Computes the state after a block at `height` that wanted `gas_wanted_total` gas.
    ///
    /// This is a pure function of the persisted state and the block's demand, so an update lost
    /// to a crash is recomputed by re-executing the block against the last persisted state.
    pub fn next(
        &self,
        height: u64,
        gas_wanted_total: u64,
        block_gas_target: u64,
        change_denominator: u64,
        max_change_bps: u64,
    ) -> Self {
        Self {
            base_fee: next_base_fee(
                self.base_fee,
                self.min_gas_price,
                gas_wanted_total,
                block_gas_target,
                change_denominator,
                max_change_bps,
            ),
            gas_wanted_last_block: gas_wanted_total,
            min_gas_price: self.min_gas_price,
            height,
        }
    }
}

/// Computes the EIP-1559 base fee of the next block.
///
/// - At the target the base fee is unchanged.
/// - Above it, `base_fee * (gas_wanted - target) / target / denominator` is added, at least `1`
///   and at most `max_change_bps` of the current base fee.
/// - Below it, `base_fee * (target - gas_wanted) / target / denominator` is subtracted.
///
/// The result is never below `min_gas_price`.
pub fn next_base_fee(
    base_fee: U256,
    min_gas_price: U256,
    gas_wanted_total: u64,
    block_gas_target: u64,
    change_denominator: u64,
    max_change_bps: u64,
) -> U256 {
    if block_gas_target == 0 || change_denominator == 0 || gas_wanted_total == block_gas_target {
        return base_fee.max(min_gas_price);
    }

    let target = U256::from(block_gas_target);
    let denominator = U256::from(change_denominator);
    let next = if gas_wanted_total > block_gas_target {
        let overshoot = U256::from(gas_wanted_total - block_gas_target);
        let delta = base_fee.saturating_mul(overshoot) / target / denominator;
        let cap = base_fee.saturating_mul(U256::from(max_change_bps)) / U256::from(BPS_DENOMINATOR);
        base_fee.saturating_add(delta.min(cap).max(U256::from(1)))
    } else {
        let undershoot = U256::from(block_gas_target - gas_wanted_total);
        let delta = base_fee.saturating_mul(undershoot) / target / denominator;
        base_fee.saturating_sub(delta)
    };

    next.max(min_gas_price)
}
