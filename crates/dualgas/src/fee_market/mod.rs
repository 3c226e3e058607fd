//! The EIP-1559 fee market.
//!
//! The base fee is a function of the previous block's aggregated gas wanted, so it changes once
//! per block at the commit boundary and never within a block.

mod params;
mod state;
mod store;

pub use params::*;
pub use state::*;
pub use store::*;

use alloy_primitives::U256;
use tracing::{debug, info};

use crate::{AdmissionError, BlockGasAccumulator, StoreError};

/// Whether the fee market has pending demand for the current block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeMarketPhase {
    /// No gas wanted has been recorded since the last block boundary.
    Stable,
    /// Gas wanted has been recorded and the base fee will be updated at the end of the block.
    PendingUpdate,
}

/// The fee market: the current base fee and the rules that move it.
#[derive(Debug, Clone)]
pub struct FeeMarket {
    params: FeeMarketParams,
    state: BlockFeeState,
}

impl FeeMarket {
    /// Creates a fee market at genesis.
    pub fn new(params: FeeMarketParams) -> Self {
        let base_fee =
            if params.no_base_fee { params.min_gas_price } else { params.initial_base_fee };
        let state = BlockFeeState::genesis(base_fee, params.min_gas_price);
        Self { params, state }
    }

    /// Restores a fee market from a persisted state.
    ///
    /// The minimum gas price of `params` takes precedence over the persisted one, the base fee is
    /// raised to it if needed.
    pub fn from_state(
        params: FeeMarketParams,
        mut state: BlockFeeState,
    ) -> Result<Self, StoreError> {
        if !state.is_consistent() {
            return Err(StoreError::Corrupt {
                base_fee: state.base_fee,
                min_gas_price: state.min_gas_price,
            });
        }
        state.min_gas_price = params.min_gas_price;
        state.base_fee = if params.no_base_fee {
            params.min_gas_price
        } else {
            state.base_fee.max(params.min_gas_price)
        };
        Ok(Self { params, state })
    }

    /// Restores the fee market from `store`, or starts at genesis if the store is empty.
    pub fn load<S: FeeStateStore>(params: FeeMarketParams, store: &S) -> Result<Self, StoreError> {
        match store.load()? {
            Some(state) => {
                info!(
                    target: "dualgas::fee_market",
                    height = state.height,
                    base_fee = %state.base_fee,
                    "Restored fee market"
                );
                Self::from_state(params, state)
            }
            None => Ok(Self::new(params)),
        }
    }

    /// Returns the parameters.
    pub const fn params(&self) -> &FeeMarketParams {
        &self.params
    }

    /// Returns the base fee enforced on the current block.
    pub const fn current_base_fee(&self) -> U256 {
        self.state.base_fee
    }

    /// Returns the minimum gas price.
    pub const fn min_gas_price(&self) -> U256 {
        self.state.min_gas_price
    }

    /// Returns the lowest gas price admitted in the current block, `max(min_gas_price, base_fee)`.
    pub fn admission_floor(&self) -> U256 {
        self.state.base_fee.max(self.state.min_gas_price)
    }

    /// Checks an offered per-gas price against the admission floor.
    pub fn check_admission_price(&self, offered: U256) -> Result<(), AdmissionError> {
        let required = self.admission_floor();
        if offered < required {
            return Err(AdmissionError::InsufficientFee { required, offered });
        }
        Ok(())
    }

    /// Returns the phase given the block's accumulator.
    pub fn phase(&self, accumulator: &BlockGasAccumulator) -> FeeMarketPhase {
        if accumulator.is_empty() {
            FeeMarketPhase::Stable
        } else {
            FeeMarketPhase::PendingUpdate
        }
    }

    /// Returns a copy of the state for readers that must not observe a mid-update value.
    pub fn snapshot(&self) -> BlockFeeState {
        self.state.clone()
    }

    /// Computes the state after the block just executed without applying it.
    fn next_state(
        &self,
        height: u64,
        gas_wanted_total: u64,
        block_gas_target: u64,
        change_denominator: u64,
    ) -> BlockFeeState {
        let mut next = self.state.next(
            height,
            gas_wanted_total,
            block_gas_target,
            change_denominator,
            self.params.max_change_bps,
        );
        if self.params.no_base_fee {
            next.base_fee = self.state.base_fee;
        }
        next
    }

    /// Moves the base fee for the next block given the aggregated gas wanted of the block just
    /// executed, and returns the new base fee.
    pub fn update_for_next_block(
        &mut self,
        gas_wanted_total: u64,
        block_gas_target: u64,
        change_denominator: u64,
    ) -> U256 {
        let next = self.next_state(
            self.state.height,
            gas_wanted_total,
            block_gas_target,
            change_denominator,
        );
        self.commit(next);
        self.state.base_fee
    }

    /// Returns the state closing block `height` with the configured target and denominator.
    ///
    /// The fee market is left untouched; the state takes effect through [`FeeMarket::commit`]
    /// once it has been persisted.
    pub fn end_block_state(&self, height: u64, gas_wanted_total: u64) -> BlockFeeState {
        self.next_state(
            height,
            gas_wanted_total,
            self.params.block_gas_target(),
            self.params.base_fee_change_denominator,
        )
    }

    /// Replaces the current state with `state`.
    pub fn commit(&mut self, state: BlockFeeState) {
        debug!(
            target: "dualgas::fee_market",
            height = state.height,
            gas_wanted_total = state.gas_wanted_last_block,
            previous = %self.state.base_fee,
            base_fee = %state.base_fee,
            "Updated base fee"
        );
        self.state = state;
    }

    /// Closes block `height`: updates the base fee with the configured target and denominator
    /// and returns the new state.
    pub fn end_block(&mut self, height: u64, gas_wanted_total: u64) -> BlockFeeState {
        let state = self.end_block_state(height, gas_wanted_total);
        self.commit(state.clone());
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FeeMarketParams {
        FeeMarketParams::default().with_block_gas_limit(20_000_000)
    }

    #[test]
    fn test_genesis_base_fee() {
        let market = FeeMarket::new(params());
        assert_eq!(market.current_base_fee(), U256::from(1_000_000_000u64));
        assert_eq!(market.snapshot().height, 0);
    }

    #[test]
    fn test_admission_floor_uses_min_gas_price() {
        let market = FeeMarket::new(params().with_min_gas_price(U256::from(2_000_000_000u64)));
        assert_eq!(market.admission_floor(), U256::from(2_000_000_000u64));
        assert!(market.check_admission_price(U256::from(1_999_999_999u64)).is_err());
        assert!(market.check_admission_price(U256::from(2_000_000_000u64)).is_ok());
    }

    #[test]
    fn test_end_block_updates_once() {
        let mut market = FeeMarket::new(params());
        let state = market.end_block(1, 15_000_000);
        assert_eq!(state.base_fee, U256::from(1_062_500_000u64));
        assert_eq!(state.height, 1);
        assert_eq!(state.gas_wanted_last_block, 15_000_000);
    }

    #[test]
    fn test_no_base_fee_freezes() {
        let mut market = FeeMarket::new(
            params().with_no_base_fee(true).with_min_gas_price(U256::from(10)),
        );
        assert_eq!(market.current_base_fee(), U256::from(10));
        market.end_block(1, 20_000_000);
        assert_eq!(market.current_base_fee(), U256::from(10));
    }

    #[test]
    fn test_end_block_state_is_pure() {
        let mut market = FeeMarket::new(params());
        let state = market.end_block_state(1, 0);
        assert_eq!(state.base_fee, U256::from(875_000_000u64));
        assert_eq!(market.current_base_fee(), U256::from(1_000_000_000u64));
        assert_eq!(market.end_block_state(1, 0), state);

        market.commit(state.clone());
        assert_eq!(market.snapshot(), state);
    }

    #[test]
    fn test_phase() {
        let market = FeeMarket::new(params());
        let mut acc = BlockGasAccumulator::new();
        assert_eq!(market.phase(&acc), FeeMarketPhase::Stable);
        acc.record_gas_wanted(Default::default(), 21_000);
        assert_eq!(market.phase(&acc), FeeMarketPhase::PendingUpdate);
    }

    #[test]
    fn test_from_state_rejects_corrupt() {
        let state = BlockFeeState {
            base_fee: U256::from(1),
            gas_wanted_last_block: 0,
            min_gas_price: U256::from(2),
            height: 3,
        };
        assert!(matches!(
            FeeMarket::from_state(params(), state),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
