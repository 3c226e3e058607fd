//! Reconciliation of the EVM's gas accounting with the transaction's gas meter.
//!
//! The EVM's own `gas_used` is authoritative for EVM transactions. The reconciler caps the
//! refund the engine reports, applies the optional minimum-gas floor, and splits the
//! pre-charged fee into the sender refund, the proposer tip and the base fee portion.

use alloy_primitives::{Address, Bytes, Log, U256};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    constants::{evm::REFUND_CAP_DIVISOR, fee_market::BPS_DENOMINATOR},
    AccountState, AdmissionError, ConfigError,
};

/// Parameters of the [`GasReconciler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerParams {
    /// The refund is capped to `gas_used / refund_cap_divisor`.
    pub refund_cap_divisor: u64,
    /// The charged gas is at least `gas_limit * min_gas_multiplier_bps / 10_000`. `0` disables
    /// the floor.
    pub min_gas_multiplier_bps: u64,
}

impl Default for ReconcilerParams {
    fn default() -> Self {
        Self { refund_cap_divisor: REFUND_CAP_DIVISOR, min_gas_multiplier_bps: 0 }
    }
}

impl ReconcilerParams {
    /// Set a custom refund cap divisor.
    pub const fn with_refund_cap_divisor(mut self, divisor: u64) -> Self {
        self.refund_cap_divisor = divisor;
        self
    }

    /// Set a custom minimum gas multiplier, in basis points of the gas limit.
    pub const fn with_min_gas_multiplier_bps(mut self, bps: u64) -> Self {
        self.min_gas_multiplier_bps = bps;
        self
    }

    /// Checks the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refund_cap_divisor == 0 {
            return Err(ConfigError::Invalid {
                field: "refund_cap_divisor",
                reason: "must be non-zero",
            });
        }
        if self.min_gas_multiplier_bps > BPS_DENOMINATOR {
            return Err(ConfigError::Invalid {
                field: "min_gas_multiplier_bps",
                reason: "must not exceed 10000",
            });
        }
        Ok(())
    }
}

/// What the EVM engine reports after executing a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvmExecutionOutcome {
    /// The gas used before refunds.
    pub gas_used: u64,
    /// The refund the engine accrued, before capping.
    pub refund_eligible: u64,
    /// Whether the execution reverted or halted.
    pub failed: bool,
    /// Logs emitted, empty when failed.
    pub logs: Vec<Log>,
    /// Return data.
    pub output: Bytes,
}

/// The charged gas after reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciledGas {
    /// The gas charged to the sender.
    pub gas_used: u64,
    /// The refund granted by the engine after capping.
    pub capped_refund: u64,
    /// Whether the engine reported more gas than the limit.
    pub out_of_gas: bool,
}

/// How the pre-charged fee is split. `charged == refund + tip + base_fee_amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeDistribution {
    /// `gas_limit * effective_price`, pre-charged at admission.
    pub charged: U256,
    /// `(gas_limit - gas_used) * effective_price`, returned to the sender.
    pub refund: U256,
    /// `gas_used * (effective_price - base_fee)`, paid to the block proposer.
    pub tip: U256,
    /// `gas_used * base_fee`, kept by the fee collector.
    pub base_fee_amount: U256,
}

/// Reconciles EVM gas accounting and distributes fees.
#[derive(Debug, Clone, Copy, Default)]
pub struct GasReconciler {
    params: ReconcilerParams,
}

impl GasReconciler {
    /// Creates a reconciler.
    pub const fn new(params: ReconcilerParams) -> Self {
        Self { params }
    }

    /// Returns the parameters.
    pub const fn params(&self) -> &ReconcilerParams {
        &self.params
    }

    /// The amount pre-charged at admission.
    pub fn precharge(gas_limit: u64, effective_price: U256) -> U256 {
        U256::from(gas_limit).saturating_mul(effective_price)
    }

    /// Computes the gas charged for an execution that used `gas_used_by_evm` and accrued
    /// `refund_eligible` refund.
    pub fn reconcile(
        &self,
        gas_limit: u64,
        gas_used_by_evm: u64,
        refund_eligible: u64,
    ) -> ReconciledGas {
        if gas_used_by_evm > gas_limit {
            return ReconciledGas { gas_used: gas_limit, capped_refund: 0, out_of_gas: true };
        }

        let max_refund = gas_used_by_evm.checked_div(self.params.refund_cap_divisor).unwrap_or(0);
        let capped_refund = refund_eligible.min(max_refund);
        let mut gas_used = gas_used_by_evm - capped_refund;

        if self.params.min_gas_multiplier_bps > 0 {
            let floor = (gas_limit as u128 * self.params.min_gas_multiplier_bps as u128 /
                BPS_DENOMINATOR as u128) as u64;
            gas_used = gas_used.max(floor);
        }

        ReconciledGas { gas_used: gas_used.min(gas_limit), capped_refund, out_of_gas: false }
    }

    /// Splits the pre-charged fee of a transaction that was charged `gas_used`.
    pub fn distribute(
        &self,
        gas_limit: u64,
        gas_used: u64,
        effective_price: U256,
        base_fee: U256,
    ) -> FeeDistribution {
        let gas_used = gas_used.min(gas_limit);
        let charged = Self::precharge(gas_limit, effective_price);
        let refund = U256::from(gas_limit - gas_used).saturating_mul(effective_price);
        let retained = charged - refund;
        let tip = U256::from(gas_used)
            .saturating_mul(effective_price.saturating_sub(base_fee))
            .min(retained);
        FeeDistribution { charged, refund, tip, base_fee_amount: retained - tip }
    }

    /// Pays out `distribution` from the fee collector: the refund to `sender`, the tip to
    /// `proposer`.
    pub fn settle(
        &self,
        state: &mut dyn AccountState,
        distribution: &FeeDistribution,
        fee_collector: Address,
        sender: Address,
        proposer: Address,
        denom: &str,
    ) -> Result<(), AdmissionError> {
        if !distribution.refund.is_zero() {
            state.transfer(fee_collector, sender, denom, distribution.refund)?;
        }
        if !distribution.tip.is_zero() {
            state.transfer(fee_collector, proposer, denom, distribution.tip)?;
        }
        debug!(
            target: "dualgas::reconcile",
            %sender,
            %proposer,
            charged = %distribution.charged,
            refund = %distribution.refund,
            tip = %distribution.tip,
            base_fee_amount = %distribution.base_fee_amount,
            "Settled fees"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refund_capped_at_half() {
        let reconciler = GasReconciler::default();
        let gas = reconciler.reconcile(100_000, 60_000, 20_000);
        assert_eq!(gas.gas_used, 40_000);
        assert_eq!(gas.capped_refund, 20_000);

        let gas = reconciler.reconcile(100_000, 60_000, 50_000);
        assert_eq!(gas.capped_refund, 30_000);
        assert_eq!(gas.gas_used, 30_000);
    }

    #[test]
    fn test_over_limit_is_out_of_gas() {
        let gas = GasReconciler::default().reconcile(50_000, 60_000, 10_000);
        assert!(gas.out_of_gas);
        assert_eq!(gas.gas_used, 50_000);
    }

    #[test]
    fn test_min_gas_multiplier_floor() {
        let reconciler =
            GasReconciler::new(ReconcilerParams::default().with_min_gas_multiplier_bps(5_000));
        assert_eq!(reconciler.reconcile(100_000, 21_000, 0).gas_used, 50_000);
        assert_eq!(reconciler.reconcile(100_000, 80_000, 0).gas_used, 80_000);
    }

    #[test]
    fn test_distribution_conserves_fee() {
        let dist = GasReconciler::default().distribute(
            100_000,
            40_000,
            U256::from(12),
            U256::from(10),
        );
        assert_eq!(dist.charged, U256::from(1_200_000));
        assert_eq!(dist.refund, U256::from(720_000));
        assert_eq!(dist.tip, U256::from(80_000));
        assert_eq!(dist.base_fee_amount, U256::from(400_000));
        assert_eq!(dist.charged, dist.refund + dist.tip + dist.base_fee_amount);
    }
}
