//! The EVM admission chain.
//!
//! All checks an EVM transaction needs are fused into [`EvmMonoDecorator`], which validates
//! everything before it writes anything.

use alloy_primitives::U256;
use tracing::debug;

use super::{AnteChain, AnteContext, AnteDecorator};
use crate::{AdmissionError, ExtensionOption, GasReconciler, Tx, TxBody};

/// Builds the EVM chain.
pub fn evm_ante_chain() -> AnteChain {
    AnteChain::builder().then(RejectExtensionMismatchDecorator).then(EvmMonoDecorator).build()
}

/// Requires an EVM body led by the EVM extension option. Trailing options are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectExtensionMismatchDecorator;

impl AnteDecorator for RejectExtensionMismatchDecorator {
    fn name(&self) -> &'static str {
        "reject_extension_mismatch"
    }

    fn handle(&self, _ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        if !matches!(tx.body, TxBody::Evm(_)) {
            return Err(AdmissionError::ExtensionMismatch { expected: "evm" });
        }
        if tx.extension_options.first() != Some(&ExtensionOption::EthereumTx) {
            return Err(AdmissionError::InvalidExtensionOption(
                "evm transactions must lead with the ethereum extension option".to_string(),
            ));
        }
        Ok(())
    }
}

/// The fused EVM admission step.
///
/// Validates, in order: the sender account (created empty when unknown), the chain id, the
/// intrinsic gas, the gas limit, the fee caps, the fee market price, the balance and the nonce.
/// Then pre-charges `gas_limit * effective_price`, resets the meter to the gas limit,
/// increments the nonce and records the gas wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvmMonoDecorator;

impl AnteDecorator for EvmMonoDecorator {
    fn name(&self) -> &'static str {
        "evm_mono"
    }

    fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let TxBody::Evm(evm) = &tx.body else {
            return Err(AdmissionError::ExtensionMismatch { expected: "evm" });
        };

        let mut account = ctx.state.get_or_create_account(evm.from);

        if evm.chain_id != ctx.block.chain_id {
            return Err(AdmissionError::InvalidChainId {
                expected: ctx.block.chain_id,
                got: evm.chain_id,
            });
        }

        let intrinsic_gas = evm.intrinsic_gas();
        if evm.gas_limit < intrinsic_gas {
            return Err(AdmissionError::IntrinsicGasTooLow {
                gas_limit: evm.gas_limit,
                intrinsic_gas,
            });
        }
        if evm.gas_limit > ctx.params.max_tx_gas {
            return Err(AdmissionError::GasLimitExceeded {
                gas_limit: evm.gas_limit,
                limit: ctx.params.max_tx_gas,
            });
        }

        if evm.max_priority_fee_per_gas > evm.max_fee_per_gas {
            return Err(AdmissionError::TipAboveFeeCap {
                max_priority_fee: evm.max_priority_fee_per_gas,
                max_fee: evm.max_fee_per_gas,
            });
        }
        let effective_price = evm.effective_gas_price(ctx.fee_market.current_base_fee());
        ctx.fee_market.check_admission_price(effective_price)?;

        let denom = ctx.params.fee_denom.as_str();
        let fee = GasReconciler::precharge(evm.gas_limit, effective_price);
        let required = fee.saturating_add(evm.value);
        let balance = ctx.state.balance(&evm.from, denom);
        if balance < required {
            return Err(AdmissionError::InsufficientFunds { address: evm.from, balance, required });
        }

        if evm.nonce != account.sequence {
            return Err(AdmissionError::SequenceMismatch {
                address: evm.from,
                expected: account.sequence,
                got: evm.nonce,
            });
        }

        if fee > U256::ZERO {
            ctx.state.transfer(evm.from, ctx.params.fee_collector, denom, fee)?;
        }
        ctx.reset_gas_meter(evm.gas_limit);
        account.sequence = account.sequence.saturating_add(1);
        ctx.state.set_account(account);
        ctx.set_effective_gas_price(effective_price);
        ctx.record_gas_wanted(evm.gas_limit);

        debug!(
            target: "dualgas::ante",
            tx_hash = %ctx.tx_hash,
            from = %evm.from,
            gas_limit = evm.gas_limit,
            %effective_price,
            %fee,
            "Admitted evm transaction"
        );
        Ok(())
    }
}
