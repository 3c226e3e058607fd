use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, Log};

use crate::{EngineError, EvmExecutionOutcome, EvmExecutor, EvmTx, ExecutionEnv};

/// How [`MockEvmExecutor`] behaves for a callee.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCall {
    /// Gas used on top of the intrinsic gas.
    pub execution_gas: u64,
    /// The refund reported to the reconciler.
    pub refund: u64,
    /// Revert after using the gas.
    pub revert: bool,
    /// Fail with an [`EngineError`].
    pub engine_error: bool,
}

impl MockCall {
    /// A call using `execution_gas` on top of the intrinsic gas.
    pub const fn gas(execution_gas: u64) -> Self {
        Self { execution_gas, refund: 0, revert: false, engine_error: false }
    }

    /// Set the reported refund.
    pub const fn with_refund(mut self, refund: u64) -> Self {
        self.refund = refund;
        self
    }

    /// Revert the call.
    pub const fn reverting(mut self) -> Self {
        self.revert = true;
        self
    }

    /// Fail the engine.
    pub const fn engine_failure(mut self) -> Self {
        self.engine_error = true;
        self
    }
}

/// A deterministic stand-in for the EVM interpreter.
///
/// Gas used is the intrinsic gas plus the configured execution gas of the callee, plus the cost
/// of a precompile when the callee is one. A call needing more than its gas limit fails with
/// `gas_used == gas_limit`. Successful calls transfer `value` and emit one log from the callee.
#[derive(Debug, Clone, Default)]
pub struct MockEvmExecutor {
    calls: BTreeMap<Address, MockCall>,
    default: MockCall,
}

impl MockEvmExecutor {
    /// Creates an executor where every call costs only its intrinsic gas.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the behavior for calls to `to`.
    pub fn with_call(mut self, to: Address, call: MockCall) -> Self {
        self.calls.insert(to, call);
        self
    }

    /// Configure the behavior for every other callee.
    pub const fn with_default(mut self, call: MockCall) -> Self {
        self.default = call;
        self
    }

    fn failed(gas_used: u64) -> EvmExecutionOutcome {
        EvmExecutionOutcome { gas_used, failed: true, ..Default::default() }
    }
}

impl EvmExecutor for MockEvmExecutor {
    fn execute(
        &self,
        tx: &EvmTx,
        env: &mut ExecutionEnv<'_>,
    ) -> Result<EvmExecutionOutcome, EngineError> {
        let call = tx.to.and_then(|to| self.calls.get(&to).copied()).unwrap_or(self.default);
        if call.engine_error {
            return Err(EngineError("mock engine failure".to_string()));
        }

        let mut gas_used = tx.intrinsic_gas().saturating_add(call.execution_gas);
        let mut output = Bytes::new();
        if let Some(precompile) = tx.to.as_ref().and_then(|to| env.precompiles.lookup(to)) {
            match precompile.run(&tx.data, tx.gas_limit.saturating_sub(gas_used)) {
                Ok(out) => {
                    gas_used += out.gas_used;
                    output = out.bytes;
                }
                Err(_) => return Ok(Self::failed(tx.gas_limit)),
            }
        }
        if gas_used > tx.gas_limit {
            return Ok(Self::failed(tx.gas_limit));
        }
        if call.revert {
            return Ok(Self::failed(gas_used));
        }

        let to = tx.to.unwrap_or_default();
        if !tx.value.is_zero() && env.state.transfer(tx.from, to, env.denom, tx.value).is_err() {
            return Ok(Self::failed(gas_used));
        }

        Ok(EvmExecutionOutcome {
            gas_used,
            refund_eligible: call.refund,
            failed: false,
            logs: vec![Log::new_unchecked(to, Vec::new(), tx.data.clone())],
            output,
        })
    }
}
