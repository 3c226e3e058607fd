//! Admission pipeline.
//!
//! A transaction is routed to one of two decorator chains by its first extension option. Each
//! decorator either passes the transaction on or rejects it with a named failure; the chain
//! stops at the first rejection. Decorators write through the [`AnteContext`]'s state view,
//! which the caller commits only when the whole chain succeeds.

mod evm;
mod native;
mod router;

pub use evm::*;
pub use native::*;
pub use router::*;

use alloy_primitives::{B256, U256};
use auto_impl::auto_impl;
use delegate::delegate;
use tracing::{debug, trace};

use crate::{AccountState, AdmissionError, AnteParams, BlockInfo, FeeMarket, GasMeter, Tx};

/// Everything a decorator may read or write while admitting a transaction.
pub struct AnteContext<'a> {
    /// The state view. Writes are buffered by the caller.
    pub state: &'a mut dyn AccountState,
    /// The fee market of the current block.
    pub fee_market: &'a FeeMarket,
    /// Admission parameters.
    pub params: &'a AnteParams,
    /// The block being built.
    pub block: &'a BlockInfo,
    /// The hash of the transaction.
    pub tx_hash: B256,
    /// The length of the encoded transaction.
    pub tx_size: usize,
    /// Simulation mode, used by gas estimation. Signatures are charged but not verified.
    pub simulate: bool,
    meter: GasMeter,
    gas_wanted: Option<u64>,
    effective_gas_price: Option<U256>,
}

impl core::fmt::Debug for AnteContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnteContext")
            .field("tx_hash", &self.tx_hash)
            .field("meter", &self.meter)
            .field("gas_wanted", &self.gas_wanted)
            .finish_non_exhaustive()
    }
}

/// What an admitted transaction carries over to execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnteOutcome {
    /// The transaction's gas meter.
    pub meter: GasMeter,
    /// The gas wanted to record into the block accumulator.
    pub gas_wanted: Option<u64>,
    /// The per-gas price pre-charged for an EVM transaction.
    pub effective_gas_price: Option<U256>,
}

impl<'a> AnteContext<'a> {
    /// Creates a context for `tx`. The meter starts with the transaction's gas limit.
    pub fn new(
        state: &'a mut dyn AccountState,
        fee_market: &'a FeeMarket,
        params: &'a AnteParams,
        block: &'a BlockInfo,
        tx: &Tx,
    ) -> Self {
        Self {
            state,
            fee_market,
            params,
            block,
            tx_hash: tx.hash(),
            tx_size: tx.encode().len(),
            simulate: false,
            meter: GasMeter::new(tx.gas_limit()),
            gas_wanted: None,
            effective_gas_price: None,
        }
    }

    /// Enables or disables simulation mode.
    pub fn with_simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    delegate! {
        to self.meter {
            /// Consumes gas from the transaction's meter.
            #[call(consume)]
            pub fn consume_gas(
                &mut self,
                amount: u64,
                descriptor: &'static str,
            ) -> Result<(), AdmissionError>;
            /// Resets the transaction's meter to a new limit.
            #[call(reset)]
            pub fn reset_gas_meter(&mut self, limit: u64);
            /// Returns the gas consumed so far.
            #[call(consumed)]
            pub fn gas_consumed(&self) -> u64;
            /// Returns the gas left.
            #[call(remaining)]
            pub fn gas_remaining(&self) -> u64;
        }
    }

    /// Returns the transaction's meter.
    pub const fn meter(&self) -> &GasMeter {
        &self.meter
    }

    /// Records the gas the transaction wants from the block.
    pub fn record_gas_wanted(&mut self, amount: u64) {
        self.gas_wanted = Some(amount);
    }

    /// Returns the gas wanted recorded so far.
    pub const fn gas_wanted(&self) -> Option<u64> {
        self.gas_wanted
    }

    /// Sets the per-gas price pre-charged for an EVM transaction.
    pub fn set_effective_gas_price(&mut self, price: U256) {
        self.effective_gas_price = Some(price);
    }

    /// Consumes the context, releasing the state view.
    pub fn finish(self) -> AnteOutcome {
        AnteOutcome {
            meter: self.meter,
            gas_wanted: self.gas_wanted,
            effective_gas_price: self.effective_gas_price,
        }
    }
}

/// One step of an admission chain.
#[auto_impl(&, Box, Arc)]
pub trait AnteDecorator: Send + Sync {
    /// The name used in logs.
    fn name(&self) -> &'static str;

    /// Checks and prepares `tx`. `Err` terminates the chain.
    fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError>;
}

/// An ordered list of decorators, built once at startup.
#[derive(Default)]
pub struct AnteChain {
    decorators: Vec<Box<dyn AnteDecorator>>,
}

impl core::fmt::Debug for AnteChain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl AnteChain {
    /// Returns a builder for a new chain.
    pub fn builder() -> AnteChainBuilder {
        AnteChainBuilder::default()
    }

    /// Returns the decorator names in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.decorators.iter().map(|d| d.name()).collect()
    }

    /// Returns the number of decorators.
    pub fn len(&self) -> usize {
        self.decorators.len()
    }

    /// Returns `true` if the chain has no decorator.
    pub fn is_empty(&self) -> bool {
        self.decorators.is_empty()
    }

    /// Runs every decorator in order and stops at the first rejection.
    pub fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        for decorator in &self.decorators {
            trace!(
                target: "dualgas::ante",
                decorator = decorator.name(),
                tx_hash = %ctx.tx_hash,
                "Running decorator"
            );
            if let Err(err) = decorator.handle(ctx, tx) {
                debug!(
                    target: "dualgas::ante",
                    decorator = decorator.name(),
                    tx_hash = %ctx.tx_hash,
                    %err,
                    "Rejected transaction"
                );
                return Err(err);
            }
        }
        Ok(())
    }
}

/// Builds an [`AnteChain`].
#[derive(Default)]
pub struct AnteChainBuilder {
    decorators: Vec<Box<dyn AnteDecorator>>,
}

impl core::fmt::Debug for AnteChainBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AnteChainBuilder").field("len", &self.decorators.len()).finish()
    }
}

impl AnteChainBuilder {
    /// Appends a decorator.
    pub fn then(mut self, decorator: impl AnteDecorator + 'static) -> Self {
        self.decorators.push(Box::new(decorator));
        self
    }

    /// Appends a decorator if `enabled`.
    pub fn then_if(self, enabled: bool, decorator: impl AnteDecorator + 'static) -> Self {
        if enabled {
            self.then(decorator)
        } else {
            self
        }
    }

    /// Finishes the chain.
    pub fn build(self) -> AnteChain {
        AnteChain { decorators: self.decorators }
    }
}
