//! Block processing.
//!
//! [`BlockProcessor`] drives the block cycle: `on_block_begin`, one `deliver_tx` per
//! transaction in consensus order, and `on_block_end`, which moves the base fee and persists
//! the fee state.
//!
//! Every transaction goes through two commit boundaries. The admission phase runs on a
//! [`StateOverlay`] that is committed only if the whole chain accepts the transaction, so a
//! rejected transaction is never charged. The execution phase runs on a second overlay that is
//! committed only if execution succeeds; fees are charged either way.

use alloy_primitives::{Address, Bytes, Log, B256};
use tracing::{debug, info, warn};

use crate::{
    AccountState, AdmissionError, AnteContext, AnteOutcome, BlockFeeState, BlockGasAccumulator,
    BlockInfo, ChainConfig, ChainKind, DefaultMsgExecutor, EvmExecutor, ExecutionEnv,
    FeeDistribution, FeeMarket, FeeMarketPhase, FeeStateStore, GasReconciler, MemoryFeeStateStore,
    NativeMsgExecutor, PrecompileRegistry, ProcessorError, StateChangeset, StateOverlay, StoreError,
    Tx, TxBody, TxRouter,
};

/// The outcome of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Admitted and executed.
    Success,
    /// Admitted and charged, but execution failed. Execution state changes were discarded.
    Failed(AdmissionError),
    /// Not admitted. Nothing was charged or written.
    Rejected(AdmissionError),
}

impl TxStatus {
    /// Returns `true` for [`TxStatus::Success`].
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns the error of a failed or rejected transaction.
    pub const fn error(&self) -> Option<&AdmissionError> {
        match self {
            Self::Success => None,
            Self::Failed(err) | Self::Rejected(err) => Some(err),
        }
    }
}

/// The receipt of a delivered transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// The transaction hash.
    pub tx_hash: B256,
    /// The chain the transaction was routed to, `None` if it could not be routed.
    pub kind: Option<ChainKind>,
    /// The outcome.
    pub status: TxStatus,
    /// The declared gas limit.
    pub gas_wanted: u64,
    /// The gas charged. Zero for rejected transactions.
    pub gas_used: u64,
    /// How the fee of an EVM transaction was split.
    pub fee: Option<FeeDistribution>,
    /// Logs of a successful EVM transaction.
    pub logs: Vec<Log>,
    /// Return data of an EVM transaction.
    pub output: Bytes,
}

impl TxReceipt {
    fn rejected(tx_hash: B256, gas_wanted: u64, err: AdmissionError) -> Self {
        Self {
            tx_hash,
            kind: None,
            status: TxStatus::Rejected(err),
            gas_wanted,
            gas_used: 0,
            fee: None,
            logs: Vec::new(),
            output: Bytes::new(),
        }
    }
}

/// The result of a successful admission.
#[derive(Debug)]
pub(crate) struct Admitted {
    pub(crate) kind: ChainKind,
    pub(crate) outcome: AnteOutcome,
    pub(crate) changes: StateChangeset,
}

/// The result of the execution phase.
#[derive(Debug)]
pub(crate) struct Executed {
    pub(crate) status: TxStatus,
    pub(crate) gas_used: u64,
    /// The changes to commit, `None` when they are discarded.
    pub(crate) changes: Option<StateChangeset>,
    pub(crate) fee: Option<FeeDistribution>,
    pub(crate) sender: Option<Address>,
    pub(crate) logs: Vec<Log>,
    pub(crate) output: Bytes,
}

/// Processes blocks of native and EVM transactions.
pub struct BlockProcessor<S, E, N = DefaultMsgExecutor, F = MemoryFeeStateStore> {
    config: ChainConfig,
    state: S,
    fee_market: FeeMarket,
    accumulator: BlockGasAccumulator,
    router: TxRouter,
    reconciler: GasReconciler,
    precompiles: PrecompileRegistry,
    evm: E,
    native: N,
    store: F,
    block: BlockInfo,
    receipts: Vec<TxReceipt>,
}

impl<S, E, N, F> core::fmt::Debug for BlockProcessor<S, E, N, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BlockProcessor")
            .field("block", &self.block)
            .field("fee_market", &self.fee_market)
            .field("accumulator", &self.accumulator)
            .field("receipts", &self.receipts.len())
            .finish_non_exhaustive()
    }
}

impl<S, E, F> BlockProcessor<S, E, DefaultMsgExecutor, F>
where
    S: AccountState,
    E: EvmExecutor,
    F: FeeStateStore,
{
    /// Creates a processor, restoring the fee market from `store`. Fails if `config` does not
    /// validate.
    pub fn new(config: ChainConfig, state: S, evm: E, store: F) -> Result<Self, ProcessorError> {
        config.validate()?;
        let fee_market = FeeMarket::load(config.fee_market.clone(), &store)?;
        let block = BlockInfo {
            height: fee_market.snapshot().height + 1,
            chain_id: config.chain_id,
            proposer: Address::ZERO,
        };
        Ok(Self {
            router: TxRouter::from_params(&config.ante, config.fee_market.block_gas_limit),
            reconciler: GasReconciler::new(config.reconciler),
            precompiles: PrecompileRegistry::new(config.precompiles.iter().copied()),
            config,
            state,
            fee_market,
            accumulator: BlockGasAccumulator::new(),
            evm,
            native: DefaultMsgExecutor::default(),
            store,
            block,
            receipts: Vec::new(),
        })
    }
}

impl<S, E, N, F> BlockProcessor<S, E, N, F>
where
    S: AccountState,
    E: EvmExecutor,
    N: NativeMsgExecutor,
    F: FeeStateStore,
{
    /// Replaces the native message executor.
    pub fn with_native_executor<N2: NativeMsgExecutor>(
        self,
        native: N2,
    ) -> BlockProcessor<S, E, N2, F> {
        BlockProcessor {
            config: self.config,
            state: self.state,
            fee_market: self.fee_market,
            accumulator: self.accumulator,
            router: self.router,
            reconciler: self.reconciler,
            precompiles: self.precompiles,
            evm: self.evm,
            native,
            store: self.store,
            block: self.block,
            receipts: self.receipts,
        }
    }

    /// Replaces the admission chains.
    pub fn with_router(mut self, router: TxRouter) -> Self {
        self.router = router;
        self
    }

    /// Starts a block.
    ///
    /// If the previous block never reached [`BlockProcessor::on_block_end`], its recorded gas
    /// wanted is kept and counts toward the base fee update at the end of `block`.
    pub fn on_block_begin(&mut self, block: BlockInfo) {
        if !self.accumulator.is_empty() {
            warn!(
                target: "dualgas::block",
                previous = self.block.height,
                height = block.height,
                carried_gas_wanted = self.accumulator.total(),
                "Starting a block before the previous one ended"
            );
        }
        debug!(
            target: "dualgas::block",
            height = block.height,
            base_fee = %self.fee_market.current_base_fee(),
            "Begin block"
        );
        self.block = block;
        self.receipts.clear();
    }

    /// Admits and executes `tx`. Failures are reported in the receipt and never abort the
    /// block.
    pub fn deliver_tx(&mut self, tx: &Tx) -> TxReceipt {
        let tx_hash = tx.hash();
        let gas_wanted = tx.gas_limit();

        let Admitted { kind, outcome, changes } = match self.admit(&self.state, tx, false) {
            Ok(admitted) => admitted,
            Err(err) => {
                debug!(target: "dualgas::block", %tx_hash, %err, "Transaction rejected");
                let receipt = TxReceipt::rejected(tx_hash, gas_wanted, err);
                self.receipts.push(receipt.clone());
                return receipt;
            }
        };
        changes.apply(&mut self.state);
        if let Some(amount) = outcome.gas_wanted {
            self.accumulator.record_gas_wanted(tx_hash, amount);
        }

        let executed = self.execute(&self.state, tx, kind, &outcome);
        if let Some(changes) = executed.changes {
            changes.apply(&mut self.state);
        }
        if let (Some(fee), Some(sender)) = (&executed.fee, executed.sender) {
            if let Err(err) = self.reconciler.settle(
                &mut self.state,
                fee,
                self.config.ante.fee_collector,
                sender,
                self.block.proposer,
                &self.config.ante.fee_denom,
            ) {
                warn!(target: "dualgas::block", %tx_hash, %err, "Failed to settle fees");
            }
        }

        let receipt = TxReceipt {
            tx_hash,
            kind: Some(kind),
            status: executed.status,
            gas_wanted,
            gas_used: executed.gas_used,
            fee: executed.fee,
            logs: executed.logs,
            output: executed.output,
        };
        debug!(
            target: "dualgas::block",
            %tx_hash,
            ?kind,
            success = receipt.status.is_success(),
            gas_used = receipt.gas_used,
            "Transaction delivered"
        );
        self.receipts.push(receipt.clone());
        receipt
    }

    /// Ends the block: persists the fee state for the next block, then moves the base fee and
    /// resets the accumulator.
    ///
    /// On a store failure neither the fee market nor the accumulator changes, so the call can be
    /// retried.
    pub fn on_block_end(&mut self) -> Result<BlockFeeState, StoreError> {
        let gas_wanted = self.accumulator.total();
        let state = self.fee_market.end_block_state(self.block.height, gas_wanted);
        self.store.save(&state)?;
        self.fee_market.commit(state.clone());
        self.accumulator.drain_and_reset();
        info!(
            target: "dualgas::block",
            height = state.height,
            txs = self.receipts.len(),
            gas_wanted,
            next_base_fee = %state.base_fee,
            "End block"
        );
        Ok(state)
    }

    /// Runs the admission chain on an overlay over `state`.
    pub(crate) fn admit(
        &self,
        state: &dyn AccountState,
        tx: &Tx,
        simulate: bool,
    ) -> Result<Admitted, AdmissionError> {
        let mut overlay = StateOverlay::new(state);
        let mut ctx = AnteContext::new(
            &mut overlay,
            &self.fee_market,
            &self.config.ante,
            &self.block,
            tx,
        )
        .with_simulate(simulate);
        let result = self.router.admit(&mut ctx, tx);
        let outcome = ctx.finish();
        let kind = result?;
        Ok(Admitted { kind, outcome, changes: overlay.into_changeset() })
    }

    /// Executes an admitted transaction on an overlay over `state`.
    pub(crate) fn execute(
        &self,
        state: &dyn AccountState,
        tx: &Tx,
        kind: ChainKind,
        outcome: &AnteOutcome,
    ) -> Executed {
        let mut meter = outcome.meter;
        let mut overlay = StateOverlay::new(state);

        match (&tx.body, kind) {
            (TxBody::Native(native), ChainKind::Native) => {
                let result = native
                    .messages
                    .iter()
                    .try_for_each(|msg| self.native.execute(msg, &mut meter, &mut overlay));
                let (status, gas_used, changes) = match result {
                    Ok(()) => (TxStatus::Success, meter.consumed(), Some(overlay.into_changeset())),
                    Err(err) => {
                        let gas_used =
                            err.out_of_gas_usage().map_or(meter.consumed(), |(limit, _)| limit);
                        (TxStatus::Failed(err), gas_used, None)
                    }
                };
                Executed {
                    status,
                    gas_used,
                    changes,
                    fee: None,
                    sender: None,
                    logs: Vec::new(),
                    output: Bytes::new(),
                }
            }
            (TxBody::Evm(evm), ChainKind::Evm) => {
                let base_fee = self.fee_market.current_base_fee();
                let effective_gas_price = outcome.effective_gas_price.unwrap_or(base_fee);
                let result = {
                    let mut env = ExecutionEnv {
                        state: &mut overlay,
                        precompiles: &self.precompiles,
                        block: &self.block,
                        base_fee,
                        effective_gas_price,
                        denom: &self.config.ante.fee_denom,
                    };
                    self.evm.execute(evm, &mut env)
                };

                let (status, gas_used, commit, logs, output) = match result {
                    Ok(result) => {
                        let gas = self.reconciler.reconcile(
                            evm.gas_limit,
                            result.gas_used,
                            result.refund_eligible,
                        );
                        if gas.out_of_gas {
                            let err = AdmissionError::OutOfGas {
                                descriptor: "evm execution",
                                gas_wanted: evm.gas_limit,
                                gas_used: result.gas_used,
                            };
                            (TxStatus::Failed(err), gas.gas_used, false, Vec::new(), result.output)
                        } else if result.failed {
                            let err = AdmissionError::ExecutionReverted { gas_used: gas.gas_used };
                            (TxStatus::Failed(err), gas.gas_used, false, Vec::new(), result.output)
                        } else {
                            (TxStatus::Success, gas.gas_used, true, result.logs, result.output)
                        }
                    }
                    Err(err) => {
                        warn!(target: "dualgas::block", %err, "Execution engine failed");
                        let status = TxStatus::Failed(err.into());
                        (status, evm.gas_limit, false, Vec::new(), Bytes::new())
                    }
                };
                meter.set_consumed(gas_used);

                let fee = self.reconciler.distribute(
                    evm.gas_limit,
                    meter.consumed(),
                    effective_gas_price,
                    base_fee,
                );
                Executed {
                    status,
                    gas_used: meter.consumed(),
                    changes: commit.then(|| overlay.into_changeset()),
                    fee: Some(fee),
                    sender: Some(evm.from),
                    logs,
                    output,
                }
            }
            _ => Executed {
                status: TxStatus::Failed(AdmissionError::ExtensionMismatch {
                    expected: match kind {
                        ChainKind::Native => "native",
                        ChainKind::Evm => "evm",
                    },
                }),
                gas_used: 0,
                changes: None,
                fee: None,
                sender: None,
                logs: Vec::new(),
                output: Bytes::new(),
            },
        }
    }

    /// Returns the configuration.
    pub const fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Returns the committed state.
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// Returns the committed state mutably, e.g. to apply genesis.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.state
    }

    /// Returns the fee market.
    pub const fn fee_market(&self) -> &FeeMarket {
        &self.fee_market
    }

    /// Returns the fee market phase of the current block.
    pub fn phase(&self) -> FeeMarketPhase {
        self.fee_market.phase(&self.accumulator)
    }

    /// Returns the accumulator of the current block.
    pub const fn accumulator(&self) -> &BlockGasAccumulator {
        &self.accumulator
    }

    /// Returns the precompile registry.
    pub const fn precompiles(&self) -> &PrecompileRegistry {
        &self.precompiles
    }

    /// Returns the router.
    pub const fn router(&self) -> &TxRouter {
        &self.router
    }

    /// Returns the fee state store.
    pub const fn store(&self) -> &F {
        &self.store
    }

    /// Returns the current block.
    pub const fn block(&self) -> &BlockInfo {
        &self.block
    }

    /// Returns the receipts of the current block.
    pub fn receipts(&self) -> &[TxReceipt] {
        &self.receipts
    }
}
