//! Execution engines.
//!
//! The EVM interpreter is an external collaborator behind [`EvmExecutor`]. Native messages are
//! executed by a [`NativeMsgExecutor`], with [`DefaultMsgExecutor`] covering the built-in
//! message kinds.

use alloy_primitives::U256;
use auto_impl::auto_impl;
use tracing::trace;

use crate::{
    constants::native::{READ_COST, WRITE_COST},
    AccountState, AdmissionError, BlockInfo, EngineError, EvmExecutionOutcome, EvmTx, GasMeter,
    Msg, PrecompileRegistry,
};

/// What the EVM engine sees while executing a transaction.
pub struct ExecutionEnv<'a> {
    /// The state view. Writes are discarded when the execution fails.
    pub state: &'a mut dyn AccountState,
    /// The enabled precompiles.
    pub precompiles: &'a PrecompileRegistry,
    /// The block being built.
    pub block: &'a BlockInfo,
    /// The base fee of the block.
    pub base_fee: U256,
    /// The price per gas the transaction pays.
    pub effective_gas_price: U256,
    /// The denomination balances and values are held in.
    pub denom: &'a str,
}

impl core::fmt::Debug for ExecutionEnv<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecutionEnv")
            .field("block", &self.block)
            .field("base_fee", &self.base_fee)
            .field("effective_gas_price", &self.effective_gas_price)
            .finish_non_exhaustive()
    }
}

/// An EVM engine.
#[auto_impl(&, Box, Arc)]
pub trait EvmExecutor {
    /// Executes `tx`. A revert is reported through [`EvmExecutionOutcome::failed`]; `Err` is
    /// reserved for internal engine failures.
    fn execute(
        &self,
        tx: &EvmTx,
        env: &mut ExecutionEnv<'_>,
    ) -> Result<EvmExecutionOutcome, EngineError>;
}

/// Executes native messages, charging the transaction's meter.
#[auto_impl(&, Box, Arc)]
pub trait NativeMsgExecutor {
    /// Executes `msg`.
    fn execute(
        &self,
        msg: &Msg,
        meter: &mut GasMeter,
        state: &mut dyn AccountState,
    ) -> Result<(), AdmissionError>;
}

/// The built-in message executor.
#[derive(Debug, Clone, Copy)]
pub struct DefaultMsgExecutor {
    read_cost: u64,
    write_cost: u64,
}

impl Default for DefaultMsgExecutor {
    fn default() -> Self {
        Self { read_cost: READ_COST, write_cost: WRITE_COST }
    }
}

impl DefaultMsgExecutor {
    /// Creates an executor with custom storage costs.
    pub const fn new(read_cost: u64, write_cost: u64) -> Self {
        Self { read_cost, write_cost }
    }
}

impl NativeMsgExecutor for DefaultMsgExecutor {
    fn execute(
        &self,
        msg: &Msg,
        meter: &mut GasMeter,
        state: &mut dyn AccountState,
    ) -> Result<(), AdmissionError> {
        trace!(target: "dualgas::executor", type_url = msg.type_url(), "Executing message");
        match msg {
            Msg::Send { from, to, amount } => {
                for coin in amount.iter() {
                    meter.consume(self.read_cost, "read balance")?;
                    meter.consume(self.write_cost.saturating_mul(2), "write balance")?;
                    state.transfer(*from, *to, &coin.denom, coin.amount)?;
                }
            }
            Msg::RecvPacket { source_channel, sequence, .. } => {
                meter.consume(self.read_cost, "read packet receipt")?;
                // already received packets are no-ops
                if !state.is_packet_relayed(source_channel, *sequence) {
                    meter.consume(self.write_cost, "write packet receipt")?;
                    state.mark_packet_relayed(source_channel, *sequence);
                }
            }
            Msg::Exec { msgs, .. } => {
                for msg in msgs {
                    self.execute(msg, meter, state)?;
                }
            }
            Msg::Other { gas_cost, .. } => meter.consume(*gas_cost, "msg execution")?,
            Msg::EthereumTx(_) => {
                return Err(AdmissionError::DisallowedMessage {
                    type_url: msg.type_url().to_string(),
                })
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coin, Coins, MemoryState};
    use alloy_primitives::Address;

    #[test]
    fn test_send_charges_meter() {
        let (a, b) = (Address::with_last_byte(1), Address::with_last_byte(2));
        let mut state = MemoryState::new().with_funded_account(a, "agas", U256::from(10));
        let mut meter = GasMeter::new(100_000);
        let amount = Coins::from(vec![Coin::new("agas", U256::from(4))]);
        let msg = Msg::Send { from: a, to: b, amount };
        DefaultMsgExecutor::default().execute(&msg, &mut meter, &mut state).unwrap();
        assert_eq!(meter.consumed(), READ_COST + 2 * WRITE_COST);
        assert_eq!(state.balance(&b, "agas"), U256::from(4));
    }

    #[test]
    fn test_out_of_gas() {
        let mut state = MemoryState::new();
        let mut meter = GasMeter::new(100);
        let msg = Msg::Other { type_url: "/x".into(), signer: Address::ZERO, gas_cost: 101 };
        let err = DefaultMsgExecutor::default().execute(&msg, &mut meter, &mut state).unwrap_err();
        assert_eq!(err.out_of_gas_usage(), Some((100, 101)));
    }

    #[test]
    fn test_packet_receipt_written_once() {
        let mut state = MemoryState::new();
        let mut meter = GasMeter::new(100_000);
        let msg = Msg::RecvPacket {
            signer: Address::ZERO,
            source_channel: "channel-0".into(),
            sequence: 1,
        };
        let executor = DefaultMsgExecutor::default();
        executor.execute(&msg, &mut meter, &mut state).unwrap();
        executor.execute(&msg, &mut meter, &mut state).unwrap();
        assert_eq!(meter.consumed(), 2 * READ_COST + WRITE_COST);
        assert!(state.is_packet_relayed("channel-0", 1));
    }
}
