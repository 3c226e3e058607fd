use alloy_primitives::{Address, U256};
use k256::ecdsa::SigningKey;

use super::{address_of, sign_native, MockEvmExecutor, TestSigner};
use crate::{
    constants::native::{CHAIN_ID, FEE_DENOM},
    BlockProcessor, ChainConfig, Coin, Coins, EvmTx, Fee, MemoryState, Msg, NativeTx, Tx,
};

/// One gwei.
pub const GWEI: u64 = 1_000_000_000;

/// A processor over an in-memory state and the mock EVM.
pub type TestProcessor = BlockProcessor<MemoryState, MockEvmExecutor>;

/// Creates a processor with `config` and `state`.
pub fn processor(config: ChainConfig, state: MemoryState, evm: MockEvmExecutor) -> TestProcessor {
    BlockProcessor::new(config, state, evm, Default::default()).unwrap()
}

/// A coin of the default fee denomination.
pub fn fee_coins(amount: U256) -> Coins {
    Coins::from(vec![Coin::new(FEE_DENOM, amount)])
}

/// An unsigned native transfer of `amount` from `from` to `to`.
pub fn native_send(from: Address, to: Address, amount: u64, fee: U256, gas_limit: u64) -> NativeTx {
    NativeTx {
        messages: vec![Msg::Send { from, to, amount: fee_coins(U256::from(amount)) }],
        fee: Fee { amount: fee_coins(fee), gas_limit, payer: None },
        ..Default::default()
    }
}

/// Signs `body` with `key` for the default chain and wraps it with the dynamic fee option.
pub fn signed_native(
    key: &SigningKey,
    account_number: u64,
    sequence: u64,
    mut body: NativeTx,
    max_priority_price: U256,
) -> Tx {
    sign_native(&mut body, &[TestSigner { key, account_number, sequence }], CHAIN_ID);
    Tx::native(body, max_priority_price)
}

/// An EVM call on the default chain.
pub fn evm_call(
    from: &SigningKey,
    to: Address,
    gas_limit: u64,
    max_fee: u64,
    tip: u64,
    nonce: u64,
) -> EvmTx {
    EvmTx {
        from: address_of(from),
        to: Some(to),
        gas_limit,
        max_fee_per_gas: U256::from(max_fee),
        max_priority_fee_per_gas: U256::from(tip),
        chain_id: CHAIN_ID,
        nonce,
        ..Default::default()
    }
}
