//! End-to-end tests of the block cycle: admission, execution, gas reconciliation and the fee
//! market update.

use alloy_primitives::{Address, U256};
use dualgas::{
    constants::native::{FEE_COLLECTOR, FEE_DENOM},
    test_utils::{
        address_of, evm_call, native_send, processor, signed_native, signing_key, MockCall,
        MockEvmExecutor, TestProcessor, GWEI,
    },
    AccountState, AdmissionError, AnteParams, BlockInfo, ChainConfig, ChainKind, EngineError,
    FeeDistribution, FeeMarketPhase, FeeStateStore, MemoryState, PrecompileModule, Tx, TxStatus,
};
use k256::ecdsa::SigningKey;
use proptest::prelude::*;
use rstest::rstest;
use sha2::{Digest, Sha256};

const CONTRACT: Address = Address::with_last_byte(0xc0);
const PROPOSER: Address = Address::with_last_byte(0xfe);

fn initial_balance() -> U256 {
    U256::from(10).pow(U256::from(24))
}

fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::from(GWEI)
}

fn setup_with(config: ChainConfig, evm: MockEvmExecutor) -> (TestProcessor, SigningKey, Address) {
    let key = signing_key(1);
    let alice = address_of(&key);
    let state = MemoryState::new().with_funded_account(alice, FEE_DENOM, initial_balance());
    let mut processor = processor(config, state, evm);
    let block = BlockInfo { proposer: PROPOSER, ..processor.block().clone() };
    processor.on_block_begin(block);
    (processor, key, alice)
}

fn setup(evm: MockEvmExecutor) -> (TestProcessor, SigningKey, Address) {
    setup_with(ChainConfig::default(), evm)
}

fn balance(processor: &TestProcessor, address: Address) -> U256 {
    processor.state().balance(&address, FEE_DENOM)
}

fn nonce(processor: &TestProcessor, address: Address) -> u64 {
    processor.state().account(&address).map_or(0, |account| account.sequence)
}

#[test]
fn test_evm_refund_is_capped_and_fees_are_split() {
    // 21_000 intrinsic + 39_000 execution = 60_000 used, 20_000 refund eligible
    let evm = MockEvmExecutor::new().with_call(CONTRACT, MockCall::gas(39_000).with_refund(20_000));
    let (mut processor, key, alice) = setup(evm);

    let tx = Tx::evm(evm_call(&key, CONTRACT, 100_000, 2 * GWEI, GWEI, 0));
    let receipt = processor.deliver_tx(&tx);

    assert_eq!(receipt.status, TxStatus::Success);
    assert_eq!(receipt.kind, Some(ChainKind::Evm));
    assert_eq!(receipt.gas_wanted, 100_000);
    assert_eq!(receipt.gas_used, 40_000);
    assert_eq!(receipt.logs.len(), 1);
    assert_eq!(
        receipt.fee,
        Some(FeeDistribution {
            charged: gwei(200_000),
            refund: gwei(120_000),
            tip: gwei(40_000),
            base_fee_amount: gwei(40_000),
        })
    );

    assert_eq!(balance(&processor, alice), initial_balance() - gwei(80_000));
    assert_eq!(balance(&processor, PROPOSER), gwei(40_000));
    assert_eq!(balance(&processor, FEE_COLLECTOR), gwei(40_000));
    assert_eq!(nonce(&processor, alice), 1);
    assert_eq!(processor.accumulator().total(), 100_000);
}

#[rstest]
#[case::small_refund(39_000, 10_000, 50_000)]
#[case::capped_refund(39_000, 50_000, 30_000)]
#[case::no_refund(0, 0, 21_000)]
fn test_evm_gas_used(#[case] execution_gas: u64, #[case] refund: u64, #[case] expected: u64) {
    let evm = MockEvmExecutor::new()
        .with_call(CONTRACT, MockCall::gas(execution_gas).with_refund(refund));
    let (mut processor, key, _) = setup(evm);
    let call = evm_call(&key, CONTRACT, 100_000, 2 * GWEI, GWEI, 0);
    let receipt = processor.deliver_tx(&Tx::evm(call));
    assert!(receipt.status.is_success());
    assert_eq!(receipt.gas_used, expected);
}

#[test]
fn test_value_transfer_commits_on_success() {
    let (mut processor, key, alice) = setup(MockEvmExecutor::new());
    let mut call = evm_call(&key, CONTRACT, 21_000, GWEI, 0, 0);
    call.value = U256::from(1_000);
    let receipt = processor.deliver_tx(&Tx::evm(call));

    assert!(receipt.status.is_success());
    assert_eq!(balance(&processor, CONTRACT), U256::from(1_000));
    assert_eq!(balance(&processor, alice), initial_balance() - gwei(21_000) - U256::from(1_000));
}

#[test]
fn test_revert_discards_state_but_charges_gas() {
    let evm = MockEvmExecutor::new().with_call(CONTRACT, MockCall::gas(9_000).reverting());
    let (mut processor, key, alice) = setup(evm);
    let mut call = evm_call(&key, CONTRACT, 50_000, GWEI, 0, 0);
    call.value = U256::from(1_000);
    let receipt = processor.deliver_tx(&Tx::evm(call));

    assert_eq!(
        receipt.status,
        TxStatus::Failed(AdmissionError::ExecutionReverted { gas_used: 30_000 })
    );
    assert_eq!(receipt.gas_used, 30_000);
    assert!(receipt.logs.is_empty());
    assert_eq!(balance(&processor, CONTRACT), U256::ZERO);
    assert_eq!(balance(&processor, alice), initial_balance() - gwei(30_000));
    // the nonce bump belongs to admission and survives the revert
    assert_eq!(nonce(&processor, alice), 1);
}

#[test]
fn test_execution_out_of_gas_charges_the_limit() {
    let evm = MockEvmExecutor::new().with_call(CONTRACT, MockCall::gas(100_000));
    let (mut processor, key, alice) = setup(evm);
    let receipt = processor.deliver_tx(&Tx::evm(evm_call(&key, CONTRACT, 50_000, GWEI, 0, 0)));

    assert!(matches!(receipt.status, TxStatus::Failed(AdmissionError::ExecutionReverted { .. })));
    assert_eq!(receipt.gas_used, 50_000);
    assert_eq!(balance(&processor, alice), initial_balance() - gwei(50_000));
}

#[test]
fn test_engine_error_fails_the_tx_only() {
    let evm = MockEvmExecutor::new().with_call(CONTRACT, MockCall::gas(0).engine_failure());
    let (mut processor, key, alice) = setup(evm);

    let receipt = processor.deliver_tx(&Tx::evm(evm_call(&key, CONTRACT, 40_000, GWEI, 0, 0)));
    assert_eq!(
        receipt.status,
        TxStatus::Failed(AdmissionError::Engine(EngineError("mock engine failure".to_string())))
    );
    assert_eq!(receipt.gas_used, 40_000);
    assert_eq!(balance(&processor, alice), initial_balance() - gwei(40_000));

    // the next transaction of the block still goes through
    let other = Address::with_last_byte(0x01);
    let receipt = processor.deliver_tx(&Tx::evm(evm_call(&key, other, 21_000, GWEI, 0, 1)));
    assert!(receipt.status.is_success());
    assert_eq!(processor.receipts().len(), 2);
}

#[test]
fn test_rejected_evm_tx_is_free() {
    let (mut processor, key, alice) = setup(MockEvmExecutor::new());
    // fee cap below the base fee
    let receipt = processor.deliver_tx(&Tx::evm(evm_call(&key, CONTRACT, 21_000, GWEI - 1, 0, 0)));

    assert_eq!(
        receipt.status,
        TxStatus::Rejected(AdmissionError::InsufficientFee {
            required: U256::from(GWEI),
            offered: U256::from(GWEI - 1)
        })
    );
    assert_eq!(receipt.fee, None);
    assert_eq!(balance(&processor, alice), initial_balance());
    assert_eq!(nonce(&processor, alice), 0);
    assert!(processor.accumulator().is_empty());
}

#[rstest]
#[case::bad_nonce(evm_call(&signing_key(1), CONTRACT, 21_000, GWEI, 0, 3))]
#[case::intrinsic_gas(evm_call(&signing_key(1), CONTRACT, 20_999, GWEI, 0, 0))]
#[case::tip_above_cap(evm_call(&signing_key(1), CONTRACT, 21_000, GWEI, 2 * GWEI, 0))]
#[case::wrong_chain({
    let mut call = evm_call(&signing_key(1), CONTRACT, 21_000, GWEI, 0, 0);
    call.chain_id = 1;
    call
})]
fn test_invalid_evm_tx_rejected(#[case] call: dualgas::EvmTx) {
    let (mut processor, _, alice) = setup(MockEvmExecutor::new());
    let receipt = processor.deliver_tx(&Tx::evm(call));
    assert!(matches!(receipt.status, TxStatus::Rejected(_)));
    assert_eq!(balance(&processor, alice), initial_balance());
    assert_eq!(nonce(&processor, alice), 0);
}

#[test]
fn test_sender_cannot_afford_precharge() {
    let key = signing_key(2);
    let poor = address_of(&key);
    let state = MemoryState::new().with_funded_account(poor, FEE_DENOM, gwei(20_999));
    let mut processor = processor(ChainConfig::default(), state, MockEvmExecutor::new());

    let receipt = processor.deliver_tx(&Tx::evm(evm_call(&key, CONTRACT, 21_000, GWEI, 0, 0)));
    assert_eq!(
        receipt.status,
        TxStatus::Rejected(AdmissionError::InsufficientFunds {
            address: poor,
            balance: gwei(20_999),
            required: gwei(21_000),
        })
    );
}

#[test]
fn test_precompile_call() {
    let (mut processor, key, _) = setup(MockEvmExecutor::new());
    let mut call = evm_call(&key, PrecompileModule::Sha256.address(), 100_000, GWEI, 0, 0);
    call.data = vec![0xab; 40].into();
    let receipt = processor.deliver_tx(&Tx::evm(call));

    assert!(receipt.status.is_success());
    assert_eq!(&receipt.output[..], Sha256::digest([0xab; 40]).as_slice());
    // 21_000 + 40 * 16 calldata + 60 + 2 * 12
    assert_eq!(receipt.gas_used, 21_724);
}

#[test]
fn test_mixed_block_moves_base_fee() {
    let fee_market = ChainConfig::default().fee_market.with_block_gas_limit(400_000);
    let config = ChainConfig::default()
        .with_fee_market(fee_market)
        .with_ante(AnteParams::default().with_max_tx_gas(400_000));
    let (mut processor, key, alice) = setup_with(config, MockEvmExecutor::new());
    let height = processor.block().height;

    let bob = Address::with_last_byte(0xb0);
    let body = native_send(alice, bob, 1, gwei(200_000), 200_000);
    let native = signed_native(&key, 0, 0, body, U256::ZERO);
    assert!(processor.deliver_tx(&native).status.is_success());
    assert!(processor
        .deliver_tx(&Tx::evm(evm_call(&key, CONTRACT, 100_000, GWEI, 0, 1)))
        .status
        .is_success());
    // rejected transactions do not count
    assert!(!processor
        .deliver_tx(&Tx::evm(evm_call(&key, CONTRACT, 100_000, GWEI, 0, 9)))
        .status
        .is_success());

    assert_eq!(processor.accumulator().total(), 300_000);
    assert_eq!(processor.phase(), FeeMarketPhase::PendingUpdate);
    // the base fee only moves at the end of the block
    assert_eq!(processor.fee_market().current_base_fee(), U256::from(GWEI));

    let state = processor.on_block_end().unwrap();
    // 1 gwei + 1 gwei * (300_000 - 200_000) / 200_000 / 8
    assert_eq!(state.base_fee, U256::from(1_062_500_000u64));
    assert_eq!(state.gas_wanted_last_block, 300_000);
    assert_eq!(state.height, height);
    assert_eq!(processor.fee_market().current_base_fee(), U256::from(1_062_500_000u64));
    assert_eq!(processor.phase(), FeeMarketPhase::Stable);
    assert!(processor.accumulator().is_empty());
    assert_eq!(processor.store().load().unwrap(), Some(state));

    // a fee cap of the old base fee no longer passes
    let next = BlockInfo { height: height + 1, ..processor.block().clone() };
    processor.on_block_begin(next);
    assert!(processor.receipts().is_empty());
    let receipt = processor.deliver_tx(&Tx::evm(evm_call(&key, CONTRACT, 21_000, GWEI, 0, 2)));
    assert!(matches!(receipt.status, TxStatus::Rejected(AdmissionError::InsufficientFee { .. })));
}

#[test]
fn test_empty_block_lowers_base_fee() {
    let (mut processor, _, _) = setup(MockEvmExecutor::new());
    let state = processor.on_block_end().unwrap();
    assert_eq!(state.base_fee, U256::from(875_000_000u64));
    assert_eq!(state.gas_wanted_last_block, 0);
}

#[test]
fn test_unended_block_carries_gas_wanted_forward() {
    let (mut processor, key, _) = setup(MockEvmExecutor::new());
    let receipt = processor.deliver_tx(&Tx::evm(evm_call(&key, CONTRACT, 15_000_000, GWEI, 0, 0)));
    assert!(receipt.status.is_success());

    let height = processor.block().height;
    let next = BlockInfo { height: height + 1, ..processor.block().clone() };
    processor.on_block_begin(next);
    assert!(processor.receipts().is_empty());
    assert_eq!(processor.accumulator().total(), 15_000_000);
    assert_eq!(processor.phase(), FeeMarketPhase::PendingUpdate);
    assert_eq!(processor.fee_market().current_base_fee(), U256::from(GWEI));

    let committed = processor.on_block_end().unwrap();
    assert_eq!(committed.height, height + 1);
    assert_eq!(committed.gas_wanted_last_block, 15_000_000);
    assert_eq!(committed.base_fee, U256::from(1_062_500_000u64));
}

#[test]
fn test_no_base_fee_pins_price_to_minimum() {
    let fee_market = ChainConfig::default()
        .fee_market
        .with_no_base_fee(true)
        .with_min_gas_price(U256::from(10));
    let (mut processor, key, _) =
        setup_with(ChainConfig::default().with_fee_market(fee_market), MockEvmExecutor::new());
    assert_eq!(processor.fee_market().current_base_fee(), U256::from(10));

    let receipt = processor.deliver_tx(&Tx::evm(evm_call(&key, CONTRACT, 10_000_000, 10, 0, 0)));
    assert!(receipt.status.is_success());
    let state = processor.on_block_end().unwrap();
    assert_eq!(state.base_fee, U256::from(10));
}

proptest! {
    #[test]
    fn proptest_gas_used_within_limit(
        execution_gas in 0u64..200_000,
        refund in 0u64..200_000,
        gas_limit in 21_000u64..150_000,
    ) {
        let evm = MockEvmExecutor::new()
            .with_call(CONTRACT, MockCall::gas(execution_gas).with_refund(refund));
        let (mut processor, key, alice) = setup(evm);
        let call = evm_call(&key, CONTRACT, gas_limit, 2 * GWEI, GWEI, 0);
        let receipt = processor.deliver_tx(&Tx::evm(call));

        prop_assert!(receipt.gas_used <= gas_limit);
        let fee = receipt.fee.unwrap();
        prop_assert_eq!(fee.charged, fee.refund + fee.tip + fee.base_fee_amount);
        prop_assert_eq!(balance(&processor, alice), initial_balance() - fee.charged + fee.refund);
        if receipt.status.is_success() {
            let used = 21_000 + execution_gas;
            prop_assert_eq!(receipt.gas_used, used - refund.min(used / 2));
        } else {
            prop_assert_eq!(receipt.gas_used, gas_limit);
        }
    }
}
