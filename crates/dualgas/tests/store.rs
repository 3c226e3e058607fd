//! Tests for fee state persistence and restart.

use alloy_primitives::U256;
use dualgas::{
    test_utils::{address_of, evm_call, signing_key, MockEvmExecutor, GWEI},
    AnteParams, BlockFeeState, BlockProcessor, ChainConfig, ConfigError, FeeStateStore,
    JsonFileFeeStateStore, MemoryFeeStateStore, MemoryState, ProcessorError, StoreError, Tx,
};

fn state(base_fee: u64, min_gas_price: u64, height: u64) -> BlockFeeState {
    BlockFeeState {
        base_fee: U256::from(base_fee),
        gas_wanted_last_block: 1_234,
        min_gas_price: U256::from(min_gas_price),
        height,
    }
}

#[test]
fn test_json_store_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = JsonFileFeeStateStore::new(dir.path().join("fee_state.json"));
    assert_eq!(store.load().unwrap(), None);

    store.save(&state(GWEI, 0, 1)).unwrap();
    store.save(&state(2 * GWEI, 10, 2)).unwrap();
    assert_eq!(store.load().unwrap(), Some(state(2 * GWEI, 10, 2)));
    // no temporary file is left behind
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_json_store_rejects_corrupt_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fee_state.json");
    std::fs::write(&path, serde_json::to_vec(&state(5, 10, 3)).unwrap()).unwrap();

    let store = JsonFileFeeStateStore::new(&path);
    assert!(matches!(
        store.load(),
        Err(StoreError::Corrupt { base_fee, min_gas_price })
            if base_fee == U256::from(5) && min_gas_price == U256::from(10)
    ));

    std::fs::write(&path, b"{ not json").unwrap();
    assert!(matches!(store.load(), Err(StoreError::Encoding(_))));
}

#[test]
fn test_processor_resumes_from_persisted_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fee_state.json");
    let key = signing_key(1);
    let funded = || {
        MemoryState::new().with_funded_account(
            address_of(&key),
            "agas",
            U256::from(10).pow(U256::from(24)),
        )
    };

    let mut processor = BlockProcessor::new(
        ChainConfig::default(),
        funded(),
        MockEvmExecutor::new(),
        JsonFileFeeStateStore::new(&path),
    )
    .unwrap();
    assert_eq!(processor.block().height, 1);
    let receipt = processor.deliver_tx(&Tx::evm(evm_call(
        &key,
        alloy_primitives::Address::with_last_byte(0xc0),
        15_000_000,
        GWEI,
        0,
        0,
    )));
    assert!(receipt.status.is_success());
    let committed = processor.on_block_end().unwrap();
    assert_eq!(committed.base_fee, U256::from(1_062_500_000u64));
    drop(processor);

    let restarted = BlockProcessor::new(
        ChainConfig::default(),
        funded(),
        MockEvmExecutor::new(),
        JsonFileFeeStateStore::new(&path),
    )
    .unwrap();
    assert_eq!(restarted.block().height, 2);
    assert_eq!(restarted.fee_market().snapshot(), committed);
    assert_eq!(restarted.fee_market().current_base_fee(), U256::from(1_062_500_000u64));
}

#[test]
fn test_processor_refuses_corrupt_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fee_state.json");
    std::fs::write(&path, serde_json::to_vec(&state(1, 2, 1)).unwrap()).unwrap();

    let result = BlockProcessor::new(
        ChainConfig::default(),
        MemoryState::new(),
        MockEvmExecutor::new(),
        JsonFileFeeStateStore::new(&path),
    );
    assert!(matches!(result, Err(ProcessorError::Store(StoreError::Corrupt { .. }))));
}

/// A store whose first `failures` saves fail.
#[derive(Debug, Default)]
struct FlakyStore {
    failures: usize,
    inner: MemoryFeeStateStore,
}

impl FeeStateStore for FlakyStore {
    fn load(&self) -> Result<Option<BlockFeeState>, StoreError> {
        self.inner.load()
    }

    fn save(&mut self, state: &BlockFeeState) -> Result<(), StoreError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        self.inner.save(state)
    }
}

#[test]
fn test_failed_save_leaves_block_end_retryable() {
    let key = signing_key(1);
    let state = MemoryState::new().with_funded_account(
        address_of(&key),
        "agas",
        U256::from(10).pow(U256::from(24)),
    );
    let store = FlakyStore { failures: 1, ..Default::default() };
    let mut processor =
        BlockProcessor::new(ChainConfig::default(), state, MockEvmExecutor::new(), store).unwrap();
    let receipt = processor.deliver_tx(&Tx::evm(evm_call(
        &key,
        alloy_primitives::Address::with_last_byte(0xc0),
        15_000_000,
        GWEI,
        0,
        0,
    )));
    assert!(receipt.status.is_success());

    assert!(matches!(processor.on_block_end(), Err(StoreError::Io(_))));
    assert_eq!(processor.fee_market().current_base_fee(), U256::from(GWEI));
    assert_eq!(processor.fee_market().snapshot().height, 0);
    assert_eq!(processor.accumulator().total(), 15_000_000);
    assert_eq!(processor.store().load().unwrap(), None);

    // the retry applies the update exactly once
    let committed = processor.on_block_end().unwrap();
    assert_eq!(committed.base_fee, U256::from(1_062_500_000u64));
    assert_eq!(committed.height, 1);
    assert_eq!(processor.fee_market().snapshot(), committed);
    assert_eq!(processor.store().load().unwrap(), Some(committed));
    assert!(processor.accumulator().is_empty());
}

#[test]
fn test_failed_save_on_empty_block_moves_base_fee_once() {
    let store = FlakyStore { failures: 1, ..Default::default() };
    let mut processor = BlockProcessor::new(
        ChainConfig::default(),
        MemoryState::new(),
        MockEvmExecutor::new(),
        store,
    )
    .unwrap();
    assert!(processor.on_block_end().is_err());
    let committed = processor.on_block_end().unwrap();
    assert_eq!(committed.base_fee, U256::from(875_000_000u64));
    assert_eq!(processor.fee_market().current_base_fee(), U256::from(875_000_000u64));
}

#[test]
fn test_processor_refuses_invalid_config() {
    let config =
        ChainConfig::default().with_ante(AnteParams::default().with_max_tx_gas(30_000_000));
    let result = BlockProcessor::new(
        config,
        MemoryState::new(),
        MockEvmExecutor::new(),
        MemoryFeeStateStore::new(),
    );
    assert!(matches!(
        result,
        Err(ProcessorError::Config(ConfigError::Invalid { field: "ante.max_tx_gas", .. }))
    ));
}
