use std::{
    fs,
    path::{Path, PathBuf},
};

use auto_impl::auto_impl;
use tracing::debug;

use super::BlockFeeState;
use crate::StoreError;

/// Durable storage of the [`BlockFeeState`], written once per block at the commit boundary.
#[auto_impl(&mut, Box)]
pub trait FeeStateStore {
    /// Loads the last persisted state, `None` before the first block.
    fn load(&self) -> Result<Option<BlockFeeState>, StoreError>;

    /// Persists `state`, replacing the previous one.
    fn save(&mut self, state: &BlockFeeState) -> Result<(), StoreError>;
}

/// An in-memory [`FeeStateStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryFeeStateStore {
    state: Option<BlockFeeState>,
}

impl MemoryFeeStateStore {
    /// Creates an empty store.
    pub const fn new() -> Self {
        Self { state: None }
    }

    /// Creates a store holding `state`.
    pub const fn with_state(state: BlockFeeState) -> Self {
        Self { state: Some(state) }
    }
}

impl FeeStateStore for MemoryFeeStateStore {
    fn load(&self) -> Result<Option<BlockFeeState>, StoreError> {
        Ok(self.state.clone())
    }

    fn save(&mut self, state: &BlockFeeState) -> Result<(), StoreError> {
        self.state = Some(state.clone());
        Ok(())
    }
}

/// A [`FeeStateStore`] backed by a JSON file.
///
/// Saves write a sibling temporary file first and rename it over the target, so a crash leaves
/// either the previous or the new state on disk.
#[derive(Debug, Clone)]
pub struct JsonFileFeeStateStore {
    path: PathBuf,
}

impl JsonFileFeeStateStore {
    /// Creates a store persisting to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl FeeStateStore for JsonFileFeeStateStore {
    fn load(&self) -> Result<Option<BlockFeeState>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read(&self.path)?;
        let state: BlockFeeState = serde_json::from_slice(&raw)?;
        if !state.is_consistent() {
            return Err(StoreError::Corrupt {
                base_fee: state.base_fee,
                min_gas_price: state.min_gas_price,
            });
        }
        debug!(
            target: "dualgas::fee_market",
            path = %self.path.display(),
            height = state.height,
            "Loaded fee state"
        );
        Ok(Some(state))
    }

    fn save(&mut self, state: &BlockFeeState) -> Result<(), StoreError> {
        let tmp = self.tmp_path();
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(
            target: "dualgas::fee_market",
            path = %self.path.display(),
            height = state.height,
            "Saved fee state"
        );
        Ok(())
    }
}
