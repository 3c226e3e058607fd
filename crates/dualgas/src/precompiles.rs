//! Precompile registry.
//!
//! Precompiles are native handlers mapped to fixed addresses. The registry is built once from
//! the enabled module list and is read-only afterwards.

use std::sync::Arc;

use alloy_primitives::{address, keccak256, map::HashMap, Address, Bytes};
use auto_impl::auto_impl;
use once_cell::race::OnceBox;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{constants::precompile, PrecompileError};

/// The result of a successful precompile call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecompileOutput {
    /// Gas consumed by the call.
    pub gas_used: u64,
    /// Output bytes.
    pub bytes: Bytes,
}

/// A precompile handler.
#[auto_impl(&, Box, Arc)]
pub trait Precompile: Send + Sync {
    /// Runs the precompile on `input` with `gas_limit` gas.
    fn run(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError>;
}

/// Returns `base + per_word * ceil(len / 32)`.
const fn linear_cost(len: usize, base: u64, per_word: u64) -> u64 {
    base.saturating_add(per_word.saturating_mul(len.div_ceil(32) as u64))
}

fn charge(cost: u64, gas_limit: u64) -> Result<u64, PrecompileError> {
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas { required: cost, gas_limit });
    }
    Ok(cost)
}

/// `SHA256` at `0x02`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Precompile;

impl Precompile for Sha256Precompile {
    fn run(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        let cost = linear_cost(input.len(), precompile::SHA256_BASE, precompile::SHA256_PER_WORD);
        let gas_used = charge(cost, gas_limit)?;
        let digest = Sha256::digest(input);
        Ok(PrecompileOutput { gas_used, bytes: Bytes::copy_from_slice(&digest) })
    }
}

/// `IDENTITY` at `0x04`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityPrecompile;

impl Precompile for IdentityPrecompile {
    fn run(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        let cost =
            linear_cost(input.len(), precompile::IDENTITY_BASE, precompile::IDENTITY_PER_WORD);
        let gas_used = charge(cost, gas_limit)?;
        Ok(PrecompileOutput { gas_used, bytes: Bytes::copy_from_slice(input) })
    }
}

/// `KECCAK256` at `0x0900`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Keccak256Precompile;

impl Precompile for Keccak256Precompile {
    fn run(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        let cost =
            linear_cost(input.len(), precompile::KECCAK256_BASE, precompile::KECCAK256_PER_WORD);
        let gas_used = charge(cost, gas_limit)?;
        let bytes = Bytes::copy_from_slice(keccak256(input).as_slice());
        Ok(PrecompileOutput { gas_used, bytes })
    }
}

/// The precompile modules that can be enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecompileModule {
    /// [`Sha256Precompile`].
    Sha256,
    /// [`IdentityPrecompile`].
    Identity,
    /// [`Keccak256Precompile`].
    Keccak256,
}

impl PrecompileModule {
    /// All modules.
    pub const ALL: [Self; 3] = [Self::Sha256, Self::Identity, Self::Keccak256];

    /// Returns the address the module is mounted at.
    pub const fn address(&self) -> Address {
        match self {
            Self::Sha256 => address!("0x0000000000000000000000000000000000000002"),
            Self::Identity => address!("0x0000000000000000000000000000000000000004"),
            Self::Keccak256 => address!("0x0000000000000000000000000000000000000900"),
        }
    }

    fn handler(&self) -> Arc<dyn Precompile> {
        match self {
            Self::Sha256 => Arc::new(Sha256Precompile),
            Self::Identity => Arc::new(IdentityPrecompile),
            Self::Keccak256 => Arc::new(Keccak256Precompile),
        }
    }
}

/// Maps addresses to precompile handlers.
#[derive(Clone)]
pub struct PrecompileRegistry {
    addresses: Vec<Address>,
    handlers: HashMap<Address, Arc<dyn Precompile>>,
}

impl core::fmt::Debug for PrecompileRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PrecompileRegistry").field("addresses", &self.addresses).finish()
    }
}

impl PartialEq for PrecompileRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.addresses == other.addresses
    }
}

impl Eq for PrecompileRegistry {}

impl PrecompileRegistry {
    /// Builds a registry from `modules`. The list is sorted by address and deduplicated, so the
    /// same set of modules always yields the same registry.
    pub fn new(modules: impl IntoIterator<Item = PrecompileModule>) -> Self {
        let mut modules: Vec<_> = modules.into_iter().collect();
        modules.sort_by_key(|m| m.address());
        modules.dedup();

        let mut handlers = HashMap::default();
        for module in &modules {
            handlers.insert(module.address(), module.handler());
        }
        Self { addresses: modules.iter().map(|m| m.address()).collect(), handlers }
    }

    /// Returns the registry with every module enabled, built once per process.
    pub fn standard() -> &'static Self {
        static STANDARD: OnceBox<PrecompileRegistry> = OnceBox::new();
        STANDARD.get_or_init(|| Box::new(Self::new(PrecompileModule::ALL)))
    }

    /// Mounts a custom handler at `address`, replacing any module mounted there.
    pub fn with_precompile(mut self, address: Address, handler: Arc<dyn Precompile>) -> Self {
        if self.handlers.insert(address, handler).is_none() {
            let idx = self.addresses.partition_point(|a| *a < address);
            self.addresses.insert(idx, address);
        }
        self
    }

    /// Returns the handler at `address`.
    pub fn lookup(&self, address: &Address) -> Option<&dyn Precompile> {
        self.handlers.get(address).map(|h| h.as_ref())
    }

    /// Returns `true` if a precompile is mounted at `address`.
    pub fn contains(&self, address: &Address) -> bool {
        self.handlers.contains_key(address)
    }

    /// Returns the mounted addresses in ascending order.
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Returns the number of mounted precompiles.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Returns `true` if no precompile is mounted.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::hex;

    #[test]
    fn test_lookup() {
        let registry = PrecompileRegistry::standard();
        assert_eq!(registry.len(), 3);
        assert!(registry.lookup(&PrecompileModule::Identity.address()).is_some());
        assert!(registry.lookup(&Address::ZERO).is_none());
        assert!(registry.lookup(&address!("0x0000000000000000000000000000000000000001")).is_none());
    }

    #[test]
    fn test_module_order_is_normalized() {
        let a = PrecompileRegistry::new([
            PrecompileModule::Keccak256,
            PrecompileModule::Sha256,
            PrecompileModule::Keccak256,
        ]);
        let b = PrecompileRegistry::new([PrecompileModule::Sha256, PrecompileModule::Keccak256]);
        assert_eq!(a, b);
        assert_eq!(
            a.addresses(),
            &[PrecompileModule::Sha256.address(), PrecompileModule::Keccak256.address()]
        );
    }

    #[test]
    fn test_sha256() {
        let out = Sha256Precompile.run(b"", 100).unwrap();
        assert_eq!(out.gas_used, 60);
        assert_eq!(
            &out.bytes[..],
            hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn test_identity_gas() {
        let input = [7u8; 33];
        let out = IdentityPrecompile.run(&input, 21).unwrap();
        assert_eq!(out.gas_used, 21);
        assert_eq!(&out.bytes[..], &input);
        assert_eq!(
            IdentityPrecompile.run(&input, 20),
            Err(PrecompileError::OutOfGas { required: 21, gas_limit: 20 })
        );
    }

    #[test]
    fn test_keccak256() {
        let out = Keccak256Precompile.run(b"", 30).unwrap();
        assert_eq!(&out.bytes[..], keccak256(b"").as_slice());
    }
}
