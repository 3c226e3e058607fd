//! Chain configuration.

use std::{collections::BTreeSet, path::Path};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{fee_market::BLOCK_GAS_LIMIT, msg_types, native},
    ConfigError, FeeMarketParams, PrecompileModule, ReconcilerParams,
};

/// Parameters of the admission chains.
///
/// # Builder Pattern
///
/// ```rust,ignore
/// let params = AnteParams::default()
///     .with_max_memo_characters(512)
///     .with_disabled_msg_type("/cosmos.bank.v1beta1.MsgSend");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnteParams {
    /// Gas per byte of the encoded transaction.
    pub tx_size_cost_per_byte: u64,
    /// Gas per secp256k1 signature verification.
    pub sig_verify_cost_secp256k1: u64,
    /// Maximum memo length, in characters.
    pub max_memo_characters: usize,
    /// Maximum number of signatures per transaction.
    pub tx_sig_limit: usize,
    /// Maximum gas limit of a single transaction.
    pub max_tx_gas: u64,
    /// The denomination fees are paid in.
    pub fee_denom: String,
    /// The module account collecting fees.
    pub fee_collector: Address,
    /// Message types disabled by the circuit breaker.
    pub disabled_msg_types: BTreeSet<String>,
    /// Whether the restricted validator set policy is active.
    pub restricted_validator_set: bool,
    /// Message types disabled while the restricted validator set policy is active.
    pub restricted_msg_types: BTreeSet<String>,
}

impl Default for AnteParams {
    fn default() -> Self {
        Self {
            tx_size_cost_per_byte: native::TX_SIZE_COST_PER_BYTE,
            sig_verify_cost_secp256k1: native::SIG_VERIFY_COST_SECP256K1,
            max_memo_characters: native::MAX_MEMO_CHARACTERS,
            tx_sig_limit: native::TX_SIG_LIMIT,
            max_tx_gas: BLOCK_GAS_LIMIT,
            fee_denom: native::FEE_DENOM.to_string(),
            fee_collector: native::FEE_COLLECTOR,
            disabled_msg_types: BTreeSet::new(),
            restricted_validator_set: false,
            restricted_msg_types: BTreeSet::from([msg_types::CREATE_VALIDATOR.to_string()]),
        }
    }
}

impl AnteParams {
    /// Set a custom per-byte gas cost.
    pub const fn with_tx_size_cost_per_byte(mut self, cost: u64) -> Self {
        self.tx_size_cost_per_byte = cost;
        self
    }

    /// Set a custom signature verification gas cost.
    pub const fn with_sig_verify_cost(mut self, cost: u64) -> Self {
        self.sig_verify_cost_secp256k1 = cost;
        self
    }

    /// Set a custom memo limit.
    pub const fn with_max_memo_characters(mut self, limit: usize) -> Self {
        self.max_memo_characters = limit;
        self
    }

    /// Set a custom signature limit.
    pub const fn with_tx_sig_limit(mut self, limit: usize) -> Self {
        self.tx_sig_limit = limit;
        self
    }

    /// Set a custom per-transaction gas limit.
    pub const fn with_max_tx_gas(mut self, limit: u64) -> Self {
        self.max_tx_gas = limit;
        self
    }

    /// Set a custom fee denomination.
    pub fn with_fee_denom(mut self, denom: impl Into<String>) -> Self {
        self.fee_denom = denom.into();
        self
    }

    /// Set a custom fee collector.
    pub const fn with_fee_collector(mut self, fee_collector: Address) -> Self {
        self.fee_collector = fee_collector;
        self
    }

    /// Disable a message type through the circuit breaker.
    pub fn with_disabled_msg_type(mut self, type_url: impl Into<String>) -> Self {
        self.disabled_msg_types.insert(type_url.into());
        self
    }

    /// Activate or deactivate the restricted validator set policy.
    pub const fn with_restricted_validator_set(mut self, active: bool) -> Self {
        self.restricted_validator_set = active;
        self
    }

    /// Checks the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tx_gas == 0 {
            return Err(ConfigError::Invalid { field: "max_tx_gas", reason: "must be non-zero" });
        }
        if self.tx_sig_limit == 0 {
            return Err(ConfigError::Invalid { field: "tx_sig_limit", reason: "must be non-zero" });
        }
        if self.fee_denom.is_empty() {
            return Err(ConfigError::Invalid { field: "fee_denom", reason: "must not be empty" });
        }
        Ok(())
    }
}

/// The complete configuration of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// The chain id, used for EVM replay protection and native sign docs.
    pub chain_id: u64,
    /// Fee market parameters.
    pub fee_market: FeeMarketParams,
    /// Reconciliation parameters.
    pub reconciler: ReconcilerParams,
    /// Admission parameters.
    pub ante: AnteParams,
    /// Enabled precompile modules.
    pub precompiles: Vec<PrecompileModule>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: native::CHAIN_ID,
            fee_market: FeeMarketParams::default(),
            reconciler: ReconcilerParams::default(),
            ante: AnteParams::default(),
            precompiles: PrecompileModule::ALL.to_vec(),
        }
    }
}

impl ChainConfig {
    /// Parses and validates a JSON configuration. Missing fields take their default values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Set a custom chain id.
    pub const fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Set custom fee market parameters.
    pub fn with_fee_market(mut self, params: FeeMarketParams) -> Self {
        self.fee_market = params;
        self
    }

    /// Set custom reconciliation parameters.
    pub const fn with_reconciler(mut self, params: ReconcilerParams) -> Self {
        self.reconciler = params;
        self
    }

    /// Set custom admission parameters.
    pub fn with_ante(mut self, params: AnteParams) -> Self {
        self.ante = params;
        self
    }

    /// Checks every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.fee_market.validate()?;
        self.reconciler.validate()?;
        self.ante.validate()?;
        if self.ante.max_tx_gas > self.fee_market.block_gas_limit {
            return Err(ConfigError::Invalid {
                field: "ante.max_tx_gas",
                reason: "must not exceed the block gas limit",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = ChainConfig::from_json_str(
            r#"{
                "chain_id": 7,
                "fee_market": { "block_gas_limit": 30000000 },
                "ante": { "max_tx_gas": 1000000 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.chain_id, 7);
        assert_eq!(config.fee_market.block_gas_limit, 30_000_000);
        assert_eq!(config.fee_market.block_gas_target(), 15_000_000);
        assert_eq!(config.reconciler.refund_cap_divisor, 2);
        assert_eq!(config.ante.fee_denom, "agas");
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            ChainConfig::from_json_str(r#"{ "reconciler": { "refund_cap_divisor": 0 } }"#),
            Err(ConfigError::Invalid { field: "refund_cap_divisor", .. })
        ));
        assert!(matches!(
            ChainConfig::from_json_str(r#"{ "fee_market": { "base_fee_change_denominator": 0 } }"#),
            Err(ConfigError::Invalid { field: "base_fee_change_denominator", .. })
        ));
        assert!(matches!(ChainConfig::from_json_str("{"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_default_is_valid() {
        ChainConfig::default().validate().unwrap();
    }
}
