use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{constants::fee_market, ConfigError};

/// Parameters of the EIP-1559 fee market.
///
/// # Builder Pattern
///
/// ```rust,ignore
/// let params = FeeMarketParams::default()
///     .with_block_gas_limit(30_000_000)
///     .with_min_gas_price(U256::from(1_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeMarketParams {
    /// The network-wide minimum gas price. The base fee never goes below it.
    pub min_gas_price: U256,
    /// The base fee at genesis.
    pub initial_base_fee: U256,
    /// Bounds the per-block change: `delta = base_fee * overshoot / target / denominator`.
    pub base_fee_change_denominator: u64,
    /// The block gas target is `block_gas_limit / elasticity_multiplier`.
    pub elasticity_multiplier: u64,
    /// The block gas limit. Also the upper bound of the gas wanted by a single transaction.
    pub block_gas_limit: u64,
    /// The maximum increase of the base fee per block, in basis points of the current base fee.
    pub max_change_bps: u64,
    /// Freezes the base fee at `min_gas_price`, only the minimum gas price is enforced.
    pub no_base_fee: bool,
}

impl Default for FeeMarketParams {
    fn default() -> Self {
        Self {
            min_gas_price: U256::from(fee_market::MIN_GAS_PRICE),
            initial_base_fee: U256::from(fee_market::INITIAL_BASE_FEE),
            base_fee_change_denominator: fee_market::BASE_FEE_CHANGE_DENOMINATOR,
            elasticity_multiplier: fee_market::ELASTICITY_MULTIPLIER,
            block_gas_limit: fee_market::BLOCK_GAS_LIMIT,
            max_change_bps: fee_market::MAX_CHANGE_BPS,
            no_base_fee: false,
        }
    }
}

impl FeeMarketParams {
    /// Returns the block gas target.
    pub const fn block_gas_target(&self) -> u64 {
        if self.elasticity_multiplier == 0 {
            return self.block_gas_limit;
        }
        self.block_gas_limit / self.elasticity_multiplier
    }

    /// Set a custom minimum gas price.
    pub const fn with_min_gas_price(mut self, min_gas_price: U256) -> Self {
        self.min_gas_price = min_gas_price;
        self
    }

    /// Set a custom genesis base fee.
    pub const fn with_initial_base_fee(mut self, base_fee: U256) -> Self {
        self.initial_base_fee = base_fee;
        self
    }

    /// Set a custom base fee change denominator.
    pub const fn with_base_fee_change_denominator(mut self, denominator: u64) -> Self {
        self.base_fee_change_denominator = denominator;
        self
    }

    /// Set a custom elasticity multiplier.
    pub const fn with_elasticity_multiplier(mut self, multiplier: u64) -> Self {
        self.elasticity_multiplier = multiplier;
        self
    }

    /// Set a custom block gas limit.
    pub const fn with_block_gas_limit(mut self, limit: u64) -> Self {
        self.block_gas_limit = limit;
        self
    }

    /// Set a custom maximum per-block increase, in basis points.
    pub const fn with_max_change_bps(mut self, bps: u64) -> Self {
        self.max_change_bps = bps;
        self
    }

    /// Freeze the base fee at the minimum gas price.
    pub const fn with_no_base_fee(mut self, no_base_fee: bool) -> Self {
        self.no_base_fee = no_base_fee;
        self
    }

    /// Checks the parameters are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_fee_change_denominator == 0 {
            return Err(ConfigError::Invalid {
                field: "base_fee_change_denominator",
                reason: "must be non-zero",
            });
        }
        if self.elasticity_multiplier == 0 {
            return Err(ConfigError::Invalid {
                field: "elasticity_multiplier",
                reason: "must be non-zero",
            });
        }
        if self.block_gas_target() == 0 {
            return Err(ConfigError::Invalid {
                field: "block_gas_limit",
                reason: "block gas target must be non-zero",
            });
        }
        Ok(())
    }
}
