//! Constants for the dual-path pipeline.
//!
//! It groups the constants for the different concerns as sub-modules.

/// Constants for the EIP-1559 fee market.
pub mod fee_market {
    /// The bound divisor of the base fee, i.e. at most `1 / 8` change per block at full overshoot.
    pub const BASE_FEE_CHANGE_DENOMINATOR: u64 = 8;
    /// The elasticity multiplier. The block gas target is
    /// `block_gas_limit / ELASTICITY_MULTIPLIER`.
    pub const ELASTICITY_MULTIPLIER: u64 = 2;
    /// Default block gas limit.
    pub const BLOCK_GAS_LIMIT: u64 = 20_000_000;
    /// Initial base fee at genesis (1 gwei).
    pub const INITIAL_BASE_FEE: u64 = 1_000_000_000;
    /// Default network-wide minimum gas price.
    pub const MIN_GAS_PRICE: u64 = 0;
    /// The maximum per-block increase of the base fee, in basis points. `1_250` matches the
    /// EIP-1559 upper bound of `1 / BASE_FEE_CHANGE_DENOMINATOR` at a full block.
    pub const MAX_CHANGE_BPS: u64 = 1_250;
    /// Basis points denominator.
    pub const BPS_DENOMINATOR: u64 = 10_000;
}

/// Constants for EVM gas accounting.
pub mod evm {
    /// Intrinsic gas of every EVM transaction.
    pub const TX_BASE_GAS: u64 = 21_000;
    /// Additional intrinsic gas of a contract creation.
    pub const TX_CREATE_GAS: u64 = 32_000;
    /// Intrinsic gas per zero byte of calldata.
    pub const TX_DATA_ZERO_GAS: u64 = 4;
    /// Intrinsic gas per non-zero byte of calldata.
    pub const TX_DATA_NON_ZERO_GAS: u64 = 16;
    /// The refund cap divisor. The refund is capped to `gas_used / REFUND_CAP_DIVISOR`.
    pub const REFUND_CAP_DIVISOR: u64 = 2;
}

/// Constants for the native admission chain.
pub mod native {
    use alloy_primitives::{address, Address};

    /// Gas charged per byte of the encoded transaction.
    pub const TX_SIZE_COST_PER_BYTE: u64 = 10;
    /// Gas charged per secp256k1 signature verification.
    pub const SIG_VERIFY_COST_SECP256K1: u64 = 1_000;
    /// Maximum number of characters in a memo.
    pub const MAX_MEMO_CHARACTERS: usize = 256;
    /// Maximum number of signatures in a transaction.
    pub const TX_SIG_LIMIT: usize = 7;
    /// Gas charged for a balance read by the default message executor.
    pub const READ_COST: u64 = 1_000;
    /// Gas charged for a balance write by the default message executor.
    pub const WRITE_COST: u64 = 2_000;
    /// The default fee denomination.
    pub const FEE_DENOM: &str = "agas";
    /// The default fee collector module account.
    pub const FEE_COLLECTOR: Address = address!("0x8213ae4c9a0771177019e93422e191146d5b337c");
    /// The default chain id.
    pub const CHAIN_ID: u64 = 9_000;
}

/// Message type URLs understood by the native chain.
pub mod msg_types {
    /// Bank transfer.
    pub const SEND: &str = "/cosmos.bank.v1beta1.MsgSend";
    /// Inbound IBC packet.
    pub const RECV_PACKET: &str = "/ibc.core.channel.v1.MsgRecvPacket";
    /// Authorization wrapper executing nested messages.
    pub const EXEC: &str = "/cosmos.authz.v1beta1.MsgExec";
    /// An EVM transaction carried as a native message.
    pub const ETHEREUM_TX: &str = "/ethermint.evm.v1.MsgEthereumTx";
    /// Validator creation.
    pub const CREATE_VALIDATOR: &str = "/cosmos.staking.v1beta1.MsgCreateValidator";
}

/// Extension option type URLs.
pub mod extension {
    /// Marks an EVM transaction.
    pub const ETHEREUM_TX: &str = "/ethermint.evm.v1.ExtensionOptionsEthereumTx";
    /// Marks a fee-aware native transaction.
    pub const DYNAMIC_FEE: &str = "/ethermint.types.v1.ExtensionOptionDynamicFeeTx";
}

/// Precompile gas schedule.
pub mod precompile {
    /// `SHA256` base cost.
    pub const SHA256_BASE: u64 = 60;
    /// `SHA256` cost per word.
    pub const SHA256_PER_WORD: u64 = 12;
    /// `IDENTITY` base cost.
    pub const IDENTITY_BASE: u64 = 15;
    /// `IDENTITY` cost per word.
    pub const IDENTITY_PER_WORD: u64 = 3;
    /// `KECCAK256` base cost.
    pub const KECCAK256_BASE: u64 = 30;
    /// `KECCAK256` cost per word.
    pub const KECCAK256_PER_WORD: u64 = 6;
}
