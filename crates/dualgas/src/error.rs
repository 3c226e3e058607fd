use alloy_primitives::{Address, U256};

/// Reasons a transaction is rejected or fails. Every variant is fatal for the offending
/// transaction only, never for the enclosing block.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    /// The gas meter was exceeded.
    #[error("out of gas in {descriptor}: gas_wanted={gas_wanted}, gas_used={gas_used}")]
    OutOfGas {
        /// What consumed the gas.
        descriptor: &'static str,
        /// The gas limit of the transaction.
        gas_wanted: u64,
        /// The gas the transaction would have needed at the point of failure.
        gas_used: u64,
    },
    /// The offered gas price is below the admission floor. Never charged.
    #[error("insufficient fee: offered={offered} < required={required}")]
    InsufficientFee {
        /// The required amount (per gas for EVM, total for native).
        required: U256,
        /// The offered amount.
        offered: U256,
    },
    /// The transaction has no recognised extension marker.
    #[error("rejected unknown extension option: {type_url}")]
    RejectedUnknownExtension {
        /// The type URL of the first extension option, empty when there is none.
        type_url: String,
    },
    /// The body does not match the chain selected by the extension marker.
    #[error("transaction body does not match the {expected} extension")]
    ExtensionMismatch {
        /// The expected body kind.
        expected: &'static str,
    },
    /// A signature does not verify.
    #[error("signature verification failed for {signer}")]
    SignatureInvalid {
        /// The signer.
        signer: Address,
    },
    /// The sequence (nonce) does not match the account.
    #[error("sequence mismatch for {address}: expected={expected}, got={got}")]
    SequenceMismatch {
        /// The account.
        address: Address,
        /// The account sequence.
        expected: u64,
        /// The sequence of the transaction.
        got: u64,
    },
    /// The EVM call reverted. Gas is still charged.
    #[error("execution reverted: gas_used={gas_used}")]
    ExecutionReverted {
        /// The gas charged.
        gas_used: u64,
    },
    /// A message type not allowed on the native path.
    #[error("disallowed message type: {type_url}")]
    DisallowedMessage {
        /// The message type URL.
        type_url: String,
    },
    /// A message type disabled by the circuit breaker.
    #[error("message type disabled by circuit breaker: {type_url}")]
    CircuitBreakerTripped {
        /// The message type URL.
        type_url: String,
    },
    /// A malformed or misplaced extension option.
    #[error("invalid extension option: {0}")]
    InvalidExtensionOption(String),
    /// Stateless validation failed.
    #[error("invalid transaction: {0}")]
    InvalidBasic(String),
    /// The block height is past the timeout height.
    #[error(
        "timeout height exceeded: block_height={block_height} > timeout_height={timeout_height}"
    )]
    TimeoutHeightExceeded {
        /// Current height.
        block_height: u64,
        /// Timeout height of the transaction.
        timeout_height: u64,
    },
    /// The memo is too long.
    #[error("memo too large: length={length} > limit={limit}")]
    MemoTooLarge {
        /// Memo length in characters.
        length: usize,
        /// Maximum characters.
        limit: usize,
    },
    /// The account cannot cover an amount.
    #[error("insufficient funds for {address}: balance={balance} < required={required}")]
    InsufficientFunds {
        /// The account.
        address: Address,
        /// Balance in the relevant denomination.
        balance: U256,
        /// The required amount.
        required: U256,
    },
    /// The account referenced by a signer does not exist.
    #[error("unknown account: {0}")]
    UnknownAccount(Address),
    /// No usable public key for a signer.
    #[error("invalid public key for {0}")]
    InvalidPubKey(Address),
    /// The public key does not derive to the signer address.
    #[error("public key does not match signer {signer}: derived {derived}")]
    PubKeyMismatch {
        /// The signer.
        signer: Address,
        /// The address derived from the key.
        derived: Address,
    },
    /// Too many signatures.
    #[error("too many signatures: count={count} > limit={limit}")]
    TooManySignatures {
        /// Signatures in the transaction.
        count: usize,
        /// Maximum signatures.
        limit: usize,
    },
    /// Every packet in the transaction has already been relayed.
    #[error("redundant relay: all packet messages have already been received")]
    RedundantRelay,
    /// The gas limit is above what the chain admits.
    #[error("gas limit exceeded: gas_limit={gas_limit} > limit={limit}")]
    GasLimitExceeded {
        /// The gas limit of the transaction.
        gas_limit: u64,
        /// The limit.
        limit: u64,
    },
    /// The gas limit is below the intrinsic gas.
    #[error("intrinsic gas too low: gas_limit={gas_limit} < intrinsic_gas={intrinsic_gas}")]
    IntrinsicGasTooLow {
        /// The gas limit of the transaction.
        gas_limit: u64,
        /// The intrinsic gas.
        intrinsic_gas: u64,
    },
    /// The transaction is signed for another network.
    #[error("invalid chain id: expected={expected}, got={got}")]
    InvalidChainId {
        /// The chain id of this network.
        expected: u64,
        /// The chain id of the transaction.
        got: u64,
    },
    /// `max_priority_fee_per_gas > max_fee_per_gas`.
    #[error("priority fee above fee cap: max_priority_fee={max_priority_fee} > max_fee={max_fee}")]
    TipAboveFeeCap {
        /// The tip cap.
        max_priority_fee: U256,
        /// The fee cap.
        max_fee: U256,
    },
    /// The execution engine failed internally.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl AdmissionError {
    /// Returns the `(gas_wanted, gas_used)` pair for [`AdmissionError::OutOfGas`].
    pub const fn out_of_gas_usage(&self) -> Option<(u64, u64)> {
        match self {
            Self::OutOfGas { gas_wanted, gas_used, .. } => Some((*gas_wanted, *gas_used)),
            _ => None,
        }
    }

    /// Returns `true` if the failure happened before any fee could be charged.
    pub const fn is_fee_rejection(&self) -> bool {
        matches!(self, Self::InsufficientFee { .. })
    }
}

/// An internal failure of the external execution engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("execution engine error: {0}")]
pub struct EngineError(pub String);

/// Errors of the fee state store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to read or write the state file.
    #[error("fee state I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The state could not be (de)serialized.
    #[error("fee state encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    /// The persisted state breaks `base_fee >= min_gas_price`.
    #[error("corrupt fee state: base_fee={base_fee} < min_gas_price={min_gas_price}")]
    Corrupt {
        /// The persisted base fee.
        base_fee: U256,
        /// The persisted minimum gas price.
        min_gas_price: U256,
    },
}

/// Errors of creating a [`BlockProcessor`](crate::BlockProcessor).
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The fee state could not be restored.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors of configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The configuration is not valid JSON.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// The field.
        field: &'static str,
        /// Why it is invalid.
        reason: &'static str,
    },
}

/// Errors of a precompile call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrecompileError {
    /// The call costs more than the gas it was given.
    #[error("precompile out of gas: required={required} > gas_limit={gas_limit}")]
    OutOfGas {
        /// The cost of the call.
        required: u64,
        /// The gas given to the call.
        gas_limit: u64,
    },
}
