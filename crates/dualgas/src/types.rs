use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Serialize};

use crate::constants::{evm, extension, msg_types};

/// An amount of a single denomination.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    /// The denomination.
    pub denom: String,
    /// The amount.
    pub amount: U256,
}

impl Coin {
    /// Creates a new coin.
    pub fn new(denom: impl Into<String>, amount: U256) -> Self {
        Self { denom: denom.into(), amount }
    }
}

/// An ordered list of coins.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    derive_more::Deref,
    derive_more::From,
)]
pub struct Coins(Vec<Coin>);

impl Coins {
    /// Creates an empty list.
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    /// Returns the amount of `denom`, zero when absent.
    pub fn amount_of(&self, denom: &str) -> U256 {
        self.0
            .iter()
            .filter(|coin| coin.denom == denom)
            .fold(U256::ZERO, |total, coin| total.saturating_add(coin.amount))
    }
}

impl FromIterator<Coin> for Coins {
    fn from_iter<I: IntoIterator<Item = Coin>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A compressed SEC1 secp256k1 public key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Deref)]
pub struct PublicKey(Bytes);

impl PublicKey {
    /// Wraps raw key bytes. The bytes are validated lazily by [`Self::verifying_key`].
    pub const fn new(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Parses the key.
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        VerifyingKey::from_sec1_bytes(&self.0).ok()
    }

    /// Derives the account address: the last 20 bytes of the keccak hash of the uncompressed
    /// point without its prefix byte.
    pub fn address(&self) -> Option<Address> {
        let key = self.verifying_key()?;
        let point = key.to_encoded_point(false);
        Some(Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..]))
    }
}

impl From<&VerifyingKey> for PublicKey {
    fn from(key: &VerifyingKey) -> Self {
        Self(Bytes::copy_from_slice(key.to_encoded_point(true).as_bytes()))
    }
}

/// A native message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Msg {
    /// Bank transfer.
    Send {
        /// Sender.
        from: Address,
        /// Recipient.
        to: Address,
        /// Amount.
        amount: Coins,
    },
    /// Inbound cross-chain packet.
    RecvPacket {
        /// Relayer.
        signer: Address,
        /// The channel the packet was sent on.
        source_channel: String,
        /// The packet sequence on that channel.
        sequence: u64,
    },
    /// Executes nested messages on behalf of their signers.
    Exec {
        /// The grantee signing the wrapper.
        grantee: Address,
        /// Nested messages.
        msgs: Vec<Msg>,
    },
    /// An EVM transaction wrapped as a native message. Never admitted on the native path.
    EthereumTx(EvmTx),
    /// Any other module message with a flat execution cost.
    Other {
        /// The message type URL.
        type_url: String,
        /// The signer.
        signer: Address,
        /// Gas consumed by execution.
        gas_cost: u64,
    },
}

impl Msg {
    /// Returns the message type URL.
    pub fn type_url(&self) -> &str {
        match self {
            Self::Send { .. } => msg_types::SEND,
            Self::RecvPacket { .. } => msg_types::RECV_PACKET,
            Self::Exec { .. } => msg_types::EXEC,
            Self::EthereumTx(_) => msg_types::ETHEREUM_TX,
            Self::Other { type_url, .. } => type_url,
        }
    }

    /// Returns the signer of the message.
    pub fn signer(&self) -> Address {
        match self {
            Self::Send { from, .. } => *from,
            Self::RecvPacket { signer, .. } | Self::Other { signer, .. } => *signer,
            Self::Exec { grantee, .. } => *grantee,
            Self::EthereumTx(tx) => tx.from,
        }
    }

    /// Visits this message and, for [`Msg::Exec`], every nested message depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self) -> bool) -> bool {
        if !visit(self) {
            return false;
        }
        if let Self::Exec { msgs, .. } = self {
            for msg in msgs {
                if !msg.walk(visit) {
                    return false;
                }
            }
        }
        true
    }
}

/// The fee of a native transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    /// The maximum amount paid, the fee limit.
    pub amount: Coins,
    /// The gas limit.
    pub gas_limit: u64,
    /// The account paying the fee, the first signer when unset.
    pub payer: Option<Address>,
}

/// Signer metadata of a native transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// The signer address.
    pub address: Address,
    /// The public key, required when the account has none bound yet.
    pub public_key: Option<PublicKey>,
    /// The account sequence the signature was produced for.
    pub sequence: u64,
}

/// A native, account-based transaction priced by bandwidth and operations.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeTx {
    /// Messages executed in order.
    pub messages: Vec<Msg>,
    /// The fee.
    pub fee: Fee,
    /// Free-form memo.
    pub memo: String,
    /// The last block height the transaction is valid in, `0` for no timeout.
    pub timeout_height: u64,
    /// Signer metadata, one per required signer.
    pub signer_infos: Vec<SignerInfo>,
    /// Signatures, one per signer info.
    pub signatures: Vec<Bytes>,
}

#[derive(Serialize)]
struct SignDoc<'a> {
    chain_id: u64,
    account_number: u64,
    sequence: u64,
    messages: &'a [Msg],
    fee: &'a Fee,
    memo: &'a str,
    timeout_height: u64,
}

impl NativeTx {
    /// Returns the required signers: the unique signers of the top-level messages, in order,
    /// followed by the fee payer when it signs no message.
    pub fn signers(&self) -> Vec<Address> {
        let mut signers = Vec::new();
        for signer in self.messages.iter().map(Msg::signer).chain(self.fee.payer) {
            if !signers.contains(&signer) {
                signers.push(signer);
            }
        }
        signers
    }

    /// Returns the account paying the fee.
    pub fn fee_payer(&self) -> Option<Address> {
        self.fee.payer.or_else(|| self.signers().first().copied())
    }

    /// Returns the bytes a signer signs over.
    pub fn sign_bytes(&self, chain_id: u64, account_number: u64, sequence: u64) -> Vec<u8> {
        encode(&SignDoc {
            chain_id,
            account_number,
            sequence,
            messages: &self.messages,
            fee: &self.fee,
            memo: &self.memo,
            timeout_height: self.timeout_height,
        })
    }
}

/// An EVM-style, EIP-1559 transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmTx {
    /// The sender, as recovered by the signature layer.
    pub from: Address,
    /// The callee, `None` for contract creation.
    pub to: Option<Address>,
    /// Transferred value.
    pub value: U256,
    /// Calldata or initcode.
    pub data: Bytes,
    /// The gas limit.
    pub gas_limit: u64,
    /// The fee cap per gas.
    pub max_fee_per_gas: U256,
    /// The tip cap per gas.
    pub max_priority_fee_per_gas: U256,
    /// The chain id the transaction was signed for.
    pub chain_id: u64,
    /// The sender nonce.
    pub nonce: u64,
}

impl EvmTx {
    /// Returns `true` for contract creation.
    pub const fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// Returns the intrinsic gas: the floor every execution of this transaction costs.
    pub fn intrinsic_gas(&self) -> u64 {
        let zeros = self.data.iter().filter(|byte| **byte == 0).count() as u64;
        let non_zeros = self.data.len() as u64 - zeros;
        let mut gas = evm::TX_BASE_GAS;
        if self.is_create() {
            gas += evm::TX_CREATE_GAS;
        }
        gas.saturating_add(zeros.saturating_mul(evm::TX_DATA_ZERO_GAS))
            .saturating_add(non_zeros.saturating_mul(evm::TX_DATA_NON_ZERO_GAS))
    }

    /// Returns the price actually paid per gas at `base_fee`:
    /// `min(max_fee_per_gas, base_fee + max_priority_fee_per_gas)`.
    pub fn effective_gas_price(&self, base_fee: U256) -> U256 {
        self.max_fee_per_gas.min(base_fee.saturating_add(self.max_priority_fee_per_gas))
    }
}

/// A transaction extension marker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtensionOption {
    /// The transaction carries an EVM payload.
    EthereumTx,
    /// The native transaction is fee-market aware.
    DynamicFee {
        /// The maximum tip per gas above the base fee.
        max_priority_price: U256,
    },
    /// An extension this node does not understand.
    Unknown {
        /// The extension type URL.
        type_url: String,
    },
}

impl ExtensionOption {
    /// Returns the extension type URL.
    pub fn type_url(&self) -> &str {
        match self {
            Self::EthereumTx => extension::ETHEREUM_TX,
            Self::DynamicFee { .. } => extension::DYNAMIC_FEE,
            Self::Unknown { type_url } => type_url,
        }
    }
}

/// The transaction payload. Exactly one variant is active per transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxBody {
    /// A native transaction.
    Native(NativeTx),
    /// An EVM transaction.
    Evm(EvmTx),
}

/// A transaction as delivered by consensus.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    /// The payload.
    pub body: TxBody,
    /// Extension markers. Only the first one is consulted for routing.
    pub extension_options: Vec<ExtensionOption>,
}

impl Tx {
    /// Wraps an EVM transaction with the EVM marker.
    pub fn evm(tx: EvmTx) -> Self {
        Self { body: TxBody::Evm(tx), extension_options: vec![ExtensionOption::EthereumTx] }
    }

    /// Wraps a native transaction with the dynamic fee marker.
    pub fn native(tx: NativeTx, max_priority_price: U256) -> Self {
        Self {
            body: TxBody::Native(tx),
            extension_options: vec![ExtensionOption::DynamicFee { max_priority_price }],
        }
    }

    /// Returns the canonical encoding.
    pub fn encode(&self) -> Vec<u8> {
        encode(self)
    }

    /// Returns the transaction hash.
    pub fn hash(&self) -> B256 {
        keccak256(self.encode())
    }

    /// Returns the declared gas limit, the gas wanted.
    pub const fn gas_limit(&self) -> u64 {
        match &self.body {
            TxBody::Native(tx) => tx.fee.gas_limit,
            TxBody::Evm(tx) => tx.gas_limit,
        }
    }
}

/// Header data of the block being built.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block height.
    pub height: u64,
    /// Chain id.
    pub chain_id: u64,
    /// The proposer receiving priority tips.
    pub proposer: Address,
}

fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    // plain structs without maps, serializing into a buffer does not fail
    serde_json::to_vec(value).unwrap_or_default()
}
