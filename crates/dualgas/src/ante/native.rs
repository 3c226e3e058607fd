//! The native admission chain.

use std::collections::BTreeSet;

use alloy_primitives::U256;
use k256::ecdsa::{signature::Verifier, Signature};
use tracing::debug;

use super::{AnteChain, AnteContext, AnteDecorator};
use crate::{
    constants::msg_types, AdmissionError, AnteParams, Coin, Coins, ExtensionOption, Msg,
    NativeTx, PublicKey, Tx, TxBody,
};

/// Builds the native chain configured by `params`.
pub fn native_ante_chain(params: &AnteParams, block_gas_limit: u64) -> AnteChain {
    AnteChain::builder()
        .then(RejectMessagesDecorator)
        .then(CircuitBreakerDecorator::new(params.disabled_msg_types.clone()))
        .then(ExtensionOptionsDecorator)
        .then(ValidateBasicDecorator::new(params.max_tx_gas))
        .then(TimeoutHeightDecorator)
        .then(ValidateMemoDecorator::new(params.max_memo_characters))
        .then(MinGasPriceDecorator)
        .then(ConsumeTxSizeGasDecorator::new(params.tx_size_cost_per_byte))
        .then(DeductFeeDecorator)
        .then(SetPubKeyDecorator)
        .then(ValidateSigCountDecorator::new(params.tx_sig_limit))
        .then(SigVerificationDecorator::new(params.sig_verify_cost_secp256k1))
        .then(IncrementSequenceDecorator)
        .then(RedundantRelayDecorator)
        .then(GasWantedDecorator::new(block_gas_limit))
        .then_if(
            params.restricted_validator_set,
            RestrictedValidatorSetDecorator::new(params.restricted_msg_types.clone()),
        )
        .build()
}

fn native_body(tx: &Tx) -> Result<&NativeTx, AdmissionError> {
    match &tx.body {
        TxBody::Native(native) => Ok(native),
        TxBody::Evm(_) => Err(AdmissionError::ExtensionMismatch { expected: "native" }),
    }
}

/// Returns the first message type in `tx` (nested ones included) matching `pred`.
fn find_msg_type(native: &NativeTx, mut pred: impl FnMut(&str) -> bool) -> Option<String> {
    let mut found = None;
    for msg in &native.messages {
        let complete = msg.walk(&mut |msg: &Msg| {
            if pred(msg.type_url()) {
                found = Some(msg.type_url().to_string());
                return false;
            }
            true
        });
        if !complete {
            break;
        }
    }
    found
}

/// Returns the max priority price of the dynamic fee option, if `tx` has one.
fn dynamic_fee_tip(tx: &Tx) -> Option<U256> {
    match tx.extension_options.first() {
        Some(ExtensionOption::DynamicFee { max_priority_price }) => Some(*max_priority_price),
        _ => None,
    }
}

/// The fee a native transaction pays in the fee denomination.
///
/// With the dynamic fee option the price is `min(fee / gas_limit, base_fee + max_priority_price)`,
/// otherwise the whole declared fee is paid.
fn native_fee_amount(ctx: &AnteContext<'_>, tx: &Tx, native: &NativeTx) -> U256 {
    let fee = native.fee.amount.amount_of(&ctx.params.fee_denom);
    let gas_limit = U256::from(native.fee.gas_limit);
    match dynamic_fee_tip(tx) {
        Some(tip) if !gas_limit.is_zero() => {
            let fee_cap = fee / gas_limit;
            let price = fee_cap.min(ctx.fee_market.current_base_fee().saturating_add(tip));
            price.saturating_mul(gas_limit)
        }
        _ => fee,
    }
}

/// Rejects EVM payloads on the native path, including messages nested in [`Msg::Exec`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectMessagesDecorator;

impl AnteDecorator for RejectMessagesDecorator {
    fn name(&self) -> &'static str {
        "reject_messages"
    }

    fn handle(&self, _ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = match &tx.body {
            TxBody::Native(native) => native,
            TxBody::Evm(_) => {
                return Err(AdmissionError::DisallowedMessage {
                    type_url: msg_types::ETHEREUM_TX.to_string(),
                })
            }
        };
        if let Some(type_url) = find_msg_type(native, |t| t == msg_types::ETHEREUM_TX) {
            return Err(AdmissionError::DisallowedMessage { type_url });
        }
        Ok(())
    }
}

/// Rejects message types disabled by the circuit breaker.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerDecorator {
    disabled: BTreeSet<String>,
}

impl CircuitBreakerDecorator {
    /// Creates the decorator with the disabled message types.
    pub const fn new(disabled: BTreeSet<String>) -> Self {
        Self { disabled }
    }
}

impl AnteDecorator for CircuitBreakerDecorator {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn handle(&self, _ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        if self.disabled.is_empty() {
            return Ok(());
        }
        let native = native_body(tx)?;
        if let Some(type_url) = find_msg_type(native, |t| self.disabled.contains(t)) {
            return Err(AdmissionError::CircuitBreakerTripped { type_url });
        }
        Ok(())
    }
}

/// Requires the dynamic fee option to lead the extension options. Trailing options are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionOptionsDecorator;

impl AnteDecorator for ExtensionOptionsDecorator {
    fn name(&self) -> &'static str {
        "extension_options"
    }

    fn handle(&self, _ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        match tx.extension_options.first() {
            Some(ExtensionOption::DynamicFee { .. }) => Ok(()),
            Some(other) => Err(AdmissionError::InvalidExtensionOption(format!(
                "{} is not allowed on native transactions",
                other.type_url()
            ))),
            None => Err(AdmissionError::RejectedUnknownExtension { type_url: String::new() }),
        }
    }
}

/// Stateless checks of the transaction.
#[derive(Debug, Clone, Copy)]
pub struct ValidateBasicDecorator {
    max_tx_gas: u64,
}

impl ValidateBasicDecorator {
    /// Creates the decorator with the per-transaction gas limit.
    pub const fn new(max_tx_gas: u64) -> Self {
        Self { max_tx_gas }
    }
}

impl AnteDecorator for ValidateBasicDecorator {
    fn name(&self) -> &'static str {
        "validate_basic"
    }

    fn handle(&self, _ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = native_body(tx)?;
        if native.messages.is_empty() {
            return Err(AdmissionError::InvalidBasic("no messages".to_string()));
        }
        if native.fee.gas_limit == 0 {
            return Err(AdmissionError::InvalidBasic("zero gas limit".to_string()));
        }
        if native.fee.gas_limit > self.max_tx_gas {
            return Err(AdmissionError::GasLimitExceeded {
                gas_limit: native.fee.gas_limit,
                limit: self.max_tx_gas,
            });
        }
        if native.signatures.is_empty() {
            return Err(AdmissionError::InvalidBasic("no signatures".to_string()));
        }
        if native.signatures.len() != native.signer_infos.len() {
            return Err(AdmissionError::InvalidBasic(format!(
                "{} signatures for {} signers",
                native.signatures.len(),
                native.signer_infos.len()
            )));
        }
        let declared: Vec<_> = native.signer_infos.iter().map(|info| info.address).collect();
        if declared != native.signers() {
            return Err(AdmissionError::InvalidBasic(
                "signer infos do not match the required signers".to_string(),
            ));
        }
        validate_fee_coins(&native.fee.amount)
    }
}

fn validate_fee_coins(coins: &Coins) -> Result<(), AdmissionError> {
    let mut denoms = BTreeSet::new();
    for Coin { denom, amount } in coins.iter() {
        if amount.is_zero() {
            return Err(AdmissionError::InvalidBasic(format!("zero fee amount in {denom}")));
        }
        if !denoms.insert(denom.as_str()) {
            return Err(AdmissionError::InvalidBasic(format!("duplicate fee denom {denom}")));
        }
    }
    Ok(())
}

/// Rejects transactions past their timeout height.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutHeightDecorator;

impl AnteDecorator for TimeoutHeightDecorator {
    fn name(&self) -> &'static str {
        "timeout_height"
    }

    fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = native_body(tx)?;
        if native.timeout_height != 0 && ctx.block.height > native.timeout_height {
            return Err(AdmissionError::TimeoutHeightExceeded {
                block_height: ctx.block.height,
                timeout_height: native.timeout_height,
            });
        }
        Ok(())
    }
}

/// Bounds the memo length.
#[derive(Debug, Clone, Copy)]
pub struct ValidateMemoDecorator {
    max_characters: usize,
}

impl ValidateMemoDecorator {
    /// Creates the decorator with the memo limit.
    pub const fn new(max_characters: usize) -> Self {
        Self { max_characters }
    }
}

impl AnteDecorator for ValidateMemoDecorator {
    fn name(&self) -> &'static str {
        "validate_memo"
    }

    fn handle(&self, _ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = native_body(tx)?;
        let length = native.memo.chars().count();
        if length > self.max_characters {
            return Err(AdmissionError::MemoTooLarge { length, limit: self.max_characters });
        }
        Ok(())
    }
}

/// Requires `fee >= gas_limit * max(min_gas_price, base_fee)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinGasPriceDecorator;

impl AnteDecorator for MinGasPriceDecorator {
    fn name(&self) -> &'static str {
        "min_gas_price"
    }

    fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = native_body(tx)?;
        let required =
            U256::from(native.fee.gas_limit).saturating_mul(ctx.fee_market.admission_floor());
        let offered = native_fee_amount(ctx, tx, native);
        if offered < required {
            return Err(AdmissionError::InsufficientFee { required, offered });
        }
        Ok(())
    }
}

/// Charges gas for the encoded size of the transaction.
#[derive(Debug, Clone, Copy)]
pub struct ConsumeTxSizeGasDecorator {
    cost_per_byte: u64,
}

impl ConsumeTxSizeGasDecorator {
    /// Creates the decorator with the per-byte cost.
    pub const fn new(cost_per_byte: u64) -> Self {
        Self { cost_per_byte }
    }
}

impl AnteDecorator for ConsumeTxSizeGasDecorator {
    fn name(&self) -> &'static str {
        "consume_tx_size_gas"
    }

    fn handle(&self, ctx: &mut AnteContext<'_>, _tx: &Tx) -> Result<(), AdmissionError> {
        let cost = self.cost_per_byte.saturating_mul(ctx.tx_size as u64);
        ctx.consume_gas(cost, "txSize")
    }
}

/// Moves the fee from the payer to the fee collector.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeductFeeDecorator;

impl AnteDecorator for DeductFeeDecorator {
    fn name(&self) -> &'static str {
        "deduct_fee"
    }

    fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = native_body(tx)?;
        let payer = native
            .fee_payer()
            .ok_or_else(|| AdmissionError::InvalidBasic("no fee payer".to_string()))?;
        if ctx.state.account(&payer).is_none() {
            return Err(AdmissionError::UnknownAccount(payer));
        }

        let collector = ctx.params.fee_collector;
        let fee = if dynamic_fee_tip(tx).is_some() {
            let amount = native_fee_amount(ctx, tx, native);
            Coins::from(vec![Coin::new(ctx.params.fee_denom.clone(), amount)])
        } else {
            native.fee.amount.clone()
        };
        for coin in fee.iter().filter(|coin| !coin.amount.is_zero()) {
            ctx.state.transfer(payer, collector, &coin.denom, coin.amount)?;
        }
        debug!(target: "dualgas::ante", tx_hash = %ctx.tx_hash, %payer, ?fee, "Deducted fee");
        Ok(())
    }
}

/// Binds public keys from the signer infos to accounts that have none.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetPubKeyDecorator;

impl AnteDecorator for SetPubKeyDecorator {
    fn name(&self) -> &'static str {
        "set_pub_key"
    }

    fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = native_body(tx)?;
        for info in &native.signer_infos {
            let mut account = ctx
                .state
                .account(&info.address)
                .ok_or(AdmissionError::UnknownAccount(info.address))?;
            let Some(public_key) = &info.public_key else { continue };

            let derived = public_key.address().ok_or(AdmissionError::InvalidPubKey(info.address))?;
            if derived != info.address {
                return Err(AdmissionError::PubKeyMismatch { signer: info.address, derived });
            }
            if account.public_key.is_none() {
                account.public_key = Some(public_key.clone());
                ctx.state.set_account(account);
            }
        }
        Ok(())
    }
}

/// Bounds the number of signatures.
#[derive(Debug, Clone, Copy)]
pub struct ValidateSigCountDecorator {
    limit: usize,
}

impl ValidateSigCountDecorator {
    /// Creates the decorator with the signature limit.
    pub const fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl AnteDecorator for ValidateSigCountDecorator {
    fn name(&self) -> &'static str {
        "validate_sig_count"
    }

    fn handle(&self, _ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let count = native_body(tx)?.signatures.len();
        if count > self.limit {
            return Err(AdmissionError::TooManySignatures { count, limit: self.limit });
        }
        Ok(())
    }
}

/// Charges and verifies every signature and checks the signer sequences.
#[derive(Debug, Clone, Copy)]
pub struct SigVerificationDecorator {
    cost: u64,
}

impl SigVerificationDecorator {
    /// Creates the decorator with the per-signature cost.
    pub const fn new(cost: u64) -> Self {
        Self { cost }
    }
}

impl AnteDecorator for SigVerificationDecorator {
    fn name(&self) -> &'static str {
        "sig_verification"
    }

    fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = native_body(tx)?;
        for (info, signature) in native.signer_infos.iter().zip(&native.signatures) {
            ctx.consume_gas(self.cost, "ante verify: secp256k1")?;

            let signer = info.address;
            let account = ctx.state.account(&signer).ok_or(AdmissionError::UnknownAccount(signer))?;
            if account.sequence != info.sequence {
                return Err(AdmissionError::SequenceMismatch {
                    address: signer,
                    expected: account.sequence,
                    got: info.sequence,
                });
            }
            if ctx.simulate {
                continue;
            }

            let key = account
                .public_key
                .as_ref()
                .and_then(PublicKey::verifying_key)
                .ok_or(AdmissionError::InvalidPubKey(signer))?;
            let signature = Signature::from_slice(signature)
                .map_err(|_| AdmissionError::SignatureInvalid { signer })?;
            let sign_bytes =
                native.sign_bytes(ctx.block.chain_id, account.account_number, account.sequence);
            key.verify(&sign_bytes, &signature)
                .map_err(|_| AdmissionError::SignatureInvalid { signer })?;
        }
        Ok(())
    }
}

/// Increments the sequence of every signer.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncrementSequenceDecorator;

impl AnteDecorator for IncrementSequenceDecorator {
    fn name(&self) -> &'static str {
        "increment_sequence"
    }

    fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = native_body(tx)?;
        for info in &native.signer_infos {
            let mut account = ctx
                .state
                .account(&info.address)
                .ok_or(AdmissionError::UnknownAccount(info.address))?;
            account.sequence = account.sequence.saturating_add(1);
            ctx.state.set_account(account);
        }
        Ok(())
    }
}

/// Rejects transactions whose packet messages have all been received already.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedundantRelayDecorator;

impl AnteDecorator for RedundantRelayDecorator {
    fn name(&self) -> &'static str {
        "redundant_relay"
    }

    fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = native_body(tx)?;
        let mut packets = 0usize;
        let mut redundant = 0usize;
        for msg in &native.messages {
            if let Msg::RecvPacket { source_channel, sequence, .. } = msg {
                packets += 1;
                if ctx.state.is_packet_relayed(source_channel, *sequence) {
                    redundant += 1;
                }
            }
        }
        if packets > 0 && redundant == packets {
            return Err(AdmissionError::RedundantRelay);
        }
        Ok(())
    }
}

/// Records the gas wanted for the fee market.
#[derive(Debug, Clone, Copy)]
pub struct GasWantedDecorator {
    block_gas_limit: u64,
}

impl GasWantedDecorator {
    /// Creates the decorator with the block gas limit.
    pub const fn new(block_gas_limit: u64) -> Self {
        Self { block_gas_limit }
    }
}

impl AnteDecorator for GasWantedDecorator {
    fn name(&self) -> &'static str {
        "gas_wanted"
    }

    fn handle(&self, ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let gas_wanted = tx.gas_limit();
        if gas_wanted > self.block_gas_limit {
            return Err(AdmissionError::GasLimitExceeded {
                gas_limit: gas_wanted,
                limit: self.block_gas_limit,
            });
        }
        ctx.record_gas_wanted(gas_wanted);
        Ok(())
    }
}

/// Disables configured message types while the restricted validator set policy is active.
#[derive(Debug, Clone, Default)]
pub struct RestrictedValidatorSetDecorator {
    restricted: BTreeSet<String>,
}

impl RestrictedValidatorSetDecorator {
    /// Creates the decorator with the restricted message types.
    pub const fn new(restricted: BTreeSet<String>) -> Self {
        Self { restricted }
    }
}

impl AnteDecorator for RestrictedValidatorSetDecorator {
    fn name(&self) -> &'static str {
        "restricted_validator_set"
    }

    fn handle(&self, _ctx: &mut AnteContext<'_>, tx: &Tx) -> Result<(), AdmissionError> {
        let native = native_body(tx)?;
        if let Some(type_url) = find_msg_type(native, |t| self.restricted.contains(t)) {
            return Err(AdmissionError::DisallowedMessage { type_url });
        }
        Ok(())
    }
}
