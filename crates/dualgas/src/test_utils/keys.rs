use alloy_primitives::{Address, Bytes};
use k256::ecdsa::{signature::Signer, Signature, SigningKey};

use crate::{NativeTx, PublicKey, SignerInfo};

/// Returns a deterministic signing key.
pub fn signing_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed.max(1); 32]).unwrap()
}

/// Returns the compressed public key of `key`.
pub fn public_key(key: &SigningKey) -> PublicKey {
    PublicKey::from(key.verifying_key())
}

/// Returns the account address of `key`.
pub fn address_of(key: &SigningKey) -> Address {
    public_key(key).address().unwrap()
}

/// A signer of a native transaction.
#[derive(Debug, Clone, Copy)]
pub struct TestSigner<'a> {
    /// The key.
    pub key: &'a SigningKey,
    /// The account number.
    pub account_number: u64,
    /// The account sequence.
    pub sequence: u64,
}

/// Fills the signer infos and signatures of `tx`.
pub fn sign_native(tx: &mut NativeTx, signers: &[TestSigner<'_>], chain_id: u64) {
    tx.signer_infos = signers
        .iter()
        .map(|s| SignerInfo {
            address: address_of(s.key),
            public_key: Some(public_key(s.key)),
            sequence: s.sequence,
        })
        .collect();
    tx.signatures = signers
        .iter()
        .map(|s| {
            let sign_bytes = tx.sign_bytes(chain_id, s.account_number, s.sequence);
            let signature: Signature = s.key.sign(&sign_bytes);
            Bytes::copy_from_slice(&signature.to_bytes())
        })
        .collect();
}
