//! Account state and the transaction commit boundary.
//!
//! Decorators and executors mutate a [`StateOverlay`] on top of the committed state. The block
//! processor turns the overlay into a [`StateChangeset`] and applies it only when the phase it
//! covers succeeded, so a rejected transaction leaves no trace.

use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{Address, U256};
use auto_impl::auto_impl;
use serde::{Deserialize, Serialize};

use crate::{AdmissionError, PublicKey};

/// An account of the unified account model. The native sequence and the EVM nonce are the same
/// counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The address.
    pub address: Address,
    /// The account number, bound into native sign docs.
    pub account_number: u64,
    /// The sequence (nonce).
    pub sequence: u64,
    /// The public key, set on the first signed native transaction.
    pub public_key: Option<PublicKey>,
}

impl Account {
    /// Creates an empty account.
    pub const fn new(address: Address, account_number: u64) -> Self {
        Self { address, account_number, sequence: 0, public_key: None }
    }
}

/// A view of the account state.
#[auto_impl(&mut, Box)]
pub trait AccountState {
    /// Returns the account at `address`.
    fn account(&self, address: &Address) -> Option<Account>;

    /// Inserts or replaces an account.
    fn set_account(&mut self, account: Account);

    /// Returns the account number the next created account gets.
    fn next_account_number(&self) -> u64;

    /// Returns the balance of `address` in `denom`.
    fn balance(&self, address: &Address, denom: &str) -> U256;

    /// Sets the balance of `address` in `denom`.
    fn set_balance(&mut self, address: Address, denom: &str, amount: U256);

    /// Returns `true` if the packet was already received.
    fn is_packet_relayed(&self, channel: &str, sequence: u64) -> bool;

    /// Marks the packet received.
    fn mark_packet_relayed(&mut self, channel: &str, sequence: u64);

    /// Returns the account at `address`, creating an empty one if it does not exist.
    fn get_or_create_account(&mut self, address: Address) -> Account {
        if let Some(account) = self.account(&address) {
            return account;
        }
        let account = Account::new(address, self.next_account_number());
        self.set_account(account.clone());
        account
    }

    /// Moves `amount` of `denom` from `from` to `to`.
    fn transfer(
        &mut self,
        from: Address,
        to: Address,
        denom: &str,
        amount: U256,
    ) -> Result<(), AdmissionError> {
        let balance = self.balance(&from, denom);
        if balance < amount {
            return Err(AdmissionError::InsufficientFunds {
                address: from,
                balance,
                required: amount,
            });
        }
        self.set_balance(from, denom, balance - amount);
        let to_balance = self.balance(&to, denom);
        self.set_balance(to, denom, to_balance.saturating_add(amount));
        Ok(())
    }
}

/// An in-memory [`AccountState`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryState {
    accounts: BTreeMap<Address, Account>,
    balances: BTreeMap<(Address, String), U256>,
    relayed: BTreeSet<(String, u64)>,
}

impl MemoryState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account funded with `amount` of `denom`.
    pub fn with_funded_account(mut self, address: Address, denom: &str, amount: U256) -> Self {
        self.get_or_create_account(address);
        self.set_balance(address, denom, amount);
        self
    }

    /// Returns the number of accounts.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }
}

impl AccountState for MemoryState {
    fn account(&self, address: &Address) -> Option<Account> {
        self.accounts.get(address).cloned()
    }

    fn set_account(&mut self, account: Account) {
        self.accounts.insert(account.address, account);
    }

    fn next_account_number(&self) -> u64 {
        self.accounts.len() as u64
    }

    fn balance(&self, address: &Address, denom: &str) -> U256 {
        self.balances.get(&(*address, denom.to_string())).copied().unwrap_or_default()
    }

    fn set_balance(&mut self, address: Address, denom: &str, amount: U256) {
        self.balances.insert((address, denom.to_string()), amount);
    }

    fn is_packet_relayed(&self, channel: &str, sequence: u64) -> bool {
        self.relayed.contains(&(channel.to_string(), sequence))
    }

    fn mark_packet_relayed(&mut self, channel: &str, sequence: u64) {
        self.relayed.insert((channel.to_string(), sequence));
    }
}

/// The writes buffered by a [`StateOverlay`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateChangeset {
    accounts: BTreeMap<Address, Account>,
    balances: BTreeMap<(Address, String), U256>,
    relayed: BTreeSet<(String, u64)>,
}

impl StateChangeset {
    /// Returns `true` if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.balances.is_empty() && self.relayed.is_empty()
    }

    /// Writes the changes into `state`.
    pub fn apply(self, state: &mut dyn AccountState) {
        for account in self.accounts.into_values() {
            state.set_account(account);
        }
        for ((address, denom), amount) in self.balances {
            state.set_balance(address, &denom, amount);
        }
        for (channel, sequence) in self.relayed {
            state.mark_packet_relayed(&channel, sequence);
        }
    }
}

/// A write cache over a borrowed [`AccountState`].
///
/// Reads fall through to the base state, writes stay in the overlay until it is turned into a
/// [`StateChangeset`]. Dropping the overlay discards them.
pub struct StateOverlay<'a> {
    base: &'a dyn AccountState,
    changes: StateChangeset,
    created: u64,
}

impl core::fmt::Debug for StateOverlay<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StateOverlay").field("changes", &self.changes).finish_non_exhaustive()
    }
}

impl<'a> StateOverlay<'a> {
    /// Creates an empty overlay over `base`.
    pub fn new(base: &'a dyn AccountState) -> Self {
        Self { base, changes: StateChangeset::default(), created: 0 }
    }

    /// Returns the buffered writes.
    pub fn into_changeset(self) -> StateChangeset {
        self.changes
    }
}

impl AccountState for StateOverlay<'_> {
    fn account(&self, address: &Address) -> Option<Account> {
        self.changes.accounts.get(address).cloned().or_else(|| self.base.account(address))
    }

    fn set_account(&mut self, account: Account) {
        if self.account(&account.address).is_none() {
            self.created += 1;
        }
        self.changes.accounts.insert(account.address, account);
    }

    fn next_account_number(&self) -> u64 {
        self.base.next_account_number() + self.created
    }

    fn balance(&self, address: &Address, denom: &str) -> U256 {
        self.changes
            .balances
            .get(&(*address, denom.to_string()))
            .copied()
            .unwrap_or_else(|| self.base.balance(address, denom))
    }

    fn set_balance(&mut self, address: Address, denom: &str, amount: U256) {
        self.changes.balances.insert((address, denom.to_string()), amount);
    }

    fn is_packet_relayed(&self, channel: &str, sequence: u64) -> bool {
        self.changes.relayed.contains(&(channel.to_string(), sequence)) ||
            self.base.is_packet_relayed(channel, sequence)
    }

    fn mark_packet_relayed(&mut self, channel: &str, sequence: u64) {
        self.changes.relayed.insert((channel.to_string(), sequence));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const ALICE: Address = address!("0x00000000000000000000000000000000000a11ce");
    const BOB: Address = address!("0x0000000000000000000000000000000000000b0b");

    #[test]
    fn test_transfer() {
        let mut state = MemoryState::new().with_funded_account(ALICE, "agas", U256::from(100));
        state.transfer(ALICE, BOB, "agas", U256::from(40)).unwrap();
        assert_eq!(state.balance(&ALICE, "agas"), U256::from(60));
        assert_eq!(state.balance(&BOB, "agas"), U256::from(40));

        let err = state.transfer(ALICE, BOB, "agas", U256::from(61)).unwrap_err();
        assert!(matches!(err, AdmissionError::InsufficientFunds { .. }));
        assert_eq!(state.balance(&ALICE, "agas"), U256::from(60));
    }

    #[test]
    fn test_overlay_discarded_on_drop() {
        let state = MemoryState::new().with_funded_account(ALICE, "agas", U256::from(100));
        {
            let mut overlay = StateOverlay::new(&state);
            overlay.transfer(ALICE, BOB, "agas", U256::from(100)).unwrap();
            overlay.mark_packet_relayed("channel-0", 1);
            assert_eq!(overlay.balance(&ALICE, "agas"), U256::ZERO);
            assert!(overlay.is_packet_relayed("channel-0", 1));
        }
        assert_eq!(state.balance(&ALICE, "agas"), U256::from(100));
        assert!(!state.is_packet_relayed("channel-0", 1));
    }

    #[test]
    fn test_overlay_changeset_applies() {
        let mut state = MemoryState::new().with_funded_account(ALICE, "agas", U256::from(100));
        let changes = {
            let mut overlay = StateOverlay::new(&state);
            overlay.transfer(ALICE, BOB, "agas", U256::from(30)).unwrap();
            let mut account = overlay.get_or_create_account(ALICE);
            account.sequence += 1;
            overlay.set_account(account);
            overlay.into_changeset()
        };
        assert!(!changes.is_empty());
        changes.apply(&mut state);
        assert_eq!(state.balance(&ALICE, "agas"), U256::from(70));
        assert_eq!(state.balance(&BOB, "agas"), U256::from(30));
        assert_eq!(state.account(&ALICE).unwrap().sequence, 1);
    }

    #[test]
    fn test_nested_overlay_account_numbers() {
        let state = MemoryState::new().with_funded_account(ALICE, "agas", U256::from(1));
        let mut outer = StateOverlay::new(&state);
        assert_eq!(outer.get_or_create_account(BOB).account_number, 1);
        let mut inner = StateOverlay::new(&outer);
        let carol = address!("0x00000000000000000000000000000000000ca201");
        assert_eq!(inner.get_or_create_account(carol).account_number, 2);
    }
}
