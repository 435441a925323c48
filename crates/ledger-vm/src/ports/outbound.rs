//! # Driven Ports (SPI - Outbound)
//!
//! Interfaces the engine depends on:
//! - `StateBackend`: the authenticated account store
//! - `AccessList`: warm/cold bookkeeping for one transaction
//!
//! Both are synchronous. A store that is naturally asynchronous is wrapped
//! in a blocking adapter so that no opcode ever suspends half-way.

use crate::domain::entities::Account;
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::StateError;

// =============================================================================
// STATE BACKEND
// =============================================================================

/// Handle to an open state checkpoint.
///
/// Checkpoints nest strictly: only the innermost open one may be committed
/// or reverted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Checkpoint(pub u64);

/// Account and storage store.
///
/// ## Contract
///
/// - `get_storage` returns zero for slots never written
/// - `put_code` is content-addressed and returns `keccak256(code)`
/// - changes made after `checkpoint()` are undone by `revert` and kept by
///   `commit`; either call closes the checkpoint
/// - `compute_root` is a pure function of the current contents
pub trait StateBackend: Send + Sync {
    /// Account at `address`, `None` if never created.
    fn get_account(&self, address: &Address) -> Result<Option<Account>, StateError>;

    /// Creates or overwrites the account at `address`.
    fn put_account(&mut self, address: Address, account: Account) -> Result<(), StateError>;

    /// Removes the account and its storage.
    fn delete_account(&mut self, address: &Address) -> Result<(), StateError>;

    /// Storage slot value, zero if unset.
    fn get_storage(&self, address: &Address, key: &StorageKey)
        -> Result<StorageValue, StateError>;

    /// Writes a storage slot; writing zero clears it.
    fn put_storage(
        &mut self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), StateError>;

    /// Code stored under `code_hash`.
    fn get_code(&self, code_hash: &Hash) -> Result<Bytes, StateError>;

    /// Stores `code` and returns its hash.
    fn put_code(&mut self, code: Bytes) -> Result<Hash, StateError>;

    /// Opens a checkpoint.
    fn checkpoint(&mut self) -> Result<Checkpoint, StateError>;

    /// Keeps every change since `checkpoint` and closes it.
    fn commit(&mut self, checkpoint: Checkpoint) -> Result<(), StateError>;

    /// Undoes every change since `checkpoint` and closes it.
    fn revert(&mut self, checkpoint: Checkpoint) -> Result<(), StateError>;

    /// Commitment to the whole world state.
    fn compute_root(&mut self) -> Result<Hash, StateError>;

    /// Balance of `address`, zero for unknown accounts.
    fn get_balance(&self, address: &Address) -> Result<U256, StateError> {
        Ok(self
            .get_account(address)?
            .map(|account| account.balance)
            .unwrap_or_default())
    }

    /// Code of the account at `address`, empty for plain accounts.
    fn code_at(&self, address: &Address) -> Result<Bytes, StateError> {
        match self.get_account(address)? {
            Some(account) if account.has_code() => self.get_code(&account.code_hash),
            _ => Ok(Bytes::new()),
        }
    }
}

// =============================================================================
// ACCESS LIST (EIP-2929)
// =============================================================================

/// Access status for storage/accounts (EIP-2929).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessStatus {
    /// First access in this transaction (cold).
    Cold,
    /// Already accessed in this transaction (warm).
    Warm,
}

impl AccessStatus {
    /// Returns true on first access.
    #[must_use]
    pub fn is_cold(self) -> bool {
        self == Self::Cold
    }
}

/// Interface for tracking warm/cold access status.
///
/// Additions are journaled so that a failed frame can drop the entries it
/// warmed.
pub trait AccessList: Send + Sync {
    /// Check and mark account as accessed.
    ///
    /// Returns the previous access status.
    fn touch_account(&mut self, address: Address) -> AccessStatus;

    /// Check and mark storage slot as accessed.
    ///
    /// Returns the previous access status.
    fn touch_storage(&mut self, address: Address, key: StorageKey) -> AccessStatus;

    /// Check if account is warm.
    fn is_account_warm(&self, address: &Address) -> bool;

    /// Check if storage slot is warm.
    fn is_storage_warm(&self, address: &Address, key: &StorageKey) -> bool;

    /// Position to roll back to.
    fn checkpoint(&self) -> usize;

    /// Forgets every entry added after `checkpoint`.
    fn revert(&mut self, checkpoint: usize);

    /// Forgets everything.
    fn clear(&mut self);

    /// Pre-warm an account.
    fn warm_account(&mut self, address: Address) {
        let _ = self.touch_account(address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct AccountsOnly {
        accounts: BTreeMap<Address, Account>,
        code: BTreeMap<Hash, Bytes>,
    }

    impl StateBackend for AccountsOnly {
        fn get_account(&self, address: &Address) -> Result<Option<Account>, StateError> {
            Ok(self.accounts.get(address).cloned())
        }

        fn put_account(&mut self, address: Address, account: Account) -> Result<(), StateError> {
            self.accounts.insert(address, account);
            Ok(())
        }

        fn delete_account(&mut self, address: &Address) -> Result<(), StateError> {
            self.accounts.remove(address);
            Ok(())
        }

        fn get_storage(
            &self,
            _address: &Address,
            _key: &StorageKey,
        ) -> Result<StorageValue, StateError> {
            Ok(StorageValue::ZERO)
        }

        fn put_storage(
            &mut self,
            _address: Address,
            _key: StorageKey,
            _value: StorageValue,
        ) -> Result<(), StateError> {
            Err(StateError::Unavailable)
        }

        fn get_code(&self, code_hash: &Hash) -> Result<Bytes, StateError> {
            self.code
                .get(code_hash)
                .cloned()
                .ok_or(StateError::CodeNotFound(*code_hash))
        }

        fn put_code(&mut self, code: Bytes) -> Result<Hash, StateError> {
            let hash = crate::domain::services::keccak256(code.as_slice());
            self.code.insert(hash, code);
            Ok(hash)
        }

        fn checkpoint(&mut self) -> Result<Checkpoint, StateError> {
            Err(StateError::Unavailable)
        }

        fn commit(&mut self, _checkpoint: Checkpoint) -> Result<(), StateError> {
            Err(StateError::Unavailable)
        }

        fn revert(&mut self, _checkpoint: Checkpoint) -> Result<(), StateError> {
            Err(StateError::Unavailable)
        }

        fn compute_root(&mut self) -> Result<Hash, StateError> {
            Ok(Hash::ZERO)
        }
    }

    #[test]
    fn test_access_status() {
        assert!(AccessStatus::Cold.is_cold());
        assert!(!AccessStatus::Warm.is_cold());
    }

    #[test]
    fn test_default_balance_and_code() {
        let mut state = AccountsOnly::default();
        let plain = Address::low(0xaa);
        let contract = Address::low(0xbb);

        assert_eq!(state.get_balance(&plain).unwrap(), U256::zero());
        assert!(state.code_at(&plain).unwrap().is_empty());

        let hash = state.put_code(Bytes::from(vec![0x00])).unwrap();
        let mut account = Account::new(U256::from(5), 1);
        account.code_hash = hash;
        state.put_account(contract, account).unwrap();

        assert_eq!(state.get_balance(&contract).unwrap(), U256::from(5));
        assert_eq!(state.code_at(&contract).unwrap().as_slice(), &[0x00]);
    }
}
