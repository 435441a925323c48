//! # State Adapter
//!
//! Journaled in-memory world state.
//!
//! Every mutation made while a checkpoint is open is recorded in an undo
//! journal; `revert` replays it backwards down to the checkpoint's mark.
//! `compute_root` is a flat keccak commitment over the RLP-encoded accounts
//! in address order. It is deterministic, but it is not a Merkle-Patricia
//! root: authenticated roots belong to the production store.

use crate::domain::entities::Account;
use crate::domain::services::keccak256;
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::StateError;
use crate::ports::outbound::{Checkpoint, StateBackend};
use rlp::RlpStream;
use std::collections::BTreeMap;

type Slots = BTreeMap<StorageKey, StorageValue>;

#[derive(Clone, Debug)]
enum JournalEntry {
    Account {
        address: Address,
        previous: Option<Account>,
    },
    Slot {
        address: Address,
        key: StorageKey,
        previous: StorageValue,
    },
    Wiped {
        address: Address,
        previous: Slots,
    },
    Code(Hash),
}

/// In-memory state store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryState {
    accounts: BTreeMap<Address, Account>,
    storage: BTreeMap<Address, Slots>,
    code: BTreeMap<Hash, Bytes>,
    journal: Vec<JournalEntry>,
    /// Open checkpoints, innermost last: (id, journal mark).
    checkpoints: Vec<(u64, usize)>,
    next_checkpoint: u64,
}

impl InMemoryState {
    /// Create a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Genesis-style constructor.
    #[must_use]
    pub fn with_accounts(accounts: impl IntoIterator<Item = (Address, Account)>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Sets the balance of `address`, creating the account if needed.
    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.record_account(address);
        self.accounts.entry(address).or_default().balance = balance;
    }

    /// Attaches `code` to `address`, creating the account if needed.
    pub fn set_code(&mut self, address: Address, code: Bytes) -> Hash {
        let hash = self.store_code(code);
        self.record_account(address);
        self.accounts.entry(address).or_default().code_hash = hash;
        hash
    }

    /// Every non-zero slot of `address`.
    #[must_use]
    pub fn storage_of(&self, address: &Address) -> Slots {
        self.storage.get(address).cloned().unwrap_or_default()
    }

    /// All accounts, in address order.
    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &Account)> {
        self.accounts.iter()
    }

    /// Number of checkpoints still open.
    #[must_use]
    pub fn open_checkpoints(&self) -> usize {
        self.checkpoints.len()
    }

    fn journaling(&self) -> bool {
        !self.checkpoints.is_empty()
    }

    fn record_account(&mut self, address: Address) {
        if self.journaling() {
            let previous = self.accounts.get(&address).cloned();
            self.journal.push(JournalEntry::Account { address, previous });
        }
    }

    fn store_code(&mut self, code: Bytes) -> Hash {
        if code.is_empty() {
            return Account::EMPTY_CODE_HASH;
        }
        let hash = keccak256(code.as_slice());
        if !self.code.contains_key(&hash) {
            self.code.insert(hash, code);
            if self.journaling() {
                self.journal.push(JournalEntry::Code(hash));
            }
        }
        hash
    }

    fn close(&mut self, checkpoint: Checkpoint) -> Result<usize, StateError> {
        match self.checkpoints.last() {
            Some(&(id, mark)) if id == checkpoint.0 => {
                self.checkpoints.pop();
                Ok(mark)
            }
            innermost => Err(StateError::CheckpointMismatch {
                expected: innermost.map(|&(id, _)| id),
                got: checkpoint.0,
            }),
        }
    }

    fn undo(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::Account { address, previous } => match previous {
                Some(account) => {
                    self.accounts.insert(address, account);
                }
                None => {
                    self.accounts.remove(&address);
                }
            },
            JournalEntry::Slot {
                address,
                key,
                previous,
            } => write_slot(&mut self.storage, address, key, previous),
            JournalEntry::Wiped { address, previous } => {
                if previous.is_empty() {
                    self.storage.remove(&address);
                } else {
                    self.storage.insert(address, previous);
                }
            }
            JournalEntry::Code(hash) => {
                self.code.remove(&hash);
            }
        }
    }

    fn storage_root(slots: Option<&Slots>) -> Hash {
        let Some(slots) = slots.filter(|s| !s.is_empty()) else {
            return Account::EMPTY_STORAGE_ROOT;
        };
        let mut stream = RlpStream::new_list(slots.len());
        for (key, value) in slots {
            stream.begin_list(2);
            stream.append(&key.as_bytes().to_vec());
            stream.append(&value.to_u256());
        }
        keccak256(&stream.out())
    }
}

fn write_slot(
    storage: &mut BTreeMap<Address, Slots>,
    address: Address,
    key: StorageKey,
    value: StorageValue,
) {
    if value.is_zero() {
        if let Some(slots) = storage.get_mut(&address) {
            slots.remove(&key);
            if slots.is_empty() {
                storage.remove(&address);
            }
        }
    } else {
        storage.entry(address).or_default().insert(key, value);
    }
}

impl StateBackend for InMemoryState {
    fn get_account(&self, address: &Address) -> Result<Option<Account>, StateError> {
        Ok(self.accounts.get(address).cloned())
    }

    fn put_account(&mut self, address: Address, account: Account) -> Result<(), StateError> {
        self.record_account(address);
        self.accounts.insert(address, account);
        Ok(())
    }

    fn delete_account(&mut self, address: &Address) -> Result<(), StateError> {
        self.record_account(*address);
        self.accounts.remove(address);
        let previous = self.storage.remove(address).unwrap_or_default();
        if self.journaling() {
            self.journal.push(JournalEntry::Wiped {
                address: *address,
                previous,
            });
        }
        Ok(())
    }

    fn get_storage(
        &self,
        address: &Address,
        key: &StorageKey,
    ) -> Result<StorageValue, StateError> {
        Ok(self
            .storage
            .get(address)
            .and_then(|slots| slots.get(key))
            .copied()
            .unwrap_or(StorageValue::ZERO))
    }

    fn put_storage(
        &mut self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), StateError> {
        if self.journaling() {
            let previous = self.get_storage(&address, &key)?;
            self.journal.push(JournalEntry::Slot {
                address,
                key,
                previous,
            });
        }
        write_slot(&mut self.storage, address, key, value);
        Ok(())
    }

    fn get_code(&self, code_hash: &Hash) -> Result<Bytes, StateError> {
        if *code_hash == Account::EMPTY_CODE_HASH {
            return Ok(Bytes::new());
        }
        self.code
            .get(code_hash)
            .cloned()
            .ok_or(StateError::CodeNotFound(*code_hash))
    }

    fn put_code(&mut self, code: Bytes) -> Result<Hash, StateError> {
        Ok(self.store_code(code))
    }

    fn checkpoint(&mut self) -> Result<Checkpoint, StateError> {
        let id = self.next_checkpoint;
        self.next_checkpoint += 1;
        self.checkpoints.push((id, self.journal.len()));
        Ok(Checkpoint(id))
    }

    fn commit(&mut self, checkpoint: Checkpoint) -> Result<(), StateError> {
        self.close(checkpoint)?;
        if self.checkpoints.is_empty() {
            self.journal.clear();
        }
        Ok(())
    }

    fn revert(&mut self, checkpoint: Checkpoint) -> Result<(), StateError> {
        let mark = self.close(checkpoint)?;
        while self.journal.len() > mark {
            if let Some(entry) = self.journal.pop() {
                self.undo(entry);
            }
        }
        Ok(())
    }

    fn compute_root(&mut self) -> Result<Hash, StateError> {
        let mut stream = RlpStream::new_list(self.accounts.len());
        for (address, account) in &mut self.accounts {
            account.storage_root = Self::storage_root(self.storage.get(address));
            stream.begin_list(2);
            stream.append(address);
            stream.append(&*account);
        }
        Ok(keccak256(&stream.out()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::low(n)
    }

    fn word(n: u64) -> StorageValue {
        StorageValue::from_u256(U256::from(n))
    }

    #[test]
    fn test_accounts_are_created_lazily() {
        let mut state = InMemoryState::new();
        assert!(state.get_account(&addr(1)).unwrap().is_none());

        state.set_balance(addr(1), U256::from(1000));
        assert_eq!(state.get_balance(&addr(1)).unwrap(), U256::from(1000));
        assert_eq!(state.get_account(&addr(1)).unwrap().unwrap().nonce, 0);
    }

    #[test]
    fn test_storage_defaults_to_zero() {
        let mut state = InMemoryState::new();
        let key = StorageKey::from(0u64);
        assert!(state.get_storage(&addr(1), &key).unwrap().is_zero());

        state.put_storage(addr(1), key, word(42)).unwrap();
        assert_eq!(state.get_storage(&addr(1), &key).unwrap(), word(42));

        state.put_storage(addr(1), key, StorageValue::ZERO).unwrap();
        assert!(state.storage_of(&addr(1)).is_empty());
    }

    #[test]
    fn test_code_is_content_addressed() {
        let mut state = InMemoryState::new();
        let code = Bytes::from(vec![0x60, 0x00, 0x60, 0x00, 0xf3]);
        let hash = state.put_code(code.clone()).unwrap();
        assert_eq!(hash, keccak256(code.as_slice()));
        assert_eq!(state.get_code(&hash).unwrap(), code);

        assert_eq!(state.put_code(Bytes::new()).unwrap(), Account::EMPTY_CODE_HASH);
        assert!(state.get_code(&Account::EMPTY_CODE_HASH).unwrap().is_empty());
        assert!(matches!(
            state.get_code(&Hash::new([9; 32])),
            Err(StateError::CodeNotFound(_))
        ));
    }

    #[test]
    fn test_revert_restores_everything() {
        let mut state = InMemoryState::new();
        state.set_balance(addr(1), U256::from(10));
        state.put_storage(addr(1), StorageKey::from(1u64), word(1)).unwrap();
        let before = state.compute_root().unwrap();

        let cp = state.checkpoint().unwrap();
        state.set_balance(addr(1), U256::from(99));
        state.set_balance(addr(2), U256::from(5));
        state.put_storage(addr(1), StorageKey::from(1u64), word(7)).unwrap();
        state.put_storage(addr(1), StorageKey::from(2u64), word(8)).unwrap();
        let hash = state.set_code(addr(3), Bytes::from(vec![0x00]));
        state.delete_account(&addr(1)).unwrap();
        state.revert(cp).unwrap();

        assert_eq!(state.get_balance(&addr(1)).unwrap(), U256::from(10));
        assert!(state.get_account(&addr(2)).unwrap().is_none());
        assert!(state.get_account(&addr(3)).unwrap().is_none());
        assert!(state.get_code(&hash).is_err());
        assert_eq!(state.storage_of(&addr(1)).len(), 1);
        assert_eq!(state.compute_root().unwrap(), before);
    }

    #[test]
    fn test_nested_commit_then_outer_revert() {
        let mut state = InMemoryState::new();
        let outer = state.checkpoint().unwrap();
        let inner = state.checkpoint().unwrap();
        state.set_balance(addr(1), U256::from(1));
        state.commit(inner).unwrap();
        assert_eq!(state.get_balance(&addr(1)).unwrap(), U256::from(1));

        state.revert(outer).unwrap();
        assert!(state.get_account(&addr(1)).unwrap().is_none());
        assert_eq!(state.open_checkpoints(), 0);
    }

    #[test]
    fn test_checkpoints_must_close_innermost_first() {
        let mut state = InMemoryState::new();
        let outer = state.checkpoint().unwrap();
        let inner = state.checkpoint().unwrap();

        let err = state.commit(outer).unwrap_err();
        assert_eq!(
            err,
            StateError::CheckpointMismatch {
                expected: Some(inner.0),
                got: outer.0
            }
        );

        state.commit(inner).unwrap();
        state.commit(outer).unwrap();
        assert!(state.revert(outer).is_err());
    }

    #[test]
    fn test_root_is_order_independent_and_tracks_storage() {
        let mut a = InMemoryState::new();
        a.set_balance(addr(1), U256::from(1));
        a.set_balance(addr(2), U256::from(2));

        let mut b = InMemoryState::new();
        b.set_balance(addr(2), U256::from(2));
        b.set_balance(addr(1), U256::from(1));

        assert_eq!(a.compute_root().unwrap(), b.compute_root().unwrap());

        b.put_storage(addr(1), StorageKey::from(0u64), word(1)).unwrap();
        assert_ne!(a.compute_root().unwrap(), b.compute_root().unwrap());
        let account = b.get_account(&addr(1)).unwrap().unwrap();
        assert_ne!(account.storage_root, Account::EMPTY_STORAGE_ROOT);
    }
}
