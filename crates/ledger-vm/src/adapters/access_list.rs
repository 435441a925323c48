//! EIP-2929 warm/cold tracking with an undo journal.

use std::collections::HashSet;

use crate::domain::value_objects::{Address, StorageKey};
use crate::ports::outbound::{AccessList, AccessStatus};

#[derive(Clone, Copy, Debug)]
enum Warmed {
    Account(Address),
    Slot(Address, StorageKey),
}

/// Warm sets for one transaction. Reverting to a checkpoint re-colds
/// everything first touched after it.
#[derive(Clone, Debug, Default)]
pub struct InMemoryAccessList {
    warm_accounts: HashSet<Address>,
    warm_storage: HashSet<(Address, StorageKey)>,
    journal: Vec<Warmed>,
}

impl InMemoryAccessList {
    /// Nothing warm.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `accounts` warm.
    #[must_use]
    pub fn with_prewarmed(accounts: impl IntoIterator<Item = Address>) -> Self {
        let mut list = Self::new();
        accounts.into_iter().for_each(|address| list.warm_account(address));
        list
    }

    fn record(&mut self, newly_warm: bool, entry: Warmed) -> AccessStatus {
        if !newly_warm {
            return AccessStatus::Warm;
        }
        self.journal.push(entry);
        AccessStatus::Cold
    }
}

impl AccessList for InMemoryAccessList {
    fn touch_account(&mut self, address: Address) -> AccessStatus {
        let fresh = self.warm_accounts.insert(address);
        self.record(fresh, Warmed::Account(address))
    }

    fn touch_storage(&mut self, address: Address, key: StorageKey) -> AccessStatus {
        let fresh = self.warm_storage.insert((address, key));
        self.record(fresh, Warmed::Slot(address, key))
    }

    fn is_account_warm(&self, address: &Address) -> bool {
        self.warm_accounts.contains(address)
    }

    fn is_storage_warm(&self, address: &Address, key: &StorageKey) -> bool {
        self.warm_storage.contains(&(*address, *key))
    }

    fn checkpoint(&self) -> usize {
        self.journal.len()
    }

    fn revert(&mut self, checkpoint: usize) {
        if checkpoint >= self.journal.len() {
            return;
        }
        for entry in self.journal.drain(checkpoint..) {
            match entry {
                Warmed::Account(address) => {
                    self.warm_accounts.remove(&address);
                }
                Warmed::Slot(address, key) => {
                    self.warm_storage.remove(&(address, key));
                }
            }
        }
    }

    fn clear(&mut self) {
        self.warm_accounts.clear();
        self.warm_storage.clear();
        self.journal.clear();
    }
}
