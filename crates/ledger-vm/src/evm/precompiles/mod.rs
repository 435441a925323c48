//! # Precompiled Contracts
//!
//! Native functions at reserved low addresses, reachable through the CALL
//! family like ordinary code.
//!
//! | Address | Contract | Gas |
//! |---------|----------|-----|
//! | `0x01` | ECRECOVER | 3000 |
//! | `0x02` | SHA256 | 60 + 12 per word |
//! | `0x04` | IDENTITY | 15 + 3 per word |

pub mod ecrecover;
pub mod identity;
pub mod sha256;

use std::collections::BTreeMap;
use std::fmt;

use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;

/// Precompile execution result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrecompileOutput {
    /// Gas used by the precompile.
    pub gas_used: u64,
    /// Output data.
    pub output: Bytes,
}

/// A precompiled contract.
pub trait Precompile: Send + Sync {
    /// Runs the contract on `input` with `gas_limit` gas available.
    ///
    /// # Errors
    ///
    /// `OutOfGas` when the input costs more than `gas_limit`.
    fn execute(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError>;

    /// Address the contract is registered at.
    fn address(&self) -> Address;
}

/// Charges `cost` against `gas_limit`.
pub(crate) fn ensure_gas(cost: u64, gas_limit: u64) -> Result<(), PrecompileError> {
    if cost > gas_limit {
        return Err(PrecompileError::OutOfGas {
            required: cost,
            available: gas_limit,
        });
    }
    Ok(())
}

pub(crate) fn words(len: usize) -> u64 {
    (len as u64).div_ceil(32)
}

/// Fixed table of precompiled contracts, keyed by address.
pub struct PrecompileRegistry {
    contracts: BTreeMap<Address, Box<dyn Precompile>>,
}

impl PrecompileRegistry {
    /// Empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            contracts: BTreeMap::new(),
        }
    }

    /// ECRECOVER, SHA256 and IDENTITY at their standard addresses.
    #[must_use]
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(ecrecover::Ecrecover));
        registry.register(Box::new(sha256::Sha256Precompile));
        registry.register(Box::new(identity::Identity));
        registry
    }

    /// Adds `contract` at its own address, replacing any previous entry.
    pub fn register(&mut self, contract: Box<dyn Precompile>) {
        self.contracts.insert(contract.address(), contract);
    }

    /// Returns true if `address` is a registered precompile.
    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.contracts.contains_key(address)
    }

    /// Registered addresses in ascending order.
    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.contracts.keys().copied()
    }

    /// Runs the contract at `address`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unregistered address, otherwise whatever the
    /// contract reports.
    pub fn invoke(
        &self,
        address: Address,
        input: &[u8],
        gas_limit: u64,
    ) -> Result<PrecompileOutput, PrecompileError> {
        let contract = self
            .contracts
            .get(&address)
            .ok_or(PrecompileError::NotFound(address))?;
        contract.execute(input, gas_limit)
    }
}

impl Default for PrecompileRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for PrecompileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.contracts.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::precompiles;

    #[test]
    fn test_standard_addresses() {
        let registry = PrecompileRegistry::standard();
        let addresses: Vec<_> = registry.addresses().collect();
        assert_eq!(addresses, precompiles::ALL.to_vec());
        assert!(!registry.contains(&Address::low(3)));
        assert!(!registry.contains(&Address::low(5)));
    }

    #[test]
    fn test_invoke_identity() {
        let registry = PrecompileRegistry::standard();
        let output = registry
            .invoke(precompiles::IDENTITY, b"hello world", 100_000)
            .unwrap();
        assert_eq!(output.output.as_slice(), b"hello world");
        assert_eq!(output.gas_used, 15 + 3);
    }

    #[test]
    fn test_invoke_unregistered() {
        let registry = PrecompileRegistry::standard();
        let err = registry.invoke(Address::low(9), b"", 100_000).unwrap_err();
        assert_eq!(err, PrecompileError::NotFound(Address::low(9)));
    }
}
