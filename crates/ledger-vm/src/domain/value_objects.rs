//! Immutable primitives shared by every layer of the engine: addresses,
//! hashes, storage words, byte buffers and the per-frame gas meter.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::VmError;

pub use primitive_types::U256;

fn write_hex(f: &mut fmt::Formatter<'_>, raw: &[u8]) -> fmt::Result {
    f.write_str("0x")?;
    raw.iter().try_for_each(|b| write!(f, "{b:02x}"))
}

/// Shared surface of the fixed-width byte newtypes.
macro_rules! fixed_bytes {
    ($name:ident, $len:expr) => {
        impl $name {
            /// All bytes zero.
            pub const ZERO: Self = Self([0u8; $len]);

            /// Wraps raw bytes.
            #[must_use]
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// `None` unless `slice` is exactly the right width.
            #[must_use]
            pub fn from_slice(slice: &[u8]) -> Option<Self> {
                <[u8; $len]>::try_from(slice).ok().map(Self)
            }

            /// Borrows the raw bytes.
            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// True when every byte is zero.
            #[must_use]
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }
    };
}

fn word_bytes(word: U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    word.to_big_endian(&mut out);
    out
}

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

fixed_bytes!(Address, 20);

impl Address {
    /// Address ending in byte `n`, zero elsewhere. Precompiles live here.
    #[must_use]
    pub const fn low(n: u8) -> Self {
        let mut out = [0u8; 20];
        out[19] = n;
        Self(out)
    }

    /// Low 160 bits of a stack word.
    #[must_use]
    pub fn from_word(word: U256) -> Self {
        let full = word_bytes(word);
        let mut out = [0u8; 20];
        out.copy_from_slice(&full[12..]);
        Self(out)
    }

    /// Left-pads into a stack word.
    #[must_use]
    pub fn to_word(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

/// A 32-byte digest, Keccak-256 unless stated otherwise.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

fixed_bytes!(Hash, 32);

impl Hash {
    /// Reads the digest as a big-endian word.
    #[must_use]
    pub fn to_word(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // abbreviated: first and last four bytes
        write_hex(f, &self.0[..4])?;
        f.write_str("..")?;
        self.0[28..]
            .iter()
            .try_for_each(|b| write!(f, "{b:02x}"))
    }
}

/// Key of one persistent storage slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StorageKey(pub [u8; 32]);

fixed_bytes!(StorageKey, 32);

impl StorageKey {
    /// Big-endian bytes of `word`.
    #[must_use]
    pub fn from_u256(word: U256) -> Self {
        Self(word_bytes(word))
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", U256::from_big_endian(&self.0))
    }
}

impl From<U256> for StorageKey {
    fn from(word: U256) -> Self {
        Self::from_u256(word)
    }
}

impl From<u64> for StorageKey {
    fn from(n: u64) -> Self {
        Self::from_u256(U256::from(n))
    }
}

/// Content of one persistent storage slot. Unset slots read as zero.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct StorageValue(pub [u8; 32]);

fixed_bytes!(StorageValue, 32);

impl StorageValue {
    /// Big-endian bytes of `word`.
    #[must_use]
    pub fn from_u256(word: U256) -> Self {
        Self(word_bytes(word))
    }

    /// Back to a stack word.
    #[must_use]
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl fmt::Debug for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl From<U256> for StorageValue {
    fn from(word: U256) -> Self {
        Self::from_u256(word)
    }
}

/// Owned byte buffer for call data, return data and code.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bytes(pub Vec<u8>);

impl Bytes {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Bytes(Vec::new())
    }

    /// Copies a slice into a new buffer.
    #[must_use]
    pub fn from_slice(raw: &[u8]) -> Self {
        Bytes(raw.to_vec())
    }

    /// Unwraps the vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Borrows the contents.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Byte count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for zero bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.len() <= 32 {
            write_hex(f, &self.0)
        } else {
            write_hex(f, &self.0[..16])?;
            write!(f, "..({} bytes)", self.0.len())
        }
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(raw: Vec<u8>) -> Self {
        Self(raw)
    }
}

impl From<&[u8]> for Bytes {
    fn from(raw: &[u8]) -> Self {
        Self::from_slice(raw)
    }
}

impl AsRef<[u8]> for Bytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Remaining-gas ledger for one call frame.
///
/// The meter knows nothing about opcodes: every static and dynamic cost is
/// computed elsewhere and charged through [`GasMeter::charge`].
///
/// `remaining` never exceeds `limit`, and a refused charge changes nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    remaining: u64,
    refund: u64,
}

impl GasMeter {
    /// Creates a meter holding `limit` gas.
    #[must_use]
    pub const fn new(limit: u64) -> Self {
        Self {
            limit,
            remaining: limit,
            refund: 0,
        }
    }

    /// Gas still available.
    #[must_use]
    pub const fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Refund counter accumulated by storage clears.
    #[must_use]
    pub const fn refund(&self) -> u64 {
        self.refund
    }

    /// Deducts `amount`.
    ///
    /// # Errors
    ///
    /// `OutOfGas` if `amount` exceeds the remaining gas.
    pub fn charge(&mut self, amount: u64) -> Result<(), VmError> {
        if amount > self.remaining {
            return Err(VmError::OutOfGas);
        }
        self.remaining -= amount;
        Ok(())
    }

    /// Gives back gas a child frame did not use.
    pub fn reclaim(&mut self, amount: u64) {
        self.remaining = self.remaining.saturating_add(amount).min(self.limit);
    }

    /// Adds to the refund counter.
    pub fn add_refund(&mut self, credit: u64) {
        self.refund = self.refund.saturating_add(credit);
    }
}
