//! Pure, deterministic helpers: hashing, contract address derivation and
//! intrinsic gas.

use sha3::{Digest, Keccak256};

use crate::domain::value_objects::{Address, Hash};
use crate::evm::gas::costs;

/// Keccak-256 of `data`.
#[must_use]
pub fn keccak256(data: &[u8]) -> Hash {
    Hash::new(Keccak256::digest(data).into())
}

/// Address created by CREATE or a creation transaction.
///
/// `keccak256(rlp([sender, nonce]))[12..]`
#[must_use]
pub fn compute_contract_address(sender: Address, nonce: u64) -> Address {
    let mut stream = rlp::RlpStream::new_list(2);
    stream.append(&sender);
    stream.append(&nonce);
    address_tail(&keccak256(&stream.out()))
}

/// Address created by CREATE2.
///
/// `keccak256(0xff ++ sender ++ salt ++ keccak256(init_code))[12..]`
#[must_use]
pub fn compute_contract_address_create2(sender: Address, salt: Hash, init_code: &[u8]) -> Address {
    let preimage: Vec<u8> = std::iter::once(0xff)
        .chain(sender.as_bytes().iter().copied())
        .chain(salt.0)
        .chain(keccak256(init_code).0)
        .collect();
    address_tail(&keccak256(&preimage))
}

fn address_tail(digest: &Hash) -> Address {
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest.0[12..]);
    Address(out)
}

/// Gas charged for including a transaction, before any code runs.
///
/// 21000 base, 32000 more for creation plus 2 per init-code word, and
/// 4 / 16 per zero / non-zero payload byte.
#[must_use]
pub fn intrinsic_gas(data: &[u8], is_create: bool) -> u64 {
    let zeros = data.iter().filter(|b| **b == 0).count() as u64;
    let payload = zeros * costs::TX_DATA_ZERO
        + (data.len() as u64 - zeros) * costs::TX_DATA_NON_ZERO;
    let creation = if is_create {
        costs::TX_CREATE + costs::INIT_CODE_WORD * (data.len() as u64).div_ceil(32)
    } else {
        0
    };
    costs::TX_BASE + payload + creation
}

/// Addresses of the registered precompiled contracts.
pub mod precompiles {
    use super::Address;

    /// Signature recovery (0x01).
    pub const ECRECOVER: Address = Address::low(1);

    /// SHA-256 (0x02).
    pub const SHA256: Address = Address::low(2);

    /// Identity / data copy (0x04).
    pub const IDENTITY: Address = Address::low(4);

    /// Every registered address, in ascending order.
    pub const ALL: [Address; 3] = [ECRECOVER, SHA256, IDENTITY];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak256_empty() {
        use crate::domain::entities::Account;
        assert_eq!(keccak256(&[]), Account::EMPTY_CODE_HASH);
    }

    #[test]
    fn test_empty_storage_root_is_hash_of_rlp_empty_string() {
        use crate::domain::entities::Account;
        assert_eq!(keccak256(&[0x80]), Account::EMPTY_STORAGE_ROOT);
    }

    #[test]
    fn test_compute_contract_address_known_vector() {
        // sender 0x6ac7ea33f8831ea9dcc53393aaa88b25a785dbf0, nonce 0
        let sender = Address::new([
            0x6a, 0xc7, 0xea, 0x33, 0xf8, 0x83, 0x1e, 0xa9, 0xdc, 0xc5, 0x33, 0x93, 0xaa, 0xa8,
            0x8b, 0x25, 0xa7, 0x85, 0xdb, 0xf0,
        ]);
        let expected = Address::new([
            0xcd, 0x23, 0x4a, 0x47, 0x1b, 0x72, 0xba, 0x2f, 0x1c, 0xcf, 0x0a, 0x70, 0xfc, 0xab,
            0xa6, 0x48, 0xa5, 0xee, 0xcd, 0x8d,
        ]);
        assert_eq!(compute_contract_address(sender, 0), expected);
        assert_ne!(compute_contract_address(sender, 1), expected);
    }

    #[test]
    fn test_create2_known_vector() {
        // EIP-1014 example 0: zero sender, zero salt, init code 0x00
        let expected = Address::new([
            0x4d, 0x1a, 0x2e, 0x2b, 0xb4, 0xf8, 0x8f, 0x02, 0x50, 0xf2, 0x6f, 0xff, 0xf0, 0x98,
            0xb0, 0xb3, 0x0b, 0x26, 0xbf, 0x38,
        ]);
        let addr = compute_contract_address_create2(Address::ZERO, Hash::ZERO, &[0x00]);
        assert_eq!(addr, expected);
    }

    #[test]
    fn test_create2_different_salt() {
        let sender = Address::new([1u8; 20]);
        let addr1 = compute_contract_address_create2(sender, Hash::new([1u8; 32]), &[0x00]);
        let addr2 = compute_contract_address_create2(sender, Hash::new([2u8; 32]), &[0x00]);
        assert_ne!(addr1, addr2);
    }

    #[test]
    fn test_intrinsic_gas_transfer() {
        assert_eq!(intrinsic_gas(&[], false), 21_000);
    }

    #[test]
    fn test_intrinsic_gas_with_data() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 0, 0, 0, 0, 0];
        assert_eq!(intrinsic_gas(&data, false), 21_000 + 160 + 20);
    }

    #[test]
    fn test_intrinsic_gas_creation() {
        assert_eq!(intrinsic_gas(&[], true), 53_000);
        // one zero byte, one init-code word
        assert_eq!(intrinsic_gas(&[0x00], true), 53_000 + 4 + 2);
        assert_eq!(intrinsic_gas(&[0u8; 33], true), 53_000 + 33 * 4 + 2 * 2);
    }
}
