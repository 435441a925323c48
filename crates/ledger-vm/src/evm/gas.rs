//! Static and dynamic costs (Berlin schedule with Shanghai PUSH0 and
//! init-code metering). Costs are computed here and charged through
//! [`GasMeter::charge`](crate::domain::GasMeter::charge); nothing in this
//! module touches a meter.

use crate::domain::value_objects::{StorageValue, U256};

/// Named prices of the schedule.
pub mod costs {
    /// Tier of ADDRESS, POP, GAS.
    pub const BASE: u64 = 2;
    /// Tier of ADD, MLOAD, PUSHn.
    pub const VERY_LOW: u64 = 3;
    /// Tier of MUL, DIV, SELFBALANCE.
    pub const LOW: u64 = 5;
    /// Tier of ADDMOD, JUMP.
    pub const MID: u64 = 8;
    /// Tier of JUMPI.
    pub const HIGH: u64 = 10;
    /// JUMPDEST marker.
    pub const JUMPDEST: u64 = 1;

    // transactions
    /// Intrinsic cost of every transaction.
    pub const TX_BASE: u64 = 21_000;
    /// Added to the intrinsic cost of a creation transaction.
    pub const TX_CREATE: u64 = 32_000;
    /// Per non-zero payload byte.
    pub const TX_DATA_NON_ZERO: u64 = 16;
    /// Per zero payload byte.
    pub const TX_DATA_ZERO: u64 = 4;
    /// Per 32-byte word of init code.
    pub const INIT_CODE_WORD: u64 = 2;

    // memory
    /// Per word of linear memory.
    pub const MEMORY_WORD: u64 = 3;
    /// Divisor of the quadratic memory term.
    pub const MEMORY_QUAD_DIVISOR: u64 = 512;
    /// Per word copied.
    pub const COPY: u64 = 3;

    // EIP-2929 access
    /// First touch of a storage slot in a transaction.
    pub const COLD_SLOAD: u64 = 2100;
    /// Later touches of a storage slot.
    pub const WARM_STORAGE_READ: u64 = 100;
    /// First touch of an account in a transaction.
    pub const COLD_ACCOUNT_ACCESS: u64 = 2600;
    /// Later touches of an account.
    pub const WARM_ACCOUNT_ACCESS: u64 = 100;

    // SSTORE
    /// Writing non-zero into a zero slot.
    pub const SSTORE_SET: u64 = 20_000;
    /// Any other write (before the cold surcharge).
    pub const SSTORE_RESET: u64 = 2900;
    /// Refund for clearing a non-zero slot.
    pub const SSTORE_CLEAR_REFUND: u64 = 4800;
    /// SSTORE fails if no more than this remains.
    pub const SSTORE_SENTRY: u64 = 2300;

    // CALL family
    /// Surcharge for a value-bearing call.
    pub const CALL_VALUE: u64 = 9000;
    /// Surcharge for sending value to an empty account.
    pub const CALL_NEW_ACCOUNT: u64 = 25_000;
    /// Free gas given to the callee of a value-bearing call.
    pub const CALL_STIPEND: u64 = 2300;

    // CREATE family
    /// CREATE / CREATE2 base cost.
    pub const CREATE: u64 = 32_000;
    /// Per byte of deployed code.
    pub const CODE_DEPOSIT_BYTE: u64 = 200;

    // LOGn
    /// LOGn before topics and data.
    pub const LOG: u64 = 375;
    /// Per topic.
    pub const LOG_TOPIC: u64 = 375;
    /// Per logged byte.
    pub const LOG_DATA: u64 = 8;

    // misc
    /// KECCAK256 before words.
    pub const KECCAK256: u64 = 30;
    /// KECCAK256 per word, also CREATE2 hashing.
    pub const KECCAK256_WORD: u64 = 6;
    /// EXP before exponent bytes.
    pub const EXP: u64 = 10;
    /// EXP per byte of exponent.
    pub const EXP_BYTE: u64 = 50;
    /// SELFDESTRUCT before the new-account surcharge.
    pub const SELFDESTRUCT: u64 = 5000;
    /// SELFDESTRUCT funding an empty account.
    pub const SELFDESTRUCT_NEW_ACCOUNT: u64 = 25_000;
    /// BLOCKHASH lookup.
    pub const BLOCKHASH: u64 = 20;
}

fn words(size: u64) -> u64 {
    size.div_ceil(32)
}

/// EXP: 10 plus 50 per significant byte of the exponent.
#[must_use]
pub fn exp_gas_cost(exponent: U256) -> u64 {
    let significant = u64::from(256 - exponent.leading_zeros()).div_ceil(8);
    costs::EXP + costs::EXP_BYTE * significant
}

/// KECCAK256 over `size` bytes.
#[must_use]
pub fn keccak256_gas_cost(size: u64) -> u64 {
    costs::KECCAK256 + costs::KECCAK256_WORD * words(size)
}

/// LOGn with `topic_count` topics over `size` bytes.
#[must_use]
pub fn log_gas_cost(size: u64, topic_count: u64) -> u64 {
    costs::LOG + costs::LOG_TOPIC * topic_count + costs::LOG_DATA * size
}

/// Word-copy cost of CALLDATACOPY, CODECOPY, EXTCODECOPY and RETURNDATACOPY.
#[must_use]
pub fn copy_gas_cost(size: u64) -> u64 {
    costs::COPY * words(size)
}

/// CREATE: base plus init-code metering. CREATE2 also pays for hashing
/// the init code.
#[must_use]
pub fn create_gas_cost(init_code_size: u64, salted: bool) -> u64 {
    let per_word = costs::INIT_CODE_WORD + if salted { costs::KECCAK256_WORD } else { 0 };
    costs::CREATE + per_word * words(init_code_size)
}

/// EIP-2929 account touch.
#[must_use]
pub const fn account_access_cost(is_cold: bool) -> u64 {
    if is_cold {
        costs::COLD_ACCOUNT_ACCESS
    } else {
        costs::WARM_ACCOUNT_ACCESS
    }
}

/// EIP-2929 slot read.
#[must_use]
pub const fn sload_cost(is_cold: bool) -> u64 {
    if is_cold {
        costs::COLD_SLOAD
    } else {
        costs::WARM_STORAGE_READ
    }
}

/// `(cost, refund)` of one SSTORE, decided on the slot's current value.
#[must_use]
pub fn sstore_cost(current: StorageValue, new: StorageValue, is_cold: bool) -> (u64, u64) {
    let surcharge = if is_cold { costs::COLD_SLOAD } else { 0 };
    match (current.is_zero(), new.is_zero()) {
        (true, false) => (costs::SSTORE_SET + surcharge, 0),
        (false, true) => (costs::SSTORE_RESET + surcharge, costs::SSTORE_CLEAR_REFUND),
        _ => (costs::SSTORE_RESET + surcharge, 0),
    }
}

/// Surcharge of a CALL-family instruction, excluding memory and the gas
/// forwarded to the callee. `new_account` only counts when value moves.
#[must_use]
pub const fn call_surcharge(is_cold: bool, has_value: bool, new_account: bool) -> u64 {
    let access = account_access_cost(is_cold);
    match (has_value, new_account) {
        (false, _) => access,
        (true, false) => access + costs::CALL_VALUE,
        (true, true) => access + costs::CALL_VALUE + costs::CALL_NEW_ACCOUNT,
    }
}

/// All but one 64th of what is left.
#[must_use]
pub const fn max_forwardable(available: u64) -> u64 {
    available - available / 64
}

/// Gas forwarded to a callee: the requested amount capped by
/// [`max_forwardable`]. The stipend goes on top and is not taken from the
/// caller.
#[must_use]
pub fn calculate_call_gas(available: u64, requested: U256) -> u64 {
    let cap = max_forwardable(available);
    if requested < U256::from(cap) {
        requested.low_u64()
    } else {
        cap
    }
}

/// Total cost of a memory of `words` words: `3 * words + words^2 / 512`.
#[must_use]
pub fn memory_gas_cost(words: u64) -> u64 {
    let linear = costs::MEMORY_WORD.saturating_mul(words);
    let quadratic = words.saturating_mul(words) / costs::MEMORY_QUAD_DIVISOR;
    linear.saturating_add(quadratic)
}

/// Cost of growing memory from `current_words` to `new_words`.
#[must_use]
pub fn memory_expansion_cost(current_words: u64, new_words: u64) -> u64 {
    memory_gas_cost(new_words).saturating_sub(memory_gas_cost(current_words))
}

/// At most a fifth of the gas used comes back as refund.
pub const MAX_REFUND_QUOTIENT: u64 = 5;

/// Refund granted against `gas_used`.
#[must_use]
pub fn calculate_refund(gas_used: u64, refund: u64) -> u64 {
    refund.min(gas_used / MAX_REFUND_QUOTIENT)
}

/// Inclusive opcode ranges sharing one static price.
const STATIC_PRICES: &[(u8, u8, u64)] = &[
    (0x01, 0x01, costs::VERY_LOW), // ADD
    (0x02, 0x02, costs::LOW),      // MUL
    (0x03, 0x03, costs::VERY_LOW), // SUB
    (0x04, 0x07, costs::LOW),      // DIV SDIV MOD SMOD
    (0x08, 0x09, costs::MID),      // ADDMOD MULMOD
    (0x0b, 0x0b, costs::LOW),      // SIGNEXTEND
    (0x10, 0x1d, costs::VERY_LOW), // comparison, bitwise, shifts
    (0x30, 0x30, costs::BASE),     // ADDRESS
    (0x32, 0x34, costs::BASE),     // ORIGIN CALLER CALLVALUE
    (0x35, 0x35, costs::VERY_LOW), // CALLDATALOAD
    (0x36, 0x36, costs::BASE),     // CALLDATASIZE
    (0x37, 0x37, costs::VERY_LOW), // CALLDATACOPY
    (0x38, 0x38, costs::BASE),     // CODESIZE
    (0x39, 0x39, costs::VERY_LOW), // CODECOPY
    (0x3a, 0x3a, costs::BASE),     // GASPRICE
    (0x3d, 0x3d, costs::BASE),     // RETURNDATASIZE
    (0x3e, 0x3e, costs::VERY_LOW), // RETURNDATACOPY
    (0x40, 0x40, costs::BLOCKHASH),
    (0x41, 0x46, costs::BASE),     // COINBASE .. CHAINID
    (0x47, 0x47, costs::LOW),      // SELFBALANCE
    (0x48, 0x48, costs::BASE),     // BASEFEE
    (0x50, 0x50, costs::BASE),     // POP
    (0x51, 0x53, costs::VERY_LOW), // MLOAD MSTORE MSTORE8
    (0x56, 0x56, costs::MID),      // JUMP
    (0x57, 0x57, costs::HIGH),     // JUMPI
    (0x58, 0x5a, costs::BASE),     // PC MSIZE GAS
    (0x5b, 0x5b, costs::JUMPDEST),
    (0x5f, 0x5f, costs::BASE),     // PUSH0
    (0x60, 0x9f, costs::VERY_LOW), // PUSHn DUPn SWAPn
    (0xa0, 0xa4, costs::LOG),      // LOGn, topics and data on top
];

/// Static part of every opcode's cost; zero for opcodes priced entirely
/// at execution time (EXP, KECCAK256, account and storage access, the CALL
/// and CREATE families, SELFDESTRUCT).
pub const OPCODE_GAS: [u64; 256] = {
    let mut table = [0u64; 256];
    let mut r = 0;
    while r < STATIC_PRICES.len() {
        let (first, last, price) = STATIC_PRICES[r];
        let mut op = first as usize;
        while op <= last as usize {
            table[op] = price;
            op += 1;
        }
        r += 1;
    }
    table
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exp_gas_cost() {
        assert_eq!(exp_gas_cost(U256::zero()), 10);
        assert_eq!(exp_gas_cost(U256::from(1)), 60);
        assert_eq!(exp_gas_cost(U256::from(255)), 60);
        assert_eq!(exp_gas_cost(U256::from(256)), 110);
        assert_eq!(exp_gas_cost(U256::MAX), 10 + 50 * 32);
    }

    #[test]
    fn test_keccak256_and_copy_costs() {
        assert_eq!(keccak256_gas_cost(0), 30);
        assert_eq!(keccak256_gas_cost(33), 30 + 12);
        assert_eq!(copy_gas_cost(0), 0);
        assert_eq!(copy_gas_cost(32), 3);
        assert_eq!(copy_gas_cost(33), 6);
    }

    #[test]
    fn test_log_gas_cost() {
        assert_eq!(log_gas_cost(32, 0), 375 + 256);
        assert_eq!(log_gas_cost(64, 2), 375 + 750 + 512);
    }

    #[test]
    fn test_create_gas_cost() {
        assert_eq!(create_gas_cost(0, false), 32_000);
        assert_eq!(create_gas_cost(64, false), 32_004);
        assert_eq!(create_gas_cost(64, true), 32_016);
    }

    #[test]
    fn test_sstore_cost() {
        let zero = StorageValue::ZERO;
        let one = StorageValue::from_u256(U256::one());
        let two = StorageValue::from_u256(U256::from(2));

        assert_eq!(sstore_cost(zero, one, true), (22_100, 0));
        assert_eq!(sstore_cost(zero, one, false), (20_000, 0));
        assert_eq!(sstore_cost(one, two, false), (2900, 0));
        assert_eq!(sstore_cost(one, zero, false), (2900, 4800));
        assert_eq!(sstore_cost(zero, zero, true), (5000, 0));
    }

    #[test]
    fn test_call_surcharge() {
        // an empty target is free unless value moves
        assert_eq!(call_surcharge(true, false, true), 2600);
        assert_eq!(call_surcharge(false, true, false), 9100);
        assert_eq!(call_surcharge(true, true, true), 2600 + 9000 + 25_000);
    }

    #[test]
    fn test_calculate_call_gas() {
        assert_eq!(calculate_call_gas(64_000, U256::from(50_000)), 50_000);
        assert_eq!(calculate_call_gas(64_000, U256::from(64_000)), 63_000);
        assert_eq!(calculate_call_gas(64_000, U256::MAX), 63_000);
        assert_eq!(calculate_call_gas(0, U256::from(10)), 0);
    }

    #[test]
    fn test_memory_gas_cost() {
        assert_eq!(memory_gas_cost(0), 0);
        assert_eq!(memory_gas_cost(1), 3);
        assert_eq!(memory_gas_cost(32), 96 + 2);
        assert_eq!(memory_expansion_cost(1, 1), 0);
        assert_eq!(memory_expansion_cost(0, 1), 3);
        assert_eq!(memory_expansion_cost(2, 1), 0);
    }

    #[test]
    fn test_calculate_refund() {
        assert_eq!(calculate_refund(1000, 600), 200);
        assert_eq!(calculate_refund(1000, 100), 100);
        assert_eq!(calculate_refund(0, 4800), 0);
    }

    #[test]
    fn test_opcode_gas_table() {
        assert_eq!(OPCODE_GAS[0x00], 0); // STOP
        assert_eq!(OPCODE_GAS[0x01], costs::VERY_LOW); // ADD
        assert_eq!(OPCODE_GAS[0x5F], costs::BASE); // PUSH0
        assert_eq!(OPCODE_GAS[0x7F], costs::VERY_LOW); // PUSH32
        assert_eq!(OPCODE_GAS[0x9F], costs::VERY_LOW); // SWAP16
        assert_eq!(OPCODE_GAS[0xA4], costs::LOG); // LOG4
        assert_eq!(OPCODE_GAS[0x31], 0); // BALANCE
        assert_eq!(OPCODE_GAS[0x42], costs::BASE); // TIMESTAMP
        assert_eq!(OPCODE_GAS[0xF1], 0); // CALL
    }
}
