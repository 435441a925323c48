//! Fixed-input scenarios: a plain transfer and precompile calls made from
//! contract code, with and without enough gas.

mod common;

use common::*;
use ledger_vm::prelude::*;

const SHA256_OF_WORD_ONE: &str = "c386d8e8d07342f2e39e189c8e6c57bb205bb373fe4e3a6f69404a8bb767b417";

const MSG_HASH: &str = "148c127f88ab9e15752c8f541f86f187c6831c666ece5706613a2ab271d95f15";
const SIG_R: &str = "db3ecbe6f6a47e1cc25fece0292770b554d87c10a21c66f16d91fb9605e10300";
const SIG_S: &str = "0c8c3f3112c365dd8c6a21d6fc5fa151c30e3a188754dcf7457f106a491a071f";
const PUBKEY: &str = "0424cb2aad569903db22cbd05cb8b633a93cb5d3ce5687906d34b478d36e148fc2\
                      18cb0ba14ae6fd49caa5245dcf357750bbab4c6e1b84ec078a604daaadcb7586";

/// Stores 1 at slot 0, hashes the word 1 through precompile 0x02 with
/// `gas` (a PUSH fragment), then stores memory word 0 at slot 0.
fn sha256_caller(gas: &str) -> Bytes {
    code(&[
        "6001600055",             // SSTORE(0, 1)
        "6001600052",             // MSTORE(0, 1)
        "6020600060206000600060", // out 32 @0, in 32 @0, value 0
        "02",                     // to 0x02
        gas,
        "f1",                     // CALL
        "50",                     // POP
        "600051600055",           // SSTORE(0, MLOAD(0))
        "00",
    ])
}

/// Stores the digest at slot 0, recovers through precompile 0x01 into
/// memory 0..65, then stores memory words 0..3 at slots 0..3.
fn ecrecover_caller(gas: &str) -> Bytes {
    code(&[
        "7f", MSG_HASH, "80600055", "600052", // SSTORE(0, hash), MSTORE(0, hash)
        "601c602052",                         // MSTORE(32, 28)
        "7f", SIG_R, "604052",                // MSTORE(64, r)
        "7f", SIG_S, "606052",                // MSTORE(96, s)
        "6041600060806000600060", "01",       // out 65 @0, in 128 @0, value 0, to 0x01
        gas,
        "f150",                               // CALL POP
        "600051600055",
        "602051600155",
        "604051600255",
        "00",
    ])
}

#[test]
fn test_transfer_charges_intrinsic_cost() {
    init_tracing();
    let (from, account) = sender();
    let to = Address::low(0xb2);
    let mut state = InMemoryState::with_accounts([(from, account.clone())]);

    let mut tx = tx_to(Some(to), 21_000);
    tx.value = U256::from(12_345);
    let receipt = run_transaction(&mut state, &tx, &block()).unwrap();

    assert!(receipt.success);
    assert_eq!(receipt.gas_used, 21_000);
    assert_eq!(receipt.gas_used, intrinsic_gas(&[], false));
    assert_eq!(state.get_balance(&to).unwrap(), U256::from(12_345));
    assert_eq!(
        state.get_balance(&from).unwrap(),
        account.balance - U256::from(12_345) - U256::from(21_000 * 10)
    );
    assert_eq!(receipt.post_accounts[&from].nonce, 1);
    assert_eq!(receipt.post_state_root, state.compute_root().unwrap());
}

#[test]
fn test_sha256_call_stores_digest() {
    let (result, state) = run_fixture(sha256_caller("61ffff"), 1_000_000);

    assert!(result.success, "{:?}", result.error);
    assert_eq!(slot(&state, address(CONTRACT), 0), word(SHA256_OF_WORD_ONE));
    assert_ne!(result.post_account.storage_root, Account::EMPTY_STORAGE_ROOT);
}

#[test]
fn test_sha256_call_without_gas_keeps_sentinel() {
    let (result, state) = run_fixture(sha256_caller("6009"), 1_000_000);

    // the failed call pushes 0 and leaves memory alone, so MLOAD(0) is still 1
    assert!(result.success);
    assert_eq!(slot(&state, address(CONTRACT), 0), U256::one());
}

#[test]
fn test_ecrecover_call_stores_public_key() {
    let (result, state) = run_fixture(ecrecover_caller("61ffff"), 1_000_000);
    assert!(result.success, "{:?}", result.error);

    let pubkey = hex::decode(PUBKEY).unwrap();
    let contract = address(CONTRACT);
    assert_eq!(slot(&state, contract, 0), U256::from_big_endian(&pubkey[..32]));
    assert_eq!(slot(&state, contract, 1), U256::from_big_endian(&pubkey[32..64]));

    // the 65th key byte overwrote the first byte of r
    let mut third = hex::decode(SIG_R).unwrap();
    third[0] = pubkey[64];
    assert_eq!(slot(&state, contract, 2), U256::from_big_endian(&third));
}

#[test]
fn test_ecrecover_call_without_gas_keeps_hash() {
    let (result, state) = run_fixture(ecrecover_caller("6009"), 1_000_000);
    assert!(result.success);

    let contract = address(CONTRACT);
    assert_eq!(slot(&state, contract, 0), word(MSG_HASH));
    assert_eq!(slot(&state, contract, 1), U256::from(28));
    assert_eq!(slot(&state, contract, 2), word(SIG_R));
}

#[test]
fn test_ecrecover_precompile_output_is_full_key() {
    let mut input = hex::decode(MSG_HASH).unwrap();
    input.extend_from_slice(&[0u8; 31]);
    input.push(28);
    input.extend(hex::decode(SIG_R).unwrap());
    input.extend(hex::decode(SIG_S).unwrap());

    let output = PrecompileRegistry::standard()
        .invoke(precompiles::ECRECOVER, &input, 3_000)
        .unwrap();
    assert_eq!(hex::encode(output.output.as_slice()), PUBKEY);
}
