//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use ledger_vm::prelude::*;

/// Contract address of the bare-code fixtures.
pub const CONTRACT: &str = "0f572e5295c57f15886f9b263e2f6d2d6c7b5ec6";
/// Caller and origin of the bare-code fixtures.
pub const CALLER: &str = "cd1722f3947def4cf144679da39c4c32bdc35681";
/// Fee recipient of the fixture block.
pub const COINBASE: &str = "2adc25665018aa1fe0e6bc666dac8fc2697ff9ba";

/// Installs a test subscriber once; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn address(text: &str) -> Address {
    Address::from_slice(&hex::decode(text).unwrap()).unwrap()
}

pub fn word(text: &str) -> U256 {
    U256::from_big_endian(&hex::decode(text).unwrap())
}

/// Joins hex fragments into bytecode.
pub fn code(parts: &[&str]) -> Bytes {
    Bytes::from(hex::decode(parts.concat()).unwrap())
}

pub fn block() -> BlockContext {
    BlockContext {
        number: 0,
        timestamp: 1,
        coinbase: address(COINBASE),
        gas_limit: 10_000_000,
        ..BlockContext::default()
    }
}

/// Parameters that run `code` as the fixture contract, funded with 1 ether.
pub fn fixture_params(code: Bytes, gas: u64) -> RunCodeParams {
    RunCodeParams {
        block: block(),
        context: ExecutionContext {
            origin: address(CALLER),
            caller: address(CALLER),
            address: address(CONTRACT),
            code_address: address(CONTRACT),
            gas_limit: gas,
            gas_price: U256::from(100_000_000_000_000u64),
            ..ExecutionContext::default()
        },
        account: Account::new(U256::from(1_000_000_000_000_000_000u64), 0),
        code,
    }
}

/// Runs the fixture contract on a fresh state and returns that state.
pub fn run_fixture(code: Bytes, gas: u64) -> (ExecutionResult, InMemoryState) {
    init_tracing();
    let mut state = InMemoryState::new();
    let result = run_code(&mut state, fixture_params(code, gas)).unwrap();
    (result, state)
}

pub fn slot(state: &InMemoryState, owner: Address, key: u64) -> U256 {
    state.get_storage(&owner, &StorageKey::from(key)).unwrap().to_u256()
}

/// A funded externally owned account and a transaction template from it.
pub fn sender() -> (Address, Account) {
    (Address::low(0xa1), Account::new(U256::from(1_000_000_000_000u64), 0))
}

pub fn tx_to(to: Option<Address>, gas_limit: u64) -> Transaction {
    Transaction {
        from: sender().0,
        nonce: 0,
        gas_price: U256::from(10),
        gas_limit,
        to,
        value: U256::zero(),
        data: Bytes::new(),
    }
}
