//! # Ledger VM - Deterministic Contract Execution
//!
//! A stack-based virtual machine for account-model ledgers: 256-bit words,
//! byte-addressed memory, gas metering, nested message calls and contract
//! creation, executed against a checkpointed world state.
//!
//! ## Architecture
//!
//! | Layer | Location | Purpose |
//! |-------|----------|---------|
//! | Domain | `domain/` | Value objects, entities, codec, invariants |
//! | Ports | `ports/` | `ExecutionApi` (inbound), `StateBackend` and `AccessList` (outbound) |
//! | EVM | `evm/` | Interpreter, call dispatcher, gas, stack, memory, precompiles |
//! | Processor | `processor.rs` | Transaction validation, fees, receipts |
//! | Adapters | `adapters/` | In-memory state store and access list |
//! | Service | `service.rs` | Async facade with serialized commits |
//!
//! ## Execution Limits
//!
//! | Limit | Default |
//! |-------|---------|
//! | `max_call_depth` | 1024 |
//! | `max_code_size` | 24 KiB |
//! | `max_init_code_size` | 48 KiB |
//! | `max_stack_size` | 1024 |
//! | `max_memory_size` | 16 MiB |
//! | `max_execution_steps` | 10 000 000 |
//!
//! ## Example
//!
//! ```ignore
//! use ledger_vm::prelude::*;
//!
//! let mut state = InMemoryState::with_accounts([(sender, Account::new(balance, 0))]);
//! let receipt = run_transaction(&mut state, &tx, &BlockContext::default())?;
//! println!("gas used: {}", receipt.gas_used);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::cast_possible_truncation)]

pub mod adapters;
pub mod domain;
pub mod errors;
pub mod evm;
pub mod ports;
pub mod processor;
pub mod service;

pub use processor::{run_code, run_transaction, TransactionProcessor};

/// Everything an embedder or a test usually needs.
pub mod prelude {
    pub use crate::domain::entities::{
        Account, BlockContext, CallKind, EvmVersion, ExecutionContext, ExecutionResult, Log,
        Receipt, RunCodeParams, Transaction, VmConfig,
    };
    pub use crate::domain::value_objects::{
        Address, Bytes, GasMeter, Hash, StorageKey, StorageValue, U256,
    };
    pub use crate::domain::services::{
        compute_contract_address, compute_contract_address_create2, intrinsic_gas, keccak256,
        precompiles,
    };
    pub use crate::domain::codec::{
        decode_account, decode_transaction, encode_account, encode_transaction,
    };
    pub use crate::domain::invariants::{
        check_receipt_invariants, InvariantCheckResult, InvariantViolation,
    };
    pub use crate::ports::inbound::ExecutionApi;
    pub use crate::ports::outbound::{AccessList, AccessStatus, Checkpoint, StateBackend};
    pub use crate::errors::{CodecError, PrecompileError, StateError, TransactionError, VmError};
    pub use crate::evm::{ExecutionGuard, Precompile, PrecompileOutput, PrecompileRegistry};
    pub use crate::processor::{run_code, run_transaction, TransactionProcessor};
    pub use crate::adapters::{InMemoryAccessList, InMemoryState};
    pub use crate::service::{create_test_service, ExecutionService, ServiceConfig, ServiceStats};
}

/// Version of this crate, from the manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_reaches_precompiles() {
        use prelude::*;
        assert_eq!(PrecompileRegistry::standard().addresses().count(), 3);
    }
}
