//! Accounts, transactions, call frames and their results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::value_objects::{Address, Bytes, Hash, U256};

/// One entry of the world state.
///
/// `storage_root` is owned by the state store; the engine only carries it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Number of transactions sent (or contracts created) by this account.
    pub nonce: u64,
    /// Balance in the native unit.
    pub balance: U256,
    /// Commitment to the account's storage.
    pub storage_root: Hash,
    /// Hash of the account's code, [`Account::EMPTY_CODE_HASH`] for none.
    pub code_hash: Hash,
}

impl Account {
    /// keccak256 of the empty byte string.
    pub const EMPTY_CODE_HASH: Hash = Hash([
        0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
        0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
        0xa4, 0x70,
    ]);

    /// keccak256 of the RLP empty string, the root of an empty storage map.
    pub const EMPTY_STORAGE_ROOT: Hash = Hash([
        0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8,
        0x6e, 0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63,
        0xb4, 0x21,
    ]);

    /// A plain account with no code and no storage.
    #[must_use]
    pub fn new(balance: U256, nonce: u64) -> Self {
        Self {
            nonce,
            balance,
            storage_root: Self::EMPTY_STORAGE_ROOT,
            code_hash: Self::EMPTY_CODE_HASH,
        }
    }

    /// Returns true if the account has code attached.
    #[must_use]
    pub fn has_code(&self) -> bool {
        self.code_hash != Self::EMPTY_CODE_HASH
    }

    /// No code, zero nonce and zero balance.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.balance.is_zero() && self.nonce == 0 && !self.has_code()
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new(U256::zero(), 0)
    }
}

/// Block-level environment visible to executing code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockContext {
    /// Height of the block being executed.
    pub number: u64,
    /// Unix seconds.
    pub timestamp: u64,
    /// Fee recipient.
    pub coinbase: Address,
    /// Difficulty / randomness beacon (PREVRANDAO).
    pub prev_randao: U256,
    /// Upper bound for a transaction's gas and for estimation.
    pub gas_limit: u64,
    /// Seen by BASEFEE.
    pub base_fee: U256,
    /// Seen by CHAINID.
    pub chain_id: u64,
    /// Hashes of previous blocks, most recent (the parent) first.
    pub ancestor_hashes: Vec<Hash>,
}

impl BlockContext {
    /// Number of ancestors BLOCKHASH can see.
    pub const BLOCKHASH_WINDOW: u64 = 256;

    /// Hash of block `number`, or zero when it is not one of the 256
    /// ancestors of this block.
    #[must_use]
    pub fn block_hash(&self, number: U256) -> Hash {
        if number >= U256::from(self.number) {
            return Hash::ZERO;
        }
        let distance = self.number - number.low_u64();
        if distance > Self::BLOCKHASH_WINDOW {
            return Hash::ZERO;
        }
        usize::try_from(distance - 1)
            .ok()
            .and_then(|index| self.ancestor_hashes.get(index))
            .copied()
            .unwrap_or(Hash::ZERO)
    }
}

impl Default for BlockContext {
    fn default() -> Self {
        BlockContext {
            gas_limit: VmConfig::BLOCK_GAS_LIMIT,
            chain_id: 1,
            number: 0,
            timestamp: 0,
            coinbase: Address::default(),
            prev_randao: U256::default(),
            base_fee: U256::default(),
            ancestor_hashes: vec![],
        }
    }
}

/// How a frame was entered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallKind {
    /// Plain message call.
    Call,
    /// Callee code on the caller's storage, value sent to self.
    CallCode,
    /// Callee code on the caller's storage with the caller's sender and value.
    DelegateCall,
    /// Read-only message call.
    StaticCall,
    /// Contract creation (CREATE or creation transaction).
    Create,
    /// Salted contract creation.
    Create2,
}

/// Inputs of one call frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Signer of the enclosing transaction.
    pub origin: Address,
    /// Frame that issued this one.
    pub caller: Address,
    /// Account whose storage and balance the frame acts on.
    pub address: Address,
    /// Account the executing code was loaded from.
    pub code_address: Address,
    /// Value visible to CALLVALUE.
    pub value: U256,
    /// Empty for creations.
    pub data: Bytes,
    /// Gas handed to the frame, stipend included.
    pub gas_limit: u64,
    /// Seen by GASPRICE.
    pub gas_price: U256,
    /// Nesting depth, 0 for the transaction's own frame.
    pub depth: u16,
    /// Set under STATICCALL; forbids state modification.
    pub is_static: bool,
}

impl ExecutionContext {
    /// Context of a depth-0 message from `origin` to `to`.
    #[must_use]
    pub fn new_transaction(
        origin: Address,
        to: Address,
        value: U256,
        data: Bytes,
        gas_limit: u64,
        gas_price: U256,
    ) -> Self {
        Self {
            origin,
            caller: origin,
            address: to,
            code_address: to,
            value,
            data,
            gas_limit,
            gas_price,
            depth: 0,
            is_static: false,
        }
    }

    /// Context of a child frame of `kind` issued by this frame.
    #[must_use]
    pub fn child(
        &self,
        kind: CallKind,
        target: Address,
        value: U256,
        data: Bytes,
        gas: u64,
    ) -> Self {
        let (caller, address, value) = match kind {
            CallKind::Call | CallKind::Create | CallKind::Create2 => (self.address, target, value),
            CallKind::StaticCall => (self.address, target, U256::zero()),
            CallKind::CallCode => (self.address, self.address, value),
            CallKind::DelegateCall => (self.caller, self.address, self.value),
        };
        Self {
            origin: self.origin,
            caller,
            address,
            code_address: target,
            value,
            data,
            gas_limit: gas,
            gas_price: self.gas_price,
            depth: self.depth.saturating_add(1),
            is_static: self.is_static || kind == CallKind::StaticCall,
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new_transaction(
            Address::ZERO,
            Address::ZERO,
            U256::zero(),
            Bytes::new(),
            0,
            U256::zero(),
        )
    }
}

/// A transaction accepted for processing.
///
/// `from` has already been recovered from the signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Recovered signer, charged for gas and value.
    pub from: Address,
    /// Must equal the sender's current nonce.
    pub nonce: u64,
    /// Wei per unit of gas.
    pub gas_price: U256,
    /// Gas bought up front; unused gas is refunded.
    pub gas_limit: u64,
    /// `None` deploys `data` as init code.
    pub to: Option<Address>,
    /// Moved from `from` to the target before code runs.
    pub value: U256,
    /// Call data, or init code when `to` is `None`.
    pub data: Bytes,
}

impl Transaction {
    /// True for contract creation.
    #[must_use]
    pub fn is_create(&self) -> bool {
        self.to.is_none()
    }

    /// `gas_limit * gas_price`, or `None` on overflow.
    #[must_use]
    pub fn max_fee(&self) -> Option<U256> {
        self.gas_price.checked_mul(U256::from(self.gas_limit))
    }
}

/// Event emitted by LOG0..LOG4.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    /// Account whose code ran LOGn.
    pub address: Address,
    /// At most four.
    pub topics: Vec<Hash>,
    /// Memory slice named by the instruction.
    pub data: Bytes,
}

impl Log {
    /// Assembles a log record.
    #[must_use]
    pub fn new(address: Address, topics: Vec<Hash>, data: Bytes) -> Self {
        Self {
            address,
            topics,
            data,
        }
    }
}

/// Outcome of one processed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Execution phase outcome; fees are charged either way.
    pub success: bool,
    /// Gas charged after refunds.
    pub gas_used: u64,
    /// Return data, or revert output.
    pub output: Bytes,
    /// Logs of a successful execution.
    pub logs: Vec<Log>,
    /// Address of the deployed contract.
    pub contract_address: Option<Address>,
    /// Post-state of the sender, destination and fee recipient.
    pub post_accounts: BTreeMap<Address, Account>,
    /// State root after the transaction.
    pub post_state_root: Hash,
    /// Why execution failed.
    pub error: Option<String>,
}

/// Outcome of running a bare code buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// False on REVERT and on every exceptional halt.
    pub success: bool,
    /// Output of RETURN or REVERT.
    pub return_data: Bytes,
    /// Consumed by the frame, before refunds.
    pub gas_used: u64,
    /// Refund counter at exit (not applied).
    pub gas_refund: u64,
    /// Logs of a successful execution.
    pub logs: Vec<Log>,
    /// State of the executing account afterwards.
    pub post_account: Account,
    /// Why execution failed.
    pub error: Option<String>,
}

/// Inputs of [`run_code`](crate::processor::run_code).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCodeParams {
    /// Environment seen by block opcodes.
    pub block: BlockContext,
    /// Frame inputs; `context.address` is where the code runs.
    pub context: ExecutionContext,
    /// Account installed at `context.address` before running.
    pub account: Account,
    /// Bytecode run in place of whatever `account` holds.
    pub code: Bytes,
}

/// Execution limits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Deepest frame allowed to run; depth 0 is the transaction itself.
    pub max_call_depth: u16,
    /// Bytes of deployed code.
    pub max_code_size: usize,
    /// Bytes of init code.
    pub max_init_code_size: usize,
    /// Words per frame stack.
    pub max_stack_size: usize,
    /// Bytes of memory per frame.
    pub max_memory_size: usize,
    /// Instructions allowed per transaction across all frames.
    pub max_execution_steps: u64,
    /// Instruction set revision.
    pub evm_version: EvmVersion,
    /// Emit a `trace!` event per instruction.
    pub trace_opcodes: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 1024,
            max_code_size: 24_576,
            max_init_code_size: 49_152,
            max_stack_size: 1024,
            max_memory_size: 16 * 1024 * 1024,
            max_execution_steps: 10_000_000,
            evm_version: EvmVersion::Shanghai,
            trace_opcodes: false,
        }
    }
}

impl VmConfig {
    /// Gas limit of a default [`BlockContext`].
    pub const BLOCK_GAS_LIMIT: u64 = 30_000_000;
}

/// Instruction set revision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum EvmVersion {
    /// Access lists, no BASEFEE, no PUSH0.
    Berlin,
    /// Adds BASEFEE.
    London,
    /// Adds PUSH0.
    #[default]
    Shanghai,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent() -> ExecutionContext {
        ExecutionContext {
            origin: Address::new([1u8; 20]),
            caller: Address::new([1u8; 20]),
            address: Address::new([2u8; 20]),
            code_address: Address::new([2u8; 20]),
            value: U256::from(100),
            data: Bytes::from_slice(&[0x01, 0x02]),
            gas_limit: 1000,
            gas_price: U256::from(1),
            depth: 0,
            is_static: false,
        }
    }

    #[test]
    fn test_child_call() {
        let parent = parent();
        let child = parent.child(
            CallKind::Call,
            Address::new([3u8; 20]),
            U256::from(50),
            Bytes::new(),
            500,
        );
        assert_eq!(child.origin, parent.origin);
        assert_eq!(child.caller, parent.address);
        assert_eq!(child.address, Address::new([3u8; 20]));
        assert_eq!(child.value, U256::from(50));
        assert_eq!(child.depth, 1);
        assert!(!child.is_static);
    }

    #[test]
    fn test_child_delegatecall_keeps_caller_and_value() {
        let parent = parent();
        let child = parent.child(
            CallKind::DelegateCall,
            Address::new([3u8; 20]),
            U256::zero(),
            Bytes::new(),
            500,
        );
        assert_eq!(child.caller, parent.caller);
        assert_eq!(child.address, parent.address);
        assert_eq!(child.code_address, Address::new([3u8; 20]));
        assert_eq!(child.value, parent.value);
    }

    #[test]
    fn test_static_flag_is_inherited() {
        let parent = parent();
        let child = parent.child(
            CallKind::StaticCall,
            Address::new([3u8; 20]),
            U256::from(9),
            Bytes::new(),
            10,
        );
        assert!(child.is_static);
        assert!(child.value.is_zero());

        let grandchild = child.child(CallKind::Call, parent.address, U256::zero(), Bytes::new(), 5);
        assert!(grandchild.is_static);
        assert_eq!(grandchild.depth, 2);
    }

    #[test]
    fn test_block_hash_window() {
        let block = BlockContext {
            number: 10,
            ancestor_hashes: vec![Hash::new([9u8; 32]), Hash::new([8u8; 32])],
            ..BlockContext::default()
        };
        assert_eq!(block.block_hash(U256::from(9)), Hash::new([9u8; 32]));
        assert_eq!(block.block_hash(U256::from(8)), Hash::new([8u8; 32]));
        assert_eq!(block.block_hash(U256::from(7)), Hash::ZERO);
        assert_eq!(block.block_hash(U256::from(10)), Hash::ZERO);
        assert_eq!(block.block_hash(U256::MAX), Hash::ZERO);
    }

    #[test]
    fn test_account_defaults() {
        let account = Account::default();
        assert!(account.is_empty());
        assert!(!account.has_code());
        assert_eq!(account.storage_root, Account::EMPTY_STORAGE_ROOT);
    }

    #[test]
    fn test_vm_config_deserializes_partial_json() {
        let config: VmConfig = serde_json::from_str(r#"{"max_call_depth": 8}"#).unwrap();
        assert_eq!(config.max_call_depth, 8);
        assert_eq!(config.max_code_size, 24_576);
        assert_eq!(config.evm_version, EvmVersion::Shanghai);
    }
}
