//! # EVM Interpreter
//!
//! Executes one code buffer in one call frame.
//!
//! Each step fetches the byte at the program counter, decodes it through
//! the opcode table for the configured revision, checks the stack arity,
//! charges the static cost from [`OPCODE_GAS`], then runs the instruction,
//! which charges its dynamic costs (memory growth, copies, account access)
//! before touching anything. Falling off the end of the code is a STOP.
//!
//! CALL and CREATE never run the child here. The instruction hands a
//! [`ChildFrame`] to the [`CallDispatcher`], which runs it on its own frame
//! stack and later resumes this frame with the child's [`FrameOutcome`].

use std::collections::BTreeSet;

use primitive_types::U512;
use tracing::trace;

use crate::domain::entities::{CallKind, EvmVersion, ExecutionContext, Log, VmConfig};
use crate::domain::services::{
    compute_contract_address, compute_contract_address_create2, keccak256,
};
use crate::domain::value_objects::{
    Address, Bytes, GasMeter, Hash, StorageKey, StorageValue, U256,
};
use crate::errors::VmError;
use crate::evm::dispatcher::{CallDispatcher, FrameOutcome};
use crate::evm::gas::{self, costs, OPCODE_GAS};
use crate::evm::memory::{Memory, WORD_SIZE};
use crate::evm::opcodes::{decode, Opcode};
use crate::evm::stack::Stack;
use crate::ports::outbound::{AccessList, StateBackend};

/// Result of one instruction.
pub(crate) enum Step {
    /// Keep going.
    Continue,
    /// The frame finished successfully with this output.
    Return(Bytes),
    /// The frame is suspended until this child finishes.
    Spawn(Box<ChildFrame>),
}

/// A child frame requested by the CALL or CREATE family.
#[derive(Debug)]
pub(crate) enum ChildFrame {
    /// Message call.
    Call {
        kind: CallKind,
        context: ExecutionContext,
    },
    /// Contract creation at `context.address`.
    Create {
        kind: CallKind,
        context: ExecutionContext,
        init_code: Bytes,
    },
}

/// Where a suspended frame puts its child's result.
#[derive(Clone, Copy, Debug)]
enum Pending {
    Call { out_offset: usize, out_size: usize },
    Create { address: Address },
}

/// One call frame.
pub struct Interpreter {
    context: ExecutionContext,
    code: Bytes,
    pc: usize,
    stack: Stack,
    memory: Memory,
    gas: GasMeter,
    /// Output of the last child frame.
    return_data: Bytes,
    logs: Vec<Log>,
    self_destructs: BTreeSet<Address>,
    jump_dests: Vec<bool>,
    pending: Option<Pending>,
    version: EvmVersion,
    max_init_code_size: usize,
    trace: bool,
}

impl Interpreter {
    /// Prepares a frame running `code` under `context`.
    #[must_use]
    pub fn new(context: ExecutionContext, code: Bytes, config: &VmConfig) -> Self {
        let jump_dests = analyze_jump_dests(code.as_slice());
        Self {
            gas: GasMeter::new(context.gas_limit),
            context,
            code,
            pc: 0,
            stack: Stack::with_limit(config.max_stack_size),
            memory: Memory::with_limit(config.max_memory_size),
            return_data: Bytes::new(),
            logs: Vec::new(),
            self_destructs: BTreeSet::new(),
            jump_dests,
            pending: None,
            version: config.evm_version,
            max_init_code_size: config.max_init_code_size,
            trace: config.trace_opcodes,
        }
    }

    /// Turns the way the frame halted into what its parent receives.
    pub(crate) fn finish(self, halted: Result<Bytes, VmError>) -> FrameOutcome {
        match halted {
            Ok(output) => FrameOutcome {
                result: Ok(output),
                gas_left: self.gas.remaining(),
                refund: self.gas.refund(),
                logs: self.logs,
                self_destructs: self.self_destructs,
            },
            Err(err) => FrameOutcome::failed(err, self.gas.remaining()),
        }
    }

    /// Continues a suspended frame with the outcome of its child: unused gas
    /// comes back, and the CALL or CREATE pushes its result.
    ///
    /// # Errors
    ///
    /// The child's halting error, or a failure writing the output to memory.
    pub(crate) fn resume(&mut self, outcome: FrameOutcome) -> Result<(), VmError> {
        self.gas.reclaim(outcome.gas_left);
        if let Some(err) = outcome.halting_error() {
            return Err(err.clone());
        }

        match self.pending.take() {
            Some(Pending::Call {
                out_offset,
                out_size,
            }) => {
                self.return_data = outcome.return_data();
                let success = outcome.is_success();
                if success {
                    self.memory
                        .write_padded(out_offset, out_size, self.return_data.as_slice(), 0)?;
                    self.merge(outcome);
                }
                self.stack.push_bool(success)
            }
            Some(Pending::Create { address }) => {
                if outcome.is_success() {
                    self.merge(outcome);
                    self.stack.push(address.to_word())
                } else {
                    self.return_data = outcome.return_data();
                    self.stack.push(U256::zero())
                }
            }
            None => Ok(()),
        }
    }

    /// Executes one instruction.
    pub(crate) fn step<S, A>(
        &mut self,
        dispatcher: &mut CallDispatcher<'_, S, A>,
    ) -> Result<Step, VmError>
    where
        S: StateBackend,
        A: AccessList,
    {
        let Some(&byte) = self.code.as_slice().get(self.pc) else {
            return Ok(Step::Return(Bytes::new()));
        };
        dispatcher.guard.tick()?;

        let opcode = decode(byte, self.version).ok_or(VmError::InvalidOpcode(byte))?;
        if self.trace {
            trace!(
                depth = self.context.depth,
                pc = self.pc,
                ?opcode,
                gas = self.gas.remaining(),
                stack = self.stack.len(),
                "step"
            );
        }
        self.stack.require(opcode.stack_inputs())?;
        if self.context.is_static && opcode.is_state_modifying() {
            return Err(VmError::WriteInStaticContext);
        }
        self.gas.charge(OPCODE_GAS[byte as usize])?;
        self.pc += 1;

        match opcode {
            // =================================================================
            // STOP & ARITHMETIC
            // =================================================================
            Opcode::Stop => return Ok(Step::Return(Bytes::new())),

            Opcode::Add => self.binary(|a, b| a.overflowing_add(b).0)?,
            Opcode::Mul => self.binary(|a, b| a.overflowing_mul(b).0)?,
            Opcode::Sub => self.binary(|a, b| a.overflowing_sub(b).0)?,
            Opcode::Div => self.binary(|a, b| if b.is_zero() { U256::zero() } else { a / b })?,
            Opcode::SDiv => self.binary(signed_div)?,
            Opcode::Mod => self.binary(|a, b| if b.is_zero() { U256::zero() } else { a % b })?,
            Opcode::SMod => self.binary(signed_mod)?,

            Opcode::AddMod => {
                let [a, b, n] = self.stack.pop_n()?;
                let result = if n.is_zero() {
                    U256::zero()
                } else {
                    u512_to_u256((U512::from(a) + U512::from(b)) % U512::from(n))
                };
                self.stack.push(result)?;
            }

            Opcode::MulMod => {
                let [a, b, n] = self.stack.pop_n()?;
                let result = if n.is_zero() {
                    U256::zero()
                } else {
                    u512_to_u256(a.full_mul(b) % U512::from(n))
                };
                self.stack.push(result)?;
            }

            Opcode::Exp => {
                let [base, exponent] = self.stack.pop_n()?;
                self.gas.charge(gas::exp_gas_cost(exponent))?;
                self.stack.push(base.overflowing_pow(exponent).0)?;
            }

            Opcode::SignExtend => self.binary(sign_extend)?,

            // =================================================================
            // COMPARISON & BITWISE
            // =================================================================
            Opcode::Lt => self.compare(|a, b| a < b)?,
            Opcode::Gt => self.compare(|a, b| a > b)?,
            Opcode::SLt => self.compare(signed_lt)?,
            Opcode::SGt => self.compare(|a, b| signed_lt(b, a))?,
            Opcode::Eq => self.compare(|a, b| a == b)?,

            Opcode::IsZero => {
                let a = self.stack.pop()?;
                self.stack.push_bool(a.is_zero())?;
            }

            Opcode::And => self.binary(|a, b| a & b)?,
            Opcode::Or => self.binary(|a, b| a | b)?,
            Opcode::Xor => self.binary(|a, b| a ^ b)?,

            Opcode::Not => {
                let a = self.stack.pop()?;
                self.stack.push(!a)?;
            }

            Opcode::Byte => self.binary(|i, x| {
                if i < U256::from(32) {
                    U256::from(x.byte(31 - i.low_u64() as usize))
                } else {
                    U256::zero()
                }
            })?,

            Opcode::Shl => self.binary(|shift, value| {
                if shift >= U256::from(256) {
                    U256::zero()
                } else {
                    value << shift.low_u64() as usize
                }
            })?,

            Opcode::Shr => self.binary(|shift, value| {
                if shift >= U256::from(256) {
                    U256::zero()
                } else {
                    value >> shift.low_u64() as usize
                }
            })?,

            Opcode::Sar => self.binary(sar)?,

            // =================================================================
            // KECCAK256
            // =================================================================
            Opcode::Keccak256 => {
                let [offset, size] = self.stack.pop_n()?;
                let (offset, size) = self.memory_range(offset, size)?;
                self.gas.charge(gas::keccak256_gas_cost(size as u64))?;
                let hash = keccak256(&self.memory.read_bytes(offset, size));
                self.stack.push(hash.to_word())?;
            }

            // =================================================================
            // ENVIRONMENTAL INFORMATION
            // =================================================================
            Opcode::Address => self.stack.push(self.context.address.to_word())?,

            Opcode::Balance => {
                let address = Address::from_word(self.stack.pop()?);
                self.charge_account_access(dispatcher, address)?;
                let balance = dispatcher.state.get_balance(&address)?;
                self.stack.push(balance)?;
            }

            Opcode::Origin => self.stack.push(self.context.origin.to_word())?,
            Opcode::Caller => self.stack.push(self.context.caller.to_word())?,
            Opcode::CallValue => self.stack.push(self.context.value)?,

            Opcode::CallDataLoad => {
                let offset = saturating_usize(self.stack.pop()?);
                let word = padded_slice(self.context.data.as_slice(), offset, WORD_SIZE);
                self.stack.push(U256::from_big_endian(&word))?;
            }

            Opcode::CallDataSize => self.stack.push(U256::from(self.context.data.len()))?,

            Opcode::CallDataCopy => {
                let [dest, source, size] = self.stack.pop_n()?;
                let (dest, size) = self.memory_range(dest, size)?;
                self.gas.charge(gas::copy_gas_cost(size as u64))?;
                self.memory.write_padded(
                    dest,
                    size,
                    self.context.data.as_slice(),
                    saturating_usize(source),
                )?;
            }

            Opcode::CodeSize => self.stack.push(U256::from(self.code.len()))?,

            Opcode::CodeCopy => {
                let [dest, source, size] = self.stack.pop_n()?;
                let (dest, size) = self.memory_range(dest, size)?;
                self.gas.charge(gas::copy_gas_cost(size as u64))?;
                self.memory
                    .write_padded(dest, size, self.code.as_slice(), saturating_usize(source))?;
            }

            Opcode::GasPrice => self.stack.push(self.context.gas_price)?,

            Opcode::ExtCodeSize => {
                let address = Address::from_word(self.stack.pop()?);
                self.charge_account_access(dispatcher, address)?;
                let code = dispatcher.state.code_at(&address)?;
                self.stack.push(U256::from(code.len()))?;
            }

            Opcode::ExtCodeCopy => {
                let [address, dest, source, size] = self.stack.pop_n()?;
                let address = Address::from_word(address);
                let (dest, size) = self.memory_range(dest, size)?;
                self.gas.charge(gas::copy_gas_cost(size as u64))?;
                self.charge_account_access(dispatcher, address)?;
                let code = dispatcher.state.code_at(&address)?;
                self.memory
                    .write_padded(dest, size, code.as_slice(), saturating_usize(source))?;
            }

            Opcode::ReturnDataSize => self.stack.push(U256::from(self.return_data.len()))?,

            Opcode::ReturnDataCopy => {
                let [dest, source, size] = self.stack.pop_n()?;
                let end = source.checked_add(size);
                if end.map_or(true, |end| end > U256::from(self.return_data.len())) {
                    return Err(VmError::ReturnDataOutOfBounds {
                        offset: saturating_u64(source),
                        size: saturating_u64(size),
                        available: self.return_data.len(),
                    });
                }
                let (dest, size) = self.memory_range(dest, size)?;
                self.gas.charge(gas::copy_gas_cost(size as u64))?;
                self.memory.write_padded(
                    dest,
                    size,
                    self.return_data.as_slice(),
                    saturating_usize(source),
                )?;
            }

            Opcode::ExtCodeHash => {
                let address = Address::from_word(self.stack.pop()?);
                self.charge_account_access(dispatcher, address)?;
                let hash = match dispatcher.state.get_account(&address)? {
                    Some(account) if !account.is_empty() => account.code_hash.to_word(),
                    _ => U256::zero(),
                };
                self.stack.push(hash)?;
            }

            // =================================================================
            // BLOCK INFORMATION
            // =================================================================
            Opcode::BlockHash => {
                let number = self.stack.pop()?;
                let hash = dispatcher.block.block_hash(number);
                self.stack.push(hash.to_word())?;
            }

            Opcode::Coinbase => self.stack.push(dispatcher.block.coinbase.to_word())?,
            Opcode::Timestamp => self.stack.push(U256::from(dispatcher.block.timestamp))?,
            Opcode::Number => self.stack.push(U256::from(dispatcher.block.number))?,
            Opcode::PrevRandao => self.stack.push(dispatcher.block.prev_randao)?,
            Opcode::GasLimit => self.stack.push(U256::from(dispatcher.block.gas_limit))?,
            Opcode::ChainId => self.stack.push(U256::from(dispatcher.block.chain_id))?,

            Opcode::SelfBalance => {
                let balance = dispatcher.state.get_balance(&self.context.address)?;
                self.stack.push(balance)?;
            }

            Opcode::BaseFee => self.stack.push(dispatcher.block.base_fee)?,

            // =================================================================
            // STACK, MEMORY, STORAGE, FLOW
            // =================================================================
            Opcode::Pop => {
                self.stack.pop()?;
            }

            Opcode::MLoad => {
                let offset = self.stack.pop()?;
                let (offset, _) = self.memory_range(offset, U256::from(WORD_SIZE))?;
                let word = self.memory.read_word(offset);
                self.stack.push(U256::from_big_endian(&word))?;
            }

            Opcode::MStore => {
                let [offset, value] = self.stack.pop_n()?;
                let (offset, _) = self.memory_range(offset, U256::from(WORD_SIZE))?;
                self.memory.write_word(offset, &word_bytes(value))?;
            }

            Opcode::MStore8 => {
                let [offset, value] = self.stack.pop_n()?;
                let (offset, _) = self.memory_range(offset, U256::one())?;
                self.memory.write_byte(offset, value.byte(0))?;
            }

            Opcode::SLoad => {
                let key = StorageKey::from_u256(self.stack.pop()?);
                let is_cold = dispatcher
                    .access
                    .touch_storage(self.context.address, key)
                    .is_cold();
                self.gas.charge(gas::sload_cost(is_cold))?;
                let value = dispatcher.state.get_storage(&self.context.address, &key)?;
                self.stack.push(value.to_u256())?;
            }

            Opcode::SStore => {
                if self.gas.remaining() <= costs::SSTORE_SENTRY {
                    return Err(VmError::OutOfGas);
                }
                let [key, value] = self.stack.pop_n()?;
                let key = StorageKey::from_u256(key);
                let value = StorageValue::from_u256(value);
                let is_cold = dispatcher
                    .access
                    .touch_storage(self.context.address, key)
                    .is_cold();
                let current = dispatcher.state.get_storage(&self.context.address, &key)?;
                let (cost, refund) = gas::sstore_cost(current, value, is_cold);
                self.gas.charge(cost)?;
                self.gas.add_refund(refund);
                dispatcher
                    .state
                    .put_storage(self.context.address, key, value)?;
            }

            Opcode::Jump => {
                let dest = self.stack.pop()?;
                self.jump(dest)?;
            }

            Opcode::JumpI => {
                let [dest, condition] = self.stack.pop_n()?;
                if !condition.is_zero() {
                    self.jump(dest)?;
                }
            }

            Opcode::Pc => self.stack.push(U256::from(self.pc - 1))?,
            Opcode::MSize => self.stack.push(U256::from(self.memory.len()))?,
            Opcode::Gas => self.stack.push(U256::from(self.gas.remaining()))?,
            Opcode::JumpDest => {}

            // =================================================================
            // PUSH, DUP, SWAP
            // =================================================================
            Opcode::Push(size) => {
                let size = size as usize;
                let value = if size == 0 {
                    U256::zero()
                } else {
                    let bytes = padded_slice(self.code.as_slice(), self.pc, size);
                    U256::from_big_endian(&bytes)
                };
                self.stack.push(value)?;
                self.pc += size;
            }

            Opcode::Dup(n) => self.stack.dup(n as usize - 1)?,
            Opcode::Swap(n) => self.stack.swap(n as usize)?,

            // =================================================================
            // LOGGING
            // =================================================================
            Opcode::Log(topic_count) => {
                let [offset, size] = self.stack.pop_n()?;
                let mut topics = Vec::with_capacity(topic_count as usize);
                for _ in 0..topic_count {
                    topics.push(Hash::new(word_bytes(self.stack.pop()?)));
                }
                let (offset, size) = self.memory_range(offset, size)?;
                self.gas
                    .charge(gas::log_gas_cost(size as u64, u64::from(topic_count)) - costs::LOG)?;
                let data = Bytes::from(self.memory.read_bytes(offset, size));
                self.logs
                    .push(Log::new(self.context.address, topics, data));
            }

            // =================================================================
            // SYSTEM
            // =================================================================
            Opcode::Create => return self.create(dispatcher, CallKind::Create),
            Opcode::Create2 => return self.create(dispatcher, CallKind::Create2),

            Opcode::Call => return self.call(dispatcher, CallKind::Call),
            Opcode::CallCode => return self.call(dispatcher, CallKind::CallCode),
            Opcode::DelegateCall => return self.call(dispatcher, CallKind::DelegateCall),
            Opcode::StaticCall => return self.call(dispatcher, CallKind::StaticCall),

            Opcode::Return => {
                let [offset, size] = self.stack.pop_n()?;
                let (offset, size) = self.memory_range(offset, size)?;
                return Ok(Step::Return(Bytes::from(self.memory.read_bytes(offset, size))));
            }

            Opcode::Revert => {
                let [offset, size] = self.stack.pop_n()?;
                let (offset, size) = self.memory_range(offset, size)?;
                let output = Bytes::from(self.memory.read_bytes(offset, size));
                return Err(VmError::Revert(output));
            }

            Opcode::Invalid => return Err(VmError::InvalidOpcode(byte)),

            Opcode::SelfDestruct => {
                let beneficiary = Address::from_word(self.stack.pop()?);
                self.self_destruct(dispatcher, beneficiary)?;
                return Ok(Step::Return(Bytes::new()));
            }
        }

        Ok(Step::Continue)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn binary(&mut self, op: impl FnOnce(U256, U256) -> U256) -> Result<(), VmError> {
        let [a, b] = self.stack.pop_n()?;
        self.stack.push(op(a, b))
    }

    fn compare(&mut self, op: impl FnOnce(U256, U256) -> bool) -> Result<(), VmError> {
        let [a, b] = self.stack.pop_n()?;
        self.stack.push_bool(op(a, b))
    }

    fn jump(&mut self, dest: U256) -> Result<(), VmError> {
        let target = saturating_usize(dest);
        if !self.jump_dests.get(target).copied().unwrap_or(false) {
            return Err(VmError::InvalidJump(target));
        }
        self.pc = target;
        Ok(())
    }

    /// Charges for growing memory to cover `offset..offset + size` and grows
    /// it. A zero-length range touches nothing, whatever its offset.
    fn memory_range(&mut self, offset: U256, size: U256) -> Result<(usize, usize), VmError> {
        if size.is_zero() {
            return Ok((0, 0));
        }
        let limit = self.memory.limit();
        let end = offset
            .checked_add(size)
            .filter(|end| *end <= U256::from(limit))
            .ok_or(VmError::MemoryLimitExceeded {
                requested: saturating_u64(offset.saturating_add(size)),
                max: limit as u64,
            })?;
        let (offset, size, end) = (
            offset.low_u64() as usize,
            size.low_u64() as usize,
            end.low_u64() as usize,
        );

        let new_words = end.div_ceil(WORD_SIZE) as u64;
        let cost = gas::memory_expansion_cost(self.memory.word_size() as u64, new_words);
        self.gas.charge(cost)?;
        self.memory.resize(end)?;
        Ok((offset, size))
    }

    fn charge_account_access<S, A>(
        &mut self,
        dispatcher: &mut CallDispatcher<'_, S, A>,
        address: Address,
    ) -> Result<(), VmError>
    where
        S: StateBackend,
        A: AccessList,
    {
        let is_cold = dispatcher.access.touch_account(address).is_cold();
        self.gas.charge(gas::account_access_cost(is_cold))
    }

    fn call<S, A>(
        &mut self,
        dispatcher: &mut CallDispatcher<'_, S, A>,
        kind: CallKind,
    ) -> Result<Step, VmError>
    where
        S: StateBackend,
        A: AccessList,
    {
        let requested = self.stack.pop()?;
        let target = Address::from_word(self.stack.pop()?);
        let value = match kind {
            CallKind::Call | CallKind::CallCode => self.stack.pop()?,
            _ => U256::zero(),
        };
        let [in_offset, in_size, out_offset, out_size] = self.stack.pop_n()?;

        let has_value = !value.is_zero();
        if kind == CallKind::Call && has_value && self.context.is_static {
            return Err(VmError::WriteInStaticContext);
        }

        let (in_offset, in_size) = self.memory_range(in_offset, in_size)?;
        let (out_offset, out_size) = self.memory_range(out_offset, out_size)?;

        let is_cold = dispatcher.access.touch_account(target).is_cold();
        let is_empty = kind == CallKind::Call
            && has_value
            && dispatcher
                .state
                .get_account(&target)?
                .map_or(true, |account| account.is_empty());
        self.gas
            .charge(gas::call_surcharge(is_cold, has_value, is_empty))?;

        let forwarded = gas::calculate_call_gas(self.gas.remaining(), requested);
        self.gas.charge(forwarded)?;
        let stipend = if has_value { costs::CALL_STIPEND } else { 0 };

        let input = Bytes::from(self.memory.read_bytes(in_offset, in_size));
        let context = self
            .context
            .child(kind, target, value, input, forwarded + stipend);
        self.pending = Some(Pending::Call {
            out_offset,
            out_size,
        });
        Ok(Step::Spawn(Box::new(ChildFrame::Call { kind, context })))
    }

    fn create<S, A>(
        &mut self,
        dispatcher: &mut CallDispatcher<'_, S, A>,
        kind: CallKind,
    ) -> Result<Step, VmError>
    where
        S: StateBackend,
        A: AccessList,
    {
        let [value, offset, size] = self.stack.pop_n()?;
        let salt = match kind {
            CallKind::Create2 => Some(Hash::new(word_bytes(self.stack.pop()?))),
            _ => None,
        };

        if size > U256::from(self.max_init_code_size) {
            return Err(VmError::InitCodeSizeExceeded {
                size: saturating_usize(size),
                max: self.max_init_code_size,
            });
        }
        let (offset, size) = self.memory_range(offset, size)?;
        self.gas
            .charge(gas::create_gas_cost(size as u64, salt.is_some()))?;
        let init_code = Bytes::from(self.memory.read_bytes(offset, size));

        self.return_data = Bytes::new();
        let creator = self.context.address;
        let mut creator_account = dispatcher.state.get_account(&creator)?.unwrap_or_default();
        let address = match salt {
            Some(salt) => compute_contract_address_create2(creator, salt, init_code.as_slice()),
            None => compute_contract_address(creator, creator_account.nonce),
        };

        let unfunded = self.context.child(kind, address, value, Bytes::new(), 0);
        if let Err(err) = dispatcher.preflight(kind, &unfunded) {
            if err.is_halting() {
                return Err(err);
            }
            self.stack.push(U256::zero())?;
            return Ok(Step::Continue);
        }
        let Some(next_nonce) = creator_account.nonce.checked_add(1) else {
            self.stack.push(U256::zero())?;
            return Ok(Step::Continue);
        };
        creator_account.nonce = next_nonce;
        dispatcher.state.put_account(creator, creator_account)?;

        let forwarded = gas::max_forwardable(self.gas.remaining());
        self.gas.charge(forwarded)?;
        let context = ExecutionContext {
            gas_limit: forwarded,
            ..unfunded
        };
        self.pending = Some(Pending::Create { address });
        Ok(Step::Spawn(Box::new(ChildFrame::Create {
            kind,
            context,
            init_code,
        })))
    }

    fn self_destruct<S, A>(
        &mut self,
        dispatcher: &mut CallDispatcher<'_, S, A>,
        beneficiary: Address,
    ) -> Result<(), VmError>
    where
        S: StateBackend,
        A: AccessList,
    {
        let address = self.context.address;
        let balance = dispatcher.state.get_balance(&address)?;

        let mut cost = costs::SELFDESTRUCT;
        if dispatcher.access.touch_account(beneficiary).is_cold() {
            cost += costs::COLD_ACCOUNT_ACCESS;
        }
        if !balance.is_zero()
            && dispatcher
                .state
                .get_account(&beneficiary)?
                .map_or(true, |account| account.is_empty())
        {
            cost += costs::SELFDESTRUCT_NEW_ACCOUNT;
        }
        self.gas.charge(cost)?;

        if beneficiary != address {
            dispatcher.transfer(address, beneficiary, balance)?;
        }
        self.self_destructs.insert(address);
        Ok(())
    }

    fn merge(&mut self, outcome: FrameOutcome) {
        self.gas.add_refund(outcome.refund);
        self.logs.extend(outcome.logs);
        self.self_destructs.extend(outcome.self_destructs);
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Marks every JUMPDEST that is not inside PUSH data.
fn analyze_jump_dests(code: &[u8]) -> Vec<bool> {
    let mut dests = vec![false; code.len()];
    let mut i = 0;
    while i < code.len() {
        let op = code[i];
        if op == 0x5B {
            dests[i] = true;
        } else if (0x60..=0x7F).contains(&op) {
            i += (op - 0x5F) as usize;
        }
        i += 1;
    }
    dests
}

/// `len` bytes of `data` from `offset`, zero-padded past the end.
fn padded_slice(data: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    if offset < data.len() {
        let available = (data.len() - offset).min(len);
        out[..available].copy_from_slice(&data[offset..offset + available]);
    }
    out
}

fn word_bytes(value: U256) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    bytes
}

fn saturating_u64(value: U256) -> u64 {
    if value.bits() > 64 {
        u64::MAX
    } else {
        value.low_u64()
    }
}

fn saturating_usize(value: U256) -> usize {
    usize::try_from(saturating_u64(value)).unwrap_or(usize::MAX)
}

fn negate(value: U256) -> U256 {
    (!value).overflowing_add(U256::one()).0
}

fn abs(value: U256) -> U256 {
    if value.bit(255) {
        negate(value)
    } else {
        value
    }
}

/// Signed less than comparison.
fn signed_lt(a: U256, b: U256) -> bool {
    match (a.bit(255), b.bit(255)) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

/// Signed division, truncating toward zero. `MIN / -1` wraps to `MIN`.
fn signed_div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let quotient = abs(a) / abs(b);
    if a.bit(255) == b.bit(255) {
        quotient
    } else {
        negate(quotient)
    }
}

/// Signed remainder, taking the sign of the dividend.
fn signed_mod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::zero();
    }
    let remainder = abs(a) % abs(b);
    if a.bit(255) {
        negate(remainder)
    } else {
        remainder
    }
}

/// Extends the sign bit of byte `k` (counted from the least significant).
fn sign_extend(k: U256, x: U256) -> U256 {
    if k >= U256::from(31) {
        return x;
    }
    let bit_index = 8 * k.low_u64() as usize + 7;
    let mask = (U256::one() << (bit_index + 1)) - U256::one();
    if x.bit(bit_index) {
        x | !mask
    } else {
        x & mask
    }
}

/// Arithmetic shift right.
fn sar(shift: U256, value: U256) -> U256 {
    let negative = value.bit(255);
    if shift >= U256::from(256) {
        return if negative { U256::MAX } else { U256::zero() };
    }
    let shift = shift.low_u64() as usize;
    if shift == 0 || !negative {
        return value >> shift;
    }
    (value >> shift) | (U256::MAX << (256 - shift))
}

fn u512_to_u256(value: U512) -> U256 {
    let mut bytes = [0u8; 64];
    value.to_big_endian(&mut bytes);
    U256::from_big_endian(&bytes[32..])
}

// =============================================================================
// TESTS
// =============================================================================
