//! # Call Dispatcher
//!
//! Runs child frames for the CALL and CREATE families.
//!
//! Frames live on an explicit stack owned by the dispatcher, never on the
//! native one: when an instruction asks for a child, the parent is suspended
//! on the stack and the child runs in the same loop. Nesting depth is bounded
//! by `max_call_depth` and gas alone.
//!
//! Every frame runs between a state checkpoint and an access-list
//! checkpoint. Success commits both and hands the frame's logs, refund and
//! self-destructs to the parent; any failure reverts both. Depth and balance
//! rejections happen before the checkpoint and return the child's gas.
//!
//! Errors never cross a frame boundary as `Err`: the outcome of a child is
//! always a [`FrameOutcome`], and the parent decides what to push. The one
//! exception is a halting error, which the parent re-raises so that every
//! ancestor unwinds (see [`VmError::is_halting`]).

use std::collections::BTreeSet;

use tracing::debug;

use crate::domain::entities::{BlockContext, CallKind, ExecutionContext, Log, VmConfig};
use crate::domain::invariants::check_call_depth_invariant;
use crate::domain::value_objects::{Address, Bytes, U256};
use crate::errors::VmError;
use crate::evm::gas::costs;
use crate::evm::guard::ExecutionGuard;
use crate::evm::interpreter::{ChildFrame, Interpreter, Step};
use crate::evm::precompiles::PrecompileRegistry;
use crate::ports::outbound::{AccessList, Checkpoint, StateBackend};

// =============================================================================
// FRAME OUTCOME
// =============================================================================

/// What a finished frame hands back to its parent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameOutcome {
    /// Output on success, the reason otherwise.
    pub result: Result<Bytes, VmError>,
    /// Gas the parent gets back.
    pub gas_left: u64,
    /// Refund counter of a successful frame.
    pub refund: u64,
    /// Logs of a successful frame, in emission order.
    pub logs: Vec<Log>,
    /// Accounts scheduled for deletion by a successful frame.
    pub self_destructs: BTreeSet<Address>,
}

impl FrameOutcome {
    /// Successful frame with `output`.
    #[must_use]
    pub fn success(output: Bytes, gas_left: u64) -> Self {
        Self {
            result: Ok(output),
            gas_left,
            refund: 0,
            logs: Vec::new(),
            self_destructs: BTreeSet::new(),
        }
    }

    /// Failed frame. Everything but a revert burns the remaining gas.
    #[must_use]
    pub fn failed(error: VmError, gas_left: u64) -> Self {
        let gas_left = if error.consumes_all_gas() { 0 } else { gas_left };
        Self {
            result: Err(error),
            gas_left,
            refund: 0,
            logs: Vec::new(),
            self_destructs: BTreeSet::new(),
        }
    }

    /// Frame refused before it started; all of its gas goes back.
    #[must_use]
    pub fn refused(error: VmError, gas_left: u64) -> Self {
        Self {
            gas_left,
            ..Self::failed(error, 0)
        }
    }

    /// Returns true if the frame succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Bytes visible to the parent as return data: the output on success,
    /// the revert payload on REVERT, empty otherwise.
    #[must_use]
    pub fn return_data(&self) -> Bytes {
        match &self.result {
            Ok(output) => output.clone(),
            Err(err) => err.revert_output().cloned().unwrap_or_default(),
        }
    }

    /// Failure reason, if any.
    #[must_use]
    pub fn error(&self) -> Option<&VmError> {
        self.result.as_ref().err()
    }

    /// The error, if it must abort every ancestor.
    #[must_use]
    pub fn halting_error(&self) -> Option<&VmError> {
        self.error().filter(|err| err.is_halting())
    }
}

// =============================================================================
// CALL DISPATCHER
// =============================================================================

/// Shared environment of every frame of one transaction.
pub struct CallDispatcher<'a, S, A> {
    pub(crate) state: &'a mut S,
    pub(crate) access: &'a mut A,
    pub(crate) block: &'a BlockContext,
    pub(crate) config: &'a VmConfig,
    precompiles: &'a PrecompileRegistry,
    pub(crate) guard: ExecutionGuard,
}

impl<'a, S, A> CallDispatcher<'a, S, A>
where
    S: StateBackend,
    A: AccessList,
{
    /// Creates a dispatcher over `state`.
    pub fn new(
        state: &'a mut S,
        access: &'a mut A,
        block: &'a BlockContext,
        config: &'a VmConfig,
        precompiles: &'a PrecompileRegistry,
        guard: ExecutionGuard,
    ) -> Self {
        Self {
            state,
            access,
            block,
            config,
            precompiles,
            guard,
        }
    }

    /// Checks that a child frame may start: depth within the limit and, for
    /// value-moving kinds, a caller able to pay.
    ///
    /// # Errors
    ///
    /// `CallDepthExceeded`, `InsufficientBalance`, or a state error.
    pub fn preflight(&self, kind: CallKind, context: &ExecutionContext) -> Result<(), VmError> {
        if !check_call_depth_invariant(context.depth, self.config) {
            return Err(VmError::CallDepthExceeded {
                depth: context.depth,
                max: self.config.max_call_depth,
            });
        }
        if moves_value(kind) && !context.value.is_zero() {
            let available = self.state.get_balance(&context.caller)?;
            if available < context.value {
                return Err(VmError::InsufficientBalance {
                    required: context.value,
                    available,
                });
            }
        }
        Ok(())
    }

    /// Runs a message call of `kind` described by the child `context`.
    pub fn call(&mut self, kind: CallKind, context: ExecutionContext) -> FrameOutcome {
        match self.start_call(kind, context) {
            Started::Running(frame) => self.drive(frame),
            Started::Finished(outcome) => outcome,
        }
    }

    /// Runs `init_code` to deploy a contract at `context.address`.
    ///
    /// The creator's nonce is not touched here; CREATE bumps it before
    /// calling, and the transaction processor bumps it during prepayment.
    pub fn create(
        &mut self,
        kind: CallKind,
        context: ExecutionContext,
        init_code: Bytes,
    ) -> FrameOutcome {
        match self.start_create(kind, context, init_code) {
            Started::Running(frame) => self.drive(frame),
            Started::Finished(outcome) => outcome,
        }
    }

    /// Runs `code` as the code of `context.address` without a value
    /// transfer, inside its own checkpoint.
    pub fn execute_code(&mut self, context: ExecutionContext, code: Bytes) -> FrameOutcome {
        let checkpoint = match self.open() {
            Ok(checkpoint) => checkpoint,
            Err(err) => return FrameOutcome::failed(err, 0),
        };
        let frame = Frame {
            interpreter: Box::new(Interpreter::new(context, code, self.config)),
            checkpoint,
            deploy_to: None,
        };
        self.drive(frame)
    }

    /// Runs `root` and every frame it spawns until `root` finishes.
    ///
    /// Suspended ancestors wait in `parents`. A finished child resumes the
    /// frame below it; if resuming fails (halting error, memory limit), the
    /// parent finishes with that error in turn.
    fn drive(&mut self, root: Frame) -> FrameOutcome {
        let mut frame = root;
        let mut parents: Vec<Frame> = Vec::new();
        let mut returned: Option<FrameOutcome> = None;
        loop {
            let resumed = match returned.take() {
                Some(child) => frame.interpreter.resume(child),
                None => Ok(()),
            };
            let halted = match resumed.and_then(|()| self.run_frame(&mut frame)) {
                Ok(Halt::Spawned(child)) => {
                    parents.push(std::mem::replace(&mut frame, child));
                    continue;
                }
                Ok(Halt::Returned(output)) => Ok(output),
                Err(err) => Err(err),
            };

            let outcome = self.finish(frame, halted);
            match parents.pop() {
                Some(parent) => {
                    frame = parent;
                    returned = Some(outcome);
                }
                None => {
                    debug!(steps = self.guard.steps(), "execution finished");
                    return outcome;
                }
            }
        }
    }

    /// Steps `frame` until it returns, fails, or spawns a child that needs a
    /// frame of its own. Children that finish at once (refusals, precompiles,
    /// empty code) resume `frame` in place.
    fn run_frame(&mut self, frame: &mut Frame) -> Result<Halt, VmError> {
        loop {
            match frame.interpreter.step(self)? {
                Step::Continue => {}
                Step::Return(output) => return Ok(Halt::Returned(output)),
                Step::Spawn(request) => match self.start(*request) {
                    Started::Running(child) => return Ok(Halt::Spawned(child)),
                    Started::Finished(outcome) => frame.interpreter.resume(outcome)?,
                },
            }
        }
    }

    fn start(&mut self, request: ChildFrame) -> Started {
        match request {
            ChildFrame::Call { kind, context } => self.start_call(kind, context),
            ChildFrame::Create {
                kind,
                context,
                init_code,
            } => self.start_create(kind, context, init_code),
        }
    }

    fn start_call(&mut self, kind: CallKind, context: ExecutionContext) -> Started {
        debug!(
            depth = context.depth,
            ?kind,
            target = %context.code_address,
            gas = context.gas_limit,
            "call"
        );
        if let Err(err) = self.preflight(kind, &context) {
            return Started::Finished(refuse(err, context.gas_limit));
        }
        let checkpoint = match self.open() {
            Ok(checkpoint) => checkpoint,
            Err(err) => return Started::Finished(FrameOutcome::failed(err, 0)),
        };
        match self.enter(kind, context) {
            Ok(Entered::Code(interpreter)) => Started::Running(Frame {
                interpreter,
                checkpoint,
                deploy_to: None,
            }),
            Ok(Entered::Done(outcome)) => Started::Finished(self.close(checkpoint, outcome)),
            Err(err) => Started::Finished(self.close(checkpoint, FrameOutcome::failed(err, 0))),
        }
    }

    fn start_create(
        &mut self,
        kind: CallKind,
        context: ExecutionContext,
        init_code: Bytes,
    ) -> Started {
        debug!(
            depth = context.depth,
            ?kind,
            address = %context.address,
            init_code = init_code.len(),
            gas = context.gas_limit,
            "create"
        );
        if let Err(err) = self.preflight(kind, &context) {
            return Started::Finished(refuse(err, context.gas_limit));
        }
        if init_code.len() > self.config.max_init_code_size {
            return Started::Finished(FrameOutcome::failed(
                VmError::InitCodeSizeExceeded {
                    size: init_code.len(),
                    max: self.config.max_init_code_size,
                },
                0,
            ));
        }

        let address = context.address;
        self.access.touch_account(address);
        match self.state.get_account(&address) {
            Ok(Some(existing)) if existing.has_code() || existing.nonce > 0 => {
                return Started::Finished(FrameOutcome::failed(
                    VmError::ContractAlreadyExists(address),
                    0,
                ));
            }
            Ok(_) => {}
            Err(err) => return Started::Finished(FrameOutcome::failed(err.into(), 0)),
        }

        let checkpoint = match self.open() {
            Ok(checkpoint) => checkpoint,
            Err(err) => return Started::Finished(FrameOutcome::failed(err, 0)),
        };
        if let Err(err) = self.fund_new_account(&context) {
            return Started::Finished(self.close(checkpoint, FrameOutcome::failed(err, 0)));
        }
        Started::Running(Frame {
            interpreter: Box::new(Interpreter::new(context, init_code, self.config)),
            checkpoint,
            deploy_to: Some(address),
        })
    }

    /// Sets up the callee: moves the value, then resolves what runs there.
    fn enter(&mut self, kind: CallKind, context: ExecutionContext) -> Result<Entered, VmError> {
        if moves_value(kind) {
            self.transfer(context.caller, context.address, context.value)?;
        }

        if self.precompiles.contains(&context.code_address) {
            let output = self.precompiles.invoke(
                context.code_address,
                context.data.as_slice(),
                context.gas_limit,
            )?;
            debug!(
                precompile = %context.code_address,
                gas_used = output.gas_used,
                "precompile"
            );
            return Ok(Entered::Done(FrameOutcome::success(
                output.output,
                context.gas_limit - output.gas_used,
            )));
        }

        let code = self.state.code_at(&context.code_address)?;
        if code.is_empty() {
            return Ok(Entered::Done(FrameOutcome::success(
                Bytes::new(),
                context.gas_limit,
            )));
        }
        Ok(Entered::Code(Box::new(Interpreter::new(context, code, self.config))))
    }

    /// A new contract starts at nonce 1 holding the endowment.
    fn fund_new_account(&mut self, context: &ExecutionContext) -> Result<(), VmError> {
        let address = context.address;
        let mut account = self.state.get_account(&address)?.unwrap_or_default();
        account.nonce = 1;
        self.state.put_account(address, account)?;
        self.transfer(context.caller, address, context.value)
    }

    /// Closes a halted frame: creations install their code, then the
    /// checkpoints are committed or reverted.
    fn finish(&mut self, frame: Frame, halted: Result<Bytes, VmError>) -> FrameOutcome {
        let outcome = frame.interpreter.finish(halted);
        let outcome = match frame.deploy_to {
            Some(address) => self
                .install_code(address, outcome)
                .unwrap_or_else(|err| FrameOutcome::failed(err, 0)),
            None => outcome,
        };
        self.close(frame.checkpoint, outcome)
    }

    /// Stores the code returned by a successful init code at `address`,
    /// charging the per-byte deposit.
    fn install_code(
        &mut self,
        address: Address,
        mut outcome: FrameOutcome,
    ) -> Result<FrameOutcome, VmError> {
        let code = match &outcome.result {
            Ok(code) => code.clone(),
            Err(_) => return Ok(outcome),
        };

        if code.len() > self.config.max_code_size {
            return Ok(FrameOutcome::failed(
                VmError::CodeSizeExceeded {
                    size: code.len(),
                    max: self.config.max_code_size,
                },
                0,
            ));
        }
        if code.as_slice().first() == Some(&0xEF) {
            return Ok(FrameOutcome::failed(VmError::InvalidCodePrefix, 0));
        }
        let deposit = costs::CODE_DEPOSIT_BYTE * code.len() as u64;
        if deposit > outcome.gas_left {
            return Ok(FrameOutcome::failed(VmError::OutOfGas, 0));
        }
        outcome.gas_left -= deposit;

        let code_hash = self.state.put_code(code)?;
        let mut account = self.state.get_account(&address)?.unwrap_or_default();
        account.code_hash = code_hash;
        self.state.put_account(address, account)?;

        outcome.result = Ok(Bytes::new());
        Ok(outcome)
    }

    /// Moves `value` from `from` to `to`, creating `to` if needed.
    pub(crate) fn transfer(
        &mut self,
        from: Address,
        to: Address,
        value: U256,
    ) -> Result<(), VmError> {
        if value.is_zero() {
            return Ok(());
        }
        let mut sender = self.state.get_account(&from)?.unwrap_or_default();
        if sender.balance < value {
            return Err(VmError::InsufficientBalance {
                required: value,
                available: sender.balance,
            });
        }
        sender.balance -= value;
        self.state.put_account(from, sender)?;

        let mut recipient = self.state.get_account(&to)?.unwrap_or_default();
        recipient.balance = recipient.balance.saturating_add(value);
        self.state.put_account(to, recipient)?;
        Ok(())
    }

    fn open(&mut self) -> Result<(Checkpoint, usize), VmError> {
        let checkpoint = self.state.checkpoint()?;
        Ok((checkpoint, self.access.checkpoint()))
    }

    fn close(
        &mut self,
        (checkpoint, access): (Checkpoint, usize),
        outcome: FrameOutcome,
    ) -> FrameOutcome {
        let closed = if outcome.is_success() {
            self.state.commit(checkpoint)
        } else {
            self.access.revert(access);
            self.state.revert(checkpoint)
        };
        match closed {
            Ok(()) => {
                debug!(
                    success = outcome.is_success(),
                    gas_left = outcome.gas_left,
                    error = ?outcome.error(),
                    "frame finished"
                );
                outcome
            }
            Err(err) => FrameOutcome::failed(err.into(), 0),
        }
    }
}

/// A frame on the dispatcher's stack.
struct Frame {
    interpreter: Box<Interpreter>,
    checkpoint: (Checkpoint, usize),
    /// Receives the returned code when the frame runs init code.
    deploy_to: Option<Address>,
}

enum Started {
    Running(Frame),
    Finished(FrameOutcome),
}

enum Entered {
    Code(Box<Interpreter>),
    Done(FrameOutcome),
}

enum Halt {
    Returned(Bytes),
    Spawned(Frame),
}

fn moves_value(kind: CallKind) -> bool {
    matches!(
        kind,
        CallKind::Call | CallKind::CallCode | CallKind::Create | CallKind::Create2
    )
}

fn refuse(err: VmError, gas: u64) -> FrameOutcome {
    if err.is_halting() {
        FrameOutcome::failed(err, 0)
    } else {
        FrameOutcome::refused(err, gas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryAccessList, InMemoryState};
    use crate::domain::entities::Account;
    use crate::domain::value_objects::{StorageKey, StorageValue};

    const CALLER: Address = Address::low(0xca);
    const CALLEE: Address = Address::low(0xce);

    struct Fixture {
        state: InMemoryState,
        access: InMemoryAccessList,
        block: BlockContext,
        config: VmConfig,
        precompiles: PrecompileRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let mut state = InMemoryState::new();
            state
                .put_account(CALLER, Account::new(U256::from(1_000), 0))
                .unwrap();
            Self {
                state,
                access: InMemoryAccessList::new(),
                block: BlockContext::default(),
                config: VmConfig::default(),
                precompiles: PrecompileRegistry::standard(),
            }
        }

        fn dispatcher(&mut self) -> CallDispatcher<'_, InMemoryState, InMemoryAccessList> {
            CallDispatcher::new(
                &mut self.state,
                &mut self.access,
                &self.block,
                &self.config,
                &self.precompiles,
                ExecutionGuard::unlimited(),
            )
        }
    }

    fn context(to: Address, value: u64, gas: u64) -> ExecutionContext {
        ExecutionContext::new_transaction(
            CALLER,
            to,
            U256::from(value),
            Bytes::new(),
            gas,
            U256::one(),
        )
    }

    #[test]
    fn test_value_transfer_to_new_account() {
        let mut fx = Fixture::new();
        let outcome = fx.dispatcher().call(CallKind::Call, context(CALLEE, 300, 5_000));

        assert!(outcome.is_success());
        assert_eq!(outcome.gas_left, 5_000);
        assert_eq!(fx.state.get_balance(&CALLEE).unwrap(), U256::from(300));
        assert_eq!(fx.state.get_balance(&CALLER).unwrap(), U256::from(700));
        assert_eq!(fx.state.open_checkpoints(), 0);
    }

    #[test]
    fn test_insufficient_balance_is_refused_with_gas() {
        let mut fx = Fixture::new();
        let outcome = fx.dispatcher().call(CallKind::Call, context(CALLEE, 5_000, 700));

        assert!(matches!(
            outcome.error(),
            Some(VmError::InsufficientBalance { .. })
        ));
        assert_eq!(outcome.gas_left, 700);
        assert!(fx.state.get_account(&CALLEE).unwrap().is_none());
    }

    #[test]
    fn test_depth_limit() {
        let mut fx = Fixture::new();
        fx.config.max_call_depth = 4;
        let mut ctx = context(CALLEE, 0, 100);
        ctx.depth = 5;
        let outcome = fx.dispatcher().call(CallKind::Call, ctx);
        assert_eq!(
            outcome.error(),
            Some(&VmError::CallDepthExceeded { depth: 5, max: 4 })
        );
        assert_eq!(outcome.gas_left, 100);
    }

    #[test]
    fn test_failed_child_reverts_storage_and_consumes_gas() {
        let mut fx = Fixture::new();
        // PUSH1 1 PUSH1 0 SSTORE INVALID
        fx.state.set_code(CALLEE, Bytes::from(vec![0x60, 0x01, 0x60, 0x00, 0x55, 0xfe]));

        let outcome = fx.dispatcher().call(CallKind::Call, context(CALLEE, 10, 50_000));

        assert_eq!(outcome.error(), Some(&VmError::InvalidOpcode(0xfe)));
        assert_eq!(outcome.gas_left, 0);
        let slot = fx.state.get_storage(&CALLEE, &StorageKey::from(0u64)).unwrap();
        assert_eq!(slot, StorageValue::ZERO);
        assert_eq!(fx.state.get_balance(&CALLER).unwrap(), U256::from(1_000));
        // the slot warmed by the failed frame is cold again
        assert!(!fx.access.is_storage_warm(&CALLEE, &StorageKey::from(0u64)));
    }

    #[test]
    fn test_precompile_failure_undoes_transfer() {
        let mut fx = Fixture::new();
        let sha256 = crate::domain::services::precompiles::SHA256;
        let outcome = fx.dispatcher().call(CallKind::Call, context(sha256, 10, 59));

        assert!(matches!(
            outcome.error(),
            Some(VmError::PrecompileFailure(_))
        ));
        assert_eq!(outcome.gas_left, 0);
        assert_eq!(fx.state.get_balance(&CALLER).unwrap(), U256::from(1_000));
    }

    #[test]
    fn test_create_installs_returned_code() {
        let mut fx = Fixture::new();
        // returns the single byte 0x00:
        // PUSH1 1 PUSH1 31 RETURN with memory untouched
        let init = Bytes::from(vec![0x60, 0x01, 0x60, 0x1f, 0xf3]);
        let target = Address::low(0x77);
        let ctx = context(target, 5, 100_000);

        let outcome = fx.dispatcher().create(CallKind::Create, ctx, init);

        assert!(outcome.is_success(), "{:?}", outcome.error());
        let account = fx.state.get_account(&target).unwrap().unwrap();
        assert_eq!(account.nonce, 1);
        assert_eq!(account.balance, U256::from(5));
        assert_eq!(fx.state.code_at(&target).unwrap().as_slice(), &[0x00]);
    }

    #[test]
    fn test_create_collision() {
        let mut fx = Fixture::new();
        let target = Address::low(0x77);
        fx.state.put_account(target, Account::new(U256::zero(), 1)).unwrap();

        let outcome = fx
            .dispatcher()
            .create(CallKind::Create, context(target, 0, 1_000), Bytes::new());
        assert_eq!(
            outcome.error(),
            Some(&VmError::ContractAlreadyExists(target))
        );
        assert_eq!(outcome.gas_left, 0);
    }

    #[test]
    fn test_create_rejects_ef_prefix() {
        let mut fx = Fixture::new();
        // MSTORE8(0, 0xEF) RETURN(0, 1)
        let init = Bytes::from(vec![0x60, 0xef, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xf3]);
        let target = Address::low(0x78);
        let outcome = fx
            .dispatcher()
            .create(CallKind::Create, context(target, 0, 100_000), init);
        assert_eq!(outcome.error(), Some(&VmError::InvalidCodePrefix));
        assert!(fx.state.get_account(&target).unwrap().is_none());
    }
}
