//! # Transaction Processor
//!
//! Drives one transaction against a [`StateBackend`]: validation, fee
//! prepayment, the depth-0 call or creation, refunds and fee settlement,
//! then the receipt.
//!
//! Validation failures leave the store untouched. Once validation passes,
//! the fee prepayment and nonce bump survive whatever execution does; only
//! the effects of the execution phase are reverted on failure.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::adapters::InMemoryAccessList;
use crate::domain::entities::{
    Account, BlockContext, CallKind, ExecutionContext, ExecutionResult, Receipt, RunCodeParams,
    Transaction, VmConfig,
};
use crate::domain::services::{compute_contract_address, intrinsic_gas};
use crate::domain::value_objects::{Address, Bytes, U256};
use crate::errors::{StateError, TransactionError, VmError};
use crate::evm::dispatcher::{CallDispatcher, FrameOutcome};
use crate::evm::gas::calculate_refund;
use crate::evm::guard::ExecutionGuard;
use crate::evm::precompiles::PrecompileRegistry;
use crate::ports::outbound::StateBackend;

/// Runs transactions and bare code with one configuration.
#[derive(Debug)]
pub struct TransactionProcessor {
    config: VmConfig,
    precompiles: PrecompileRegistry,
    enforce_block_gas_limit: bool,
    timeout: Option<Duration>,
    cancel: Option<Arc<AtomicBool>>,
}

impl Default for TransactionProcessor {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl TransactionProcessor {
    /// Processor with the standard precompiles and the block gas limit
    /// enforced.
    #[must_use]
    pub fn new(config: VmConfig) -> Self {
        Self {
            config,
            precompiles: PrecompileRegistry::standard(),
            enforce_block_gas_limit: true,
            timeout: None,
            cancel: None,
        }
    }

    /// Whether `gas_limit > block.gas_limit` rejects a transaction.
    #[must_use]
    pub fn with_block_gas_limit(mut self, enforce: bool) -> Self {
        self.enforce_block_gas_limit = enforce;
        self
    }

    /// Wall-clock budget of each execution.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Aborts executions once `flag` is set.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Execution limits in use.
    #[must_use]
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    fn guard(&self) -> ExecutionGuard {
        let mut guard = ExecutionGuard::new(self.config.max_execution_steps);
        if let Some(timeout) = self.timeout {
            guard = guard.with_timeout(timeout);
        }
        if let Some(flag) = &self.cancel {
            guard = guard.with_cancel_flag(Arc::clone(flag));
        }
        guard
    }

    fn access_list(&self, warm: impl IntoIterator<Item = Address>) -> InMemoryAccessList {
        InMemoryAccessList::with_prewarmed(warm.into_iter().chain(self.precompiles.addresses()))
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Validates and executes `tx` in `block`.
    ///
    /// # Errors
    ///
    /// A validation error leaves `state` untouched. `State` is returned
    /// when the store fails; everything the transaction did is reverted
    /// first.
    pub fn run_transaction<S: StateBackend>(
        &self,
        state: &mut S,
        tx: &Transaction,
        block: &BlockContext,
    ) -> Result<Receipt, TransactionError> {
        let intrinsic = self.validate(state, tx, block).inspect_err(|err| {
            warn!(sender = %tx.from, nonce = tx.nonce, %err, "transaction rejected");
        })?;

        let checkpoint = state.checkpoint()?;
        let settled = match self.execute(state, tx, block, intrinsic) {
            Ok(settled) => settled,
            Err(err) => {
                warn!(
                    sender = %tx.from,
                    nonce = tx.nonce,
                    %err,
                    "transaction aborted by the store"
                );
                state.revert(checkpoint)?;
                return Err(err);
            }
        };
        state.commit(checkpoint)?;

        let post_state_root = state.compute_root()?;
        let mut post_accounts = BTreeMap::new();
        for address in [tx.from, settled.target, block.coinbase] {
            if let Some(account) = state.get_account(&address)? {
                post_accounts.insert(address, account);
            }
        }

        let receipt = Receipt {
            success: settled.outcome.is_success(),
            gas_used: settled.gas_used,
            output: settled.outcome.return_data(),
            logs: settled.outcome.logs.clone(),
            contract_address: settled.created,
            post_accounts,
            post_state_root,
            error: settled.outcome.error().map(ToString::to_string),
        };
        info!(
            sender = %tx.from,
            nonce = tx.nonce,
            success = receipt.success,
            gas_used = receipt.gas_used,
            logs = receipt.logs.len(),
            root = %receipt.post_state_root,
            "transaction executed"
        );
        Ok(receipt)
    }

    /// Checks everything that can reject `tx` outright and returns its
    /// intrinsic gas.
    fn validate<S: StateBackend>(
        &self,
        state: &S,
        tx: &Transaction,
        block: &BlockContext,
    ) -> Result<u64, TransactionError> {
        let intrinsic = intrinsic_gas(tx.data.as_slice(), tx.is_create());
        if intrinsic > tx.gas_limit {
            return Err(TransactionError::IntrinsicGasTooLow {
                intrinsic,
                limit: tx.gas_limit,
            });
        }
        if self.enforce_block_gas_limit && tx.gas_limit > block.gas_limit {
            return Err(TransactionError::GasLimitExceedsBlock {
                limit: tx.gas_limit,
                block_limit: block.gas_limit,
            });
        }

        let sender = state.get_account(&tx.from)?.unwrap_or_default();
        // a nonce at u64::MAX could never be bumped
        if sender.nonce != tx.nonce || sender.nonce == u64::MAX {
            return Err(TransactionError::InvalidNonce {
                expected: sender.nonce,
                got: tx.nonce,
            });
        }

        match tx.max_fee().and_then(|fee| fee.checked_add(tx.value)) {
            Some(required) if sender.balance >= required => {}
            required => {
                return Err(TransactionError::InsufficientBalance {
                    required: required.unwrap_or(U256::MAX),
                    available: sender.balance,
                });
            }
        }
        Ok(intrinsic)
    }

    fn execute<S: StateBackend>(
        &self,
        state: &mut S,
        tx: &Transaction,
        block: &BlockContext,
        intrinsic: u64,
    ) -> Result<Settled, TransactionError> {
        let fee = tx.max_fee().unwrap_or_default();

        let mut sender = state.get_account(&tx.from)?.unwrap_or_default();
        sender.balance -= fee;
        sender.nonce += 1;
        state.put_account(tx.from, sender)?;

        let target = match tx.to {
            Some(to) => to,
            None => compute_contract_address(tx.from, tx.nonce),
        };
        let mut access = self.access_list([tx.from, target, block.coinbase]);

        let gas = tx.gas_limit - intrinsic;
        let outcome = {
            let mut dispatcher = CallDispatcher::new(
                state,
                &mut access,
                block,
                &self.config,
                &self.precompiles,
                self.guard(),
            );
            if tx.is_create() {
                let context = ExecutionContext::new_transaction(
                    tx.from,
                    target,
                    tx.value,
                    Bytes::new(),
                    gas,
                    tx.gas_price,
                );
                dispatcher.create(CallKind::Create, context, tx.data.clone())
            } else {
                let context = ExecutionContext::new_transaction(
                    tx.from,
                    target,
                    tx.value,
                    tx.data.clone(),
                    gas,
                    tx.gas_price,
                );
                dispatcher.call(CallKind::Call, context)
            }
        };

        if let Some(VmError::StateError(err)) = outcome.halting_error() {
            return Err(TransactionError::State(err.clone()));
        }
        if let Some(err) = outcome.halting_error() {
            warn!(sender = %tx.from, nonce = tx.nonce, %err, "execution halted");
        }

        let mut gas_used = tx.gas_limit - outcome.gas_left;
        if outcome.is_success() {
            gas_used -= calculate_refund(gas_used, outcome.refund);
        }
        debug!(gas_used, refund = outcome.refund, "settling fees");

        let unused = U256::from(tx.gas_limit - gas_used) * tx.gas_price;
        credit(state, tx.from, unused)?;
        credit(state, block.coinbase, U256::from(gas_used) * tx.gas_price)?;

        if outcome.is_success() {
            for address in &outcome.self_destructs {
                debug!(%address, "deleting self-destructed account");
                state.delete_account(address)?;
            }
        }

        let created = (tx.is_create() && outcome.is_success()).then_some(target);
        Ok(Settled {
            outcome,
            gas_used,
            target,
            created,
        })
    }

    // =========================================================================
    // BARE CODE
    // =========================================================================

    /// Runs `params.code` as the code of `params.context.address`, with
    /// `params.account` installed there first.
    ///
    /// # Errors
    ///
    /// Only store failures; execution failures are reported in the result.
    pub fn run_code<S: StateBackend>(
        &self,
        state: &mut S,
        params: RunCodeParams,
    ) -> Result<ExecutionResult, StateError> {
        let RunCodeParams {
            block,
            context,
            account,
            code,
        } = params;
        let address = context.address;
        let gas_limit = context.gas_limit;
        state.put_account(address, account)?;

        let mut access = self.access_list([context.caller, address, block.coinbase]);
        let outcome = {
            let mut dispatcher = CallDispatcher::new(
                state,
                &mut access,
                &block,
                &self.config,
                &self.precompiles,
                self.guard(),
            );
            dispatcher.execute_code(context, code)
        };
        if let Some(VmError::StateError(err)) = outcome.halting_error() {
            return Err(err.clone());
        }

        state.compute_root()?;
        let post_account = state.get_account(&address)?.unwrap_or_default();
        debug!(
            %address,
            success = outcome.is_success(),
            gas_used = gas_limit - outcome.gas_left,
            "code executed"
        );
        Ok(into_result(outcome, gas_limit, post_account))
    }
}

/// What the execution phase of a transaction left behind.
struct Settled {
    outcome: FrameOutcome,
    gas_used: u64,
    target: Address,
    created: Option<Address>,
}

fn credit<S: StateBackend>(
    state: &mut S,
    address: Address,
    amount: U256,
) -> Result<(), StateError> {
    if amount.is_zero() {
        return Ok(());
    }
    let mut account = state.get_account(&address)?.unwrap_or_default();
    account.balance = account.balance.saturating_add(amount);
    state.put_account(address, account)
}

fn into_result(outcome: FrameOutcome, gas_limit: u64, post_account: Account) -> ExecutionResult {
    ExecutionResult {
        success: outcome.is_success(),
        return_data: outcome.return_data(),
        gas_used: gas_limit - outcome.gas_left,
        gas_refund: outcome.refund,
        error: outcome.error().map(ToString::to_string),
        logs: outcome.logs,
        post_account,
    }
}

// =============================================================================
// CONVENIENCE
// =============================================================================

/// Runs `tx` with the default configuration.
///
/// # Errors
///
/// See [`TransactionProcessor::run_transaction`].
pub fn run_transaction<S: StateBackend>(
    state: &mut S,
    tx: &Transaction,
    block: &BlockContext,
) -> Result<Receipt, TransactionError> {
    TransactionProcessor::default().run_transaction(state, tx, block)
}

/// Runs bare code with the default configuration.
///
/// # Errors
///
/// See [`TransactionProcessor::run_code`].
pub fn run_code<S: StateBackend>(
    state: &mut S,
    params: RunCodeParams,
) -> Result<ExecutionResult, StateError> {
    TransactionProcessor::default().run_code(state, params)
}

// =============================================================================
// TESTS
// =============================================================================
