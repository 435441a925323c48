//! # Execution Service
//!
//! Async facade over the [`TransactionProcessor`] and a shared world state.
//!
//! - Every committing request takes the state's write lock, so commits are
//!   serialized and root computation never interleaves.
//! - `estimate_gas` and `call` run inside a checkpoint that is always
//!   reverted.
//! - Each execution gets a wall-clock deadline and the service-wide
//!   cancellation flag; tripping either aborts the transaction as a failure
//!   that consumes all of its gas.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::adapters::InMemoryState;
use crate::domain::entities::{
    BlockContext, ExecutionResult, Receipt, RunCodeParams, Transaction, VmConfig,
};
use crate::domain::invariants::{check_receipt_invariants, InvariantCheckResult};
use crate::domain::value_objects::U256;
use crate::errors::{StateError, TransactionError};
use crate::ports::inbound::ExecutionApi;
use crate::ports::outbound::StateBackend;
use crate::processor::TransactionProcessor;

/// Execution service configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// VM limits.
    pub vm: VmConfig,
    /// Wall-clock budget of one execution in milliseconds.
    pub execution_timeout_ms: u64,
    /// Reject transactions whose gas limit exceeds the block's.
    pub enforce_block_gas_limit: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            vm: VmConfig::default(),
            execution_timeout_ms: 5000,
            enforce_block_gas_limit: true,
        }
    }
}

impl ServiceConfig {
    /// Parses a configuration; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Malformed JSON or mistyped fields.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }
}

/// Counters of the execution service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    /// Transactions that produced a receipt.
    pub transactions_executed: u64,
    /// Receipts with `success`.
    pub successful_executions: u64,
    /// Receipts without `success`.
    pub failed_executions: u64,
    /// Transactions rejected during validation or by the store.
    pub rejected_transactions: u64,
    /// Gas charged across all receipts.
    pub total_gas_used: u64,
    /// Receipts that broke a post-execution invariant.
    pub invariant_violations: u64,
    /// Average wall-clock time per executed transaction in microseconds.
    pub avg_execution_time_us: u64,
}

/// The execution service.
pub struct ExecutionService<S: StateBackend> {
    config: ServiceConfig,
    state: Arc<RwLock<S>>,
    stats: Arc<RwLock<ServiceStats>>,
    cancel: Arc<AtomicBool>,
}

impl<S: StateBackend> ExecutionService<S> {
    /// Service owning `state`.
    pub fn new(state: S, config: ServiceConfig) -> Self {
        Self::with_shared_state(Arc::new(RwLock::new(state)), config)
    }

    /// Service over a state shared with other components.
    pub fn with_shared_state(state: Arc<RwLock<S>>, config: ServiceConfig) -> Self {
        Self {
            config,
            state,
            stats: Arc::new(RwLock::new(ServiceStats::default())),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared world state.
    pub fn state(&self) -> Arc<RwLock<S>> {
        Arc::clone(&self.state)
    }

    /// Service configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Current statistics.
    pub async fn stats(&self) -> ServiceStats {
        self.stats.read().await.clone()
    }

    /// Flag that aborts in-flight and future executions while set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Aborts in-flight executions.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Lets executions run again after [`cancel`](Self::cancel).
    pub fn resume(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    fn processor(&self) -> TransactionProcessor {
        TransactionProcessor::new(self.config.vm.clone())
            .with_block_gas_limit(self.config.enforce_block_gas_limit)
            .with_timeout(self.config.timeout())
            .with_cancel_flag(Arc::clone(&self.cancel))
    }

    async fn record(&self, result: &Result<Receipt, TransactionError>, elapsed: Duration) {
        let mut stats = self.stats.write().await;
        match result {
            Ok(receipt) => {
                stats.transactions_executed += 1;
                if receipt.success {
                    stats.successful_executions += 1;
                } else {
                    stats.failed_executions += 1;
                }
                stats.total_gas_used = stats.total_gas_used.saturating_add(receipt.gas_used);

                let total = stats.transactions_executed;
                let elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
                let weighted = stats.avg_execution_time_us.saturating_mul(total - 1);
                stats.avg_execution_time_us = weighted.saturating_add(elapsed_us) / total;
            }
            Err(_) => stats.rejected_transactions += 1,
        }
    }

    /// Runs `tx` inside a checkpoint that is reverted whatever happens.
    async fn simulate(
        &self,
        tx: &Transaction,
        block: &BlockContext,
        processor: TransactionProcessor,
    ) -> Result<Receipt, TransactionError> {
        let mut state = self.state.write().await;
        let checkpoint = state.checkpoint()?;
        let result = processor.run_transaction(&mut *state, tx, block);
        state.revert(checkpoint)?;
        result
    }
}

#[async_trait]
impl<S: StateBackend + 'static> ExecutionApi for ExecutionService<S> {
    #[instrument(
        skip(self, tx, block),
        fields(sender = %tx.from, nonce = tx.nonce, gas_limit = tx.gas_limit)
    )]
    async fn run_transaction(
        &self,
        tx: &Transaction,
        block: &BlockContext,
    ) -> Result<Receipt, TransactionError> {
        let start = Instant::now();
        let result = {
            let mut state = self.state.write().await;
            self.processor().run_transaction(&mut *state, tx, block)
        };
        self.record(&result, start.elapsed()).await;

        if let Ok(receipt) = &result {
            if let InvariantCheckResult::Invalid(violations) = check_receipt_invariants(tx, receipt)
            {
                error!(?violations, "receipt violates execution invariants");
                self.stats.write().await.invariant_violations += 1;
            }
            debug!(
                success = receipt.success,
                gas_used = receipt.gas_used,
                "transaction committed"
            );
        }
        result
    }

    #[instrument(
        skip(self, params),
        fields(address = %params.context.address, gas_limit = params.context.gas_limit)
    )]
    async fn run_code(&self, params: RunCodeParams) -> Result<ExecutionResult, StateError> {
        let mut state = self.state.write().await;
        let result = self.processor().run_code(&mut *state, params);
        if let Err(err) = &result {
            warn!(%err, "code execution aborted by the store");
        }
        result
    }

    #[instrument(skip(self, tx, block), fields(sender = %tx.from, nonce = tx.nonce))]
    async fn estimate_gas(
        &self,
        tx: &Transaction,
        block: &BlockContext,
    ) -> Result<u64, TransactionError> {
        let unpriced = Transaction {
            gas_limit: block.gas_limit,
            gas_price: U256::zero(),
            ..tx.clone()
        };
        let receipt = self.simulate(&unpriced, block, self.processor()).await?;
        info!(
            gas_used = receipt.gas_used,
            success = receipt.success,
            "gas estimated"
        );
        Ok(receipt.gas_used)
    }

    #[instrument(
        skip(self, tx, block),
        fields(sender = %tx.from, nonce = tx.nonce, gas_limit = tx.gas_limit)
    )]
    async fn call(
        &self,
        tx: &Transaction,
        block: &BlockContext,
    ) -> Result<Receipt, TransactionError> {
        self.simulate(tx, block, self.processor()).await
    }
}

/// Service over an empty in-memory state with the default configuration.
#[must_use]
pub fn create_test_service() -> ExecutionService<InMemoryState> {
    ExecutionService::new(InMemoryState::new(), ServiceConfig::default())
}
