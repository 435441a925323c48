//! # Driving Port (API - Inbound)
//!
//! What callers of the engine see. Implemented by
//! [`ExecutionService`](crate::service::ExecutionService).

use crate::domain::entities::{BlockContext, ExecutionResult, Receipt, RunCodeParams, Transaction};
use crate::errors::{StateError, TransactionError};
use async_trait::async_trait;

/// Transaction execution against a shared world state.
///
/// ## Usage
///
/// ```ignore
/// let receipt = api.run_transaction(&tx, &block).await?;
/// if !receipt.success {
///     println!("failed: {:?}", receipt.error);
/// }
/// ```
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    /// Validates `tx`, executes it and commits the result.
    ///
    /// # Errors
    ///
    /// A rejected transaction leaves the state untouched. Execution
    /// failures are reported in the receipt, not here.
    async fn run_transaction(
        &self,
        tx: &Transaction,
        block: &BlockContext,
    ) -> Result<Receipt, TransactionError>;

    /// Runs a raw code buffer as the code of `params.context.address`.
    ///
    /// # Errors
    ///
    /// Only store failures.
    async fn run_code(&self, params: RunCodeParams) -> Result<ExecutionResult, StateError>;

    /// Gas `tx` would use with the block's whole gas limit available.
    /// Nothing is committed.
    ///
    /// # Errors
    ///
    /// Same validation errors as `run_transaction`, fees aside.
    async fn estimate_gas(
        &self,
        tx: &Transaction,
        block: &BlockContext,
    ) -> Result<u64, TransactionError>;

    /// Executes `tx` and returns its receipt without committing anything.
    ///
    /// # Errors
    ///
    /// Same as `run_transaction`.
    async fn call(&self, tx: &Transaction, block: &BlockContext)
        -> Result<Receipt, TransactionError>;
}
