//! Properties every processed transaction must satisfy. The service checks
//! them after each transaction and reports violations.

use thiserror::Error;

use crate::domain::entities::{Receipt, Transaction, VmConfig};

/// Gas used never exceeds the gas limit.
#[must_use]
pub fn check_gas_limit_invariant(receipt: &Receipt, tx: &Transaction) -> bool {
    receipt.gas_used <= tx.gas_limit
}

/// The sender's nonce advances by exactly one, whatever the outcome.
#[must_use]
pub fn check_nonce_invariant(tx: &Transaction, receipt: &Receipt) -> bool {
    receipt
        .post_accounts
        .get(&tx.from)
        .is_some_and(|sender| sender.nonce == tx.nonce + 1)
}

/// A failed execution keeps no logs and deploys nothing.
#[must_use]
pub fn check_revert_rollback_invariant(receipt: &Receipt) -> bool {
    receipt.success || (receipt.logs.is_empty() && receipt.contract_address.is_none())
}

/// A frame depth is within the configured limit.
#[must_use]
pub fn check_call_depth_invariant(depth: u16, config: &VmConfig) -> bool {
    depth <= config.max_call_depth
}

/// Runs every receipt-level check.
#[must_use]
pub fn check_receipt_invariants(tx: &Transaction, receipt: &Receipt) -> InvariantCheckResult {
    let found: Vec<InvariantViolation> = [
        (!check_gas_limit_invariant(receipt, tx)).then(|| InvariantViolation::GasLimitExceeded {
            used: receipt.gas_used,
            limit: tx.gas_limit,
        }),
        (!check_nonce_invariant(tx, receipt)).then(|| InvariantViolation::NonceNotAdvanced {
            before: tx.nonce,
            after: receipt.post_accounts.get(&tx.from).map(|a| a.nonce),
        }),
        (!check_revert_rollback_invariant(receipt)).then(|| {
            InvariantViolation::StateNotRolledBack {
                logs: receipt.logs.len(),
            }
        }),
    ]
    .into_iter()
    .flatten()
    .collect();

    if found.is_empty() {
        InvariantCheckResult::Valid
    } else {
        InvariantCheckResult::Invalid(found)
    }
}

/// Verdict of [`check_receipt_invariants`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvariantCheckResult {
    /// Nothing broken.
    Valid,
    /// Every broken property, in check order.
    Invalid(Vec<InvariantViolation>),
}

impl InvariantCheckResult {
    /// True for [`InvariantCheckResult::Valid`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self == Self::Valid
    }
}

/// One broken property of a processed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// Receipt charged more than the transaction bought.
    #[error("gas limit exceeded: used {used} > limit {limit}")]
    GasLimitExceeded {
        /// Charged gas.
        used: u64,
        /// Bought gas.
        limit: u64,
    },
    /// Sender nonce did not move from `before` to `before + 1`.
    #[error("sender nonce not advanced: {before} -> {after:?}")]
    NonceNotAdvanced {
        /// Nonce carried by the transaction.
        before: u64,
        /// Nonce in the receipt's post-state, if the sender is there.
        after: Option<u64>,
    },
    /// Failed execution left logs behind.
    #[error("failed execution kept {logs} logs")]
    StateNotRolledBack {
        /// Logs still attached.
        logs: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Account, Log};
    use crate::domain::value_objects::{Address, Bytes, Hash, U256};
    use std::collections::BTreeMap;

    fn tx() -> Transaction {
        Transaction {
            from: Address::new([1u8; 20]),
            nonce: 3,
            gas_price: U256::one(),
            gas_limit: 50_000,
            to: Some(Address::new([2u8; 20])),
            value: U256::zero(),
            data: Bytes::new(),
        }
    }

    fn receipt(gas_used: u64, sender_nonce: u64) -> Receipt {
        let mut post_accounts = BTreeMap::new();
        post_accounts.insert(Address::new([1u8; 20]), Account::new(U256::zero(), sender_nonce));
        Receipt {
            success: true,
            gas_used,
            output: Bytes::new(),
            logs: Vec::new(),
            contract_address: None,
            post_accounts,
            post_state_root: Hash::ZERO,
            error: None,
        }
    }

    #[test]
    fn test_valid_receipt() {
        assert!(check_receipt_invariants(&tx(), &receipt(21_000, 4)).is_valid());
    }

    #[test]
    fn test_gas_and_nonce_violations() {
        let check = check_receipt_invariants(&tx(), &receipt(60_000, 3));
        match check {
            InvariantCheckResult::Invalid(violations) => {
                assert_eq!(violations.len(), 2);
                assert!(violations[1].to_string().contains("nonce"));
            }
            InvariantCheckResult::Valid => panic!("expected violations"),
        }
    }

    #[test]
    fn test_failed_receipt_with_logs() {
        let mut r = receipt(21_000, 4);
        r.success = false;
        r.logs.push(Log::new(Address::ZERO, Vec::new(), Bytes::new()));
        assert!(!check_revert_rollback_invariant(&r));
    }

    #[test]
    fn test_call_depth_invariant() {
        let config = VmConfig::default();
        assert!(check_call_depth_invariant(1024, &config));
        assert!(!check_call_depth_invariant(1025, &config));
    }
}
