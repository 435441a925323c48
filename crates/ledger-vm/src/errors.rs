//! Frame-local execution errors, transaction validation errors, and the
//! errors raised by the state store, precompiles and codec.

use thiserror::Error;

use crate::domain::value_objects::{Address, Bytes, Hash, U256};

/// Errors that end one call frame.
///
/// Apart from the halting variants (see [`VmError::is_halting`]) these never
/// escape the frame that raised them: the call dispatcher turns them into a
/// zero on the parent's stack.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VmError {
    /// A charge exceeded the frame's remaining gas.
    #[error("out of gas")]
    OutOfGas,

    /// Push onto a full stack.
    #[error("stack limit reached")]
    StackOverflow,

    /// An instruction needed more operands than the stack holds.
    #[error("not enough stack operands")]
    StackUnderflow,

    /// Byte with no defined instruction.
    #[error("undefined opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    /// Jump target is not a JUMPDEST.
    #[error("jump to {0} does not land on JUMPDEST")]
    InvalidJump(usize),

    /// Frame would nest deeper than allowed.
    #[error("call depth {depth} over limit {max}")]
    CallDepthExceeded {
        /// Depth the frame would have run at.
        depth: u16,
        /// Deepest depth allowed.
        max: u16,
    },

    /// Caller cannot cover the value it tries to move.
    #[error("balance {available} cannot cover {required}")]
    InsufficientBalance {
        /// Value to move.
        required: U256,
        /// Caller's balance.
        available: U256,
    },

    /// Precompiled contract failed.
    #[error("precompile failure: {0}")]
    PrecompileFailure(PrecompileError),

    /// Explicit REVERT, carrying its output bytes.
    #[error("execution reverted ({} bytes of output)", .0.len())]
    Revert(Bytes),

    /// State-modifying instruction under STATICCALL.
    #[error("state write under STATICCALL")]
    WriteInStaticContext,

    /// Memory expansion beyond the configured limit.
    #[error("memory of {requested} bytes over limit {max}")]
    MemoryLimitExceeded {
        /// End of the requested range, saturated.
        requested: u64,
        /// Configured memory limit in bytes.
        max: u64,
    },

    /// RETURNDATACOPY reading past the buffer.
    #[error("return data read [{offset}, +{size}) past {available} bytes")]
    ReturnDataOutOfBounds {
        /// First byte read.
        offset: u64,
        /// Bytes read.
        size: u64,
        /// Length of the return data buffer.
        available: usize,
    },

    /// Deployed code larger than allowed.
    #[error("deployed code of {size} bytes over limit {max}")]
    CodeSizeExceeded {
        /// Length of the returned code.
        size: usize,
        /// Configured code size limit.
        max: usize,
    },

    /// Init code larger than allowed.
    #[error("init code of {size} bytes over limit {max}")]
    InitCodeSizeExceeded {
        /// Length of the init code.
        size: usize,
        /// Configured init code size limit.
        max: usize,
    },

    /// Deployed code starts with 0xEF.
    #[error("code starts with reserved 0xEF byte")]
    InvalidCodePrefix,

    /// Creation target already has code or a nonce.
    #[error("creation target {0} already in use")]
    ContractAlreadyExists(Address),

    /// Wall-clock deadline or step limit exceeded.
    #[error("execution timeout after {steps} steps")]
    Timeout {
        /// Instructions executed before the guard tripped.
        steps: u64,
    },

    /// Aborted from outside through a cancellation handle.
    #[error("execution cancelled")]
    Cancelled,

    /// The state store failed.
    #[error("state store: {0}")]
    StateError(#[from] StateError),
}

impl VmError {
    /// True for REVERT, whose frame keeps its unused gas.
    #[must_use]
    pub fn is_revert(&self) -> bool {
        matches!(self, Self::Revert(_))
    }

    /// Everything except REVERT burns the frame's gas.
    #[must_use]
    pub fn consumes_all_gas(&self) -> bool {
        !self.is_revert()
    }

    /// Errors that abort every frame up to the transaction boundary instead
    /// of turning into a failed call.
    #[must_use]
    pub fn is_halting(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Cancelled | Self::StateError(_)
        )
    }

    /// Output carried through the failure channel.
    #[must_use]
    pub fn revert_output(&self) -> Option<&Bytes> {
        match self {
            Self::Revert(output) => Some(output),
            _ => None,
        }
    }
}

impl From<PrecompileError> for VmError {
    fn from(failure: PrecompileError) -> Self {
        VmError::PrecompileFailure(failure)
    }
}

/// Reasons a transaction is rejected before any state is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Transaction nonce differs from the sender's.
    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce {
        /// Sender's account nonce.
        expected: u64,
        /// Nonce carried by the transaction.
        got: u64,
    },

    /// Sender cannot cover `gas_limit * gas_price + value`.
    #[error("sender balance {available} below up-front cost {required}")]
    InsufficientBalance {
        /// `gas_limit * gas_price + value`.
        required: U256,
        /// Sender's balance.
        available: U256,
    },

    /// Gas limit below the intrinsic cost.
    #[error("intrinsic gas too low: need {intrinsic}, limit {limit}")]
    IntrinsicGasTooLow {
        /// Intrinsic cost of the transaction.
        intrinsic: u64,
        /// Transaction gas limit.
        limit: u64,
    },

    /// Gas limit above the block's.
    #[error("gas limit {limit} exceeds block gas limit {block_limit}")]
    GasLimitExceedsBlock {
        /// Transaction gas limit.
        limit: u64,
        /// Gas limit of the block.
        block_limit: u64,
    },

    /// The state store failed.
    #[error("state store: {0}")]
    State(#[from] StateError),
}

/// Errors from the account state store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Code hash with no stored code.
    #[error("code not found for hash {0}")]
    CodeNotFound(Hash),

    /// Checkpoint released out of order or twice.
    #[error("checkpoint {got} is not the innermost open checkpoint ({expected:?})")]
    CheckpointMismatch {
        /// Innermost open checkpoint, if any.
        expected: Option<u64>,
        /// Checkpoint that was released.
        got: u64,
    },

    /// Stored data failed a consistency check.
    #[error("state store corrupted")]
    Corrupted,

    /// Store backend is unreachable.
    #[error("state store unavailable")]
    Unavailable,

    /// Backend-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Failures of a precompiled contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrecompileError {
    /// Gas below the contract's cost for this input.
    #[error("precompile out of gas: need {required}, have {available}")]
    OutOfGas {
        /// Cost of the call.
        required: u64,
        /// Gas supplied.
        available: u64,
    },

    /// No precompile at this address.
    #[error("no precompile at {0}")]
    NotFound(Address),
}

/// Errors from the canonical byte codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Malformed RLP.
    #[error("rlp: {0}")]
    Rlp(String),

    /// List with the wrong number of items.
    #[error("expected {expected} fields, found {found}")]
    FieldCount {
        /// Fields the type has.
        expected: usize,
        /// Items in the list.
        found: usize,
    },

    /// Bytes left over after the encoded item.
    #[error("{0} trailing bytes after item")]
    TrailingBytes(usize),
}

impl From<rlp::DecoderError> for CodecError {
    fn from(err: rlp::DecoderError) -> Self {
        CodecError::Rlp(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_error_messages() {
        assert_eq!(VmError::OutOfGas.to_string(), "out of gas");
        assert_eq!(VmError::InvalidOpcode(0xfe).to_string(), "undefined opcode 0xfe");
        let too_deep = VmError::CallDepthExceeded {
            depth: 1025,
            max: 1024,
        };
        assert_eq!(too_deep.to_string(), "call depth 1025 over limit 1024");
    }

    #[test]
    fn test_revert_keeps_gas_and_output() {
        let err = VmError::Revert(Bytes::from(vec![1, 2, 3]));
        assert!(!err.consumes_all_gas());
        assert_eq!(err.revert_output().map(Bytes::len), Some(3));

        assert!(VmError::OutOfGas.consumes_all_gas());
        assert!(VmError::InvalidOpcode(0xFF).consumes_all_gas());
        assert!(VmError::OutOfGas.revert_output().is_none());
    }

    #[test]
    fn test_halting_errors() {
        assert!(VmError::Cancelled.is_halting());
        assert!(VmError::Timeout { steps: 10 }.is_halting());
        assert!(VmError::from(StateError::Unavailable).is_halting());
        assert!(!VmError::OutOfGas.is_halting());
        assert!(!VmError::Revert(Bytes::new()).is_halting());
    }

    #[test]
    fn test_precompile_error_conversion() {
        let err: VmError = PrecompileError::OutOfGas {
            required: 60,
            available: 9,
        }
        .into();
        assert!(matches!(err, VmError::PrecompileFailure(_)));
        assert!(err.consumes_all_gas());
    }
}
