//! Precompile 0x04: echoes its input.

use super::{ensure_gas, words, Precompile, PrecompileOutput};
use crate::domain::services::precompiles;
use crate::domain::value_objects::Address;
use crate::errors::PrecompileError;

const BASE_GAS: u64 = 15;
const PER_WORD_GAS: u64 = 3;

/// Data copy.
pub struct Identity;

impl Precompile for Identity {
    fn execute(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        let cost = BASE_GAS + PER_WORD_GAS * words(input.len());
        ensure_gas(cost, gas_limit)?;
        Ok(PrecompileOutput {
            output: input.into(),
            gas_used: cost,
        })
    }

    fn address(&self) -> Address {
        precompiles::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_copies_input() {
        let input = vec![7u8; 33];
        let result = Identity.execute(&input, 100).unwrap();
        assert_eq!(result.output.as_slice(), input.as_slice());
        assert_eq!(result.gas_used, 15 + 3 * 2);
    }

    #[test]
    fn test_identity_empty_input() {
        let result = Identity.execute(&[], 15).unwrap();
        assert!(result.output.is_empty());
        assert_eq!(result.gas_used, 15);
    }

    #[test]
    fn test_identity_out_of_gas() {
        assert!(matches!(
            Identity.execute(b"abc", 17),
            Err(PrecompileError::OutOfGas {
                required: 18,
                available: 17
            })
        ));
    }
}
