//! Precompile 0x02.

use sha2::{Digest, Sha256};

use super::{ensure_gas, words, Precompile, PrecompileOutput};
use crate::domain::services::precompiles;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;

const BASE_GAS: u64 = 60;
const PER_WORD_GAS: u64 = 12;

/// SHA-256 digest of the input's lowercase hex text.
pub struct Sha256Precompile;

impl Precompile for Sha256Precompile {
    fn execute(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        // priced on the raw input, hashed over its hex text
        let cost = BASE_GAS + PER_WORD_GAS * words(input.len());
        ensure_gas(cost, gas_limit)?;
        let digest = Sha256::digest(hex::encode(input));
        Ok(PrecompileOutput {
            output: Bytes::from_slice(&digest),
            gas_used: cost,
        })
    }

    fn address(&self) -> Address {
        precompiles::SHA256
    }
}
