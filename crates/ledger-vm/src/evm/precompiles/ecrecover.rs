//! # ECRECOVER Precompile (0x01)
//!
//! Recovers the secp256k1 public key that produced a signature over a
//! 32-byte digest.
//!
//! Input, right-padded with zeros to 128 bytes:
//!
//! | Bytes | Field |
//! |-------|-------|
//! | `0..32` | message digest |
//! | `32..64` | `v`, 27 or 28 |
//! | `64..96` | `r` |
//! | `96..128` | `s` |
//!
//! Output is the 65-byte uncompressed SEC1 key (`0x04 ++ x ++ y`). Any
//! malformed input produces empty output; the call itself still succeeds
//! and is charged the full cost.

use super::{ensure_gas, Precompile, PrecompileOutput};
use crate::domain::services::precompiles;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

/// Gas cost of one recovery.
const ECRECOVER_COST: u64 = 3000;

const INPUT_LEN: usize = 128;

/// Public key recovery.
pub struct Ecrecover;

impl Precompile for Ecrecover {
    fn execute(&self, input: &[u8], gas_limit: u64) -> Result<PrecompileOutput, PrecompileError> {
        ensure_gas(ECRECOVER_COST, gas_limit)?;

        let mut padded = [0u8; INPUT_LEN];
        let len = input.len().min(INPUT_LEN);
        padded[..len].copy_from_slice(&input[..len]);

        let output = recover(&padded).map(Bytes::from).unwrap_or_default();

        Ok(PrecompileOutput {
            gas_used: ECRECOVER_COST,
            output,
        })
    }

    fn address(&self) -> Address {
        precompiles::ECRECOVER
    }
}

fn recover(input: &[u8; INPUT_LEN]) -> Option<Vec<u8>> {
    let digest = &input[..32];

    // v occupies a full word; only its last byte may be set
    if input[32..63].iter().any(|&b| b != 0) {
        return None;
    }
    let recovery_id = match input[63] {
        27 => RecoveryId::new(false, false),
        28 => RecoveryId::new(true, false),
        _ => return None,
    };

    let signature = Signature::from_slice(&input[64..128]).ok()?;

    // k256 only verifies low-s signatures; the mirrored signature recovers
    // the same key with the opposite y parity.
    let (signature, recovery_id) = match signature.normalize_s() {
        Some(normalized) => (
            normalized,
            RecoveryId::new(!recovery_id.is_y_odd(), recovery_id.is_x_reduced()),
        ),
        None => (signature, recovery_id),
    };

    let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery_id).ok()?;
    Some(key.to_encoded_point(false).as_bytes().to_vec())
}
