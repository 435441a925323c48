//! # Serialization Codec
//!
//! Canonical RLP encoding of the records whose bytes feed hashes and roots.
//!
//! | Record | Layout |
//! |--------|--------|
//! | `Account` | `[nonce, balance, storage_root, code_hash]` |
//! | `Transaction` | `[nonce, gas_price, gas_limit, to, value, data, from]` |
//! | `Log` | `[address, [topics...], data]` |
//!
//! `to` is the empty string for contract creation. Integers are minimal
//! big-endian; the decoder rejects leading zeros, so every logical value has
//! exactly one encoding.

use rlp::{Decodable, DecoderError, Encodable, Rlp, RlpStream};

use crate::domain::entities::{Account, Log, Transaction};
use crate::domain::value_objects::{Address, Bytes, Hash};
use crate::errors::CodecError;

// =============================================================================
// PUBLIC API
// =============================================================================

/// Encodes an account record.
#[must_use]
pub fn encode_account(account: &Account) -> Vec<u8> {
    rlp::encode(account).to_vec()
}

/// Decodes an account record.
///
/// # Errors
///
/// Malformed RLP, a wrong field count or trailing bytes.
pub fn decode_account(bytes: &[u8]) -> Result<Account, CodecError> {
    decode_record(bytes, ACCOUNT_FIELDS)
}

/// Encodes a transaction.
#[must_use]
pub fn encode_transaction(tx: &Transaction) -> Vec<u8> {
    rlp::encode(tx).to_vec()
}

/// Decodes a transaction.
///
/// # Errors
///
/// Malformed RLP, a wrong field count or trailing bytes.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, CodecError> {
    decode_record(bytes, TRANSACTION_FIELDS)
}

const ACCOUNT_FIELDS: usize = 4;
const TRANSACTION_FIELDS: usize = 7;
const LOG_FIELDS: usize = 3;

fn decode_record<T: Decodable>(bytes: &[u8], fields: usize) -> Result<T, CodecError> {
    let rlp = Rlp::new(bytes);
    let total = rlp.payload_info()?.total();
    if total != bytes.len() {
        return Err(CodecError::TrailingBytes(bytes.len() - total));
    }
    let found = rlp.item_count()?;
    if found != fields {
        return Err(CodecError::FieldCount {
            expected: fields,
            found,
        });
    }
    Ok(rlp.as_val()?)
}

fn expect_list(rlp: &Rlp, fields: usize) -> Result<(), DecoderError> {
    if !rlp.is_list() {
        return Err(DecoderError::RlpExpectedToBeList);
    }
    if rlp.item_count()? != fields {
        return Err(DecoderError::RlpIncorrectListLen);
    }
    Ok(())
}

fn fixed<const N: usize>(rlp: &Rlp) -> Result<[u8; N], DecoderError> {
    let bytes = rlp.data()?;
    <[u8; N]>::try_from(bytes).map_err(|_| DecoderError::RlpInvalidLength)
}

// =============================================================================
// PRIMITIVES
// =============================================================================

impl Encodable for Address {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append(&self.0.to_vec());
    }
}

impl Decodable for Address {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        fixed::<20>(rlp).map(Address)
    }
}

impl Encodable for Hash {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append(&self.0.to_vec());
    }
}

impl Decodable for Hash {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        fixed::<32>(rlp).map(Hash)
    }
}

impl Encodable for Bytes {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.append(&self.0);
    }
}

impl Decodable for Bytes {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        rlp.as_val::<Vec<u8>>().map(Bytes)
    }
}

// =============================================================================
// RECORDS
// =============================================================================

impl Encodable for Account {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(ACCOUNT_FIELDS);
        s.append(&self.nonce);
        s.append(&self.balance);
        s.append(&self.storage_root);
        s.append(&self.code_hash);
    }
}

impl Decodable for Account {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, ACCOUNT_FIELDS)?;
        Ok(Self {
            nonce: rlp.val_at(0)?,
            balance: rlp.val_at(1)?,
            storage_root: rlp.val_at(2)?,
            code_hash: rlp.val_at(3)?,
        })
    }
}

impl Encodable for Transaction {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(TRANSACTION_FIELDS);
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        match &self.to {
            Some(to) => s.append(to),
            None => s.append_empty_data(),
        };
        s.append(&self.value);
        s.append(&self.data);
        s.append(&self.from);
    }
}

impl Decodable for Transaction {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, TRANSACTION_FIELDS)?;
        let to_item = rlp.at(3)?;
        let to = if to_item.is_empty() {
            None
        } else {
            Some(to_item.as_val()?)
        };
        Ok(Self {
            nonce: rlp.val_at(0)?,
            gas_price: rlp.val_at(1)?,
            gas_limit: rlp.val_at(2)?,
            to,
            value: rlp.val_at(4)?,
            data: rlp.val_at(5)?,
            from: rlp.val_at(6)?,
        })
    }
}

impl Encodable for Log {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_list(LOG_FIELDS);
        s.append(&self.address);
        s.append_list::<Hash, Hash>(&self.topics);
        s.append(&self.data);
    }
}

impl Decodable for Log {
    fn decode(rlp: &Rlp) -> Result<Self, DecoderError> {
        expect_list(rlp, LOG_FIELDS)?;
        Ok(Self {
            address: rlp.val_at(0)?,
            topics: rlp.list_at(1)?,
            data: rlp.val_at(2)?,
        })
    }
}
