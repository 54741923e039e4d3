//! # Event ABI Codec
//!
//! Strict decoding of the 32-byte word layout used by contract event data.
//! Only the shapes the extension events need are supported: `address`,
//! `bool` and a tuple of dynamic `string`s.

use shared_types::Address;
use thiserror::Error;

/// ABI word size in bytes.
pub const WORD: usize = 32;

/// ABI decoding failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    /// Data ended before the requested word.
    #[error("data too short: need {needed} bytes, have {available}")]
    ShortData {
        /// Bytes required
        needed: usize,
        /// Bytes present
        available: usize,
    },

    /// Padding bytes that must be zero were not.
    #[error("non-zero padding in {0} word")]
    DirtyPadding(&'static str),

    /// A bool word held something other than 0 or 1.
    #[error("invalid bool value {0}")]
    InvalidBool(u8),

    /// A dynamic offset or length does not fit the data.
    #[error("dynamic value out of bounds: offset {offset}, length {length}")]
    OutOfBounds {
        /// Byte offset of the value
        offset: usize,
        /// Declared byte length
        length: usize,
    },

    /// String bytes were not UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

fn word(data: &[u8], index: usize) -> Result<&[u8], AbiError> {
    let end = index
        .checked_mul(WORD)
        .and_then(|start| start.checked_add(WORD))
        .ok_or(AbiError::OutOfBounds {
            offset: index.saturating_mul(WORD),
            length: WORD,
        })?;
    data.get(end - WORD..end).ok_or(AbiError::ShortData {
        needed: end,
        available: data.len(),
    })
}

/// Reads a word as a `usize`, rejecting values that do not fit.
fn word_as_usize(raw: &[u8], what: &'static str) -> Result<usize, AbiError> {
    let (high, low) = raw.split_at(WORD - 8);
    if high.iter().any(|b| *b != 0) {
        return Err(AbiError::DirtyPadding(what));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(low);
    usize::try_from(u64::from_be_bytes(bytes)).map_err(|_| AbiError::DirtyPadding(what))
}

/// Encodes an address as a left-padded word.
#[must_use]
pub fn encode_address(address: &Address) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[12..].copy_from_slice(address.as_bytes());
    out
}

/// Decodes the address held in word `index`.
pub fn decode_address(data: &[u8], index: usize) -> Result<Address, AbiError> {
    let raw = word(data, index)?;
    if raw[..12].iter().any(|b| *b != 0) {
        return Err(AbiError::DirtyPadding("address"));
    }
    Address::from_slice(&raw[12..]).ok_or(AbiError::DirtyPadding("address"))
}

/// Encodes a bool as a word holding 0 or 1.
#[must_use]
pub fn encode_bool(value: bool) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[WORD - 1] = u8::from(value);
    out
}

/// Decodes the bool held in word `index`.
pub fn decode_bool(data: &[u8], index: usize) -> Result<bool, AbiError> {
    let raw = word(data, index)?;
    if raw[..WORD - 1].iter().any(|b| *b != 0) {
        return Err(AbiError::DirtyPadding("bool"));
    }
    match raw[WORD - 1] {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(AbiError::InvalidBool(other)),
    }
}

/// Encodes a tuple of strings (head of offsets, then length-prefixed tails).
#[must_use]
pub fn encode_strings(values: &[&str]) -> Vec<u8> {
    let mut head = Vec::with_capacity(values.len() * WORD);
    let mut tail = Vec::new();

    for value in values {
        let offset = values.len() * WORD + tail.len();
        head.extend_from_slice(&usize_word(offset));
        tail.extend_from_slice(&usize_word(value.len()));
        tail.extend_from_slice(value.as_bytes());
        let padding = (WORD - value.len() % WORD) % WORD;
        tail.extend(std::iter::repeat(0u8).take(padding));
    }

    head.extend_from_slice(&tail);
    head
}

fn usize_word(value: usize) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[WORD - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    out
}

/// Decodes the string whose offset is held in head word `index`.
pub fn decode_string(data: &[u8], index: usize) -> Result<String, AbiError> {
    let offset = word_as_usize(word(data, index)?, "string offset")?;
    if offset % WORD != 0 {
        return Err(AbiError::OutOfBounds { offset, length: 0 });
    }
    let length = word_as_usize(word(data, offset / WORD)?, "string length")?;

    let bytes = offset
        .checked_add(WORD)
        .and_then(|start| start.checked_add(length).map(|end| (start, end)))
        .and_then(|(start, end)| data.get(start..end))
        .ok_or(AbiError::OutOfBounds { offset, length })?;

    String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
}
