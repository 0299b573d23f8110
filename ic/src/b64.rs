//! Compact base-64 encoding of offsets and lengths in index files
//!
//! Values are written most significant 6-bit group first using the alphabet
//! `A-Za-z0-9+/`, with leading `A` (zero) groups stripped. Zero encodes as
//! `"A"`. This is not RFC 4648 base64: there is no padding and the groups
//! are aligned on the least significant bit, e.g. 255 encodes as `"D/"`.

use thiserror::Error;

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Number of 6-bit groups needed for a u64
const GROUPS: usize = 64_usize.div_ceil(6);

/// Errors from decoding an encoded value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Empty base64 value")]
    Empty,

    #[error("Illegal character in base64 value: {0:?}")]
    IllegalCharacter(char),

    #[error("Base64 value {0} does not fit in 64 bits")]
    Overflow(String),
}

/// Encode a value
pub fn encode(value: u64) -> String {
    let mut digits = [0u8; GROUPS];
    for (i, digit) in digits.iter_mut().enumerate() {
        let shift = 6 * (GROUPS - 1 - i);
        *digit = ALPHABET[((value >> shift) & 0x3f) as usize];
    }

    let first = digits[..GROUPS - 1]
        .iter()
        .position(|&d| d != ALPHABET[0])
        .unwrap_or(GROUPS - 1);

    digits[first..].iter().map(|&d| d as char).collect()
}

/// Decode a value, least significant character first
pub fn decode(encoded: &str) -> Result<u64, DecodeError> {
    if encoded.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut value = 0u64;
    let mut shift = 0u32;
    for c in encoded.chars().rev() {
        let digit = index_of(c).ok_or(DecodeError::IllegalCharacter(c))?;
        if digit != 0 {
            if shift >= u64::BITS || (u64::from(digit) << shift) >> shift != u64::from(digit) {
                return Err(DecodeError::Overflow(encoded.to_string()));
            }
            value |= u64::from(digit) << shift;
        }
        shift = shift.saturating_add(6);
    }

    Ok(value)
}

fn index_of(c: char) -> Option<u8> {
    match c {
        'A'..='Z' => Some(c as u8 - b'A'),
        'a'..='z' => Some(c as u8 - b'a' + 26),
        '0'..='9' => Some(c as u8 - b'0' + 52),
        '+' => Some(62),
        '/' => Some(63),
        _ => None,
    }
}
