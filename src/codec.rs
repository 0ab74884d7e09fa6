//! Base-62 short code scheme.
//!
//! Primary keys are rendered as base-62 numerals over `[0-9A-Za-z]`,
//! most-significant digit first. Uniqueness comes from the key source;
//! this module only guarantees that distinct positive keys map to
//! distinct codes.

use thiserror::Error;

/// Number of symbols in the alphabet.
pub const BASE: i64 = 62;

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("short code is empty")]
    Empty,
    #[error("invalid character {0:?} in short code")]
    InvalidCharacter(char),
    #[error("short code does not fit in a 64-bit key")]
    Overflow,
}

/// Returns the symbol for a single digit value, or `None` outside `0..62`.
pub fn digit(value: i64) -> Option<char> {
    usize::try_from(value)
        .ok()
        .and_then(|i| ALPHABET.get(i))
        .map(|b| *b as char)
}

/// Returns the digit value of a single symbol, or `None` if it is not in
/// the alphabet.
pub fn digit_value(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        'A'..='Z' => Some(c as u8 - b'A' + 10),
        'a'..='z' => Some(c as u8 - b'a' + 36),
        _ => None,
    }
}

/// Encode a primary key as a short code.
///
/// Zero and negative keys all encode to `"0"`.
pub fn encode(mut n: i64) -> String {
    if n <= 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while n > 0 {
        out.push(ALPHABET[(n % BASE) as usize]);
        n /= BASE;
    }
    out.reverse();

    // The alphabet is pure ASCII.
    out.into_iter().map(char::from).collect()
}

/// Decode a short code produced by [`encode`].
///
/// This is lenient: characters outside the alphabet count as the digit
/// zero and overflow wraps. Use [`try_decode`] for untrusted input.
pub fn decode(s: &str) -> i64 {
    s.chars().fold(0i64, |acc, c| {
        let value = digit_value(c).unwrap_or(0) as i64;
        acc.wrapping_mul(BASE).wrapping_add(value)
    })
}

/// Strict counterpart of [`decode`].
pub fn try_decode(s: &str) -> Result<i64, CodecError> {
    if s.is_empty() {
        return Err(CodecError::Empty);
    }

    s.chars().try_fold(0i64, |acc, c| {
        let value = digit_value(c).ok_or(CodecError::InvalidCharacter(c))? as i64;
        acc.checked_mul(BASE)
            .and_then(|v| v.checked_add(value))
            .ok_or(CodecError::Overflow)
    })
}

/// True if `id` is non-empty and made only of `[0-9A-Za-z]`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
