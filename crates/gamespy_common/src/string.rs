//! # String Fields
//!
//! Strings inside binary GameSpy packets are null-terminated byte runs.
//! Titles send ASCII; anything else is decoded lossily rather than refused.

use std::borrow::Cow;

use thiserror::Error;

/// Errors from decoding a string field.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringError {
    /// No null terminator before the end of the buffer.
    #[error("string is not null-terminated")]
    Unterminated,
}

/// Reads a null-terminated string from the start of `bytes`.
///
/// Returns the decoded text and the number of bytes the field occupies on
/// the wire, terminator included. Invalid UTF-8 becomes U+FFFD.
pub fn read_cstring(bytes: &[u8]) -> Result<(Cow<'_, str>, usize), StringError> {
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .ok_or(StringError::Unterminated)?;
    Ok((String::from_utf8_lossy(&bytes[..end]), end + 1))
}
