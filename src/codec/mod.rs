//! Byte-order and encoding helpers shared by the wire codecs.
//!
//! DevAddr, DevEUI and AppEUI travel least-significant-byte first on the
//! air while the rest of the crate keeps them most-significant-byte first.
//! All reversal happens here and in the frame parsers; the protocol logic
//! never reorders bytes on its own.

use thiserror::Error;

/// Encoding error for external identifier strings
#[derive(Debug, Error)]
pub enum CodecError {
    /// The string is not valid hexadecimal
    #[error("invalid hex string: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Reverse a byte slice into a new vector
pub fn reverse(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().rev().copied().collect()
}

/// Reverse a 4-byte field between wire and canonical order
pub fn reverse4(bytes: &[u8; 4]) -> [u8; 4] {
    [bytes[3], bytes[2], bytes[1], bytes[0]]
}

/// Reverse an 8-byte field between wire and canonical order
pub fn reverse8(bytes: &[u8; 8]) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (i, b) in bytes.iter().rev().enumerate() {
        out[i] = *b;
    }
    out
}

/// Zero-pad to the next multiple of 16 bytes for AES block operations
pub fn pad16(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    let rem = padded.len() % 16;
    if rem != 0 {
        padded.resize(padded.len() + 16 - rem, 0);
    }
    padded
}

/// Encode binary identifiers for logs and external interfaces
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode a hex string; accepts both upper and lower case
pub fn from_hex(s: &str) -> Result<Vec<u8>, CodecError> {
    Ok(hex::decode(s)?)
}
