//! Hex encoding used for every binary value that crosses the wire.
//!
//! Values are written with a `0x` prefix, matching the addresses and
//! ciphertexts exchanged with the wallet service. The prefix is optional on
//! input.

const PREFIX: &str = "0x";

/// Encode `bytes` as lowercase hex with a `0x` prefix.
pub fn to_prefixed_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("{PREFIX}{}", hex::encode(bytes))
}

/// Decode a hex string, with or without a `0x` prefix.
pub fn from_prefixed_hex(value: &str) -> Result<Vec<u8>, hex::FromHexError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix(PREFIX)
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex::decode(digits)
}
