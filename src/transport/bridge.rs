//! Binary/text bridge for audio payloads embedded in transport messages

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::Result;

/// Encode bytes as standard-alphabet base64, padded, no line wrapping
pub fn to_transport_text(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64; fails on foreign characters or bad padding
pub fn from_transport_text(text: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(text)?)
}
