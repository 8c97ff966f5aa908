//! Wire codec — binary ciphertexts and wrapped keys travel inside JSON as
//! standard (padded) base64 strings.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::ProtoError;

pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a wire string. Anything that is not valid base64 is `Malformed`.
pub fn decode(s: &str) -> Result<Vec<u8>, ProtoError> {
    Ok(STANDARD.decode(s.trim())?)
}
