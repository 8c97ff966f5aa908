//! Key derivation functions
//!
//! `hkdf_expand` — HKDF-SHA256, used to turn an X25519 shared secret into
//!   the key-encryption key for a single wrapped key.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
///
/// `salt` may be `None` (HKDF will use a zeroed salt).
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derive a 32-byte key-encryption key from a DH output.
pub fn derive_wrap_key(
    dh_output: &[u8],
    salt: &[u8],
    info: &[u8],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut key = Zeroizing::new([0u8; 32]);
    hkdf_expand(dh_output, Some(salt), info, &mut key[..])?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expansion_is_deterministic_and_context_bound() {
        let a = derive_wrap_key(&[1u8; 32], b"salt", b"info-a").unwrap();
        let b = derive_wrap_key(&[1u8; 32], b"salt", b"info-a").unwrap();
        let c = derive_wrap_key(&[1u8; 32], b"salt", b"info-b").unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn oversized_output_is_rejected() {
        let mut out = vec![0u8; 255 * 32 + 1];
        assert!(hkdf_expand(b"ikm", None, b"info", &mut out).is_err());
    }
}
