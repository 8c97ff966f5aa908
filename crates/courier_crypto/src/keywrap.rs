//! Asymmetric key wrap — seal a one-time symmetric key to a device.
//!
//! Anonymous ECIES over X25519:
//!   EK       = fresh ephemeral X25519 secret (one per wrap)
//!   DH       = X25519(EK, device_pub)
//!   KEK      = HKDF-SHA256(salt = EK_pub || device_pub, ikm = DH, info = "courier-key-wrap-v1")
//!   sealed   = XChaCha20-Poly1305(KEK, [alg tag | key bytes], aad = EK_pub || device_pub)
//!
//! Wire format:
//!   [ EK_pub (32 bytes) | nonce (24 bytes) | ciphertext + tag ]
//!
//! Wraps are independent: a new ephemeral key per device means no two
//! wrapped copies share a KEK even though they carry the same key.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroizing;

use crate::{
    aead::{self, SymmetricAlgorithm, SymmetricKey},
    error::CryptoError,
    identity::{ExchangeKeyPair, PublicKeyBytes},
    kdf,
};

const WRAP_INFO: &[u8] = b"courier-key-wrap-v1";
const KEK_ALGORITHM: SymmetricAlgorithm = SymmetricAlgorithm::XChaCha20Poly1305;

/// Smallest valid wrapped key: EK_pub + nonce + tag + alg tag + a 16-byte key.
const MIN_WRAPPED_LEN: usize = 32 + 24 + 16 + 1 + 16;

/// Wrap `key` so only the holder of `device_pub`'s secret can recover it.
pub fn wrap(key: &SymmetricKey, device_pub: &PublicKeyBytes) -> Result<Vec<u8>, CryptoError> {
    let recipient = X25519Public::from(device_pub.0);

    let ek = StaticSecret::random_from_rng(OsRng);
    let ek_pub = X25519Public::from(&ek);

    let dh = ek.diffie_hellman(&recipient);
    if !dh.was_contributory() {
        return Err(CryptoError::InvalidKey("device exchange key is a low-order point".into()));
    }

    let context = wrap_context(ek_pub.as_bytes(), &device_pub.0);
    let kek = kdf::derive_wrap_key(dh.as_bytes(), &context, WRAP_INFO)?;

    let mut plaintext = Zeroizing::new(Vec::with_capacity(1 + key.as_bytes().len()));
    plaintext.push(key.algorithm().tag());
    plaintext.extend_from_slice(key.as_bytes());

    let sealed = aead::seal(KEK_ALGORITHM, &kek[..], &plaintext, &context)?;

    let mut out = Vec::with_capacity(32 + sealed.len());
    out.extend_from_slice(ek_pub.as_bytes());
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Recover a wrapped key with the device's exchange key pair.
pub fn unwrap(wrapped: &[u8], device: &ExchangeKeyPair) -> Result<SymmetricKey, CryptoError> {
    if wrapped.len() < MIN_WRAPPED_LEN {
        return Err(CryptoError::KeyUnwrap);
    }
    let (ek_pub_bytes, sealed) = wrapped.split_at(32);
    let ek_pub_arr: [u8; 32] = ek_pub_bytes
        .try_into()
        .map_err(|_| CryptoError::KeyUnwrap)?;
    let ek_pub = X25519Public::from(ek_pub_arr);

    let dh = device.static_secret().diffie_hellman(&ek_pub);
    if !dh.was_contributory() {
        return Err(CryptoError::KeyUnwrap);
    }

    let context = wrap_context(&ek_pub_arr, &device.public.0);
    let kek = kdf::derive_wrap_key(dh.as_bytes(), &context, WRAP_INFO)?;

    let plaintext = aead::open(KEK_ALGORITHM, &kek[..], sealed, &context)
        .map_err(|_| CryptoError::KeyUnwrap)?;

    let (tag, key_bytes) = plaintext.split_first().ok_or(CryptoError::KeyUnwrap)?;
    let algorithm = SymmetricAlgorithm::from_tag(*tag)?;
    SymmetricKey::from_bytes(algorithm, key_bytes)
}

fn wrap_context(ek_pub: &[u8; 32], device_pub: &[u8; 32]) -> [u8; 64] {
    let mut ctx = [0u8; 64];
    ctx[..32].copy_from_slice(ek_pub);
    ctx[32..].copy_from_slice(device_pub);
    ctx
}
