//! Authenticated Encryption with Associated Data
//!
//! Message content is encrypted once under a fresh one-time key, so the
//! algorithm is carried alongside the key rather than negotiated per call.
//!
//! | Algorithm            | Key      | Nonce    | Tag      |
//! |----------------------|----------|----------|----------|
//! | AES-128-GCM          | 16 bytes | 12 bytes | 16 bytes |
//! | AES-256-GCM          | 32 bytes | 12 bytes | 16 bytes |
//! | XChaCha20-Poly1305   | 32 bytes | 24 bytes | 16 bytes |
//!
//! Ciphertext wire format:
//!   [ nonce | ciphertext + tag ]

use std::fmt;

use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, Nonce, OsRng as AeadOsRng, Payload},
    XChaCha20Poly1305,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

const TAG_LEN: usize = 16;

// ── Algorithm ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SymmetricAlgorithm {
    #[serde(rename = "aes-128-gcm")]
    Aes128Gcm,
    #[default]
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
}

impl SymmetricAlgorithm {
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm | Self::XChaCha20Poly1305 => 32,
        }
    }

    pub fn nonce_len(self) -> usize {
        match self {
            Self::Aes128Gcm | Self::Aes256Gcm => 12,
            Self::XChaCha20Poly1305 => 24,
        }
    }

    /// One-byte identifier used inside wrapped keys.
    pub fn tag(self) -> u8 {
        match self {
            Self::Aes128Gcm => 1,
            Self::Aes256Gcm => 2,
            Self::XChaCha20Poly1305 => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self, CryptoError> {
        match tag {
            1 => Ok(Self::Aes128Gcm),
            2 => Ok(Self::Aes256Gcm),
            3 => Ok(Self::XChaCha20Poly1305),
            other => Err(CryptoError::InvalidKey(format!(
                "unknown symmetric algorithm tag {other}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aes128Gcm => "aes-128-gcm",
            Self::Aes256Gcm => "aes-256-gcm",
            Self::XChaCha20Poly1305 => "xchacha20-poly1305",
        }
    }
}

impl fmt::Display for SymmetricAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SymmetricAlgorithm {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aes-128-gcm" => Ok(Self::Aes128Gcm),
            "aes-256-gcm" => Ok(Self::Aes256Gcm),
            "xchacha20-poly1305" => Ok(Self::XChaCha20Poly1305),
            other => Err(CryptoError::InvalidKey(format!(
                "unsupported symmetric algorithm: {other}"
            ))),
        }
    }
}

// ── One-time key ──────────────────────────────────────────────────────────────

/// Symmetric key bound to its algorithm. Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct SymmetricKey {
    #[zeroize(skip)]
    algorithm: SymmetricAlgorithm,
    bytes: Vec<u8>,
}

impl SymmetricKey {
    pub fn from_bytes(algorithm: SymmetricAlgorithm, bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != algorithm.key_len() {
            return Err(CryptoError::InvalidKey(format!(
                "{algorithm} key must be {} bytes, got {}",
                algorithm.key_len(),
                bytes.len()
            )));
        }
        Ok(Self { algorithm, bytes: bytes.to_vec() })
    }

    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("algorithm", &self.algorithm)
            .field("bytes", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh random key for `algorithm`.
pub fn generate_key(algorithm: SymmetricAlgorithm) -> SymmetricKey {
    let mut bytes = vec![0u8; algorithm.key_len()];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    SymmetricKey { algorithm, bytes }
}

// ── Encrypt / decrypt ─────────────────────────────────────────────────────────

/// Encrypt `plaintext` under `key`, prepending a random nonce.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    seal(key.algorithm, &key.bytes, plaintext, &[])
}

/// Decrypt wire-format bytes (nonce || ciphertext+tag) with the key's own algorithm.
pub fn decrypt(key: &SymmetricKey, data: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    open(key.algorithm, &key.bytes, data, &[])
}

/// Decrypt, insisting that `key` belongs to `algorithm`.
pub fn decrypt_with(
    algorithm: SymmetricAlgorithm,
    key: &SymmetricKey,
    data: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if key.algorithm != algorithm {
        return Err(CryptoError::InvalidKey(format!(
            "expected a {algorithm} key, got {}",
            key.algorithm
        )));
    }
    decrypt(key, data)
}

/// Encrypt with raw key bytes and associated data.
/// `aad` — authenticated but not encrypted.
pub fn seal(
    algorithm: SymmetricAlgorithm,
    key: &[u8],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    match algorithm {
        SymmetricAlgorithm::Aes128Gcm => seal_with::<Aes128Gcm>(key, plaintext, aad),
        SymmetricAlgorithm::Aes256Gcm => seal_with::<Aes256Gcm>(key, plaintext, aad),
        SymmetricAlgorithm::XChaCha20Poly1305 => {
            seal_with::<XChaCha20Poly1305>(key, plaintext, aad)
        }
    }
}

/// Decrypt wire-format bytes with raw key bytes and associated data.
pub fn open(
    algorithm: SymmetricAlgorithm,
    key: &[u8],
    data: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let nonce_len = algorithm.nonce_len();
    if data.len() < nonce_len + TAG_LEN {
        return Err(CryptoError::AeadDecrypt);
    }
    match algorithm {
        SymmetricAlgorithm::Aes128Gcm => open_with::<Aes128Gcm>(key, nonce_len, data, aad),
        SymmetricAlgorithm::Aes256Gcm => open_with::<Aes256Gcm>(key, nonce_len, data, aad),
        SymmetricAlgorithm::XChaCha20Poly1305 => {
            open_with::<XChaCha20Poly1305>(key, nonce_len, data, aad)
        }
    }
}

fn seal_with<C>(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;

    let nonce = C::generate_nonce(&mut AeadOsRng);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    // Prepend nonce
    let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open_with<C>(
    key: &[u8],
    nonce_len: usize,
    data: &[u8],
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError>
where
    C: Aead + AeadCore + KeyInit,
{
    let (nonce_bytes, ct) = data.split_at(nonce_len);
    let nonce = Nonce::<C>::from_slice(nonce_bytes);

    let cipher = C::new_from_slice(key).map_err(|_| CryptoError::AeadDecrypt)?;

    let plaintext = cipher
        .decrypt(nonce, Payload { msg: ct, aad })
        .map_err(|_| CryptoError::AeadDecrypt)?;

    Ok(Zeroizing::new(plaintext))
}
