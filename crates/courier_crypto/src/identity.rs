//! Device key material
//!
//! Every *device* registered under an identity owns two key pairs:
//!   - a `SigningKeyPair` (Ed25519) that authors signed messages, and
//!   - an `ExchangeKeyPair` (X25519) that wrapped message keys are sealed to.
//!
//! Public halves travel base64url-encoded (no padding). The base64url
//! Ed25519 verifying key doubles as the `author` of a signed message.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

// ── Newtype wrappers ──────────────────────────────────────────────────────────

/// 32-byte public key, base64url-encoded on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKeyBytes(pub [u8; 32]);

impl PublicKeyBytes {
    pub fn to_b64(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0)
    }

    pub fn from_b64(s: &str) -> Result<Self, CryptoError> {
        let bytes = URL_SAFE_NO_PAD.decode(s)?;
        Self::from_slice(&bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Public key must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Human-readable fingerprint: BLAKE3 of the public key, truncated to
    /// 20 bytes, hex-encoded in groups of 4 for display.
    ///
    /// Example: "a1b2 c3d4 e5f6 7890 abcd ef01 2345 6789 0abc def0"
    pub fn fingerprint(&self) -> String {
        let hash = blake3::hash(&self.0);
        let hex = hex::encode(&hash.as_bytes()[..20]);
        hex.chars()
            .collect::<Vec<_>>()
            .chunks(4)
            .map(|c| c.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl TryFrom<String> for PublicKeyBytes {
    type Error = CryptoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_b64(&value)
    }
}

impl From<PublicKeyBytes> for String {
    fn from(value: PublicKeyBytes) -> Self {
        value.to_b64()
    }
}

// ── Signing keypair ───────────────────────────────────────────────────────────

/// Ed25519 signing key.  Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)]
    pub public: PublicKeyBytes,
    secret_bytes: [u8; 32],
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public = PublicKeyBytes(signing_key.verifying_key().to_bytes());
        Self { public, secret_bytes: signing_key.to_bytes() }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Signing key must be 32 bytes, got {}", bytes.len()))
        })?;
        let signing_key = SigningKey::from_bytes(&arr);
        let public = PublicKeyBytes(signing_key.verifying_key().to_bytes());
        Ok(Self { public, secret_bytes: arr })
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    /// Sign arbitrary bytes; returns 64-byte raw Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        SigningKey::from_bytes(&self.secret_bytes).sign(msg).to_bytes().to_vec()
    }

    /// The `author` string carried by every message this key signs.
    pub fn author(&self) -> String {
        self.public.to_b64()
    }
}

/// Verify a detached Ed25519 signature made by `public_bytes`.
///
/// Malformed key or signature bytes are `InvalidKey`; a well-formed
/// signature that does not match is `SignatureVerification`.
pub fn verify_detached(
    public_bytes: &[u8],
    msg: &[u8],
    sig_bytes: &[u8],
) -> Result<(), CryptoError> {
    let vk = VerifyingKey::from_bytes(
        public_bytes.try_into().map_err(|_| CryptoError::InvalidKey("Bad pubkey len".into()))?,
    )
    .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let sig = Signature::from_bytes(
        sig_bytes.try_into().map_err(|_| CryptoError::InvalidKey("Bad sig len".into()))?,
    );
    vk.verify(msg, &sig).map_err(|_| CryptoError::SignatureVerification)
}

// ── Exchange keypair ──────────────────────────────────────────────────────────

/// X25519 key pair that wrapped message keys are sealed to.
#[derive(ZeroizeOnDrop)]
pub struct ExchangeKeyPair {
    #[zeroize(skip)]
    pub public: PublicKeyBytes,
    secret_bytes: [u8; 32],
}

impl ExchangeKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKeyBytes(X25519Public::from(&secret).to_bytes());
        Self { public, secret_bytes: secret.to_bytes() }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Exchange key must be 32 bytes, got {}", bytes.len()))
        })?;
        let secret = StaticSecret::from(arr);
        let public = PublicKeyBytes(X25519Public::from(&secret).to_bytes());
        Ok(Self { public, secret_bytes: secret.to_bytes() })
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    pub(crate) fn static_secret(&self) -> StaticSecret {
        StaticSecret::from(self.secret_bytes)
    }
}
