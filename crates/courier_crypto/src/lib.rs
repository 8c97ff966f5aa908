//! courier_crypto — primitives behind Courier's signed envelopes and
//! multi-device message encryption
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Everything signed or encrypted is canonically encoded first.
//!
//! # Module layout
//! - `canonical` — deterministic JSON encoding
//! - `signed`    — signed-message envelope (author + Ed25519 signature)
//! - `identity`  — per-device Ed25519 signing and X25519 exchange key pairs
//! - `aead`      — AES-GCM / XChaCha20-Poly1305 one-time content keys
//! - `keywrap`   — X25519 + HKDF + AEAD sealing of a content key to a device
//! - `kdf`       — HKDF-SHA256
//! - `error`     — unified error type

pub mod aead;
pub mod canonical;
pub mod error;
pub mod identity;
pub mod kdf;
pub mod keywrap;
pub mod signed;

pub use aead::{SymmetricAlgorithm, SymmetricKey};
pub use error::CryptoError;
pub use identity::{ExchangeKeyPair, PublicKeyBytes, SigningKeyPair};
pub use signed::SignedMessage;
