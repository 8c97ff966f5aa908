use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Signature verification failed")]
    SignatureVerification,

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch — possible tampering)")]
    AeadDecrypt,

    #[error("Message key could not be unwrapped")]
    KeyUnwrap,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Malformed signed message: {0}")]
    MalformedSignedMessage(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
