use courier_crypto::CryptoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Malformed input: {0}")]
    Malformed(String),

    /// The decrypting device has no wrapped key in the consulted map.
    /// Renders exactly like an unwrap failure so callers cannot probe
    /// which devices a message was addressed to.
    #[error("Message key could not be unwrapped")]
    KeyNotFound,

    #[error("Device set inconsistency: {0}")]
    DeviceSetInconsistency(String),

    #[error("Content signature is invalid")]
    ContentSignature,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl ProtoError {
    /// True for every outcome meaning "this party cannot read the message".
    pub fn is_undecryptable(&self) -> bool {
        matches!(
            self,
            ProtoError::KeyNotFound
                | ProtoError::Crypto(CryptoError::KeyUnwrap)
                | ProtoError::Crypto(CryptoError::AeadDecrypt)
        )
    }
}

impl From<base64::DecodeError> for ProtoError {
    fn from(e: base64::DecodeError) -> Self {
        ProtoError::Malformed(format!("invalid base64: {e}"))
    }
}
