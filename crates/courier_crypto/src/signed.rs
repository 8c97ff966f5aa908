//! Signed messages
//!
//! A signed message is a JSON object: the payload's own fields, plus
//!   - `author`    — base64url Ed25519 verifying key of the signer
//!   - `signature` — base64url Ed25519 signature
//!
//! The signature covers the canonical encoding of every field except
//! `signature` itself (so `author` is bound too).
//!
//! Verification distinguishes two outcomes:
//!   - input that is not a structurally valid signed message → `Err(MalformedSignedMessage)`
//!   - a well-formed message whose signature does not match   → `Ok(false)`

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    canonical::canonicalize_value,
    error::CryptoError,
    identity::{verify_detached, PublicKeyBytes, SigningKeyPair},
};

pub const AUTHOR_FIELD: &str = "author";
pub const SIGNATURE_FIELD: &str = "signature";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage<T> {
    #[serde(flatten)]
    payload: T,
    author: String,
    signature: String,
}

impl<T: Serialize> SignedMessage<T> {
    /// Sign `payload`. The payload must serialise to a JSON object that
    /// does not already use the `author` or `signature` field names.
    pub fn sign(signer: &SigningKeyPair, payload: T) -> Result<Self, CryptoError> {
        let author = signer.author();
        let bytes = signing_bytes(&payload, &author)?;
        let sig = signer.sign(&bytes);
        Ok(Self {
            payload,
            author,
            signature: URL_SAFE_NO_PAD.encode(sig),
        })
    }

    pub fn verify(&self) -> Result<bool, CryptoError> {
        let value = serde_json::to_value(self)?;
        verify_value(&value)
    }

    pub fn to_value(&self) -> Result<Value, CryptoError> {
        Ok(serde_json::to_value(self)?)
    }
}

impl<T: DeserializeOwned> SignedMessage<T> {
    /// Parse a JSON tree into a typed signed message.
    pub fn from_value(value: Value) -> Result<Self, CryptoError> {
        serde_json::from_value(value)
            .map_err(|e| CryptoError::MalformedSignedMessage(e.to_string()))
    }
}

impl<T> SignedMessage<T> {
    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The author's verifying key.
    pub fn author_key(&self) -> Result<PublicKeyBytes, CryptoError> {
        PublicKeyBytes::from_b64(&self.author)
            .map_err(|e| CryptoError::MalformedSignedMessage(format!("author: {e}")))
    }
}

/// Verify an untyped signed message.
pub fn verify_value(value: &Value) -> Result<bool, CryptoError> {
    let map = value
        .as_object()
        .ok_or_else(|| malformed("expected a JSON object"))?;

    let author = map
        .get(AUTHOR_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing author"))?;
    let signature = map
        .get(SIGNATURE_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing signature"))?;

    let author_bytes = URL_SAFE_NO_PAD
        .decode(author)
        .map_err(|_| malformed("author is not base64url"))?;
    let sig_bytes = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| malformed("signature is not base64url"))?;
    if author_bytes.len() != 32 {
        return Err(malformed("author key must be 32 bytes"));
    }
    if sig_bytes.len() != 64 {
        return Err(malformed("signature must be 64 bytes"));
    }

    let mut unsigned = map.clone();
    unsigned.remove(SIGNATURE_FIELD);
    let bytes = canonicalize_value(&Value::Object(unsigned));

    match verify_detached(&author_bytes, &bytes, &sig_bytes) {
        Ok(()) => Ok(true),
        Err(CryptoError::SignatureVerification) => Ok(false),
        Err(CryptoError::InvalidKey(e)) => Err(CryptoError::MalformedSignedMessage(e)),
        Err(other) => Err(other),
    }
}

fn signing_bytes<T: Serialize>(payload: &T, author: &str) -> Result<Vec<u8>, CryptoError> {
    let mut tree = serde_json::to_value(payload)?;
    let map = tree
        .as_object_mut()
        .ok_or_else(|| malformed("payload must serialise to a JSON object"))?;
    if map.contains_key(AUTHOR_FIELD) || map.contains_key(SIGNATURE_FIELD) {
        return Err(malformed("payload uses a reserved field name"));
    }
    map.insert(AUTHOR_FIELD.to_string(), Value::String(author.to_string()));
    Ok(canonicalize_value(&tree))
}

fn malformed(reason: &str) -> CryptoError {
    CryptoError::MalformedSignedMessage(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
        n: u64,
    }

    fn note() -> Note {
        Note { text: "hello".into(), n: 3 }
    }

    #[test]
    fn sign_and_verify() {
        let kp = SigningKeyPair::generate();
        let msg = SignedMessage::sign(&kp, note()).unwrap();
        assert_eq!(msg.author(), kp.author());
        assert!(!msg.signature().is_empty());
        assert!(msg.verify().unwrap());
    }

    #[test]
    fn wire_layout_is_flat() {
        let kp = SigningKeyPair::generate();
        let msg = SignedMessage::sign(&kp, note()).unwrap();
        let v = msg.to_value().unwrap();
        assert_eq!(v["text"], "hello");
        assert_eq!(v["n"], 3);
        assert!(v["author"].is_string());
        assert!(v["signature"].is_string());

        let back: SignedMessage<Note> = SignedMessage::from_value(v).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let kp = SigningKeyPair::generate();
        let msg = SignedMessage::sign(&kp, note()).unwrap();
        let mut v = msg.to_value().unwrap();
        v["n"] = json!(4);
        assert!(!verify_value(&v).unwrap());
    }

    #[test]
    fn swapped_author_fails_verification() {
        let kp = SigningKeyPair::generate();
        let other = SigningKeyPair::generate();
        let msg = SignedMessage::sign(&kp, note()).unwrap();
        let mut v = msg.to_value().unwrap();
        v["author"] = json!(other.author());
        assert!(!verify_value(&v).unwrap());
    }

    #[test]
    fn malformed_inputs_are_errors() {
        let kp = SigningKeyPair::generate();
        let good = SignedMessage::sign(&kp, note()).unwrap().to_value().unwrap();

        assert!(matches!(
            verify_value(&json!("baloney")),
            Err(CryptoError::MalformedSignedMessage(_))
        ));

        let mut no_sig = good.clone();
        no_sig.as_object_mut().unwrap().remove("signature");
        assert!(matches!(
            verify_value(&no_sig),
            Err(CryptoError::MalformedSignedMessage(_))
        ));

        let mut short_sig = good.clone();
        short_sig["signature"] = json!("AAAA");
        assert!(matches!(
            verify_value(&short_sig),
            Err(CryptoError::MalformedSignedMessage(_))
        ));

        let mut bad_author = good;
        bad_author["author"] = json!("!!not base64!!");
        assert!(matches!(
            verify_value(&bad_author),
            Err(CryptoError::MalformedSignedMessage(_))
        ));
    }

    #[test]
    fn reserved_fields_and_non_objects_cannot_be_signed() {
        let kp = SigningKeyPair::generate();
        assert!(SignedMessage::sign(&kp, json!({ "author": "me" })).is_err());
        assert!(SignedMessage::sign(&kp, json!([1, 2, 3])).is_err());
    }

    #[test]
    fn author_key_decodes() {
        let kp = SigningKeyPair::generate();
        let msg = SignedMessage::sign(&kp, note()).unwrap();
        assert_eq!(msg.author_key().unwrap(), kp.public);
    }
}
