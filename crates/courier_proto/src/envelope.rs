//! Envelope — signed routing certificate for a conversation thread.
//!
//! Wire layout is the signed-message object augmented with
//! `{ seq, expiration, recipient }`; `expiration` is Unix-epoch ms and
//! `0` means "never expires".
//!
//! Verification order: stale `seq`, then expiry, then signature. The first
//! two are cheap local checks and short-circuit before any crypto runs.

use std::collections::HashMap;

use courier_crypto::{signed, CryptoError, SignedMessage, SigningKeyPair};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ProtoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeFields {
    pub seq: u64,
    pub expiration: u64,
    pub recipient: String,
    /// Signed fields this version does not name; kept so they re-verify.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Arguments to `Envelope::create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeOptions {
    pub username: String,
    pub seq: u64,
    pub expiration: u64,
}

impl EnvelopeOptions {
    /// Options for a non-expiring envelope.
    pub fn new(username: &str, seq: u64) -> Self {
        Self { username: username.to_string(), seq, expiration: 0 }
    }

    pub fn expires_at(mut self, expiration_ms: u64) -> Self {
        self.expiration = expiration_ms;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Envelope(SignedMessage<EnvelopeFields>);

impl Envelope {
    /// Sign a new envelope. The caller owns `seq` monotonicity; nothing is
    /// validated here.
    pub fn create(signer: &SigningKeyPair, opts: EnvelopeOptions) -> Result<Self, ProtoError> {
        let fields = EnvelopeFields {
            seq: opts.seq,
            expiration: opts.expiration,
            recipient: opts.username,
            extra: Map::new(),
        };
        Ok(Self(SignedMessage::sign(signer, fields)?))
    }

    pub fn from_value(value: Value) -> Result<Self, ProtoError> {
        SignedMessage::from_value(value).map(Self).map_err(malformed)
    }

    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| ProtoError::Malformed(format!("envelope is not JSON: {e}")))?;
        Self::from_value(value)
    }

    pub fn to_value(&self) -> Result<Value, ProtoError> {
        Ok(self.0.to_value()?)
    }

    pub fn fields(&self) -> &EnvelopeFields {
        self.0.payload()
    }

    pub fn seq(&self) -> u64 {
        self.fields().seq
    }

    pub fn expiration(&self) -> u64 {
        self.fields().expiration
    }

    pub fn recipient(&self) -> &str {
        &self.fields().recipient
    }

    /// Base64url verifying key of the author.
    pub fn author(&self) -> &str {
        self.0.author()
    }

    pub fn signed(&self) -> &SignedMessage<EnvelopeFields> {
        &self.0
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_ms())
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        let expiration = self.expiration();
        expiration != 0 && now_ms > expiration
    }

    /// `Ok(false)` for a stale `seq`, an expired envelope, or a bad signature.
    pub fn verify(&self, current_seq: Option<u64>) -> Result<bool, ProtoError> {
        self.verify_at(current_seq, now_ms())
    }

    pub fn verify_at(&self, current_seq: Option<u64>, now_ms: u64) -> Result<bool, ProtoError> {
        if !self.passes_local_checks(current_seq, now_ms) {
            return Ok(false);
        }
        self.0.verify().map_err(malformed)
    }

    /// Verify an untyped JSON envelope. The signature is checked over the
    /// value exactly as received, unknown fields included.
    pub fn verify_value(value: &Value, current_seq: Option<u64>) -> Result<bool, ProtoError> {
        let envelope = Self::from_value(value.clone())?;
        if !envelope.passes_local_checks(current_seq, now_ms()) {
            return Ok(false);
        }
        signed::verify_value(value).map_err(malformed)
    }

    fn passes_local_checks(&self, current_seq: Option<u64>, now_ms: u64) -> bool {
        if let Some(current) = current_seq {
            if self.seq() <= current {
                warn!(seq = self.seq(), current, recipient = %self.recipient(), "rejecting stale envelope");
                return false;
            }
        }
        if self.is_expired_at(now_ms) {
            warn!(expiration = self.expiration(), recipient = %self.recipient(), "rejecting expired envelope");
            return false;
        }
        true
    }
}

/// Remembers the last accepted `seq` per (author, recipient) pair.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last_seen: HashMap<(String, String), u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_seq(&self, author: &str, recipient: &str) -> Option<u64> {
        self.last_seen
            .get(&(author.to_string(), recipient.to_string()))
            .copied()
    }

    /// Verify against the remembered `seq` and record the new one on success.
    pub fn accept(&mut self, envelope: &Envelope) -> Result<bool, ProtoError> {
        let key = (envelope.author().to_string(), envelope.recipient().to_string());
        let current = self.last_seen.get(&key).copied();
        if !envelope.verify(current)? {
            return Ok(false);
        }
        debug!(seq = envelope.seq(), recipient = %envelope.recipient(), "envelope accepted");
        self.last_seen.insert(key, envelope.seq());
        Ok(true)
    }
}

fn now_ms() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}

fn malformed(err: CryptoError) -> ProtoError {
    match err {
        CryptoError::MalformedSignedMessage(reason) => ProtoError::Malformed(reason),
        other => ProtoError::Crypto(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(seq: u64, expiration: u64) -> Envelope {
        let kp = SigningKeyPair::generate();
        Envelope::create(&kp, EnvelopeOptions::new("alice", seq).expires_at(expiration)).unwrap()
    }

    #[test]
    fn create_fills_fields() {
        let env = envelope(1, 0);
        assert_eq!(env.seq(), 1);
        assert_eq!(env.expiration(), 0);
        assert_eq!(env.recipient(), "alice");
        assert!(!env.signed().signature().is_empty());
    }

    #[test]
    fn wire_layout() {
        let env = envelope(7, 123);
        let v = env.to_value().unwrap();
        assert_eq!(v["seq"], 7);
        assert_eq!(v["expiration"], 123);
        assert_eq!(v["recipient"], "alice");
        assert!(v["author"].is_string());
        assert!(v["signature"].is_string());
        assert_eq!(Envelope::from_value(v).unwrap(), env);
    }

    #[test]
    fn zero_expiration_never_expires() {
        let env = envelope(1, 0);
        assert!(!env.is_expired());
        assert!(!env.is_expired_at(u64::MAX));
    }

    #[test]
    fn past_expiration_is_expired() {
        let env = envelope(1, 1_000);
        assert!(env.is_expired());
        assert!(!env.is_expired_at(1_000));
        assert!(env.is_expired_at(1_001));
    }

    #[test]
    fn sequence_must_increase() {
        let env = envelope(1, 0);
        assert!(!env.verify(Some(1)).unwrap());
        assert!(!env.verify(Some(5)).unwrap());
        assert!(env.verify(Some(0)).unwrap());
        assert!(env.verify(None).unwrap());
    }

    #[test]
    fn expired_envelope_fails_verification() {
        let env = envelope(2, 1_000);
        assert!(!env.verify(None).unwrap());
        assert!(env.verify_at(None, 500).unwrap());
    }

    #[test]
    fn stale_seq_short_circuits_before_signature() {
        let env = envelope(1, 0);
        let mut v = env.to_value().unwrap();
        v["signature"] = json!("not base64 !!");
        // Malformed signature is never looked at when seq is stale.
        assert!(!Envelope::verify_value(&v, Some(3)).unwrap());
        assert!(matches!(
            Envelope::verify_value(&v, None),
            Err(ProtoError::Malformed(_))
        ));
    }

    #[test]
    fn tampered_envelope_fails_verification() {
        let env = envelope(1, 0);
        let mut v = env.to_value().unwrap();
        v["recipient"] = json!("mallory");
        assert!(!Envelope::verify_value(&v, None).unwrap());
        let parsed = Envelope::from_value(v).unwrap();
        assert!(!parsed.verify(None).unwrap());
    }

    #[test]
    fn unknown_signed_fields_survive_parsing() {
        let kp = SigningKeyPair::generate();
        let signed = SignedMessage::sign(
            &kp,
            json!({ "seq": 1, "expiration": 0, "recipient": "alice", "thread": "t1" }),
        )
        .unwrap();
        let v = signed.to_value().unwrap();
        assert!(Envelope::verify_value(&v, None).unwrap());

        let env = Envelope::from_value(v).unwrap();
        assert_eq!(env.fields().extra.get("thread"), Some(&json!("t1")));
        assert!(env.verify(None).unwrap());
        assert_eq!(env.to_value().unwrap()["thread"], "t1");
    }

    #[test]
    fn non_envelopes_are_malformed() {
        assert!(matches!(
            Envelope::verify_value(&json!("baloney"), None),
            Err(ProtoError::Malformed(_))
        ));
        assert!(matches!(
            Envelope::verify_value(&json!({ "seq": 1 }), None),
            Err(ProtoError::Malformed(_))
        ));
        assert!(matches!(Envelope::from_json("{"), Err(ProtoError::Malformed(_))));
    }

    #[test]
    fn tracker_rejects_replays() {
        let kp = SigningKeyPair::generate();
        let first = Envelope::create(&kp, EnvelopeOptions::new("bob", 1)).unwrap();
        let second = Envelope::create(&kp, EnvelopeOptions::new("bob", 2)).unwrap();
        let other = Envelope::create(&kp, EnvelopeOptions::new("carol", 1)).unwrap();

        let mut tracker = SequenceTracker::new();
        assert!(tracker.accept(&first).unwrap());
        assert!(!tracker.accept(&first).unwrap());
        assert!(tracker.accept(&second).unwrap());
        assert!(!tracker.accept(&first).unwrap());
        assert!(tracker.accept(&other).unwrap());
        assert_eq!(tracker.last_seq(&kp.author(), "bob"), Some(2));
        assert_eq!(tracker.last_seq(&kp.author(), "carol"), Some(1));
    }
}
