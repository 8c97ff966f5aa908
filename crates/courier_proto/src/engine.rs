//! Envelope engine — hybrid encryption of content across every device of
//! both conversation parties.
//!
//! Encrypt:
//!   1. fresh one-time key (algorithm fixed by `EngineConfig`)
//!   2. canonicalize the content, encrypt it once
//!   3. wrap the key for each recipient device → `EncryptedContent.key`
//!   4. wrap the same key for each sender device → separate `Keys`
//!
//! The sender's wraps never travel inside the message, so a reader of
//! `EncryptedContent` learns nothing about the sender's devices.
//!
//! Decrypt: pick the key map (`DecryptAs`), look up the caller's own device
//! name, unwrap, decrypt, parse.

use std::collections::BTreeMap;

use courier_crypto::{aead, canonical, keywrap, CryptoError, SymmetricKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    codec,
    config::EngineConfig,
    device::{DeviceName, DeviceSet, LocalDevice},
    envelope::Envelope,
    error::ProtoError,
    message::Content,
};

/// Device name → wrapped one-time key (base64).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keys(BTreeMap<DeviceName, String>);

impl Keys {
    pub fn get(&self, device: &DeviceName) -> Option<&str> {
        self.0.get(device).map(String::as_str)
    }

    pub fn contains(&self, device: &DeviceName) -> bool {
        self.0.contains_key(device)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceName, &str)> {
        self.0.iter().map(|(name, wrapped)| (name, wrapped.as_str()))
    }
}

/// What the recipient receives: wrapped keys for their devices plus the
/// ciphertext of the canonical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedContent {
    pub key: Keys,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedMessage {
    pub envelope: Envelope,
    pub message: EncryptedContent,
}

/// Which key map the decrypting device should consult.
#[derive(Debug, Clone, Copy)]
pub enum DecryptAs<'a> {
    /// Use the keys embedded in the message.
    Recipient,
    /// Re-read a sent message with the separately kept sender keys.
    Author(&'a Keys),
}

#[derive(Debug, Clone, Default)]
pub struct EnvelopeEngine {
    config: EngineConfig,
}

impl EnvelopeEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Encrypt `content` for every device in `recipient`, and separately
    /// wrap the same key for every device in `me`.
    pub fn wrap_message(
        &self,
        me: &DeviceSet,
        recipient: &DeviceSet,
        envelope: Envelope,
        content: &Content,
    ) -> Result<(WrappedMessage, Keys), ProtoError> {
        ensure_devices(me, "sender")?;
        ensure_devices(recipient, "recipient")?;

        let key = aead::generate_key(self.config.symmetric);
        let plaintext = Zeroizing::new(canonical::canonicalize(content)?);

        let message = self.encrypt_content(&key, &plaintext, recipient)?;
        let sender_keys = wrap_for_devices(&key, me)?;

        debug!(
            algorithm = %self.config.symmetric,
            recipient_devices = recipient.len(),
            sender_devices = me.len(),
            "message wrapped"
        );
        Ok((WrappedMessage { envelope, message }, sender_keys))
    }

    /// Encrypt already-canonical bytes once and wrap `key` for `devices`.
    pub fn encrypt_content(
        &self,
        key: &SymmetricKey,
        plaintext: &[u8],
        devices: &DeviceSet,
    ) -> Result<EncryptedContent, ProtoError> {
        ensure_devices(devices, "recipient")?;
        if key.algorithm() != self.config.symmetric {
            return Err(CryptoError::InvalidKey(format!(
                "engine uses {}, got a {} key",
                self.config.symmetric,
                key.algorithm()
            ))
            .into());
        }

        let ciphertext = aead::encrypt(key, plaintext)?;
        Ok(EncryptedContent {
            key: wrap_for_devices(key, devices)?,
            content: codec::encode(&ciphertext),
        })
    }

    pub fn decrypt_message(
        &self,
        device: &LocalDevice,
        message: &EncryptedContent,
        decrypt_as: DecryptAs<'_>,
    ) -> Result<Content, ProtoError> {
        let keys = match decrypt_as {
            DecryptAs::Recipient => &message.key,
            DecryptAs::Author(keys) => keys,
        };

        let wrapped = keys.get(device.device_name()).ok_or_else(|| {
            debug!("no wrapped key for this device");
            ProtoError::KeyNotFound
        })?;
        let key = keywrap::unwrap(&codec::decode(wrapped)?, device.exchange_key())?;

        let ciphertext = codec::decode(&message.content)?;
        let plaintext = aead::decrypt_with(self.config.symmetric, &key, &ciphertext)?;

        let value: Value = serde_json::from_slice(&plaintext)
            .map_err(|e| ProtoError::Malformed(format!("decrypted content is not JSON: {e}")))?;
        let content = Content::from_value(value)?;

        if self.config.require_content_signature && !content.verify()? {
            return Err(ProtoError::ContentSignature);
        }
        Ok(content)
    }
}

fn ensure_devices(devices: &DeviceSet, role: &str) -> Result<(), ProtoError> {
    if devices.is_empty() {
        return Err(ProtoError::DeviceSetInconsistency(format!(
            "{role} device set is empty"
        )));
    }
    Ok(())
}

fn wrap_for_devices(key: &SymmetricKey, devices: &DeviceSet) -> Result<Keys, ProtoError> {
    let mut keys = BTreeMap::new();
    for (name, public) in devices.iter() {
        let wrapped = keywrap::wrap(key, public)?;
        keys.insert(name.clone(), codec::encode(&wrapped));
    }
    Ok(Keys(keys))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Identity;
    use crate::envelope::EnvelopeOptions;
    use courier_crypto::SymmetricAlgorithm;

    struct Party {
        identity: Identity,
        device: LocalDevice,
    }

    fn party(name: &str) -> Party {
        let (identity, device) = Identity::create(name, "phone").unwrap();
        Party { identity, device }
    }

    fn hello(from: &Party, to: &Party) -> (Envelope, Content) {
        let envelope = Envelope::create(
            from.device.signing_key(),
            EnvelopeOptions::new(to.identity.username(), 1),
        )
        .unwrap();
        let content =
            Content::create(from.device.signing_key(), from.identity.username(), "hello", None)
                .unwrap();
        (envelope, content)
    }

    #[test]
    fn recipient_and_author_keys_stay_apart() {
        let alice = party("alice");
        let bob = party("bob");
        let (envelope, content) = hello(&alice, &bob);
        let engine = EnvelopeEngine::default();

        let (wrapped, sender_keys) = engine
            .wrap_message(alice.identity.devices(), bob.identity.devices(), envelope, &content)
            .unwrap();

        assert!(wrapped.message.key.contains(bob.device.device_name()));
        assert!(!wrapped.message.key.contains(alice.device.device_name()));
        assert!(sender_keys.contains(alice.device.device_name()));
        assert!(!sender_keys.contains(bob.device.device_name()));
    }

    #[test]
    fn wrong_key_map_is_key_not_found() {
        let alice = party("alice");
        let bob = party("bob");
        let (envelope, content) = hello(&alice, &bob);
        let engine = EnvelopeEngine::default();
        let (wrapped, sender_keys) = engine
            .wrap_message(alice.identity.devices(), bob.identity.devices(), envelope, &content)
            .unwrap();

        let err = engine
            .decrypt_message(&alice.device, &wrapped.message, DecryptAs::Recipient)
            .unwrap_err();
        assert!(matches!(err, ProtoError::KeyNotFound));

        let err = engine
            .decrypt_message(&bob.device, &wrapped.message, DecryptAs::Author(&sender_keys))
            .unwrap_err();
        assert!(matches!(err, ProtoError::KeyNotFound));
        assert!(err.is_undecryptable());
    }

    #[test]
    fn empty_device_sets_are_inconsistent() {
        let alice = party("alice");
        let bob = party("bob");
        let (envelope, content) = hello(&alice, &bob);
        let engine = EnvelopeEngine::default();
        let err = engine
            .wrap_message(alice.identity.devices(), &DeviceSet::default(), envelope, &content)
            .unwrap_err();
        assert!(matches!(err, ProtoError::DeviceSetInconsistency(_)));
    }

    #[test]
    fn encrypt_content_rejects_foreign_algorithm() {
        let bob = party("bob");
        let engine = EnvelopeEngine::default();
        let key = aead::generate_key(SymmetricAlgorithm::XChaCha20Poly1305);
        let err = engine
            .encrypt_content(&key, b"{}", bob.identity.devices())
            .unwrap_err();
        assert!(matches!(err, ProtoError::Crypto(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn encrypt_content_wraps_for_each_device() {
        let (mut bob, phone) = Identity::create("bob", "phone").unwrap();
        let laptop = LocalDevice::generate("laptop");
        bob.add_device(&laptop).unwrap();

        let engine = EnvelopeEngine::default();
        let key = aead::generate_key(SymmetricAlgorithm::Aes256Gcm);
        let encrypted = engine.encrypt_content(&key, b"{}", bob.devices()).unwrap();
        assert_eq!(encrypted.key.len(), 2);

        for device in [&phone, &laptop] {
            let wrapped = codec::decode(encrypted.key.get(device.device_name()).unwrap()).unwrap();
            let unwrapped = keywrap::unwrap(&wrapped, device.exchange_key()).unwrap();
            assert_eq!(unwrapped.as_bytes(), key.as_bytes());
        }
    }

    #[test]
    fn garbage_ciphertext_is_malformed() {
        let alice = party("alice");
        let bob = party("bob");
        let (envelope, content) = hello(&alice, &bob);
        let engine = EnvelopeEngine::default();
        let (mut wrapped, _) = engine
            .wrap_message(alice.identity.devices(), bob.identity.devices(), envelope, &content)
            .unwrap();
        wrapped.message.content = "%%%".into();
        let err = engine
            .decrypt_message(&bob.device, &wrapped.message, DecryptAs::Recipient)
            .unwrap_err();
        assert!(matches!(err, ProtoError::Malformed(_)));
    }

    #[test]
    fn encrypted_content_wire_layout() {
        let alice = party("alice");
        let bob = party("bob");
        let (envelope, content) = hello(&alice, &bob);
        let (wrapped, _) = EnvelopeEngine::default()
            .wrap_message(alice.identity.devices(), bob.identity.devices(), envelope, &content)
            .unwrap();
        let v = serde_json::to_value(&wrapped.message).unwrap();
        assert!(v["content"].is_string());
        assert!(v["key"][bob.device.device_name().as_str()].is_string());
    }
}
