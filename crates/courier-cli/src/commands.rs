//! Subcommand handlers. Each returns the JSON document the command emits.

use std::path::Path;

use anyhow::{Context, Result};
use courier_proto::{
    Content, DecryptAs, EncryptedContent, Envelope, EnvelopeEngine, EnvelopeOptions, Identity,
    Keys, LocalDevice, WrappedMessage,
};
use serde_json::{json, Value};
use tracing::info;

use crate::keyfile::{read_json, write_json, write_secret_json, DeviceKeyFile};

fn load_device(path: &Path) -> Result<(String, LocalDevice)> {
    let file: DeviceKeyFile = read_json(path)?;
    let device = file
        .to_device()
        .with_context(|| format!("load device keys from {}", path.display()))?;
    Ok((file.username.clone(), device))
}

pub fn identity_new(
    username: &str,
    label: &str,
    identity_out: &Path,
    device_out: &Path,
) -> Result<Value> {
    let (identity, device) = Identity::create(username, label)?;
    write_secret_json(device_out, &DeviceKeyFile::from_device(username, &device))?;
    write_json(identity_out, &identity)?;
    info!(username, device = %device.device_name(), "identity created");
    Ok(json!({
        "username": username,
        "device": device.device_name(),
        "fingerprint": device.exchange_public().fingerprint(),
    }))
}

pub fn identity_add_device(identity_path: &Path, label: &str, device_out: &Path) -> Result<Value> {
    let mut identity: Identity = read_json(identity_path)?;
    let device = LocalDevice::generate(label);
    identity.add_device(&device)?;
    write_secret_json(
        device_out,
        &DeviceKeyFile::from_device(identity.username(), &device),
    )?;
    write_json(identity_path, &identity)?;
    info!(username = identity.username(), device = %device.device_name(), "device added");
    Ok(json!({
        "username": identity.username(),
        "device": device.device_name(),
        "devices": identity.devices().len(),
    }))
}

pub fn envelope_create(
    device_path: &Path,
    recipient: &str,
    seq: u64,
    expiration: u64,
) -> Result<Value> {
    let (_, device) = load_device(device_path)?;
    let opts = EnvelopeOptions::new(recipient, seq).expires_at(expiration);
    let envelope = Envelope::create(device.signing_key(), opts)?;
    Ok(envelope.to_value()?)
}

pub fn envelope_verify(envelope_path: &Path, current_seq: Option<u64>) -> Result<Value> {
    let raw: Value = read_json(envelope_path)?;
    // Accept a bare envelope or a wrapped message carrying one.
    let raw = match raw.get("envelope") {
        Some(inner) => inner.clone(),
        None => raw,
    };
    let valid = Envelope::verify_value(&raw, current_seq)?;
    let envelope = Envelope::from_value(raw)?;
    Ok(json!({
        "valid": valid,
        "seq": envelope.seq(),
        "recipient": envelope.recipient(),
        "expired": envelope.is_expired(),
        "author": envelope.author(),
    }))
}

pub struct WrapArgs<'a> {
    pub device: &'a Path,
    pub sender_identity: &'a Path,
    pub recipient_identity: &'a Path,
    pub envelope: &'a Path,
    pub text: &'a str,
    pub mentions: Vec<String>,
    pub keys_out: &'a Path,
}

pub fn wrap(engine: &EnvelopeEngine, args: WrapArgs<'_>) -> Result<Value> {
    let (username, device) = load_device(args.device)?;
    let me: Identity = read_json(args.sender_identity)?;
    let recipient: Identity = read_json(args.recipient_identity)?;
    let envelope = Envelope::from_value(read_json(args.envelope)?)?;

    let mentions = (!args.mentions.is_empty()).then_some(args.mentions);
    let content = Content::create(device.signing_key(), &username, args.text, mentions)?;

    let (wrapped, sender_keys) =
        engine.wrap_message(&me.snapshot(), &recipient.snapshot(), envelope, &content)?;
    write_json(args.keys_out, &sender_keys)?;
    Ok(serde_json::to_value(&wrapped)?)
}

pub fn decrypt(
    engine: &EnvelopeEngine,
    device_path: &Path,
    message_path: &Path,
    sender_keys: Option<&Path>,
) -> Result<Value> {
    let (_, device) = load_device(device_path)?;
    let raw: Value = read_json(message_path)?;
    // A full wrapped message or just its encrypted content.
    let message: EncryptedContent = match raw.get("message") {
        Some(_) => serde_json::from_value::<WrappedMessage>(raw)?.message,
        None => serde_json::from_value(raw)?,
    };

    let content = match sender_keys {
        Some(path) => {
            let keys: Keys = read_json(path)?;
            engine.decrypt_message(&device, &message, DecryptAs::Author(&keys))?
        }
        None => engine.decrypt_message(&device, &message, DecryptAs::Recipient)?,
    };
    let verified = content.verify()?;
    Ok(json!({
        "content": content,
        "signature_valid": verified,
    }))
}
