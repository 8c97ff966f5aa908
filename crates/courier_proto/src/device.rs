//! Identities and their devices.
//!
//! An identity is a username plus the set of devices enrolled under it.
//! The engine never reads a live identity: callers hand it a `DeviceSet`
//! snapshot taken at wrap time, and a `LocalDevice` when decrypting.

use std::collections::BTreeMap;
use std::fmt;

use courier_crypto::{ExchangeKeyPair, PublicKeyBytes, SigningKeyPair};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::ProtoError;

// ── Device name ───────────────────────────────────────────────────────────────

/// Name of one device, unique within an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceName(String);

impl DeviceName {
    pub fn new(name: impl Into<String>) -> Result<Self, ProtoError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProtoError::Malformed("device name must not be empty".into()));
        }
        Ok(Self(name))
    }

    /// Stable name derived from the device's exchange key fingerprint.
    pub fn from_exchange_key(key: &PublicKeyBytes) -> Self {
        Self(key.fingerprint().replace(' ', ""))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceName {
    type Error = ProtoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceName> for String {
    fn from(value: DeviceName) -> Self {
        value.0
    }
}

// ── Device set snapshot ───────────────────────────────────────────────────────

/// Immutable snapshot: device name → exchange public key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DeviceSet(BTreeMap<DeviceName, PublicKeyBytes>);

impl DeviceSet {
    /// Build a snapshot; two devices sharing a name is a `DeviceSetInconsistency`.
    pub fn from_devices(
        devices: impl IntoIterator<Item = (DeviceName, PublicKeyBytes)>,
    ) -> Result<Self, ProtoError> {
        let mut set = Self::default();
        for (name, key) in devices {
            set.insert(name, key)?;
        }
        Ok(set)
    }

    fn insert(&mut self, name: DeviceName, key: PublicKeyBytes) -> Result<(), ProtoError> {
        if self.0.contains_key(&name) {
            return Err(ProtoError::DeviceSetInconsistency(format!(
                "device name {name} appears more than once"
            )));
        }
        self.0.insert(name, key);
        Ok(())
    }

    pub fn get(&self, name: &DeviceName) -> Option<&PublicKeyBytes> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &DeviceName) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeviceName, &PublicKeyBytes)> {
        self.0.iter()
    }
}

// serde_json silently keeps the last of two duplicate keys; a snapshot
// must reject them instead.
impl<'de> Deserialize<'de> for DeviceSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(DeviceSetVisitor)
    }
}

struct DeviceSetVisitor;

impl<'de> de::Visitor<'de> for DeviceSetVisitor {
    type Value = DeviceSet;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of device name to exchange public key")
    }

    fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
    where
        A: de::MapAccess<'de>,
    {
        let mut set = DeviceSet::default();
        while let Some((name, key)) = map.next_entry::<DeviceName, PublicKeyBytes>()? {
            set.insert(name, key).map_err(de::Error::custom)?;
        }
        Ok(set)
    }
}

// ── Local device ──────────────────────────────────────────────────────────────

/// The device this process runs as: its name plus both private key pairs.
pub struct LocalDevice {
    name: DeviceName,
    label: String,
    signing: SigningKeyPair,
    exchange: ExchangeKeyPair,
}

impl LocalDevice {
    /// Generate fresh keys; the name is derived from the exchange key.
    pub fn generate(label: &str) -> Self {
        let signing = SigningKeyPair::generate();
        let exchange = ExchangeKeyPair::generate();
        let name = DeviceName::from_exchange_key(&exchange.public);
        Self { name, label: label.to_string(), signing, exchange }
    }

    pub fn from_parts(
        name: DeviceName,
        label: &str,
        signing: SigningKeyPair,
        exchange: ExchangeKeyPair,
    ) -> Self {
        Self { name, label: label.to_string(), signing, exchange }
    }

    /// The caller's own device-name resolution.
    pub fn device_name(&self) -> &DeviceName {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn signing_key(&self) -> &SigningKeyPair {
        &self.signing
    }

    pub fn exchange_key(&self) -> &ExchangeKeyPair {
        &self.exchange
    }

    pub fn exchange_public(&self) -> &PublicKeyBytes {
        &self.exchange.public
    }
}

impl fmt::Debug for LocalDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalDevice")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("signing_public", &self.signing.public)
            .field("exchange_public", &self.exchange.public)
            .finish()
    }
}

// ── Identity ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    username: String,
    devices: DeviceSet,
}

impl Identity {
    pub fn new(username: &str, devices: DeviceSet) -> Self {
        Self { username: username.to_string(), devices }
    }

    /// New identity with a single freshly generated device.
    pub fn create(username: &str, device_label: &str) -> Result<(Self, LocalDevice), ProtoError> {
        if username.trim().is_empty() {
            return Err(ProtoError::Malformed("username must not be empty".into()));
        }
        let device = LocalDevice::generate(device_label);
        let mut identity = Self::new(username, DeviceSet::default());
        identity.add_device(&device)?;
        Ok((identity, device))
    }

    pub fn add_device(&mut self, device: &LocalDevice) -> Result<(), ProtoError> {
        self.devices
            .insert(device.device_name().clone(), device.exchange_public().clone())
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn devices(&self) -> &DeviceSet {
        &self.devices
    }

    /// Copy of the current device set, for handing to the engine.
    pub fn snapshot(&self) -> DeviceSet {
        self.devices.clone()
    }
}
