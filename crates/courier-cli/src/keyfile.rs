//! On-disk JSON files: device secrets and public identity documents.
//!
//! A device key file holds both private keys (base64url) and is written
//! with owner-only permissions on unix. Identity files are public.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use courier_crypto::{ExchangeKeyPair, SigningKeyPair};
use courier_proto::{DeviceName, LocalDevice};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const KEY_FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct DeviceKeyFile {
    pub version: u32,
    pub username: String,
    pub device_name: String,
    pub label: String,
    pub signing_secret: String,
    pub exchange_secret: String,
}

impl DeviceKeyFile {
    pub fn from_device(username: &str, device: &LocalDevice) -> Self {
        Self {
            version: KEY_FILE_VERSION,
            username: username.to_string(),
            device_name: device.device_name().to_string(),
            label: device.label().to_string(),
            signing_secret: URL_SAFE_NO_PAD.encode(device.signing_key().secret_bytes()),
            exchange_secret: URL_SAFE_NO_PAD.encode(device.exchange_key().secret_bytes()),
        }
    }

    pub fn to_device(&self) -> Result<LocalDevice> {
        anyhow::ensure!(
            self.version == KEY_FILE_VERSION,
            "unsupported key file version {}",
            self.version
        );
        let signing = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(&self.signing_secret)
                .context("decode signing secret")?,
        );
        let exchange = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(&self.exchange_secret)
                .context("decode exchange secret")?,
        );
        let name = DeviceName::new(self.device_name.as_str())?;
        Ok(LocalDevice::from_parts(
            name,
            &self.label,
            SigningKeyPair::from_bytes(&signing)?,
            ExchangeKeyPair::from_bytes(&exchange)?,
        ))
    }
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("write {}", path.display()))
}

/// Like `write_json`, then restrict the file to its owner.
pub fn write_secret_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = Zeroizing::new(serde_json::to_string_pretty(value)?);
    fs::write(path, json.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    restrict_file_permissions(path);
    Ok(())
}

fn restrict_file_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!("cannot restrict permissions on {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_proto::Identity;

    #[test]
    fn device_key_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice-phone.key.json");
        let (_identity, phone) = Identity::create("alice", "phone").unwrap();

        write_secret_json(&path, &DeviceKeyFile::from_device("alice", &phone)).unwrap();
        let file: DeviceKeyFile = read_json(&path).unwrap();
        assert_eq!(file.username, "alice");

        let restored = file.to_device().unwrap();
        assert_eq!(restored.device_name(), phone.device_name());
        assert_eq!(restored.label(), "phone");
        assert_eq!(restored.signing_key().public, phone.signing_key().public);
        assert_eq!(restored.exchange_public(), phone.exchange_public());
    }

    #[cfg(unix)]
    #[test]
    fn secret_files_are_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.json");
        write_secret_json(&path, &serde_json::json!({ "k": "v" })).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn identity_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.identity.json");
        let (identity, _phone) = Identity::create("alice", "phone").unwrap();
        write_json(&path, &identity).unwrap();
        let back: Identity = read_json(&path).unwrap();
        assert_eq!(back, identity);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let (_identity, phone) = Identity::create("alice", "phone").unwrap();
        let mut file = DeviceKeyFile::from_device("alice", &phone);
        file.version = 99;
        assert!(file.to_device().is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let err = read_json::<Identity>(&path).unwrap_err();
        assert!(format!("{err:#}").contains("nope.json"));
    }
}
