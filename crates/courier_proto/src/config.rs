//! Engine configuration.
//!
//! The symmetric algorithm is fixed per engine instance rather than
//! process-wide, so engines for two algorithm versions can run side by
//! side while stored messages migrate.
//!
//! Sources, lowest precedence first: defaults, JSON file, environment.
//!   COURIER_SYMMETRIC_ALG              — "aes-128-gcm" | "aes-256-gcm" | "xchacha20-poly1305"
//!   COURIER_REQUIRE_CONTENT_SIGNATURE  — "true" | "false" | "1" | "0"

use std::path::Path;

use courier_crypto::SymmetricAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::ProtoError;

pub const ENV_SYMMETRIC_ALG: &str = "COURIER_SYMMETRIC_ALG";
pub const ENV_REQUIRE_CONTENT_SIGNATURE: &str = "COURIER_REQUIRE_CONTENT_SIGNATURE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Algorithm for one-time content keys.
    pub symmetric: SymmetricAlgorithm,
    /// Reject decrypted content whose signature does not verify.
    pub require_content_signature: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symmetric: SymmetricAlgorithm::Aes256Gcm,
            require_content_signature: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(s).map_err(|e| ProtoError::Config(e.to_string()))
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProtoError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ProtoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// Apply `COURIER_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ProtoError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ProtoError> {
        if let Some(alg) = lookup(ENV_SYMMETRIC_ALG) {
            self.symmetric = alg
                .parse()
                .map_err(|e| ProtoError::Config(format!("{ENV_SYMMETRIC_ALG}: {e}")))?;
        }
        if let Some(flag) = lookup(ENV_REQUIRE_CONTENT_SIGNATURE) {
            self.require_content_signature = parse_bool(&flag).ok_or_else(|| {
                ProtoError::Config(format!("{ENV_REQUIRE_CONTENT_SIGNATURE}: expected a boolean, got {flag:?}"))
            })?;
        }
        Ok(self)
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
