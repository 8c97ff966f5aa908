//! courier_proto — Envelopes, message content and multi-device hybrid
//! encryption for Courier
//!
//! All on-wire types are JSON. Binary values (ciphertexts, wrapped keys)
//! travel as base64 strings.
//!
//! # Modules
//! - `envelope` — Signed routing certificate (seq, expiration, recipient)
//! - `message`  — Signed plaintext content (inside the encryption)
//! - `device`   — Identities, device-set snapshots, the local device
//! - `engine`   — Wrap content for every device; decrypt as recipient or author
//! - `config`   — Engine configuration (symmetric algorithm, policy flags)
//! - `codec`    — Base64 wire strings

pub mod codec;
pub mod config;
pub mod device;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod message;

pub use config::EngineConfig;
pub use device::{DeviceName, DeviceSet, Identity, LocalDevice};
pub use engine::{DecryptAs, EncryptedContent, EnvelopeEngine, Keys, WrappedMessage};
pub use envelope::{Envelope, EnvelopeFields, EnvelopeOptions, SequenceTracker};
pub use error::ProtoError;
pub use message::{Content, MessageBody, Sender};
