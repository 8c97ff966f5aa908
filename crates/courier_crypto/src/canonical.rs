//! Canonical JSON encoding
//!
//! Everything that is signed or encrypted goes through here first, so the
//! same logical value always yields the same bytes. Output is compact JSON
//! with object keys sorted at every depth by UTF-16 code units (the RFC 8785
//! order), independent of serde_json's map ordering features.
//!
//! Protocol fields are integers and print in plain decimal. Free-form
//! fields are emitted as serde_json prints them.

use serde::Serialize;
use serde_json::Value;

use crate::error::CryptoError;

/// Canonical bytes of any serialisable value.
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CryptoError> {
    let tree = serde_json::to_value(value)?;
    Ok(canonicalize_value(&tree))
}

/// Canonical bytes of an already-built JSON tree.
pub fn canonicalize_value(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.encode_utf16().cmp(b.0.encode_utf16()));
            out.push(b'{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String(k.clone()), out);
                out.push(b':');
                write_value(v, out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, v) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(v, out);
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out),
    }
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) {
    // Display for scalars is serde_json's compact encoding.
    out.extend_from_slice(value.to_string().as_bytes());
}
