//! Binary wire format
//!
//! Every payload is `version (u32 LE) | magic (4 bytes) | bincode body`.
//! The magic tells message kinds apart; a newer version is rejected.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::EnvelopeError;

/// Current wire format version
pub const WIRE_VERSION: u32 = 1;

const HEADER_LEN: usize = 8;

/// Serialise `message` behind the given magic
pub fn encode<T: Serialize>(magic: &[u8; 4], message: &T) -> Result<Vec<u8>, EnvelopeError> {
    let body = bincode::serialize(message).map_err(|e| EnvelopeError::Unencodable(e.to_string()))?;
    let mut bytes = Vec::with_capacity(HEADER_LEN + body.len());
    bytes.extend_from_slice(&WIRE_VERSION.to_le_bytes());
    bytes.extend_from_slice(magic);
    bytes.extend_from_slice(&body);
    Ok(bytes)
}

/// Decode a payload that must carry the given magic
pub fn decode<T: DeserializeOwned>(magic: &[u8; 4], bytes: &[u8]) -> Result<T, EnvelopeError> {
    if bytes.len() < HEADER_LEN {
        return Err(EnvelopeError::Undecodable(format!(
            "payload of {} bytes is shorter than the header",
            bytes.len()
        )));
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if &header[4..8] != magic {
        return Err(EnvelopeError::Undecodable("unexpected magic bytes".to_string()));
    }
    let version = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if version > WIRE_VERSION {
        return Err(EnvelopeError::Undecodable(format!(
            "wire version {} is newer than supported {}",
            version, WIRE_VERSION
        )));
    }
    bincode::deserialize(body).map_err(|e| EnvelopeError::Undecodable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: &[u8; 4] = b"TEST";

    #[test]
    fn test_roundtrip() {
        let value = (3u64, vec![1.5f64, -2.0]);
        let bytes = encode(MAGIC, &value).unwrap();
        let back: (u64, Vec<f64>) = decode(MAGIC, &bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let bytes = encode(b"AAAA", &1u32).unwrap();
        assert!(matches!(
            decode::<u32>(MAGIC, &bytes),
            Err(EnvelopeError::Undecodable(_))
        ));
    }

    #[test]
    fn test_rejects_newer_version() {
        let mut bytes = encode(MAGIC, &1u32).unwrap();
        bytes[..4].copy_from_slice(&(WIRE_VERSION + 1).to_le_bytes());
        assert!(decode::<u32>(MAGIC, &bytes).is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(decode::<u32>(MAGIC, b"xy").is_err());
        let mut truncated = encode(MAGIC, &vec![1.0f64; 4]).unwrap();
        truncated.truncate(12);
        assert!(decode::<Vec<f64>>(MAGIC, &truncated).is_err());
    }
}
