//! Payload digests used to detect corrupt rows.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a payload.
pub fn payload_digest(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}
