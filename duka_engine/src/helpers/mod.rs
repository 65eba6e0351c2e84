use blake2::{Blake2s256, Digest};

/// Hex-encoded Blake2s digest of a raw payload. Identical redeliveries of a callback hash to the same value.
pub fn payload_hash(raw: &str) -> String {
    let digest = Blake2s256::digest(raw.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
