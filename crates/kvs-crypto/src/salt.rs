use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

/// Bytes of entropy in a generated salt.
pub const SALT_BYTES: usize = 48;

/// Generate a fresh salt: 48 random bytes from the OS-seeded CSPRNG,
/// rendered URL-safe base64 without padding (64 characters).
pub fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Short, non-reversible fingerprint of a salt, safe to print or log.
pub fn fingerprint(salt: &str) -> String {
    let hash = blake3::hash(salt.as_bytes());
    hash.to_hex()[..16].to_string()
}
