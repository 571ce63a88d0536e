/// API key generation and verification
///
/// Keys look like `sk_` followed by 64 lowercase hex characters (32 random
/// bytes). Only the SHA-256 hex digest is stored; the plaintext is shown to
/// the user once. Listings show a truncated form such as `sk_9f2a...c41e`.
///
/// # Example
///
/// ```
/// use heiso_shared::auth::api_key::{generate_api_key, truncate_api_key, verify_api_key};
///
/// let (key, hash) = generate_api_key();
/// assert!(verify_api_key(&key, &hash));
/// assert_eq!(truncate_api_key(&key).len(), 14);
/// ```

use super::sha256_hex;
use rand::{rngs::OsRng, RngCore};

/// Prefix of every key
pub const KEY_PREFIX: &str = "sk_";

const KEY_RANDOM_BYTES: usize = 32;

/// Total key length: prefix plus hex-encoded random bytes
pub const API_KEY_LENGTH: usize = KEY_PREFIX.len() + KEY_RANDOM_BYTES * 2;

/// Returns `(plaintext, sha256_hex)`.
pub fn generate_api_key() -> (String, String) {
    let mut bytes = [0u8; KEY_RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);

    let key = format!("{}{}", KEY_PREFIX, hex::encode(bytes));
    let hash = hash_api_key(&key);
    (key, hash)
}

pub fn hash_api_key(key: &str) -> String {
    sha256_hex(key)
}

/// Display form: first 7 characters, `...`, last 4. Short keys are returned whole.
pub fn truncate_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return key.to_string();
    }
    let head: String = chars[..7].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Cheap shape check before touching the database
pub fn validate_api_key_format(key: &str) -> bool {
    key.len() == API_KEY_LENGTH
        && key.starts_with(KEY_PREFIX)
        && key[KEY_PREFIX.len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
}

pub fn verify_api_key(key: &str, stored_hash: &str) -> bool {
    constant_time_compare(&hash_api_key(key), stored_hash)
}

/// Compares two strings without short-circuiting on the first difference.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
