/// Authentication and authorization utilities
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and strength validation
/// - [`jwt`]: access/refresh token issuing and validation
/// - [`api_key`]: API key generation, hashing and display truncation
/// - [`middleware`]: request authentication (Bearer JWT or `X-Api-Key`)
/// - [`authorization`]: per-tenant permission resolution
///
/// # Example
///
/// ```no_run
/// use heiso_shared::auth::password::{hash_password, verify_password};
/// use heiso_shared::auth::jwt::issue_token_pair;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("User_password1")?;
/// assert!(verify_password("User_password1", &hash)?);
///
/// let tokens = issue_token_pair("u_abcdefghij", "t_abcdefghij", "a-secret-of-at-least-32-characters")?;
/// println!("{}", tokens.access_token);
/// # Ok(())
/// # }
/// ```

pub mod api_key;
pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `input`.
///
/// Used for API keys and one-time codes, which are never stored in plaintext.
pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_hex_length() {
        assert_eq!(sha256_hex("").len(), 64);
    }
}
