//! Identifier and one-time secret generation
//!
//! Row ids are 10 characters over `[0-9A-Za-z]`, optionally prefixed with a
//! short type tag (`u_`, `ro_`, ...). Secrets use the same alphabet from the
//! operating system RNG.

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

/// Length of the random part of a row id
pub const ID_LENGTH: usize = 10;

/// Invite token length
pub const INVITE_TOKEN_LENGTH: usize = 20;

/// Password reset token length
pub const RESET_TOKEN_LENGTH: usize = 32;

/// Prefixes used by tables whose ids are shown to users
pub mod prefix {
    pub const TENANT: &str = "t";
    pub const USER: &str = "u";
    pub const ROLE: &str = "ro";
    pub const PERMISSION: &str = "pe";
    pub const NAVIGATION: &str = "n";
}

fn random_string(len: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// New row id, `prefix_XXXXXXXXXX` or `XXXXXXXXXX`
///
/// ```
/// use heiso_shared::ids::generate_id;
///
/// let id = generate_id(Some("u"));
/// assert!(id.starts_with("u_"));
/// assert_eq!(id.len(), 12);
/// ```
pub fn generate_id(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) => format!("{}_{}", p, random_string(ID_LENGTH)),
        None => random_string(ID_LENGTH),
    }
}

pub fn generate_invite_token() -> String {
    random_string(INVITE_TOKEN_LENGTH)
}

pub fn generate_reset_token() -> String {
    random_string(RESET_TOKEN_LENGTH)
}

/// Six decimal digits, never starting with zero
pub fn generate_otp_code() -> String {
    OsRng.gen_range(100_000..1_000_000).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_without_prefix() {
        let id = generate_id(None);
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_id_with_prefix() {
        let id = generate_id(Some(prefix::ROLE));
        assert!(id.starts_with("ro_"));
        assert_eq!(id.len(), 3 + ID_LENGTH);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(generate_id(None), generate_id(None));
    }

    #[test]
    fn test_token_lengths() {
        assert_eq!(generate_invite_token().len(), INVITE_TOKEN_LENGTH);
        assert_eq!(generate_reset_token().len(), RESET_TOKEN_LENGTH);
    }

    #[test]
    fn test_otp_code_format() {
        for _ in 0..100 {
            let code = generate_otp_code();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
            assert!(!code.starts_with('0'));
        }
    }
}
