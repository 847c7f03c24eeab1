//! Invitation token generation.

use rand::rngs::OsRng;
use rand::RngCore;

/// Entropy of an invitation token. 32 bytes hex-encode to 64 characters.
pub const TOKEN_BYTES: usize = 32;

/// Produce a fresh acceptance token. Tokens are never reused: every create
/// and every resend draws a new one from the OS RNG.
pub fn generate_token() -> String {
    let mut buf = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn consecutive_tokens_differ() {
        let tokens: HashSet<String> = (0..64).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 64);
    }
}
