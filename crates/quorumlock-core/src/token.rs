//! Acquisition tokens

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Number of random bytes in a generated token (128 bits).
pub const TOKEN_BYTES: usize = 16;

/// Unique value written under the lock key by one acquisition attempt.
///
/// Release and extend only touch a store record whose value equals the token,
/// which keeps a stale holder from clearing a lock that expired and was taken
/// by someone else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(String);

impl LockToken {
    /// Fresh 128-bit random token, hex encoded.
    pub fn generate() -> Self {
        let bytes: [u8; TOKEN_BYTES] = rand::random();
        Self(const_hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for LockToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for LockToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for LockToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_generate_shape() {
        let token = LockToken::generate();
        assert_eq!(token.as_str().len(), TOKEN_BYTES * 2);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_unique() {
        let tokens: HashSet<LockToken> = (0..10_000).map(|_| LockToken::generate()).collect();
        assert_eq!(tokens.len(), 10_000);
    }

    #[test]
    fn test_serde_transparent() {
        let token = LockToken::from("abc123");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"abc123\"");
    }
}
