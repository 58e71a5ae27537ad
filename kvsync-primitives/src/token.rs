//! Owner tokens.

use once_cell::sync::Lazy;
use std::fmt;
use uuid::Uuid;

static HOST: Lazy<String> = Lazy::new(|| {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "localhost".to_string())
});

/// Identifies which lock instance holds a slot in the store.
///
/// Generated once per lock instance as `{hostname}:{uuid}` and never
/// shared: two instances in the same process get different tokens, so each
/// instance is its own owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerToken(String);

impl OwnerToken {
    /// Generate a fresh token for this host.
    pub fn generate() -> Self {
        Self(format!("{}:{}", *HOST, Uuid::new_v4()))
    }

    /// Token as stored in the key or hash field.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let a = OwnerToken::generate();
        let b = OwnerToken::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_carries_host_prefix() {
        let token = OwnerToken::generate();
        let (host, suffix) = token.as_str().rsplit_once(':').unwrap();
        assert_eq!(host, HOST.as_str());
        assert!(Uuid::parse_str(suffix).is_ok());
    }
}
