//! Session Token Gate
//!
//! Offline and private sessions are gated by a random non-zero u32 token.
//! The embedded server hands the token to its own client; anyone else
//! connecting without it is refused before a player is created.
//! An open gate (no token) accepts every connection.

use thiserror::Error;
use uuid::Uuid;

/// Token check errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Client presented no token to a gated server.
    #[error("session token required")]
    MissingToken,
    /// Token does not match this session.
    #[error("invalid session token {0}")]
    InvalidToken(u32),
}

/// Accepts or refuses connections by session token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenGate {
    expected: Option<u32>,
}

impl TokenGate {
    /// Gate requiring `token`. A zero token means an open gate.
    pub fn new(token: u32) -> Self {
        Self {
            expected: (token != 0).then_some(token),
        }
    }

    /// Gate that accepts everyone.
    pub fn open() -> Self {
        Self { expected: None }
    }

    /// Gate with a freshly generated token.
    pub fn generate() -> Self {
        Self::new(generate_token())
    }

    /// True when a token is required.
    pub fn is_gated(&self) -> bool {
        self.expected.is_some()
    }

    /// Token clients must present (0 when open).
    pub fn token(&self) -> u32 {
        self.expected.unwrap_or(0)
    }

    /// Check a presented token.
    pub fn check(&self, presented: u32) -> Result<(), AuthError> {
        match self.expected {
            None => Ok(()),
            Some(expected) if presented == expected => Ok(()),
            Some(_) if presented == 0 => Err(AuthError::MissingToken),
            Some(_) => Err(AuthError::InvalidToken(presented)),
        }
    }
}

/// Random non-zero session token.
pub fn generate_token() -> u32 {
    loop {
        let bytes = Uuid::new_v4().into_bytes();
        let token = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if token != 0 {
            return token;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_gate_accepts_everything() {
        let gate = TokenGate::open();
        assert!(!gate.is_gated());
        assert_eq!(gate.token(), 0);
        assert!(gate.check(0).is_ok());
        assert!(gate.check(12345).is_ok());
        assert_eq!(TokenGate::new(0), gate);
    }

    #[test]
    fn test_gated_check() {
        let gate = TokenGate::new(77);
        assert!(gate.is_gated());
        assert!(gate.check(77).is_ok());
        assert_eq!(gate.check(0), Err(AuthError::MissingToken));
        assert_eq!(gate.check(78), Err(AuthError::InvalidToken(78)));
    }

    #[test]
    fn test_generated_tokens_nonzero() {
        for _ in 0..100 {
            let gate = TokenGate::generate();
            assert_ne!(gate.token(), 0);
            assert!(gate.check(gate.token()).is_ok());
        }
    }
}
