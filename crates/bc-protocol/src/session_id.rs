use std::fmt;
use std::str::FromStr;

use rand::rngs::OsRng;
use rand::RngCore;

/// Opaque 128-bit session identifier, wire-encoded as 32 lowercase hex
/// characters (spec.md §3/§6). Generated from a cryptographically secure
/// RNG; never derived from anything predictable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId([u8; 16]);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SessionIdParseError {
    #[error("session id must be exactly 32 hex characters, got {0}")]
    WrongLength(usize),
    #[error("session id contains non-hex characters")]
    InvalidHex,
}

impl SessionId {
    /// Draws 16 random bytes from the OS CSPRNG. Collision with an existing
    /// id is not checked here — callers that insert into a shared map must
    /// verify uniqueness before committing (spec.md §9, cross-session
    /// isolation).
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Parses the `SID` query parameter. An empty string is the "no
    /// session yet" sentinel and is distinct from a parse failure: it
    /// yields `Ok(None)`, never an error.
    pub fn parse_optional(raw: &str) -> Result<Option<Self>, SessionIdParseError> {
        if raw.is_empty() {
            return Ok(None);
        }
        Self::from_str(raw).map(Some)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for SessionId {
    type Err = SessionIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 32 {
            return Err(SessionIdParseError::WrongLength(s.len()));
        }
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| SessionIdParseError::InvalidHex)?;
        Ok(Self(bytes))
    }
}
