// Beacon wire format: `<agent-uuid>` or `<agent-uuid> TEST`, plaintext inside TLS.

use thiserror::Error;
use uuid::Uuid;

/// Largest payload read from a single connection.
pub const MAX_BEACON_LEN: usize = 1024;

const SELF_TEST_MARKER: &str = "TEST";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BeaconError {
    #[error("empty payload")]
    Empty,
    #[error("payload is not valid UTF-8")]
    NotUtf8,
    #[error("invalid agent uuid {0:?}")]
    BadUuid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconKind {
    Checkin,
    /// Connectivity check from a freshly deployed agent. Never scored.
    SelfTest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beacon {
    pub agent: Uuid,
    pub kind: BeaconKind,
}

impl Beacon {
    /// Parse a raw payload. Trailing whitespace and NUL padding are ignored,
    /// as is any token after the second.
    pub fn parse(payload: &[u8]) -> Result<Self, BeaconError> {
        let text = std::str::from_utf8(payload).map_err(|_| BeaconError::NotUtf8)?;
        let text = text.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');
        if text.is_empty() {
            return Err(BeaconError::Empty);
        }

        let (id, rest) = text.split_once(' ').unwrap_or((text, ""));
        let agent = Uuid::parse_str(id).map_err(|_| BeaconError::BadUuid(id.to_string()))?;

        let kind = match rest.split(' ').next() {
            Some(SELF_TEST_MARKER) => BeaconKind::SelfTest,
            _ => BeaconKind::Checkin,
        };

        Ok(Beacon { agent, kind })
    }
}
