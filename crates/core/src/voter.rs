//! Voter identity.
//!
//! There are no accounts: a voter is whoever shares a network address and
//! client agent. The identifier is deterministic, so the same client always
//! maps to the same voter, and it is trivially spoofable by changing either
//! input. It exists to enforce one vote per system per comment, not to
//! authenticate anyone.

use persona_common::{AppError, AppResult};
use std::fmt;

/// Maximum length of a stored voter identifier.
pub const MAX_IDENTIFIER_LEN: usize = 255;

/// Address used when the caller's address cannot be determined.
pub const ANONYMOUS_ADDRESS: &str = "anonymous";

/// Agent used when the caller sends none.
pub const UNKNOWN_AGENT: &str = "unknown";

/// Request metadata a voter identity is derived from.
#[derive(Debug, Clone, Default)]
pub struct VoterSource<'a> {
    /// Raw `X-Forwarded-For` header value.
    pub forwarded_for: Option<&'a str>,
    /// Raw `X-Real-IP` header value.
    pub real_ip: Option<&'a str>,
    /// Peer address of the connection.
    pub peer_addr: Option<String>,
    /// Raw `User-Agent` header value.
    pub user_agent: Option<&'a str>,
}

/// Anonymous voter identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VoterId(String);

impl VoterId {
    /// Derive the identifier for a request.
    #[must_use]
    pub fn resolve(source: &VoterSource<'_>) -> Self {
        let address = source
            .forwarded_for
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .or_else(|| source.real_ip.map(str::trim).filter(|ip| !ip.is_empty()))
            .map(str::to_string)
            .or_else(|| source.peer_addr.clone())
            .unwrap_or_else(|| ANONYMOUS_ADDRESS.to_string());

        let agent = source
            .user_agent
            .map(str::trim)
            .filter(|ua| !ua.is_empty())
            .unwrap_or(UNKNOWN_AGENT);

        Self::from_parts(&address, agent)
    }

    /// Combine an address and agent into a sanitized identifier.
    #[must_use]
    pub fn from_parts(address: &str, agent: &str) -> Self {
        let id: String = format!("{address}_{agent}")
            .chars()
            .map(|c| if is_allowed(c) { c } else { '_' })
            .take(MAX_IDENTIFIER_LEN)
            .collect();
        Self(id)
    }

    /// Accept an identifier supplied by a trusted caller, rejecting anything
    /// [`resolve`](Self::resolve) could not have produced.
    pub fn parse(raw: &str) -> AppResult<Self> {
        if raw.is_empty() {
            return Err(AppError::Validation(
                "voterIdentifier: must not be empty".to_string(),
            ));
        }
        if raw.len() > MAX_IDENTIFIER_LEN {
            return Err(AppError::Validation(format!(
                "voterIdentifier: must be at most {MAX_IDENTIFIER_LEN} characters"
            )));
        }
        if !raw.chars().all(is_allowed) {
            return Err(AppError::Validation(
                "voterIdentifier: contains characters outside [A-Za-z0-9._-]".to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

const fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}
