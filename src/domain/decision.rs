use std::fmt;

use super::error::AclError;

/// Reason given when the blacklist matches.
pub const DENY_BLACKLISTED: &str = "User is not allowed to this domain";

/// Outcome for a single request line.
///
/// Exactly one is produced per input line, and it renders to exactly one
/// response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Access permitted
    Allow,
    /// Access refused by policy
    Deny(&'static str),
    /// Operational failure, access not granted
    Error(AclError),
}

impl Decision {
    /// Returns true if this decision allows the request.
    #[inline]
    pub fn is_allowed(&self) -> bool {
        *self == Decision::Allow
    }

    /// Render as a protocol line, including the trailing newline.
    pub fn to_response_line(&self) -> String {
        format!("{self}\n")
    }
}

impl From<AclError> for Decision {
    fn from(err: AclError) -> Self {
        Decision::Error(err)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => write!(f, "OK"),
            Decision::Deny(reason) => write!(f, "ERR {reason}"),
            Decision::Error(err) => write!(f, "ERR {err}"),
        }
    }
}
