// src/storage/query.rs
use std::fmt;

use thiserror::Error;

/// PostgreSQL truncates identifiers longer than NAMEDATALEN - 1 bytes.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Errors raised while validating startup configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid SQL identifier {0:?}: expected [A-Za-z_][A-Za-z0-9_$]* segments of at most 63 bytes")]
    InvalidIdentifier(String),

    #[error("Column name {0:?} must not be schema-qualified")]
    QualifiedColumn(String),
}

/// A table or column name that is safe to splice into SQL text.
///
/// Only plain, unquoted identifiers are accepted. Request-time values are
/// never turned into identifiers; they are always bound as parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier(String);

impl Identifier {
    /// Accept a dot-separated name such as `schema.table`.
    pub fn qualified(name: &str) -> Result<Self, ConfigError> {
        if name.split('.').all(is_plain_identifier) {
            Ok(Identifier(name.to_string()))
        } else {
            Err(ConfigError::InvalidIdentifier(name.to_string()))
        }
    }

    /// Accept a single, unqualified name.
    pub fn column(name: &str) -> Result<Self, ConfigError> {
        let ident = Self::qualified(name)?;
        if name.contains('.') {
            return Err(ConfigError::QualifiedColumn(name.to_string()));
        }
        Ok(ident)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_plain_identifier(segment: &str) -> bool {
    if segment.is_empty() || segment.len() > MAX_IDENTIFIER_LEN {
        return false;
    }

    let mut bytes = segment.bytes();
    let first_ok = bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_');

    first_ok && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$')
}

/// The blacklist lookup, fixed for the lifetime of the process.
///
/// `$1` is the username and `$2` the requested domain. The stored domain
/// column is the `LIKE` pattern, so a row holding `%.example.com` blocks
/// every subdomain of `example.com`. A returned row means the user is
/// *denied*; the table is a blacklist even when the view is named after
/// allowed domains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    sql: String,
}

impl QueryTemplate {
    pub fn new(table: &Identifier, username_col: &Identifier, domain_col: &Identifier) -> Self {
        QueryTemplate {
            sql: format!(
                "SELECT TRUE FROM {table} WHERE {username_col} = $1 AND $2 LIKE {domain_col}"
            ),
        }
    }

    /// SQL text to prepare.
    pub fn sql(&self) -> &str {
        &self.sql
    }
}
