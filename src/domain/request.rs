use super::error::AclError;

/// A single access check, borrowed from the request line it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest<'a> {
    /// Authority of the requested URL (host, optionally with port)
    pub domain: &'a str,
    /// Authenticated user as reported by the proxy
    pub username: &'a str,
}

impl<'a> AccessRequest<'a> {
    /// Parse a `"<url> <username>"` line.
    ///
    /// Fields are split on the first whitespace run. Everything after it is
    /// the username, so a line without a separator (or with nothing after
    /// it) is rejected.
    pub fn parse(line: &'a str) -> Result<Self, AclError> {
        let line = line.trim();
        let (url, rest) = line
            .split_once(|c: char| c.is_whitespace())
            .ok_or(AclError::Parse)?;

        let username = rest.trim_start();
        if url.is_empty() || username.is_empty() {
            return Err(AclError::Parse);
        }

        Ok(AccessRequest {
            domain: extract_domain(url),
            username,
        })
    }
}

/// Extract the domain a URL points at.
///
/// With an explicit authority (`scheme://host[:port]/...` or `//host/...`)
/// the authority is returned verbatim. Without one, as in
/// `facebook.com/messages/something.html`, the domain is everything before
/// the first path separator.
pub fn extract_domain(url: &str) -> &str {
    if let Some(rest) = strip_scheme(url) {
        let authority = until_path(rest);
        if !authority.is_empty() {
            return authority;
        }
    }
    until_path(url)
}

/// Returns the part after `//` when the URL carries an authority marker.
fn strip_scheme(url: &str) -> Option<&str> {
    if let Some(rest) = url.strip_prefix("//") {
        return Some(rest);
    }

    let (scheme, rest) = url.split_once("://")?;
    is_scheme(scheme).then_some(rest)
}

/// RFC 3986: `ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )`
fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn until_path(s: &str) -> &str {
    let end = s.find(['/', '?', '#']).unwrap_or(s.len());
    &s[..end]
}
