use thiserror::Error;

/// Per-request failure kinds.
///
/// The `Display` text is what gets written after `ERR ` on the protocol
/// stream, so it is short and static. Backend details go to the log.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclError {
    #[error("Unable to connect to the database")]
    Connect,

    /// Preparation was requested while no connection is open.
    #[error("Unable to connect to the database")]
    NotConnected,

    #[error("Unable to create cursor")]
    CursorCreate,

    #[error("Unable to prepare statement")]
    Prepare,

    #[error("Unable to execute prepared statement")]
    Execute,

    #[error("Unable to close prepared cursor")]
    CloseCursor,

    #[error("Unable to close connection")]
    CloseConnection,

    #[error("Unable to parse request line")]
    Parse,
}

impl AclError {
    /// Stable label used in logs and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            AclError::Connect => "connect",
            AclError::NotConnected => "not_connected",
            AclError::CursorCreate => "cursor_create",
            AclError::Prepare => "prepare",
            AclError::Execute => "execute",
            AclError::CloseCursor => "close_cursor",
            AclError::CloseConnection => "close_connection",
            AclError::Parse => "parse",
        }
    }
}
