// src/storage/traits.rs
use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use super::query::QueryTemplate;

/// Failure reported by a policy store backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The connection is unusable and has to be re-established.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, StoreError::ConnectionLost(_))
    }
}

/// Credentials used for every (re)connect attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Entry point to a policy store: knows how to open connections.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    type Connection: StoreConnection;

    async fn connect(&self, credentials: &Credentials) -> Result<Self::Connection, StoreError>;
}

/// An open connection to a policy store.
///
/// Mirrors the usual connection/cursor split: a cursor is created, the
/// blacklist query is prepared on it once, and then it is executed for
/// every request with the username and domain bound as parameters.
#[async_trait]
pub trait StoreConnection: Send + Sized {
    type Cursor: Send;

    async fn cursor(&mut self) -> Result<Self::Cursor, StoreError>;

    async fn prepare(
        &mut self,
        cursor: &mut Self::Cursor,
        template: &QueryTemplate,
    ) -> Result<(), StoreError>;

    /// Execute the prepared query and fetch at most one row.
    ///
    /// Returns `true` if a row came back.
    async fn execute(
        &mut self,
        cursor: &mut Self::Cursor,
        username: &str,
        domain: &str,
    ) -> Result<bool, StoreError>;

    async fn close_cursor(&mut self, cursor: Self::Cursor) -> Result<(), StoreError>;

    async fn close(self) -> Result<(), StoreError>;
}
