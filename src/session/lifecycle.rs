use tracing::{debug, warn};

use crate::domain::AclError;
use crate::storage::{Credentials, PolicyStore, QueryTemplate, StoreConnection};

type CursorOf<S> = <<S as PolicyStore>::Connection as StoreConnection>::Cursor;

/// Readiness of the session, derived from which handles are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection
    Closed,
    /// Connected, query not prepared
    Open,
    /// Connected with the blacklist query prepared
    Prepared,
}

/// The helper's relationship with the policy store.
///
/// Nothing happens at construction time. Every request calls
/// [`ensure_open`](Self::ensure_open) and
/// [`ensure_prepared`](Self::ensure_prepared), which are no-ops once the
/// step has succeeded and retry it otherwise, so an outage heals on the
/// first request after the store comes back.
///
/// Invariant: a cursor is only held while a connection is held.
pub struct Session<S: PolicyStore> {
    store: S,
    credentials: Credentials,
    template: QueryTemplate,
    connection: Option<S::Connection>,
    cursor: Option<CursorOf<S>>,
}

impl<S: PolicyStore> Session<S> {
    pub fn new(store: S, credentials: Credentials, template: QueryTemplate) -> Self {
        Session {
            store,
            credentials,
            template,
            connection: None,
            cursor: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.connection, &self.cursor) {
            (None, _) => SessionState::Closed,
            (Some(_), None) => SessionState::Open,
            (Some(_), Some(_)) => SessionState::Prepared,
        }
    }

    /// Connect if there is no connection yet.
    pub async fn ensure_open(&mut self) -> Result<(), AclError> {
        if self.connection.is_some() {
            return Ok(());
        }

        match self.store.connect(&self.credentials).await {
            Ok(conn) => {
                debug!(
                    host = %self.credentials.host,
                    database = %self.credentials.database,
                    "Connected to policy store"
                );
                self.connection = Some(conn);
                Ok(())
            }
            Err(e) => {
                warn!(
                    error = %e,
                    host = %self.credentials.host,
                    database = %self.credentials.database,
                    "Policy store connection failed"
                );
                Err(AclError::Connect)
            }
        }
    }

    /// Create a cursor and prepare the blacklist query if that has not
    /// happened on the current connection.
    ///
    /// On failure the cursor is released again and the connection is kept,
    /// so the next call starts over from cursor creation. If the store
    /// reports the connection as lost, it is dropped as well and the next
    /// request reconnects.
    pub async fn ensure_prepared(&mut self) -> Result<(), AclError> {
        if self.cursor.is_some() {
            return Ok(());
        }

        let conn = self.connection.as_mut().ok_or(AclError::NotConnected)?;

        let mut cursor = match conn.cursor().await {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!(error = %e, "Cursor creation failed");
                if e.is_connection_lost() {
                    self.discard_connection();
                }
                return Err(AclError::CursorCreate);
            }
        };

        if let Err(e) = conn.prepare(&mut cursor, &self.template).await {
            warn!(error = %e, sql = self.template.sql(), "Statement preparation failed");
            if e.is_connection_lost() {
                drop(cursor);
                self.discard_connection();
            } else if let Err(e) = conn.close_cursor(cursor).await {
                debug!(error = %e, "Releasing unprepared cursor failed");
            }
            return Err(AclError::Prepare);
        }

        debug!(sql = self.template.sql(), "Prepared blacklist query");
        self.cursor = Some(cursor);
        Ok(())
    }

    /// Run the prepared query for one `(username, domain)` pair.
    ///
    /// Returns whether a blacklist row matched. A failure leaves the
    /// session as it was, except when the store reports the connection as
    /// lost: then both handles are dropped so the next request reconnects.
    pub(crate) async fn execute(&mut self, username: &str, domain: &str) -> Result<bool, AclError> {
        let (Some(conn), Some(cursor)) = (self.connection.as_mut(), self.cursor.as_mut()) else {
            return Err(AclError::Execute);
        };

        match conn.execute(cursor, username, domain).await {
            Ok(found) => Ok(found),
            Err(e) => {
                warn!(error = %e, username, domain, "Blacklist query failed");
                if e.is_connection_lost() {
                    self.discard_connection();
                }
                Err(AclError::Execute)
            }
        }
    }

    /// Forget both handles without talking to the store; the connection is
    /// already gone. The next request reconnects.
    fn discard_connection(&mut self) {
        debug!("Discarding lost policy store connection");
        self.cursor = None;
        self.connection = None;
    }

    /// Release the cursor, then the connection.
    ///
    /// Both steps are attempted even if the first fails, and the session
    /// ends up `Closed` either way. Returns the failures in order.
    pub async fn close(&mut self) -> Vec<AclError> {
        let mut errors = Vec::new();

        let cursor = self.cursor.take();
        if let (Some(cursor), Some(conn)) = (cursor, self.connection.as_mut()) {
            if let Err(e) = conn.close_cursor(cursor).await {
                warn!(error = %e, "Closing prepared cursor failed");
                errors.push(AclError::CloseCursor);
            }
        }

        if let Some(conn) = self.connection.take() {
            if let Err(e) = conn.close().await {
                warn!(error = %e, "Closing policy store connection failed");
                errors.push(AclError::CloseConnection);
            }
        }

        debug!(failures = errors.len(), "Session closed");
        errors
    }
}
