// src/storage/postgres.rs
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection, PgStatement};
use sqlx::{Connection, Executor, Statement};

use super::query::QueryTemplate;
use super::traits::{Credentials, PolicyStore, StoreConnection, StoreError};

/// PostgreSQL implementation of the PolicyStore trait.
///
/// Each helper instance holds a single connection; the proxy runs as many
/// instances as it needs, so there is no pool here.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresStore;

impl PostgresStore {
    pub fn new() -> Self {
        PostgresStore
    }
}

#[async_trait]
impl PolicyStore for PostgresStore {
    type Connection = PostgresConnection;

    async fn connect(&self, credentials: &Credentials) -> Result<Self::Connection, StoreError> {
        let options = PgConnectOptions::new()
            .host(&credentials.host)
            .port(credentials.port)
            .database(&credentials.database)
            .username(&credentials.user)
            .password(&credentials.password)
            .application_name("domain-acl");

        let conn = PgConnection::connect_with(&options).await?;

        Ok(PostgresConnection { conn })
    }
}

/// A live PostgreSQL connection.
pub struct PostgresConnection {
    conn: PgConnection,
}

/// Holds the server-side prepared statement once `prepare` succeeded.
#[derive(Debug, Default)]
pub struct PostgresCursor {
    statement: Option<PgStatement<'static>>,
}

#[async_trait]
impl StoreConnection for PostgresConnection {
    type Cursor = PostgresCursor;

    async fn cursor(&mut self) -> Result<Self::Cursor, StoreError> {
        // Statements live on the connection; make sure it is still there.
        self.conn.ping().await?;
        Ok(PostgresCursor::default())
    }

    async fn prepare(
        &mut self,
        cursor: &mut Self::Cursor,
        template: &QueryTemplate,
    ) -> Result<(), StoreError> {
        let statement = Executor::prepare(&mut self.conn, template.sql()).await?;
        cursor.statement = Some(Statement::to_owned(&statement));
        Ok(())
    }

    async fn execute(
        &mut self,
        cursor: &mut Self::Cursor,
        username: &str,
        domain: &str,
    ) -> Result<bool, StoreError> {
        let statement = cursor
            .statement
            .as_ref()
            .ok_or_else(|| StoreError::Backend("statement not prepared".to_string()))?;

        let row = statement
            .query()
            .bind(username)
            .bind(domain)
            .fetch_optional(&mut self.conn)
            .await?;

        Ok(row.is_some())
    }

    async fn close_cursor(&mut self, cursor: Self::Cursor) -> Result<(), StoreError> {
        drop(cursor);
        self.conn.clear_cached_statements().await?;
        Ok(())
    }

    async fn close(self) -> Result<(), StoreError> {
        self.conn.close().await?;
        Ok(())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::ConnectionLost(err.to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
