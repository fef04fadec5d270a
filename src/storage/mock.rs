// src/storage/mock.rs
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::query::QueryTemplate;
use super::traits::{Credentials, PolicyStore, StoreConnection, StoreError};

/// Operations of the store that can be failed or counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Connect,
    Cursor,
    Prepare,
    Execute,
    CloseCursor,
    Close,
}

#[derive(Debug, Default)]
struct MockState {
    rows: Vec<(String, String)>,
    failures: HashMap<MockOp, StoreError>,
    calls: HashMap<MockOp, u32>,
    executed: Vec<(String, String)>,
    open_connections: u32,
}

impl MockState {
    fn call(&mut self, op: MockOp) -> Result<(), StoreError> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// In-memory policy store for testing.
///
/// Clones share state, so a test can keep a handle to flip failures on and
/// off while a session owns another.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a blacklist row. `pattern` uses SQL `LIKE` syntax.
    pub fn block(&self, username: impl Into<String>, pattern: impl Into<String>) {
        self.state
            .lock()
            .rows
            .push((username.into(), pattern.into()));
    }

    /// Make every subsequent `op` fail with a backend error.
    pub fn fail(&self, op: MockOp) {
        self.fail_with(op, StoreError::Backend(format!("injected {op:?} failure")));
    }

    /// Make every subsequent `op` fail with `err`.
    pub fn fail_with(&self, op: MockOp, err: StoreError) {
        self.state.lock().failures.insert(op, err);
    }

    /// Let `op` succeed again.
    pub fn recover(&self, op: MockOp) {
        self.state.lock().failures.remove(&op);
    }

    /// Number of times `op` was attempted (for assertions).
    pub fn calls(&self, op: MockOp) -> u32 {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Bound `(username, domain)` pairs, in execution order.
    pub fn executed(&self) -> Vec<(String, String)> {
        self.state.lock().executed.clone()
    }

    /// Connections handed out and not yet closed or dropped.
    pub fn open_connections(&self) -> u32 {
        self.state.lock().open_connections
    }
}

#[async_trait]
impl PolicyStore for MockStore {
    type Connection = MockConnection;

    async fn connect(&self, _credentials: &Credentials) -> Result<Self::Connection, StoreError> {
        let mut state = self.state.lock();
        state.call(MockOp::Connect)?;
        state.open_connections += 1;

        Ok(MockConnection {
            state: Arc::clone(&self.state),
        })
    }
}

/// Connection handed out by [`MockStore`].
#[derive(Debug)]
pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.open_connections = state.open_connections.saturating_sub(1);
    }
}

#[derive(Debug, Default)]
pub struct MockCursor {
    prepared: Option<String>,
}

#[async_trait]
impl StoreConnection for MockConnection {
    type Cursor = MockCursor;

    async fn cursor(&mut self) -> Result<Self::Cursor, StoreError> {
        self.state.lock().call(MockOp::Cursor)?;
        Ok(MockCursor::default())
    }

    async fn prepare(
        &mut self,
        cursor: &mut Self::Cursor,
        template: &QueryTemplate,
    ) -> Result<(), StoreError> {
        self.state.lock().call(MockOp::Prepare)?;
        cursor.prepared = Some(template.sql().to_string());
        Ok(())
    }

    async fn execute(
        &mut self,
        cursor: &mut Self::Cursor,
        username: &str,
        domain: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        state.call(MockOp::Execute)?;

        if cursor.prepared.is_none() {
            return Err(StoreError::Backend("statement not prepared".to_string()));
        }

        state
            .executed
            .push((username.to_string(), domain.to_string()));

        Ok(state
            .rows
            .iter()
            .any(|(user, pattern)| user == username && like(domain, pattern)))
    }

    async fn close_cursor(&mut self, _cursor: Self::Cursor) -> Result<(), StoreError> {
        self.state.lock().call(MockOp::CloseCursor)
    }

    async fn close(self) -> Result<(), StoreError> {
        self.state.lock().call(MockOp::Close)
    }
}

/// SQL `LIKE`: `%` matches any run, `_` one character, `\` escapes.
/// Case-sensitive, like PostgreSQL.
pub fn like(value: &str, pattern: &str) -> bool {
    let value: Vec<char> = value.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    like_from(&value, &pattern)
}

fn like_from(value: &[char], pattern: &[char]) -> bool {
    match pattern.split_first() {
        None => value.is_empty(),
        Some(('%', rest)) => (0..=value.len()).any(|skip| like_from(&value[skip..], rest)),
        Some(('_', rest)) => !value.is_empty() && like_from(&value[1..], rest),
        Some(('\\', rest)) if !rest.is_empty() => {
            value.first() == rest.first() && like_from(&value[1..], &rest[1..])
        }
        Some((c, rest)) => value.first() == Some(c) && like_from(&value[1..], rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            host: "localhost".to_string(),
            port: 5432,
            database: "squid".to_string(),
            user: "squid".to_string(),
            password: "secret".to_string(),
        }
    }

    fn template() -> QueryTemplate {
        use crate::storage::Identifier;
        QueryTemplate::new(
            &Identifier::qualified("blocked").unwrap(),
            &Identifier::column("username").unwrap(),
            &Identifier::column("domain").unwrap(),
        )
    }

    #[test]
    fn test_like_matching() {
        assert!(like("a.com", "a.com"));
        assert!(like("www.a.com", "%.a.com"));
        assert!(!like("a.com", "%.a.com"));
        assert!(like("a.com", "_.com"));
        assert!(!like("ab.com", "_.com"));
        assert!(like("anything", "%"));
        assert!(!like("A.com", "a.com"));
        assert!(like("100%", "100\\%"));
        assert!(!like("1000", "100\\%"));
    }

    #[tokio::test]
    async fn test_blacklist_lookup() {
        let store = MockStore::new();
        store.block("johndoe", "%facebook.com");

        let mut conn = store.connect(&credentials()).await.unwrap();
        let mut cursor = conn.cursor().await.unwrap();
        conn.prepare(&mut cursor, &template()).await.unwrap();

        assert!(conn
            .execute(&mut cursor, "johndoe", "www.facebook.com")
            .await
            .unwrap());
        assert!(!conn
            .execute(&mut cursor, "janedoe", "www.facebook.com")
            .await
            .unwrap());
        assert_eq!(store.executed().len(), 2);
    }

    #[tokio::test]
    async fn test_execute_requires_prepare() {
        let store = MockStore::new();
        let mut conn = store.connect(&credentials()).await.unwrap();
        let mut cursor = conn.cursor().await.unwrap();

        assert!(conn.execute(&mut cursor, "u", "d").await.is_err());
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MockStore::new();
        store.fail(MockOp::Connect);

        assert!(store.connect(&credentials()).await.is_err());
        assert_eq!(store.open_connections(), 0);

        store.recover(MockOp::Connect);
        let conn = store.connect(&credentials()).await.unwrap();
        assert_eq!(store.calls(MockOp::Connect), 2);
        assert_eq!(store.open_connections(), 1);

        drop(conn);
        assert_eq!(store.open_connections(), 0);
    }
}
