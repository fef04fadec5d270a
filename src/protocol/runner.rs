use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::domain::{AccessRequest, Decision};
use crate::observability::HelperMetrics;
use crate::session::{decide, Session, SessionState};
use crate::storage::PolicyStore;

/// Where the loop is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Reading and answering request lines
    Running,
    /// Input exhausted, closing the session
    Draining,
    /// Finished
    Done,
}

/// Reads request lines, answers each with one `OK` / `ERR <message>` line.
///
/// Every answer is written and flushed before the next line is read.
pub struct ProtocolLoop<S: PolicyStore> {
    session: Session<S>,
    metrics: HelperMetrics,
    state: LoopState,
}

impl<S: PolicyStore> ProtocolLoop<S> {
    pub fn new(session: Session<S>) -> Self {
        ProtocolLoop {
            session,
            metrics: HelperMetrics::new(),
            state: LoopState::Running,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    pub fn metrics(&self) -> &HelperMetrics {
        &self.metrics
    }

    /// Produce the decision for one raw request line.
    ///
    /// The session is brought up first; if that fails the line is answered
    /// with the session error without being parsed.
    pub async fn handle_line(&mut self, line: &str) -> Decision {
        // ensure_open only reaches the store while closed
        if self.session.state() == SessionState::Closed {
            self.metrics.record_connect_attempt();
        }
        if let Err(e) = self.session.ensure_open().await {
            return e.into();
        }
        if let Err(e) = self.session.ensure_prepared().await {
            return e.into();
        }

        let request = match AccessRequest::parse(line) {
            Ok(request) => request,
            Err(e) => {
                warn!(line = line.trim_end(), "Malformed request line");
                return e.into();
            }
        };

        decide(&mut self.session, request.username, request.domain).await
    }

    /// Serve requests until end of input, then close the session.
    ///
    /// Close failures are written to `writer` as `ERR` lines after the last
    /// answer; they do not make the run fail. Read or write errors do, after
    /// the session has been closed. The loop ends in [`LoopState::Done`]
    /// either way.
    pub async fn run<R, W>(&mut self, mut reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let served = self.serve(&mut reader, &mut writer).await;

        self.state = LoopState::Draining;
        debug!("End of input, closing session");
        let close_errors = self.session.close().await;

        let result = match served {
            Ok(()) => {
                let mut written = Ok(());
                for err in &close_errors {
                    written = write_line(&mut writer, &format!("ERR {err}")).await;
                    if written.is_err() {
                        break;
                    }
                }
                written
            }
            Err(e) => Err(e),
        };

        self.state = LoopState::Done;
        info!(close_failures = close_errors.len(), "Helper finished");
        result
    }

    async fn serve<R, W>(&mut self, reader: &mut R, writer: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                return Ok(());
            }

            let line = String::from_utf8_lossy(&buf);
            let decision = self.handle_line(&line).await;
            self.metrics.record_decision(&decision);

            write_line(writer, &decision.to_string()).await?;
        }
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::AclError;
    use crate::storage::{MockOp, MockStore};

    fn helper(store: &MockStore) -> ProtocolLoop<MockStore> {
        let config = Config::default();
        ProtocolLoop::new(Session::new(
            store.clone(),
            config.credentials(),
            config.query_template().unwrap(),
        ))
    }

    async fn run_lines(store: &MockStore, input: &str) -> (String, HelperMetrics) {
        let mut output = Vec::new();
        let mut helper = helper(store);
        helper.run(input.as_bytes(), &mut output).await.unwrap();
        assert_eq!(helper.state(), LoopState::Done);
        (String::from_utf8(output).unwrap(), helper.metrics().clone())
    }

    #[tokio::test]
    async fn test_blacklisted_user_is_denied() {
        let store = MockStore::new();
        store.block("johndoe", "a.com");

        let (output, _) = run_lines(&store, "https://a.com/p johndoe\n").await;

        assert_eq!(output, "ERR User is not allowed to this domain\n");
    }

    #[tokio::test]
    async fn test_other_user_is_allowed() {
        let store = MockStore::new();
        store.block("johndoe", "a.com");

        let (output, _) = run_lines(&store, "https://a.com/p janedoe\n").await;

        assert_eq!(output, "OK\n");
    }

    #[tokio::test]
    async fn test_one_answer_per_line_in_order() {
        let store = MockStore::new();
        store.block("johndoe", "%facebook.com");

        let input = "https://www.facebook.com/index.html?var=2 johndoe\n\
                     facebook.com/messages/something.html janedoe\n\
                     no-separator\n\
                     \n\
                     http://example.org/ johndoe\n";
        let (output, metrics) = run_lines(&store, input).await;

        assert_eq!(
            output,
            "ERR User is not allowed to this domain\n\
             OK\n\
             ERR Unable to parse request line\n\
             ERR Unable to parse request line\n\
             OK\n"
        );
        assert_eq!(metrics.requests_total, 5);
        assert_eq!(metrics.denied, 1);
        assert_eq!(metrics.errors_by_kind.get("parse"), Some(&2));
        assert_eq!(
            store.executed(),
            vec![
                ("johndoe".to_string(), "www.facebook.com".to_string()),
                ("janedoe".to_string(), "facebook.com".to_string()),
                ("johndoe".to_string(), "example.org".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_last_line_without_newline() {
        let store = MockStore::new();

        let (output, _) = run_lines(&store, "a.com/x janedoe").await;

        assert_eq!(output, "OK\n");
    }

    #[tokio::test]
    async fn test_recovers_after_outage() {
        let store = MockStore::new();
        store.fail(MockOp::Connect);
        let mut helper = helper(&store);

        for _ in 0..3 {
            let decision = helper.handle_line("https://a.com/p janedoe\n").await;
            assert_eq!(
                decision.to_response_line(),
                "ERR Unable to connect to the database\n"
            );
        }
        assert_eq!(store.calls(MockOp::Connect), 3);
        assert!(store.executed().is_empty());

        store.recover(MockOp::Connect);
        assert_eq!(
            helper.handle_line("https://a.com/p janedoe\n").await,
            Decision::Allow
        );
        assert_eq!(helper.session().state(), SessionState::Prepared);
        assert_eq!(helper.metrics().connect_attempts, 4);

        helper.handle_line("https://a.com/p janedoe\n").await;
        assert_eq!(helper.metrics().connect_attempts, 4);
    }

    #[tokio::test]
    async fn test_prepare_failure_answers_line() {
        let store = MockStore::new();
        store.fail(MockOp::Prepare);

        let (output, _) = run_lines(&store, "a.com/x u\na.com/x u\n").await;

        assert_eq!(
            output,
            "ERR Unable to prepare statement\nERR Unable to prepare statement\n"
        );
        assert_eq!(store.calls(MockOp::Prepare), 2);
    }

    #[tokio::test]
    async fn test_cursor_failure_answers_line() {
        let store = MockStore::new();
        store.fail(MockOp::Cursor);

        let (output, _) = run_lines(&store, "a.com/x u\n").await;

        assert_eq!(output, "ERR Unable to create cursor\n");
    }

    #[tokio::test]
    async fn test_execute_failure_is_retried_next_line() {
        let store = MockStore::new();
        let mut helper = helper(&store);

        store.fail(MockOp::Execute);
        assert_eq!(
            helper.handle_line("a.com/x u\n").await,
            Decision::Error(AclError::Execute)
        );

        store.recover(MockOp::Execute);
        assert_eq!(helper.handle_line("a.com/x u\n").await, Decision::Allow);
        assert_eq!(store.calls(MockOp::Connect), 1);
    }

    #[tokio::test]
    async fn test_malformed_line_does_not_reach_store() {
        let store = MockStore::new();
        let mut helper = helper(&store);

        assert_eq!(
            helper.handle_line("https://a.com/p\n").await,
            Decision::Error(AclError::Parse)
        );
        assert_eq!(store.calls(MockOp::Execute), 0);
    }

    #[tokio::test]
    async fn test_empty_input_never_connects() {
        let store = MockStore::new();

        let (output, metrics) = run_lines(&store, "").await;

        assert_eq!(output, "");
        assert_eq!(metrics.requests_total, 0);
        assert_eq!(store.calls(MockOp::Connect), 0);
        assert_eq!(store.calls(MockOp::Close), 0);
    }

    #[tokio::test]
    async fn test_close_failures_reported_after_answers() {
        let store = MockStore::new();
        store.fail(MockOp::CloseCursor);
        store.fail(MockOp::Close);

        let (output, _) = run_lines(&store, "a.com/x u\n").await;

        assert_eq!(
            output,
            "OK\nERR Unable to close prepared cursor\nERR Unable to close connection\n"
        );
        assert_eq!(store.calls(MockOp::CloseCursor), 1);
        assert_eq!(store.calls(MockOp::Close), 1);
    }

    #[tokio::test]
    async fn test_answer_written_before_next_read() {
        let store = MockStore::new();
        store.block("johndoe", "a.com");

        let mock = tokio_test::io::Builder::new()
            .read(b"https://a.com/p johndoe\n")
            .write(b"ERR User is not allowed to this domain\n")
            .read(b"https://a.com/p janedoe\n")
            .write(b"OK\n")
            .build();
        let (reader, writer) = tokio::io::split(mock);

        let mut helper = helper(&store);
        helper
            .run(tokio::io::BufReader::new(reader), writer)
            .await
            .unwrap();

        assert_eq!(helper.state(), LoopState::Done);
        assert_eq!(store.calls(MockOp::Close), 1);
    }

    #[tokio::test]
    async fn test_write_error_is_fatal_and_closes_session() {
        let store = MockStore::new();

        let mock = tokio_test::io::Builder::new()
            .read(b"https://a.com/p janedoe\n")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "proxy went away"))
            .build();
        let (reader, writer) = tokio::io::split(mock);

        let mut helper = helper(&store);
        let err = helper
            .run(tokio::io::BufReader::new(reader), writer)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(helper.state(), LoopState::Done);
        assert_eq!(helper.session().state(), SessionState::Closed);
        assert_eq!(store.calls(MockOp::Close), 1);
    }

    #[tokio::test]
    async fn test_read_error_is_fatal() {
        let store = MockStore::new();

        let mock = tokio_test::io::Builder::new()
            .read_error(io::Error::new(io::ErrorKind::InvalidData, "bad input"))
            .build();
        let (reader, writer) = tokio::io::split(mock);

        let mut helper = helper(&store);
        let err = helper
            .run(tokio::io::BufReader::new(reader), writer)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(helper.state(), LoopState::Done);
        assert_eq!(store.calls(MockOp::Connect), 0);
    }
}
