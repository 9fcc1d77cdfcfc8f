//! Mock backend for testing without a live provider.
//!
//! [`MockBackend`] plays back a scripted sequence of outcomes (successful
//! replies and transport failures) and records what it was asked, so tests
//! can assert how the generator's conversation grew between attempts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::Client;

use super::{Backend, CompletionRequest, CompletionResponse};
use crate::error::{GenError, Result};

/// One scripted backend outcome.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this text as the completion.
    Reply(String),
    /// Fail with an HTTP 503 carrying this body.
    Fail(String),
}

/// A test backend that plays back canned outcomes in order.
///
/// Cycles back to the beginning when all outcomes have been consumed.
/// Records the total call count and the history length of every request it
/// receives.
#[derive(Debug)]
pub struct MockBackend {
    outcomes: Vec<MockOutcome>,
    index: AtomicUsize,
    calls: AtomicUsize,
    history_lens: Mutex<Vec<usize>>,
}

impl MockBackend {
    /// Create a mock backend with the given outcome script.
    pub fn new(outcomes: Vec<MockOutcome>) -> Self {
        assert!(
            !outcomes.is_empty(),
            "MockBackend requires at least one outcome"
        );
        Self {
            outcomes,
            index: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            history_lens: Mutex::new(Vec::new()),
        }
    }

    /// A mock that replies with the given texts, in order.
    pub fn replies(texts: Vec<&str>) -> Self {
        Self::new(texts.into_iter().map(|t| MockOutcome::Reply(t.into())).collect())
    }

    /// A mock that always returns the same reply.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self::new(vec![MockOutcome::Reply(text.into())])
    }

    /// A mock that always fails at the transport level.
    pub fn failing(body: impl Into<String>) -> Self {
        Self::new(vec![MockOutcome::Fail(body.into())])
    }

    /// Total number of `complete` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// History length (message count) of each request received, in order.
    pub fn history_lens(&self) -> Vec<usize> {
        self.history_lens.lock().expect("mock lock poisoned").clone()
    }

    fn next_outcome(&self) -> MockOutcome {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.outcomes.len();
        self.outcomes[idx].clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn complete(
        &self,
        _client: &Client,
        _base_url: &str,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.history_lens
            .lock()
            .expect("mock lock poisoned")
            .push(request.history.len());

        match self.next_outcome() {
            MockOutcome::Reply(text) => Ok(CompletionResponse {
                text,
                status: 200,
                metadata: None,
            }),
            MockOutcome::Fail(body) => Err(GenError::Http {
                status: 503,
                body,
                retry_after: None,
            }),
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenConfig;
    use crate::history::{Message, Role};

    fn request(history: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: "test".into(),
            system_prompt: None,
            history,
            config: GenConfig::default(),
        }
    }

    #[tokio::test]
    async fn cycles_outcomes() {
        let mock = MockBackend::replies(vec!["first", "second"]);
        let client = Client::new();
        let req = request(vec![Message::new(Role::User, "hi")]);

        let r1 = mock.complete(&client, "http://unused", &req).await.unwrap();
        let r2 = mock.complete(&client, "http://unused", &req).await.unwrap();
        let r3 = mock.complete(&client, "http://unused", &req).await.unwrap();
        assert_eq!(r1.text, "first");
        assert_eq!(r2.text, "second");
        assert_eq!(r3.text, "first");
        assert_eq!(mock.calls(), 3);
    }

    #[tokio::test]
    async fn failing_mock_returns_http_error() {
        let mock = MockBackend::failing("down for maintenance");
        let client = Client::new();
        let req = request(vec![Message::new(Role::User, "hi")]);

        let err = mock
            .complete(&client, "http://unused", &req)
            .await
            .unwrap_err();
        assert!(matches!(err, GenError::Http { status: 503, .. }));
    }

    #[tokio::test]
    async fn records_history_lengths() {
        let mock = MockBackend::fixed("ok");
        let client = Client::new();

        let one = request(vec![Message::new(Role::User, "a")]);
        let three = request(vec![
            Message::new(Role::User, "a"),
            Message::new(Role::Assistant, "b"),
            Message::new(Role::User, "c"),
        ]);
        mock.complete(&client, "http://unused", &one).await.unwrap();
        mock.complete(&client, "http://unused", &three).await.unwrap();

        assert_eq!(mock.history_lens(), vec![1, 3]);
    }
}
