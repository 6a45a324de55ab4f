//! Mock client for testing
//!
//! Replies are scripted per instructions string and consumed FIFO; when a
//! script runs dry the default reply is used. Every call is logged with start
//! and end sequence numbers from one shared counter, so tests can assert on
//! ordering (e.g. that one call finished before another started).
//!
//! Clones share the script and the log. `for_target` produces a view that
//! reports a different vendor/model while still sharing both.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};

use super::{extract_json, ClientFactory, Extraction, LlmClient, LlmError, TokenUsage};

/// One scripted reply
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// Successful extraction (must be a JSON object to parse)
    Data(Value),
    /// Vendor-reported failure
    Error(String),
    /// Raw model text that is run through JSON extraction
    Malformed(String),
    /// Never answers; only a timeout ends the call
    Hang,
}

/// A recorded call
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub instructions: String,
    pub document: String,
    pub vendor: String,
    pub model: String,
    pub temperature: f32,
    /// Sequence number taken when the call started
    pub started: u64,
    /// Sequence number taken when the call returned (None while in flight or hung)
    pub finished: Option<u64>,
}

#[derive(Debug)]
struct MockState {
    scripts: Mutex<HashMap<String, VecDeque<MockReply>>>,
    latencies: Mutex<HashMap<String, Duration>>,
    default_reply: Mutex<MockReply>,
    default_latency: Mutex<Duration>,
    usage: Mutex<TokenUsage>,
    calls: Mutex<Vec<MockCall>>,
    seq: AtomicU64,
}

/// Scripted [`LlmClient`]
#[derive(Debug, Clone)]
pub struct MockClient {
    state: Arc<MockState>,
    vendor: String,
    model: String,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    /// New mock answering `{}` with no latency
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                scripts: Mutex::new(HashMap::new()),
                latencies: Mutex::new(HashMap::new()),
                default_reply: Mutex::new(MockReply::Data(json!({}))),
                default_latency: Mutex::new(Duration::ZERO),
                usage: Mutex::new(TokenUsage::new(10, 5)),
                calls: Mutex::new(Vec::new()),
                seq: AtomicU64::new(0),
            }),
            vendor: "mock".to_string(),
            model: "mock-model".to_string(),
        }
    }

    /// Same script and log, reported under another vendor/model
    pub fn for_target(&self, vendor: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            state: Arc::clone(&self.state),
            vendor: vendor.into(),
            model: model.into(),
        }
    }

    /// Queue replies for calls whose instructions equal `instructions`
    pub fn script(
        self,
        instructions: impl Into<String>,
        replies: impl IntoIterator<Item = MockReply>,
    ) -> Self {
        self.push(instructions, replies);
        self
    }

    /// Queue more replies on a shared handle
    pub fn push(&self, instructions: impl Into<String>, replies: impl IntoIterator<Item = MockReply>) {
        self.state
            .scripts
            .lock()
            .entry(instructions.into())
            .or_default()
            .extend(replies);
    }

    /// Reply used when no script entry is queued
    pub fn with_default(self, reply: MockReply) -> Self {
        *self.state.default_reply.lock() = reply;
        self
    }

    /// Latency applied to every call without a specific latency
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.state.default_latency.lock() = latency;
        self
    }

    /// Latency for calls with these instructions
    pub fn with_latency_for(self, instructions: impl Into<String>, latency: Duration) -> Self {
        self.state
            .latencies
            .lock()
            .insert(instructions.into(), latency);
        self
    }

    /// Usage reported by successful calls
    pub fn with_usage(self, usage: TokenUsage) -> Self {
        *self.state.usage.lock() = usage;
        self
    }

    /// All calls so far, in start order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.calls.lock().clone()
    }

    /// Calls made with these instructions
    pub fn calls_for(&self, instructions: &str) -> Vec<MockCall> {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|c| c.instructions == instructions)
            .cloned()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().len()
    }

    fn next_reply(&self, instructions: &str) -> MockReply {
        let scripted = self
            .state
            .scripts
            .lock()
            .get_mut(instructions)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| self.state.default_reply.lock().clone())
    }

    fn latency(&self, instructions: &str) -> Duration {
        self.state
            .latencies
            .lock()
            .get(instructions)
            .copied()
            .unwrap_or_else(|| *self.state.default_latency.lock())
    }

    fn begin(&self, instructions: &str, document: &str, temperature: f32) -> usize {
        let started = self.state.seq.fetch_add(1, Ordering::SeqCst);
        let mut calls = self.state.calls.lock();
        calls.push(MockCall {
            instructions: instructions.to_string(),
            document: document.to_string(),
            vendor: self.vendor.clone(),
            model: self.model.clone(),
            temperature,
            started,
            finished: None,
        });
        calls.len() - 1
    }

    fn finish(&self, index: usize) {
        let finished = self.state.seq.fetch_add(1, Ordering::SeqCst);
        if let Some(call) = self.state.calls.lock().get_mut(index) {
            call.finished = Some(finished);
        }
    }
}

#[async_trait]
impl LlmClient for MockClient {
    fn vendor(&self) -> &str {
        &self.vendor
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn extract_structured(
        &self,
        instructions: &str,
        document: &str,
        temperature: f32,
    ) -> Result<Extraction, LlmError> {
        let index = self.begin(instructions, document, temperature);
        let reply = self.next_reply(instructions);

        let latency = self.latency(instructions);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let outcome = match reply {
            MockReply::Data(value) => extract_json(&value.to_string()),
            MockReply::Malformed(text) => extract_json(&text),
            MockReply::Error(message) => Err(LlmError::client(&self.vendor, message)),
            MockReply::Hang => {
                futures::future::pending::<()>().await;
                Err(LlmError::client(&self.vendor, "unreachable"))
            }
        };

        self.finish(index);
        let usage = *self.state.usage.lock();
        outcome.map(|data| Extraction::new(data, usage))
    }
}

/// Factory handing out views of one shared [`MockClient`]
#[derive(Debug, Default)]
pub struct MockClientFactory {
    template: MockClient,
    created: AtomicUsize,
}

impl MockClientFactory {
    pub fn new(template: MockClient) -> Self {
        Self {
            template,
            created: AtomicUsize::new(0),
        }
    }

    /// Number of clients built so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MockClientFactory {
    fn create(&self, vendor: &str, model: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.template.for_target(vendor, model)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_reply_is_empty_object() {
        let mock = MockClient::new();
        let out = mock.extract_structured("x", "doc", 0.0).await.unwrap();
        assert!(out.data.is_empty());
        assert_eq!(out.usage, TokenUsage::new(10, 5));
    }

    #[tokio::test]
    async fn scripts_are_consumed_in_order() {
        let mock = MockClient::new().script(
            "extract",
            [
                MockReply::Error("rate limited".into()),
                MockReply::Data(json!({"total": 1})),
            ],
        );

        let first = mock.extract_structured("extract", "doc", 0.0).await;
        assert_eq!(
            first.unwrap_err().to_string(),
            "mock API error: rate limited"
        );

        let second = mock.extract_structured("extract", "doc", 0.0).await.unwrap();
        assert_eq!(second.data["total"], json!(1));

        let third = mock.extract_structured("extract", "doc", 0.0).await.unwrap();
        assert!(third.data.is_empty());
        assert_eq!(mock.calls_for("extract").len(), 3);
    }

    #[tokio::test]
    async fn malformed_text_fails_to_parse() {
        let mock = MockClient::new().with_default(MockReply::Malformed("not json".into()));
        let err = mock.extract_structured("x", "doc", 0.0).await.unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn views_share_the_call_log() {
        let mock = MockClient::new();
        let view = mock.for_target("openai", "gpt-4o");
        view.extract_structured("x", "doc", 0.5).await.unwrap();

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].vendor, "openai");
        assert_eq!(calls[0].model, "gpt-4o");
        assert_eq!(calls[0].started, 0);
        assert_eq!(calls[0].finished, Some(1));
    }
}
