//! # Provider Abstraction Layer
//!
//! The one LLM operation the engine needs, plus the plumbing around it.
//!
//! - [`LlmClient`] - `extract_structured(instructions, document, temperature)`
//! - [`ClientFactory`] - builds a client for a (vendor, model) pair
//! - [`ClientPool`] - shared cache of clients keyed by (vendor, model)
//! - [`VendorDefaults`] - per-vendor default model lookup
//!
//! ## Available Backends
//!
//! | Vendor | API | Key |
//! |--------|-----|-----|
//! | `anthropic` | Messages API | `ANTHROPIC_API_KEY` |
//! | `openai` | Chat Completions (`json_object`) | `OPENAI_API_KEY` |
//! | `gemini` | `generateContent` | `GOOGLE_API_KEY` |
//! | `mock` | none | none, answers `{}` |
//!
//! Backends are stateless after construction, so one client instance is shared
//! by every concurrently running task that resolves to the same pair.

mod anthropic;
mod defaults;
mod gemini;
mod http;
mod json;
pub mod mock;
mod openai;

use std::ops::{Add, AddAssign};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

pub use anthropic::AnthropicClient;
pub use defaults::VendorDefaults;
pub use gemini::GeminiClient;
pub use http::{ApiKeys, HttpClientFactory};
pub use json::{extract_json, JSON_ONLY_SUFFIX};
pub use mock::{MockClient, MockClientFactory, MockReply};
pub use openai::OpenAiClient;

/// Vendor names understood by [`HttpClientFactory`]
pub const KNOWN_VENDORS: &[&str] = &["anthropic", "openai", "gemini", "mock"];

// ============================================================================
// ERRORS
// ============================================================================

/// Failure of a single LLM call
///
/// These never reach the engine as errors: the task runner records their
/// message in `TaskResult::error`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{vendor} API error: {message}")]
    Client { vendor: String, message: String },

    #[error("Failed to parse JSON response: {0}")]
    MalformedOutput(String),

    #[error("{env_var} not configured")]
    MissingApiKey { env_var: String },

    #[error("Unknown vendor: {vendor}")]
    UnknownVendor { vendor: String },
}

impl LlmError {
    pub fn client(vendor: &str, message: impl Into<String>) -> Self {
        LlmError::Client {
            vendor: vendor.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// TOKEN USAGE
// ============================================================================

/// Token counts reported by a vendor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input,
            output,
            total: input + output,
        }
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            input: self.input + rhs.input,
            output: self.output + rhs.output,
            total: self.total + rhs.total,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: TokenUsage) {
        *self = *self + rhs;
    }
}

// ============================================================================
// CLIENT TRAIT
// ============================================================================

/// Parsed structured output and the usage it cost
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub data: Map<String, Value>,
    pub usage: TokenUsage,
}

impl Extraction {
    pub fn new(data: Map<String, Value>, usage: TokenUsage) -> Self {
        Self { data, usage }
    }
}

/// Structured extraction against one vendor/model
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Vendor name (e.g. "anthropic")
    fn vendor(&self) -> &str;

    /// Model this client sends requests to
    fn model(&self) -> &str;

    /// Run `instructions` over `document` and parse the reply as a JSON object
    async fn extract_structured(
        &self,
        instructions: &str,
        document: &str,
        temperature: f32,
    ) -> Result<Extraction, LlmError>;
}

/// Builds clients for the pool
pub trait ClientFactory: Send + Sync {
    fn create(&self, vendor: &str, model: &str) -> Result<Arc<dyn LlmClient>, LlmError>;
}

// ============================================================================
// CLIENT POOL
// ============================================================================

/// Shared client cache keyed by (vendor, model)
#[derive(Clone)]
pub struct ClientPool {
    factory: Arc<dyn ClientFactory>,
    clients: Arc<DashMap<(String, String), Arc<dyn LlmClient>>>,
}

impl ClientPool {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            clients: Arc::new(DashMap::new()),
        }
    }

    /// Get or create a cached client (atomic via the entry API)
    pub fn get(&self, vendor: &str, model: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
        match self.clients.entry((vendor.to_string(), model.to_string())) {
            Entry::Occupied(e) => Ok(Arc::clone(e.get())),
            Entry::Vacant(e) => {
                let client = self.factory.create(vendor, model)?;
                debug!(vendor, model, "Created LLM client");
                e.insert(Arc::clone(&client));
                Ok(client)
            }
        }
    }

    /// Number of cached clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn clear(&self) {
        self.clients.clear();
    }
}

impl std::fmt::Debug for ClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("clients", &self.clients.len())
            .finish()
    }
}
