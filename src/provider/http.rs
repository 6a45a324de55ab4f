//! HTTP client factory shared by the vendor backends

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use super::{
    AnthropicClient, ClientFactory, GeminiClient, LlmClient, LlmError, MockClient, OpenAiClient,
};

/// TCP connect timeout; request deadlines come from the task timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// API keys per vendor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiKeys {
    pub anthropic: Option<String>,
    pub openai: Option<String>,
    pub google: Option<String>,
}

/// Builds real vendor clients over one shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    http: reqwest::Client,
    keys: ApiKeys,
    base_urls: HashMap<String, String>,
}

impl HttpClientFactory {
    pub fn new(keys: ApiKeys) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("skillrun/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            keys,
            base_urls: HashMap::new(),
        }
    }

    /// Point a vendor at another base URL (proxies, tests)
    pub fn with_base_url(mut self, vendor: impl Into<String>, url: impl Into<String>) -> Self {
        self.base_urls.insert(vendor.into(), url.into());
        self
    }

    fn key(&self, value: &Option<String>, env_var: &str) -> Result<String, LlmError> {
        value
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .ok_or_else(|| LlmError::MissingApiKey {
                env_var: env_var.to_string(),
            })
    }

    fn base_url(&self, vendor: &str) -> Option<String> {
        self.base_urls.get(vendor).cloned()
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(&self, vendor: &str, model: &str) -> Result<Arc<dyn LlmClient>, LlmError> {
        let client: Arc<dyn LlmClient> = match vendor {
            "anthropic" => {
                let key = self.key(&self.keys.anthropic, "ANTHROPIC_API_KEY")?;
                let mut c = AnthropicClient::new(self.http.clone(), key, model);
                if let Some(url) = self.base_url(vendor) {
                    c = c.with_base_url(url);
                }
                Arc::new(c)
            }
            "openai" => {
                let key = self.key(&self.keys.openai, "OPENAI_API_KEY")?;
                let mut c = OpenAiClient::new(self.http.clone(), key, model);
                if let Some(url) = self.base_url(vendor) {
                    c = c.with_base_url(url);
                }
                Arc::new(c)
            }
            "gemini" => {
                let key = self.key(&self.keys.google, "GOOGLE_API_KEY")?;
                let mut c = GeminiClient::new(self.http.clone(), key, model);
                if let Some(url) = self.base_url(vendor) {
                    c = c.with_base_url(url);
                }
                Arc::new(c)
            }
            "mock" => Arc::new(MockClient::new().for_target("mock", model)),
            other => {
                return Err(LlmError::UnknownVendor {
                    vendor: other.to_string(),
                })
            }
        };
        Ok(client)
    }
}

/// POST a JSON body and decode a JSON reply, mapping failures to `LlmError::Client`
pub(crate) async fn post_json<B: Serialize, R: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    vendor: &str,
    body: &B,
) -> Result<R, LlmError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::client(vendor, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        error!(vendor, status = %status, error = %text, "Vendor API error");
        return Err(LlmError::client(vendor, format!("{}: {}", status, text)));
    }

    response
        .json::<R>()
        .await
        .map_err(|e| LlmError::client(vendor, format!("invalid response body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_vendor_is_rejected() {
        let factory = HttpClientFactory::new(ApiKeys::default());
        let err = factory.create("cohere", "command").err().unwrap();
        assert_eq!(
            err,
            LlmError::UnknownVendor {
                vendor: "cohere".to_string()
            }
        );
    }

    #[test]
    fn empty_key_counts_as_missing() {
        let keys = ApiKeys {
            openai: Some(String::new()),
            ..Default::default()
        };
        let err = HttpClientFactory::new(keys).create("openai", "gpt-4o").err().unwrap();
        assert_eq!(err.to_string(), "OPENAI_API_KEY not configured");
    }

    #[test]
    fn builds_clients_with_keys() {
        let keys = ApiKeys {
            anthropic: Some("a".into()),
            openai: Some("o".into()),
            google: Some("g".into()),
        };
        let factory = HttpClientFactory::new(keys);
        for vendor in ["anthropic", "openai", "gemini", "mock"] {
            let client = factory.create(vendor, "m").ok().unwrap();
            assert_eq!(client.vendor(), vendor);
            assert_eq!(client.model(), "m");
        }
    }
}
