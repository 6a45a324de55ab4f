//! Per-vendor default model lookup

use std::collections::HashMap;

use tracing::warn;

/// Vendor used when an unknown vendor has no configured model
pub const FALLBACK_VENDOR: &str = "anthropic";

/// Default model per vendor, consulted when neither the task nor the request names one
#[derive(Debug, Clone, PartialEq)]
pub struct VendorDefaults {
    models: HashMap<String, String>,
}

impl Default for VendorDefaults {
    fn default() -> Self {
        let models = [
            ("anthropic", "claude-sonnet-4-20250514"),
            ("openai", "gpt-4o"),
            ("gemini", "gemini-3-flash-preview"),
            ("mock", "mock-model"),
        ]
        .into_iter()
        .map(|(v, m)| (v.to_string(), m.to_string()))
        .collect();
        Self { models }
    }
}

impl VendorDefaults {
    pub fn new(models: HashMap<String, String>) -> Self {
        Self { models }
    }

    /// Override one vendor's model
    pub fn with_model(mut self, vendor: impl Into<String>, model: impl Into<String>) -> Self {
        self.models.insert(vendor.into(), model.into());
        self
    }

    /// Default model for `vendor`, falling back to the anthropic default
    pub fn model_for(&self, vendor: &str) -> String {
        if let Some(model) = self.models.get(vendor) {
            return model.clone();
        }
        warn!(vendor, fallback = FALLBACK_VENDOR, "No default model for vendor");
        self.models
            .get(FALLBACK_VENDOR)
            .cloned()
            .unwrap_or_else(|| "claude-sonnet-4-20250514".to_string())
    }
}
