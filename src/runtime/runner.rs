//! TaskRunner - one task, bounded retries, linear backoff
//!
//! Never fails past its boundary: timeouts, vendor errors and malformed output
//! all end up in a failed `TaskResult`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use super::result::TaskResult;
use crate::ast::TaskDefinition;
use crate::provider::{ClientPool, LlmError, VendorDefaults};

/// Default backoff unit
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct TaskRunner {
    pool: ClientPool,
    defaults: Arc<VendorDefaults>,
    base_delay: Duration,
}

impl TaskRunner {
    pub fn new(pool: ClientPool, defaults: VendorDefaults) -> Self {
        Self {
            pool,
            defaults: Arc::new(defaults),
            base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }

    /// Set the backoff unit (attempt N waits N units before attempt N+1)
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay after the failed attempt with zero-based index `attempt`
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }

    /// Effective (vendor, model) for a task
    pub fn resolve_target(
        &self,
        task: &TaskDefinition,
        default_vendor: &str,
        default_model: Option<&str>,
    ) -> (String, String) {
        let vendor = task.effective_vendor(default_vendor).to_string();
        let model = task
            .preferred_model
            .as_deref()
            .filter(|m| !m.is_empty())
            .or(default_model.filter(|m| !m.is_empty()))
            .map(str::to_string)
            .unwrap_or_else(|| self.defaults.model_for(&vendor));
        (vendor, model)
    }

    /// Run a task to success or until its retry budget is spent
    #[instrument(name = "task", skip_all, fields(task_id = %task.id, group = task.group))]
    pub async fn run(
        &self,
        task: &TaskDefinition,
        document: &str,
        default_vendor: &str,
        default_model: Option<&str>,
    ) -> TaskResult {
        let (vendor, model) = self.resolve_target(task, default_vendor, default_model);
        let started = Instant::now();
        let base = TaskResult::failed(&task.id, String::new())
            .with_group(task.group)
            .with_target(&vendor, &model);

        let client = match self.pool.get(&vendor, &model) {
            Ok(client) => client,
            Err(e) => {
                warn!(vendor = %vendor, model = %model, error = %e, "No client for task");
                return TaskResult {
                    error: Some(e.to_string()),
                    elapsed_ms: elapsed_ms(started),
                    ..base
                };
            }
        };

        let attempts = task.max_retries.saturating_add(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let call = client.extract_structured(&task.instructions, document, task.temperature);
            match tokio::time::timeout(task.timeout, call).await {
                Ok(Ok(extraction)) => {
                    debug!(attempt, tokens = extraction.usage.total, "Task succeeded");
                    return TaskResult {
                        success: true,
                        data: Some(extraction.data),
                        error: None,
                        token_usage: extraction.usage,
                        elapsed_ms: elapsed_ms(started),
                        retries_used: attempt,
                        ..base
                    };
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = LlmError::Timeout {
                        timeout_ms: task.timeout.as_millis() as u64,
                    }
                    .to_string()
                }
            }

            warn!(attempt = attempt + 1, of = attempts, error = %last_error, "Task attempt failed");

            if attempt + 1 < attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }

        TaskResult {
            error: Some(last_error),
            elapsed_ms: elapsed_ms(started),
            retries_used: attempts,
            ..base
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("pool", &self.pool)
            .field("base_delay", &self.base_delay)
            .finish()
    }
}
