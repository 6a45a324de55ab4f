//! ExecutionEngine - the grouped extraction state machine
//!
//! ```text
//! initialize ─► execute_group ─► checkpoint ─► route ─┬─► execute_group (next group)
//!                                                     ├─► validate ─► route
//!                                                     ├─► retry (all groups again)
//!                                                     ├─► pause (human review)
//!                                                     └─► finalize
//! ```
//!
//! Routing is a pure function of `ExecutionState` (`route`), so a resumed
//! execution re-enters the loop exactly where the checkpoint left it.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::lock::ExecutionLocks;
use super::response::{ExecutionRequest, ExecutionResponse, ResponseStatus};
use super::runner::{TaskRunner, DEFAULT_RETRY_BASE_DELAY};
use super::scheduler::{GroupScheduler, DEFAULT_MAX_PARALLEL};
use super::state::{ExecutionState, ExecutionStatus};
use crate::ast::{GroupPlan, TaskSetDefinition};
use crate::error::{EngineError, Result};
use crate::event::{ChannelEmitter, EventEmitter, EventKind, EventLog, NoopEmitter, ProgressEvent};
use crate::loader::TaskSetSource;
use crate::process::ValidationEngine;
use crate::provider::{ClientFactory, ClientPool, VendorDefaults};
use crate::store::{CheckpointStore, StatePatch};

/// Vendor used when neither the request nor the task names one
pub const DEFAULT_VENDOR: &str = "gemini";

/// Engine-level (validation) retry budget
pub const DEFAULT_MAX_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub default_vendor: String,
    /// Model for `default_vendor` when the request does not pick one
    pub default_model: Option<String>,
    pub max_retries: u32,
    /// Pause for review when validation still fails after `max_retries`
    pub human_review: bool,
    pub max_parallel: usize,
    pub retry_base_delay: Duration,
    pub vendor_defaults: VendorDefaults,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_vendor: DEFAULT_VENDOR.to_string(),
            default_model: None,
            max_retries: DEFAULT_MAX_RETRIES,
            human_review: true,
            max_parallel: DEFAULT_MAX_PARALLEL,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            vendor_defaults: VendorDefaults::default(),
        }
    }
}

/// Next transition for a state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ExecuteGroup(i32),
    Validate,
    Retry,
    Pause,
    Complete,
}

/// Decide the next transition. Pure: depends only on `state`.
pub fn route(state: &ExecutionState) -> Step {
    if let Some(group) = state.next_group() {
        return Step::ExecuteGroup(group);
    }
    match &state.validation {
        None => Step::Validate,
        Some(v) if v.is_fail() && state.retry_count < state.max_retries => Step::Retry,
        Some(v) if v.is_fail() && state.human_review_enabled && !state.review_acknowledged => {
            Step::Pause
        }
        Some(_) => Step::Complete,
    }
}

/// Everything resolved from the task set before the first transition
struct Run {
    task_set: Arc<TaskSetDefinition>,
    plan: GroupPlan,
    validator: ValidationEngine,
}

/// Per-invocation event sink: log, forward, and keep on the state
struct Progress {
    log: EventLog,
    emitter: Arc<dyn EventEmitter>,
}

impl Progress {
    fn new(execution_id: &str, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            log: EventLog::new(execution_id),
            emitter,
        }
    }

    fn emit(&self, state: &mut ExecutionState, kind: EventKind) {
        let event = self.log.record(kind);
        self.emitter.emit(&event);
        state.record_progress_event(event);
    }
}

struct EngineInner {
    task_sets: Arc<dyn TaskSetSource>,
    store: Arc<dyn CheckpointStore>,
    scheduler: GroupScheduler,
    settings: EngineSettings,
    locks: ExecutionLocks,
}

/// Cheap to clone; clones share the store, client pool and locks
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

impl ExecutionEngine {
    pub fn new(
        task_sets: Arc<dyn TaskSetSource>,
        store: Arc<dyn CheckpointStore>,
        clients: Arc<dyn ClientFactory>,
        settings: EngineSettings,
    ) -> Self {
        let runner = TaskRunner::new(ClientPool::new(clients), settings.vendor_defaults.clone())
            .with_base_delay(settings.retry_base_delay);
        let scheduler = GroupScheduler::new(runner, settings.max_parallel);
        Self {
            inner: Arc::new(EngineInner {
                task_sets,
                store,
                scheduler,
                settings,
                locks: ExecutionLocks::new(),
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.inner.store
    }

    /// Run a document through a task set to a terminal or paused state.
    ///
    /// Never returns an error: configuration and persistence problems end the
    /// execution as `Failed` with the message in `error`.
    #[instrument(name = "execute", skip_all, fields(task_set_id = %request.task_set_id))]
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResponse {
        self.execute_with(request, Arc::new(NoopEmitter::new())).await
    }

    /// Same state machine as `execute`, running on a spawned task.
    ///
    /// Dropping the returned stream does not stop the execution.
    pub fn stream_execute(&self, request: ExecutionRequest) -> ExecutionStream {
        let execution_id = request
            .execution_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let request = request.with_execution_id(&execution_id);
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = self.clone();
        let handle = tokio::spawn(async move {
            engine
                .execute_with(request, Arc::new(ChannelEmitter::new(tx)))
                .await
        });
        ExecutionStream {
            execution_id,
            events: UnboundedReceiverStream::new(rx),
            handle,
        }
    }

    /// Continue a paused execution after human review.
    ///
    /// Rejections (unknown id, not paused, busy, task set gone) happen before
    /// the stored state is touched.
    #[instrument(name = "resume", skip(self, feedback))]
    pub async fn resume(
        &self,
        execution_id: &str,
        feedback: Option<Value>,
    ) -> Result<ExecutionResponse> {
        let _guard = self.inner.locks.try_acquire(execution_id)?;

        let mut state = self.inner.store.load(execution_id).await?.ok_or_else(|| {
            EngineError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            }
        })?;
        if state.status != ExecutionStatus::Paused {
            return Err(EngineError::NotPaused {
                execution_id: execution_id.to_string(),
                status: state.status,
            });
        }
        let run = self.prepare(&state.task_set_id)?;

        // Claim the transition in the store: another engine sharing it may
        // have loaded the same paused state
        let patch = StatePatch::acknowledge_review(feedback.clone());
        self.inner
            .store
            .update(execution_id, &patch, ExecutionStatus::Paused)
            .await?;
        state.apply_patch(&patch);

        let progress = Progress::new(execution_id, Arc::new(NoopEmitter::new()));
        progress.emit(&mut state, EventKind::Resumed { feedback });
        info!("Resuming execution");

        if let Err(e) = self.drive(&mut state, &run, &progress).await {
            self.abort(&mut state, &progress, e).await;
        }
        Ok(ExecutionResponse::from_state(&state))
    }

    /// Stored state of an execution
    pub async fn state(&self, execution_id: &str) -> Result<ExecutionState> {
        self.inner
            .store
            .load(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound {
                execution_id: execution_id.to_string(),
            })
    }

    async fn execute_with(
        &self,
        request: ExecutionRequest,
        emitter: Arc<dyn EventEmitter>,
    ) -> ExecutionResponse {
        let execution_id = request
            .execution_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut state = self.new_state(&execution_id, &request);
        let progress = Progress::new(&execution_id, emitter);

        // Another invocation owns this id: report without touching its checkpoint
        let _guard = match self.inner.locks.try_acquire(&execution_id) {
            Ok(guard) => guard,
            Err(e) => {
                let message = e.to_string();
                warn!(execution_id = %execution_id, error = %message, "Execution id is busy");
                state.finish(ExecutionStatus::Failed, Some(message.clone()));
                progress.emit(&mut state, EventKind::ExecutionFailed { error: message });
                return ExecutionResponse::from_state(&state);
            }
        };

        if let Err(e) = self.start(&mut state, &progress).await {
            self.abort(&mut state, &progress, e).await;
        }
        ExecutionResponse::from_state(&state)
    }

    fn new_state(&self, execution_id: &str, request: &ExecutionRequest) -> ExecutionState {
        let mut state = ExecutionState::new(execution_id, &request.document, &request.task_set_id);
        state.vendor_override = request.vendor.clone().filter(|v| !v.is_empty());
        state.model_override = request.model.clone().filter(|m| !m.is_empty());
        state.max_retries = self.inner.settings.max_retries;
        state.human_review_enabled = self.inner.settings.human_review;
        state
    }

    async fn start(&self, state: &mut ExecutionState, progress: &Progress) -> Result<()> {
        let run = self.prepare(&state.task_set_id)?;
        state.initialize(&run.task_set);

        let kind = EventKind::ExecutionStarted {
            task_set_id: run.task_set.id.clone(),
            task_set_version: run.task_set.version.clone(),
            groups: state.groups.clone(),
            task_count: run.plan.values().map(Vec::len).sum(),
        };
        progress.emit(state, kind);
        info!(
            execution_id = %state.execution_id,
            groups = state.groups.len(),
            "Execution started"
        );

        self.drive(state, &run, progress).await
    }

    /// Resolve the task set snapshot and compile its rules
    fn prepare(&self, task_set_id: &str) -> Result<Run> {
        let task_set = self.inner.task_sets.get_task_set(task_set_id)?;
        let plan = task_set.group_plan();
        if plan.is_empty() {
            return Err(EngineError::NoActiveTasks {
                task_set_id: task_set_id.to_string(),
            });
        }
        let validator =
            ValidationEngine::new(task_set.output_shape.as_ref(), &task_set.validation_rules)?;
        Ok(Run {
            task_set,
            plan,
            validator,
        })
    }

    async fn drive(&self, state: &mut ExecutionState, run: &Run, progress: &Progress) -> Result<()> {
        loop {
            let step = route(state);
            debug!(execution_id = %state.execution_id, ?step, "Routing");

            match step {
                Step::ExecuteGroup(group) => self.execute_group(state, run, group, progress).await?,
                Step::Validate => {
                    let result = run.validator.validate(&state.merged_data);
                    let kind = EventKind::ValidationCompleted {
                        status: result.status,
                        quality_score: result.quality_score,
                        errors: result.errors.len(),
                        warnings: result.warnings.len(),
                    };
                    state.validation = Some(result);
                    progress.emit(state, kind);
                }
                Step::Retry => {
                    state.begin_retry();
                    warn!(
                        retry = state.retry_count,
                        of = state.max_retries,
                        "Validation failed, re-running all groups"
                    );
                    let kind = EventKind::RetryScheduled {
                        retry_count: state.retry_count,
                        max_retries: state.max_retries,
                    };
                    progress.emit(state, kind);
                }
                Step::Pause => {
                    state.status = ExecutionStatus::Paused;
                    self.checkpoint(state, None, progress).await?;
                    let errors = state
                        .validation
                        .as_ref()
                        .map(|v| v.errors.clone())
                        .unwrap_or_default();
                    info!(errors = errors.len(), "Paused for human review");
                    progress.emit(state, EventKind::HumanReviewRequested { errors });
                    return Ok(());
                }
                Step::Complete => return self.finalize(state, progress).await,
            }
        }
    }

    async fn execute_group(
        &self,
        state: &mut ExecutionState,
        run: &Run,
        group: i32,
        progress: &Progress,
    ) -> Result<()> {
        let tasks = run.plan.get(&group).ok_or_else(|| {
            EngineError::Execution(format!(
                "group {} is not part of task set '{}'",
                group, run.task_set.id
            ))
        })?;
        state.current_group = Some(group);
        let task_ids = tasks.iter().map(|t| t.id.clone()).collect();
        progress.emit(state, EventKind::GroupStarted { group, task_ids });
        info!(group, tasks = tasks.len(), "Executing group");

        let document: Arc<str> = Arc::from(state.document.as_str());
        let vendor = state
            .vendor_override
            .clone()
            .unwrap_or_else(|| self.inner.settings.default_vendor.clone());
        let model = self.default_model(state);
        let results = self
            .inner
            .scheduler
            .run_group(tasks, &document, &vendor, model.as_deref())
            .await;

        let succeeded = results.iter().filter(|r| r.success).count();
        let failed = results.len() - succeeded;
        state.append_results(group, results, run.task_set.merge_strategy);
        progress.emit(state, EventKind::GroupCompleted { group, succeeded, failed });
        let field_count = state.merged_data.len();
        progress.emit(state, EventKind::MergeCompleted { group, field_count });

        self.checkpoint(state, Some(group), progress).await
    }

    /// Request model, else the configured default when the default vendor is in use
    fn default_model(&self, state: &ExecutionState) -> Option<String> {
        state.model_override.clone().or_else(|| {
            state
                .vendor_override
                .is_none()
                .then(|| self.inner.settings.default_model.clone())
                .flatten()
        })
    }

    async fn checkpoint(
        &self,
        state: &mut ExecutionState,
        group: Option<i32>,
        progress: &Progress,
    ) -> Result<()> {
        self.inner.store.save(&state.execution_id, state).await?;
        progress.emit(state, EventKind::CheckpointSaved { group });
        Ok(())
    }

    async fn finalize(&self, state: &mut ExecutionState, progress: &Progress) -> Result<()> {
        if state.all_failed() {
            state.finish(ExecutionStatus::Failed, Some("All tasks failed".to_string()));
        } else {
            state.finish(ExecutionStatus::Completed, None);
        }
        self.checkpoint(state, None, progress).await?;

        let status = ResponseStatus::from_state(state);
        let processing_time_ms = state.processing_time_ms();
        info!(%status, processing_time_ms, tokens = state.token_usage.total, "Execution finished");
        progress.emit(
            state,
            EventKind::ExecutionCompleted {
                status: status.to_string(),
                processing_time_ms,
            },
        );
        Ok(())
    }

    /// Record a fatal engine error; the checkpoint is best-effort
    async fn abort(&self, state: &mut ExecutionState, progress: &Progress, err: EngineError) {
        error!(execution_id = %state.execution_id, code = err.code(), error = %err, "Execution failed");
        let message = err.to_string();
        state.finish(ExecutionStatus::Failed, Some(message.clone()));
        if let Err(e) = self.inner.store.save(&state.execution_id, state).await {
            warn!(error = %e, "Could not checkpoint failed execution");
        }
        progress.emit(state, EventKind::ExecutionFailed { error: message });
    }
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("settings", &self.inner.settings)
            .field("scheduler", &self.inner.scheduler)
            .finish()
    }
}

/// Progress events of a running execution, plus its final response
pub struct ExecutionStream {
    execution_id: String,
    events: UnboundedReceiverStream<ProgressEvent>,
    handle: JoinHandle<ExecutionResponse>,
}

impl ExecutionStream {
    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    /// Wait for the execution to reach a terminal or paused state
    pub async fn finish(self) -> Result<ExecutionResponse> {
        self.handle
            .await
            .map_err(|e| EngineError::Execution(format!("execution task failed: {}", e)))
    }
}

impl Stream for ExecutionStream {
    type Item = ProgressEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}
