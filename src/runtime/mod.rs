//! Runtime Module - executing task sets
//!
//! - `runner`: one task with timeout and bounded retry (`TaskRunner`)
//! - `scheduler`: one group, concurrently and bounded (`GroupScheduler`)
//! - `engine`: the state machine over groups, validation, retry and review
//! - `state`: `ExecutionState`, the unit of persistence
//! - `result`: `TaskResult`
//! - `response`: request/response types handed to callers
//! - `lock`: one invocation per execution id
//!
//! This module represents the "how". For the definitions, see `ast`.

mod engine;
mod lock;
mod response;
mod result;
mod runner;
mod scheduler;
mod state;

pub use engine::{
    route, EngineSettings, ExecutionEngine, ExecutionStream, Step, DEFAULT_MAX_RETRIES,
    DEFAULT_VENDOR,
};
pub use lock::{ExecutionGuard, ExecutionLocks};
pub use response::{ExecutionMetadata, ExecutionRequest, ExecutionResponse, ResponseStatus};
pub use result::TaskResult;
pub use runner::{TaskRunner, DEFAULT_RETRY_BASE_DELAY};
pub use scheduler::{GroupScheduler, DEFAULT_MAX_PARALLEL};
pub use state::{ExecutionState, ExecutionStatus};
