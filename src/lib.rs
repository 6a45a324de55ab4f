//! skillrun - grouped LLM extraction engine
//!
//! A document runs through a task set: ordered groups of LLM extraction tasks
//! whose outputs are merged into one object and validated. Failed validation
//! retries the whole set, then pauses for human review; paused executions
//! resume from a durable checkpoint.
//!
//! ## Module Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        DOMAIN MODEL                          │
//! │  ast/       TaskSetDefinition, TaskDefinition, rules         │
//! │  loader/    schema.json / taskset.yaml → ast, registry       │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      APPLICATION LAYER                       │
//! │  runtime/   ExecutionEngine, GroupScheduler, TaskRunner      │
//! │  process/   merge strategies, validation rules, shapes       │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    INFRASTRUCTURE LAYER                      │
//! │  store/     Checkpoints (memory, file)                       │
//! │  event/     Progress events (EventLog, emitters)             │
//! │  provider/  LLM vendors (anthropic, openai, gemini, mock)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | [`ast`] | Immutable task-set definitions |
//! | [`loader`] | Task-set directory format, `TaskSetRegistry` |
//! | [`runtime`] | State machine, bounded group concurrency, task retry |
//! | [`process`] | `merge`, `ValidationEngine`, dotted paths, output shapes |
//! | [`store`] | `CheckpointStore` with memory and file backends |
//! | [`event`] | Progress events for streaming consumers |
//! | [`provider`] | `LlmClient` trait, client pool, vendor backends |
//! | [`config`] | TOML + environment configuration |
//! | [`error`] | Error types with fix suggestions |

// ═══════════════════════════════════════════════════════════════
// DOMAIN MODEL
// ═══════════════════════════════════════════════════════════════
pub mod ast;
pub mod loader;

// ═══════════════════════════════════════════════════════════════
// APPLICATION LAYER - Execution logic
// ═══════════════════════════════════════════════════════════════
pub mod process;
pub mod runtime;

// ═══════════════════════════════════════════════════════════════
// INFRASTRUCTURE LAYER - Storage, events, providers
// ═══════════════════════════════════════════════════════════════
pub mod event;
pub mod provider;
pub mod store;

// ═══════════════════════════════════════════════════════════════
// CROSS-CUTTING - Error handling, configuration
// ═══════════════════════════════════════════════════════════════
pub mod config;
pub mod error;

// ═══════════════════════════════════════════════════════════════
// PUBLIC API RE-EXPORTS
// ═══════════════════════════════════════════════════════════════

pub use error::{EngineError, FixSuggestion, Result};

pub use config::EngineConfig;

pub use ast::{MergeStrategy, TaskDefinition, TaskSetDefinition, ValidationRule};

pub use loader::{TaskSetRegistry, TaskSetSource};

pub use runtime::{
    EngineSettings, ExecutionEngine, ExecutionRequest, ExecutionResponse, ExecutionState,
    ExecutionStatus, ResponseStatus, TaskResult,
};

pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};

pub use event::{EventKind, ProgressEvent};

pub use provider::{ClientFactory, HttpClientFactory, LlmClient, MockClient};
