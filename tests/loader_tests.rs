//! Task-set directories on disk, loaded through the registry and executed
//!
//! Layout used by these tests:
//!
//! ```text
//! skills/
//! ├── invoices/   schema.json + prompts/ + output.schema.json
//! ├── receipts/   taskset.yaml with inline prompts
//! └── broken/     unparsable schema.json (skipped)
//! ```

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

use skillrun::loader::TaskSetSource;
use skillrun::process::ValidationStatus;
use skillrun::provider::{MockClient, MockClientFactory, MockReply};
use skillrun::{
    EngineSettings, ExecutionEngine, ExecutionRequest, MemoryCheckpointStore, MergeStrategy,
    ResponseStatus, TaskSetRegistry,
};

// ═══════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════

const HEADER_PROMPT: &str = "Extract the invoice number and vendor name.";
const LINES_PROMPT: &str = "Extract net, tax and total amounts.";

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn skills_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    write(
        root,
        "invoices/schema.json",
        &json!({
            "schema_id": "invoices",
            "version": "1.2",
            "name": "Invoices",
            "skills": [
                {"id": "header", "prompt_file": "prompts/header.md", "parallel_group": 1, "retry_count": 0},
                {"id": "amounts", "prompt_file": "prompts/amounts.md", "parallel_group": 2, "retry_count": 0},
                {"id": "notes", "prompt": "Extract notes.", "status": "draft"}
            ],
            "post_processing": {
                "merge_strategy": "merge_deep",
                "validation_rules": [{
                    "id": "totals",
                    "name": "Totals add up",
                    "type": "sum_check",
                    "params": {"expected": "total", "operands": ["net", "tax"]}
                }]
            },
            "output_schema_file": "output.schema.json"
        })
        .to_string(),
    );
    write(root, "invoices/prompts/header.md", HEADER_PROMPT);
    write(root, "invoices/prompts/amounts.md", LINES_PROMPT);
    write(
        root,
        "invoices/output.schema.json",
        &json!({
            "type": "object",
            "required": ["invoice_number"]
        })
        .to_string(),
    );

    write(
        root,
        "receipts/taskset.yaml",
        r#"
schema_id: receipts
version: "1"
skills:
  - id: total
    prompt: Extract the receipt total.
    retry_count: 0
post_processing:
  merge_strategy: last_wins
"#,
    );

    write(root, "broken/schema.json", "{ not json");

    dir
}

fn engine(registry: Arc<TaskSetRegistry>, mock: &MockClient) -> ExecutionEngine {
    ExecutionEngine::new(
        registry,
        Arc::new(MemoryCheckpointStore::new()),
        Arc::new(MockClientFactory::new(mock.clone())),
        EngineSettings {
            default_vendor: "mock".into(),
            retry_base_delay: Duration::from_millis(1),
            max_retries: 0,
            human_review: false,
            ..Default::default()
        },
    )
}

// ═══════════════════════════════════════════════════════════════
// REGISTRY
// ═══════════════════════════════════════════════════════════════

#[test]
fn registry_loads_valid_sets_and_skips_broken_ones() {
    let dir = skills_root();
    let registry = TaskSetRegistry::from_dir(dir.path()).unwrap();

    let ids: Vec<String> = registry.list().iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids, vec!["invoices".to_string(), "receipts".to_string()]);

    let invoices = registry.get_task_set("invoices").unwrap();
    assert_eq!(invoices.version, "1.2");
    assert_eq!(invoices.merge_strategy, MergeStrategy::DeepMerge);
    assert_eq!(invoices.tasks.len(), 3);
    assert_eq!(invoices.task("header").unwrap().instructions, HEADER_PROMPT);
    assert!(!invoices.task("notes").unwrap().enabled);
    assert_eq!(invoices.group_plan().keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(
        invoices.output_shape.as_ref().unwrap().name.as_deref(),
        Some("Invoices")
    );

    let receipts = registry.get_task_set("receipts").unwrap();
    assert_eq!(receipts.name, "receipts");
    assert_eq!(receipts.merge_strategy, MergeStrategy::LastWins);
}

#[test]
fn reload_picks_up_new_directories() {
    let dir = skills_root();
    let registry = TaskSetRegistry::from_dir(dir.path()).unwrap();
    assert_eq!(registry.len(), 2);

    write(
        dir.path(),
        "contracts/taskset.yaml",
        "schema_id: contracts\nversion: \"3\"\nskills:\n  - id: parties\n    prompt: Extract the parties.\n",
    );
    fs::remove_dir_all(dir.path().join("receipts")).unwrap();

    assert_eq!(registry.reload().unwrap(), 2);
    assert!(registry.get("contracts").is_some());
    assert_eq!(
        registry.get_task_set("receipts").unwrap_err().code(),
        "SKR-001"
    );
}

#[test]
fn missing_root_is_load_error() {
    let dir = TempDir::new().unwrap();
    let err = TaskSetRegistry::from_dir(dir.path().join("nope")).unwrap_err();
    assert_eq!(err.code(), "SKR-005");
}

// ═══════════════════════════════════════════════════════════════
// EXECUTION OVER LOADED SETS
// ═══════════════════════════════════════════════════════════════

#[tokio::test]
async fn loaded_set_runs_with_prompt_file_instructions() {
    let dir = skills_root();
    let registry = Arc::new(TaskSetRegistry::from_dir(dir.path()).unwrap());
    let mock = MockClient::new()
        .script(
            HEADER_PROMPT,
            [MockReply::Data(json!({"invoice_number": "F-1", "vendor": {"name": "ACME"}}))],
        )
        .script(
            LINES_PROMPT,
            [MockReply::Data(json!({"net": 100, "tax": 20, "total": 120}))],
        );
    let engine = engine(registry, &mock);

    let response = engine
        .execute(ExecutionRequest::new("Invoice F-1 ...", "invoices"))
        .await;

    assert_eq!(response.status, ResponseStatus::Completed);
    assert_eq!(response.metadata.task_set_version, "1.2");
    assert_eq!(response.validation.unwrap().status, ValidationStatus::Pass);
    assert_eq!(mock.call_count(), 2);
    assert!(mock.calls_for("Extract notes.").is_empty());
}

#[tokio::test]
async fn output_shape_from_file_is_enforced() {
    let dir = skills_root();
    let registry = Arc::new(TaskSetRegistry::from_dir(dir.path()).unwrap());
    let mock = MockClient::new().script(
        LINES_PROMPT,
        [MockReply::Data(json!({"net": 100, "tax": 20, "total": 120}))],
    );
    let engine = engine(registry, &mock);

    let response = engine
        .execute(ExecutionRequest::new("Invoice without number", "invoices"))
        .await;

    let validation = response.validation.unwrap();
    assert_eq!(validation.status, ValidationStatus::Fail);
    assert_eq!(validation.errors.len(), 1);
    assert!(validation.errors[0].starts_with("Shape 'Invoices' validation failed"));
}

#[tokio::test]
async fn engine_sees_sets_added_by_reload() {
    let dir = skills_root();
    let registry = Arc::new(TaskSetRegistry::from_dir(dir.path()).unwrap());
    let mock = MockClient::new().with_default(MockReply::Data(json!({"parties": ["A", "B"]})));
    let engine = engine(registry.clone(), &mock);

    let before = engine
        .execute(ExecutionRequest::new("contract", "contracts"))
        .await;
    assert_eq!(before.status, ResponseStatus::Failed);

    write(
        dir.path(),
        "contracts/taskset.yaml",
        "schema_id: contracts\nversion: \"3\"\nskills:\n  - id: parties\n    prompt: Extract the parties.\n",
    );
    registry.reload().unwrap();

    let after = engine
        .execute(ExecutionRequest::new("contract", "contracts"))
        .await;
    assert_eq!(after.status, ResponseStatus::Completed);
    assert_eq!(after.data["parties"], json!(["A", "B"]));
}
