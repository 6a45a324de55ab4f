//! GroupScheduler - run one group's tasks concurrently, bounded
//!
//! Every task is spawned on a JoinSet and waits for a semaphore permit, so at
//! most `max_parallel` LLM calls are in flight per group. Results land in a
//! pre-sized slot per input index: the returned list follows input order no
//! matter which task finishes first.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument};

use super::result::TaskResult;
use super::runner::TaskRunner;
use crate::ast::TaskDefinition;

/// Default bound on concurrent tasks within a group
pub const DEFAULT_MAX_PARALLEL: usize = 10;

#[derive(Debug, Clone)]
pub struct GroupScheduler {
    runner: TaskRunner,
    max_parallel: usize,
}

impl GroupScheduler {
    pub fn new(runner: TaskRunner, max_parallel: usize) -> Self {
        Self {
            runner,
            max_parallel: max_parallel.max(1),
        }
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Run all tasks and return one result per task, in input order.
    ///
    /// Returns only after every task has produced a result. A failing or
    /// panicking task does not cancel its siblings.
    #[instrument(name = "group", skip_all, fields(tasks = tasks.len()))]
    pub async fn run_group(
        &self,
        tasks: &[Arc<TaskDefinition>],
        document: &Arc<str>,
        vendor: &str,
        model: Option<&str>,
    ) -> Vec<TaskResult> {
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut join_set = JoinSet::new();

        for (index, task) in tasks.iter().enumerate() {
            let runner = self.runner.clone();
            let task = Arc::clone(task);
            let document = Arc::clone(document);
            let vendor = vendor.to_string();
            let model = model.map(str::to_string);
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                // Closed semaphores never happen here; run unbounded if one did
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = AssertUnwindSafe(runner.run(&task, &document, &vendor, model.as_deref()))
                    .catch_unwind()
                    .await;
                let result = outcome.unwrap_or_else(|panic| {
                    TaskResult::failed(&task.id, format!("Task panicked: {}", panic_message(&*panic)))
                        .with_group(task.group)
                });
                (index, result)
            });
        }

        let mut slots: Vec<Option<TaskResult>> = vec![None; tasks.len()];
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "Task join failed"),
            }
        }

        let results: Vec<TaskResult> = slots
            .into_iter()
            .zip(tasks)
            .map(|(slot, task)| {
                slot.unwrap_or_else(|| {
                    TaskResult::failed(&task.id, "Task did not complete").with_group(task.group)
                })
            })
            .collect();

        let failed = results.iter().filter(|r| !r.success).count();
        info!(succeeded = results.len() - failed, failed, "Group finished");
        results
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ClientPool, MockClient, MockClientFactory, MockReply, VendorDefaults};
    use serde_json::json;
    use std::time::Duration;

    fn scheduler(mock: &MockClient, max_parallel: usize) -> GroupScheduler {
        let pool = ClientPool::new(Arc::new(MockClientFactory::new(mock.clone())));
        let runner = TaskRunner::new(pool, VendorDefaults::default())
            .with_base_delay(Duration::from_millis(1));
        GroupScheduler::new(runner, max_parallel)
    }

    fn task(id: &str) -> Arc<TaskDefinition> {
        Arc::new(TaskDefinition::new(id, id).with_max_retries(0))
    }

    #[tokio::test]
    async fn results_follow_input_order_not_completion_order() {
        let mock = MockClient::new()
            .script("slow", [MockReply::Data(json!({"k": "slow"}))])
            .script("fast", [MockReply::Data(json!({"k": "fast"}))])
            .with_latency_for("slow", Duration::from_millis(50));

        let doc: Arc<str> = Arc::from("doc");
        let results = scheduler(&mock, 4)
            .run_group(&[task("slow"), task("fast")], &doc, "mock", None)
            .await;

        let ids: Vec<&str> = results.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["slow", "fast"]);

        let slow = &mock.calls_for("slow")[0];
        let fast = &mock.calls_for("fast")[0];
        assert!(fast.finished < slow.finished);
    }

    #[tokio::test]
    async fn failure_does_not_cancel_siblings() {
        let mock = MockClient::new().script("bad", [MockReply::Error("nope".into())]);
        let doc: Arc<str> = Arc::from("doc");
        let results = scheduler(&mock, 4)
            .run_group(&[task("bad"), task("good")], &doc, "mock", None)
            .await;

        assert!(!results[0].success);
        assert!(results[1].success);
    }

    #[tokio::test]
    async fn parallelism_is_bounded() {
        let mock = MockClient::new().with_latency(Duration::from_millis(20));
        let doc: Arc<str> = Arc::from("doc");
        let tasks: Vec<_> = (0..4).map(|i| task(&format!("t{}", i))).collect();

        scheduler(&mock, 1).run_group(&tasks, &doc, "mock", None).await;

        // With one permit, every call ends before the next one starts
        let mut calls = mock.calls();
        calls.sort_by_key(|c| c.started);
        for pair in calls.windows(2) {
            assert!(pair[0].finished.unwrap() < pair[1].started);
        }
    }

    #[tokio::test]
    async fn siblings_run_concurrently() {
        let mock = MockClient::new().with_latency(Duration::from_millis(30));
        let doc: Arc<str> = Arc::from("doc");
        let tasks: Vec<_> = (0..3).map(|i| task(&format!("t{}", i))).collect();

        scheduler(&mock, 10).run_group(&tasks, &doc, "mock", None).await;

        // All three start before any finishes
        let calls = mock.calls();
        let last_start = calls.iter().map(|c| c.started).max().unwrap();
        let first_end = calls.iter().filter_map(|c| c.finished).min().unwrap();
        assert!(last_start < first_end);
    }

    #[test]
    fn zero_parallelism_is_clamped() {
        let mock = MockClient::new();
        assert_eq!(scheduler(&mock, 0).max_parallel(), 1);
    }
}
