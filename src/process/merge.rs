//! TaskResultMerger - combine per-task outputs into one document
//!
//! `merge` is a pure fold: it never reads anything but its arguments, so
//! recomputing the merged document from the full result list is idempotent.

use serde_json::{Map, Value};

use crate::ast::MergeStrategy;
use crate::runtime::TaskResult;

/// Fold successful results into `existing` using `strategy`.
///
/// Failed results and results without data are ignored. Results are applied in
/// list order.
pub fn merge(
    existing: &Map<String, Value>,
    results: &[TaskResult],
    strategy: MergeStrategy,
) -> Map<String, Value> {
    let mut acc = existing.clone();

    for data in results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.data.as_ref())
    {
        match strategy {
            MergeStrategy::FirstWins => {
                for (key, value) in data {
                    if !acc.contains_key(key) {
                        acc.insert(key.clone(), value.clone());
                    }
                }
            }
            MergeStrategy::LastWins => {
                for (key, value) in data {
                    acc.insert(key.clone(), value.clone());
                }
            }
            MergeStrategy::DeepMerge => deep_merge_into(&mut acc, data),
        }
    }

    acc
}

/// Rebuild the merged document from scratch
pub fn recompute(results: &[TaskResult], strategy: MergeStrategy) -> Map<String, Value> {
    merge(&Map::new(), results, strategy)
}

fn deep_merge_into(base: &mut Map<String, Value>, update: &Map<String, Value>) {
    for (key, value) in update {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge_into(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
