//! Dotted-path lookup into merged output
//!
//! `"invoice.totals.net"` descends through nested objects one segment at a time.
//! A missing key or a non-object intermediate yields `None`, never an error.

use serde_json::{Map, Value};

/// Resolve a dotted path against an object
pub fn lookup<'a>(data: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = data.get(first)?;

    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }

    Some(current)
}
