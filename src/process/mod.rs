//! Process Module - pure transforms over task output
//!
//! - `merge`: TaskResultMerger (FirstWins / LastWins / DeepMerge fold)
//! - `validate`: ValidationEngine (shape check + declarative rules + quality score)
//! - `shape`: JSON Schema backed output-shape check
//! - `path`: dotted-path lookup shared by the rules
//!
//! Nothing here performs I/O; the engine calls these between groups.

pub mod merge;
pub mod path;
pub mod shape;
pub mod validate;

pub use merge::{merge, recompute};
pub use shape::ShapeValidator;
pub use validate::{
    CheckOutcome, CheckStatus, ValidationEngine, ValidationResult, ValidationStatus,
    SHAPE_CHECK_NAME,
};
