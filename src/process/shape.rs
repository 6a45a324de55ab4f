//! Output-shape check backed by JSON Schema
//!
//! Shapes are plain schema documents evaluated by a generic validator. Nothing
//! is loaded or executed from the task-set directory.

use serde_json::{Map, Value};

use crate::ast::OutputShape;
use crate::error::{EngineError, Result};

/// Compiled output shape
pub struct ShapeValidator {
    name: String,
    validator: jsonschema::Validator,
}

impl std::fmt::Debug for ShapeValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShapeValidator")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ShapeValidator {
    /// Compile a shape, rejecting schemas that are not themselves valid
    pub fn compile(shape: &OutputShape) -> Result<Self> {
        let validator =
            jsonschema::validator_for(&shape.schema).map_err(|e| EngineError::InvalidShape {
                reason: e.to_string(),
            })?;
        Ok(Self {
            name: shape.name.clone().unwrap_or_else(|| "output".to_string()),
            validator,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check merged data, returning every violation joined into one message
    pub fn check(&self, data: &Map<String, Value>) -> std::result::Result<(), String> {
        let instance = Value::Object(data.clone());
        let errors: Vec<String> = self
            .validator
            .iter_errors(&instance)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}
