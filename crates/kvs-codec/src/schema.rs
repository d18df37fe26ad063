use std::fmt;

use jsonschema::Validator;
use serde_json::Value;

use crate::error::{CodecError, CodecResult};

/// A compiled JSON Schema used by [`Codec::SchemaJson`](crate::Codec::SchemaJson).
pub struct JsonSchema {
    source: Value,
    validator: Validator,
}

impl JsonSchema {
    /// Compile a schema document.
    pub fn new(source: Value) -> CodecResult<Self> {
        let validator = jsonschema::validator_for(&source)
            .map_err(|e| CodecError::InvalidSchema(e.to_string()))?;
        Ok(Self { source, validator })
    }

    /// The schema document this validator was compiled from.
    pub fn source(&self) -> &Value {
        &self.source
    }

    /// Validate an instance, returning every violation joined into one message.
    pub fn check(&self, instance: &Value) -> Result<(), String> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(instance)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

impl fmt::Debug for JsonSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_malformed_schema() {
        let err = JsonSchema::new(json!({"type": 12})).unwrap_err();
        assert!(matches!(err, CodecError::InvalidSchema(_)));
    }

    #[test]
    fn check_reports_violations() {
        let schema = JsonSchema::new(json!({
            "type": "object",
            "required": ["a"],
            "properties": {"a": {"type": "integer"}}
        }))
        .unwrap();
        assert!(schema.check(&json!({"a": 1})).is_ok());
        assert!(schema.check(&json!({"a": "x"})).is_err());
        assert!(schema.check(&json!({})).is_err());
    }
}
