//! Typed access to tool call arguments.

use crate::error::SwarmError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    /// Models sometimes send arguments as a JSON-encoded string; those are
    /// decoded here so accessors always see an object.
    pub fn new(value: serde_json::Value) -> Self {
        let value = match value {
            serde_json::Value::String(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(trimmed).unwrap_or(serde_json::Value::String(raw))
                }
            }
            other => other,
        };
        Self { value }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, SwarmError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| SwarmError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get a boolean argument, defaulting when absent.
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, SwarmError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            SwarmError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_encoded_arguments_are_decoded() {
        let args = ToolArguments::new(serde_json::json!("{\"message\": \"hi\"}"));
        assert_eq!(args.get_str("message").unwrap(), "hi");
    }

    #[test]
    fn missing_string_is_invalid_argument() {
        let args = ToolArguments::new(serde_json::json!({}));
        assert!(matches!(
            args.get_str("message"),
            Err(SwarmError::InvalidArgument(_))
        ));
        assert_eq!(args.get_str_opt("message"), None);
    }
}
