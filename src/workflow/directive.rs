//! What an input transform tells the scheduler to do with a node.

use serde_json::Value;

use crate::error::SwarmError;

/// Return value of a node's input transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeDirective {
    /// Run the node's body with this input.
    Continue(String),
    /// Bypass the body and adopt this content as the node's result.
    Skip(String),
    /// Stop the run; this content becomes the final output.
    Halt(String),
    /// Jump to `node`, handing it `content` as its input.
    Goto { node: String, content: String },
}

impl NodeDirective {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Continue(_) => "continue",
            Self::Skip(_) => "skip_execution",
            Self::Halt(_) => "halt_workflow",
            Self::Goto { .. } => "goto_node",
        }
    }

    /// Interpret a transform's JSON return value.
    ///
    /// An object carrying `skip_execution: true`, `halt_workflow: true`, or
    /// `goto_node: "<id>"` is a control directive and must carry non-null
    /// `content`; anything else is plain content.
    pub fn from_value(node_id: &str, value: Value) -> Result<Self, SwarmError> {
        let Value::Object(map) = &value else {
            return Ok(Self::Continue(plain_content(value)));
        };
        let flag = |key: &str| map.get(key).and_then(Value::as_bool).unwrap_or(false);

        if let Some(target) = map.get("goto_node") {
            let target = target.as_str().filter(|t| !t.is_empty()).ok_or_else(|| {
                SwarmError::config(format!("node '{node_id}': goto_node requires a target node id"))
            })?;
            return Ok(Self::Goto {
                node: target.to_string(),
                content: required_content(node_id, "goto_node", map.get("content"))?,
            });
        }
        if flag("halt_workflow") {
            return Ok(Self::Halt(required_content(node_id, "halt_workflow", map.get("content"))?));
        }
        if flag("skip_execution") {
            return Ok(Self::Skip(required_content(node_id, "skip_execution", map.get("content"))?));
        }
        Ok(Self::Continue(plain_content(value)))
    }
}

impl From<String> for NodeDirective {
    fn from(content: String) -> Self {
        Self::Continue(content)
    }
}

impl From<&str> for NodeDirective {
    fn from(content: &str) -> Self {
        Self::Continue(content.to_string())
    }
}

fn plain_content(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Directive content, rejecting a missing or null value.
pub(crate) fn required_content(node_id: &str, directive: &str, content: Option<&Value>) -> Result<String, SwarmError> {
    match content {
        None | Some(Value::Null) => Err(missing_content(node_id, directive)),
        Some(Value::String(text)) => Ok(text.clone()),
        Some(other) => Ok(other.to_string()),
    }
}

pub(crate) fn missing_content(node_id: &str, directive: &str) -> SwarmError {
    SwarmError::config(format!("node '{node_id}': {directive} requires non-nil content"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn control_hashes_become_directives() {
        assert_eq!(
            NodeDirective::from_value("cache", json!({"skip_execution": true, "content": "CACHED"})).unwrap(),
            NodeDirective::Skip("CACHED".into())
        );
        assert_eq!(
            NodeDirective::from_value("gate", json!({"halt_workflow": true, "content": "stop"})).unwrap(),
            NodeDirective::Halt("stop".into())
        );
        assert_eq!(
            NodeDirective::from_value("review", json!({"goto_node": "implement", "content": {"fix": 1}})).unwrap(),
            NodeDirective::Goto {
                node: "implement".into(),
                content: r#"{"fix":1}"#.into()
            }
        );
    }

    #[test]
    fn plain_values_continue() {
        assert_eq!(
            NodeDirective::from_value("n", json!("text")).unwrap(),
            NodeDirective::Continue("text".into())
        );
        assert_eq!(
            NodeDirective::from_value("n", json!({"skip_execution": false, "x": 1})).unwrap().name(),
            "continue"
        );
    }

    #[test]
    fn missing_content_names_node_and_directive() {
        for (directive, value) in [
            ("skip_execution", json!({"skip_execution": true})),
            ("halt_workflow", json!({"halt_workflow": true, "content": null})),
            ("goto_node", json!({"goto_node": "plan"})),
        ] {
            let err = NodeDirective::from_value("review", value).unwrap_err();
            let message = err.to_string();
            assert!(message.contains("node 'review'"), "{message}");
            assert!(message.contains(directive), "{message}");
        }
    }
}
