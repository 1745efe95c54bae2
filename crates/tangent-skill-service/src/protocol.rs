//! Wire types for the three local RPCs (§4.G, §6 "Local RPC surface").
//!
//! The envelope itself is plain JSON over HTTP-over-UDS (`axum` serving a
//! `tokio::net::UnixListener`) rather than a JSON-RPC 2.0 envelope — the
//! spec's own wording for this surface ("`POST /skill-invocations`",
//! "`GET /tools?session_id=…`") is HTTP verbs and paths, not method calls,
//! so these types model that shape directly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /skill-invocations`.
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeSkillRequest {
    pub session_id: String,
    pub invocation_id: String,
    pub skill_name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvokeSkillResponse {
    pub invocation_id: String,
    pub output: ContextValue,
}

/// Query parameters for `GET /tools`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsQuery {
    pub session_id: String,
}

/// One skill rendered as an LLM tool descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolDescriptor>,
}

/// Query parameters for `GET /context`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContextQuery {
    pub session_id: String,
    pub name: String,
}

/// A context/invocation-output value, encoded as text with an optional
/// parsed form (§4.G: "encodes the session's stdout as a text value; if
/// the bytes parse as JSON, the response carries both a type tag ... and
/// the parsed value").
#[derive(Debug, Clone, Serialize)]
pub struct ContextValue {
    pub text: String,
    #[serde(rename = "type")]
    pub value_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ContextValue {
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(value) => Self {
                text,
                value_type: json_type_tag(&value),
                value: Some(value),
            },
            Err(_) => Self {
                text,
                value_type: "string",
                value: None,
            },
        }
    }
}

fn json_type_tag(value: &Value) -> &'static str {
    match value {
        Value::Object(_) => "object",
        Value::Array(_) => "array",
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Null => "null",
    }
}

/// RPC error envelope returned for non-2xx responses.
#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub error: String,
    pub kind: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_value_parses_json_object() {
        let v = ContextValue::from_text(r#"{"ok":true}"#.to_string());
        assert_eq!(v.value_type, "object");
        assert!(v.value.is_some());
    }

    #[test]
    fn context_value_parses_plain_number() {
        let v = ContextValue::from_text("42".to_string());
        assert_eq!(v.value_type, "number");
    }

    #[test]
    fn context_value_falls_back_to_string_on_non_json() {
        let v = ContextValue::from_text("not json at all {".to_string());
        assert_eq!(v.value_type, "string");
        assert!(v.value.is_none());
    }

    #[test]
    fn invoke_skill_request_defaults_empty_args() {
        let req: InvokeSkillRequest =
            serde_json::from_str(r#"{"session_id":"s","invocation_id":"i","skill_name":"k"}"#)
                .unwrap();
        assert!(req.args.is_empty());
    }
}
