use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a transcript entry, serialized in the wire format the model
/// endpoint expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One transcript entry. `content` may be absent when the assistant turn
/// carries tool calls only; tool-role entries echo the originating call id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Tool-result turn answering the tool call with the given id.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

/// A tool invocation requested by the model inside an assistant turn.
/// Consumed exactly once; the pipeline produces one tool-role turn per call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolCallFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Raw JSON string as emitted by the model; parsed by the orchestrator.
    pub arguments: String,
}

/// A discovered tool, immutable once registered. Names are unique across the
/// registry; the most recent registration wins on collision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    /// Opaque JSON schema for the tool's arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Option<Value>,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: name.into(),
                description: description.into(),
                parameters: parameters
                    .unwrap_or_else(|| serde_json::json!({"type": "object", "properties": {}})),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_message_carries_call_id() {
        let msg = ChatMessage::tool("call-1", "result text");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call-1"));
        assert_eq!(msg.content_str(), "result text");
    }

    #[test]
    fn assistant_turn_serializes_tool_calls_only_when_present() {
        let plain = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert!(plain.get("tool_calls").is_none());
        assert!(plain.get("tool_call_id").is_none());

        let mut with_calls = ChatMessage::assistant("");
        with_calls.content = None;
        with_calls.tool_calls.push(ToolCall {
            id: "call-9".into(),
            kind: "function".into(),
            function: ToolCallFunction {
                name: "search".into(),
                arguments: "{\"q\":\"news\"}".into(),
            },
        });
        let value = serde_json::to_value(&with_calls).unwrap();
        assert_eq!(value["tool_calls"][0]["function"]["name"], "search");
    }

    #[test]
    fn missing_schema_defaults_to_empty_object() {
        let def = ToolDefinition::function("clock", "tells time", None);
        assert_eq!(def.function.parameters["type"], "object");
        assert_eq!(def.name(), "clock");
    }

    #[test]
    fn roundtrips_model_wire_format() {
        let raw = r#"{
            "role": "assistant",
            "content": null,
            "tool_calls": [
                {"id": "c1", "type": "function", "function": {"name": "f", "arguments": "{}"}}
            ]
        }"#;
        let msg: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.len(), 1);
    }
}
