mod types;

pub use types::{ChatMessage, FunctionSpec, Role, ToolCall, ToolCallFunction, ToolDefinition};
