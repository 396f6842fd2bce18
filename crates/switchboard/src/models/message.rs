use serde::{Deserialize, Serialize};

use super::tool::{ToolCall, ToolResult};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One conversational message.
///
/// `tool_calls` is set only on assistant turns in which the model requested
/// tool invocations; `tool_results` is set only on the synthetic assistant
/// turns the orchestrator appends after executing them. The two are mutually
/// exclusive within a single message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    /// Create an empty message with the given role.
    pub fn new(role: Role) -> Self {
        Message {
            role,
            content: String::new(),
            images: Vec::new(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// Create a system message with the given text.
    pub fn system<S: Into<String>>(content: S) -> Self {
        let mut message = Message::new(Role::System);
        message.content = content.into();
        message
    }

    /// Create a user message with the given text.
    pub fn user<S: Into<String>>(content: S) -> Self {
        let mut message = Message::new(Role::User);
        message.content = content.into();
        message
    }

    /// Create an assistant message with the given text.
    pub fn assistant<S: Into<String>>(content: S) -> Self {
        let mut message = Message::new(Role::Assistant);
        message.content = content.into();
        message
    }

    /// Add image URLs to the message.
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    /// Attach the tool calls requested by the model.
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Attach the results of executed tools.
    pub fn with_tool_results(mut self, tool_results: Vec<ToolResult>) -> Self {
        self.tool_results = tool_results;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn has_tool_results(&self) -> bool {
        !self.tool_results.is_empty()
    }
}
