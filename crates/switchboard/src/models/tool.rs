use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::ToolParameter;

/// A tool invocation requested by the model.
///
/// `call_id` is opaque and provider-supplied; providers without per-call
/// identifiers leave it empty, in which case results pair with calls by
/// order within the turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub call_id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new<S: Into<String>>(name: S, args: Value) -> Self {
        ToolCall {
            call_id: String::new(),
            name: name.into(),
            args,
        }
    }

    pub fn with_call_id<S: Into<String>>(mut self, call_id: S) -> Self {
        self.call_id = call_id.into();
        self
    }
}

/// The result of executing a tool, echoed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub call_id: String,
    pub name: String,
    pub result: Value,
}

impl ToolResult {
    pub fn new<C: Into<String>, N: Into<String>>(call_id: C, name: N, result: Value) -> Self {
        ToolResult {
            call_id: call_id.into(),
            name: name.into(),
            result,
        }
    }
}

/// Provider-neutral description of a tool and its parameters.
///
/// Adapters derive their own function-declaration format from this.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

/// A callable function the model can invoke.
///
/// `parameters` describes the argument record; `execute` receives the raw
/// JSON arguments the model produced and decodes them itself.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ToolParameter>;

    async fn execute(&self, args: Value) -> anyhow::Result<Value>;
}
