use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::base::{CallParams, HttpStatusError, Provider, ProviderError, RawResponse, Usage};
use super::retry::{with_retry, RetryConfig};
use crate::config::ModelConfig;
use crate::models::message::Message;
use crate::models::tool::{ToolCall, ToolDef};
use crate::schema::object_schema;

pub const OPENAI_HOST: &str = "https://api.openai.com";

const PROVIDER_TAG: &str = "openai";

/// Adapter for OpenAI-style chat completions endpoints.
#[derive(Debug)]
pub struct OpenAiProvider {
    api_key: String,
    host: String,
    client: reqwest::Client,
    retry: RetryConfig,
}

impl OpenAiProvider {
    pub fn new(config: &ModelConfig, client: reqwest::Client) -> Self {
        Self {
            api_key: config.api_key.clone(),
            host: config
                .host
                .clone()
                .unwrap_or_else(|| OPENAI_HOST.to_string()),
            client,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn call(&self, params: CallParams) -> Result<RawResponse, ProviderError> {
        let mut payload = Map::new();
        payload.insert("model".to_string(), json!(params.model));
        payload.insert(
            "messages".to_string(),
            json!(messages_to_wire(&params.messages)),
        );
        if !params.tool_defs.is_empty() {
            payload.insert("tools".to_string(), json!(tools_to_wire(&params.tool_defs)));
        }
        if params.max_tokens > 0 {
            payload.insert("max_tokens".to_string(), json!(params.max_tokens));
        }
        if params.temperature > 0.0 {
            payload.insert("temperature".to_string(), json!(params.temperature));
        }
        if params.top_p > 0.0 {
            payload.insert("top_p".to_string(), json!(params.top_p));
        }
        if params.output_schema.is_some() {
            // Chat completions enforce json_object, not a full schema.
            payload.insert("response_format".to_string(), json!({"type": "json_object"}));
        }
        let payload = Value::Object(payload);

        if crate::router::verbose_messages() {
            debug!(payload = %payload, "openai request payload");
        }

        let url = format!("{}/v1/chat/completions", self.host.trim_end_matches('/'));
        let response: ChatResponse = with_retry(&self.retry, || async {
            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&payload)
                .send()
                .await?;
            let status = resp.status().as_u16();
            if status >= 400 {
                let body = resp.text().await.unwrap_or_default();
                return Err(HttpStatusError::new(status, body, PROVIDER_TAG).into());
            }
            Ok(resp.json::<ChatResponse>().await?)
        })
        .await?;

        let mut out = RawResponse {
            usage: Usage::new(
                response.usage.prompt_tokens,
                response.usage.completion_tokens,
                response.usage.total_tokens,
            ),
            ..Default::default()
        };
        if let Some(choice) = response.choices.into_iter().next() {
            match choice.message.tool_calls {
                Some(calls) if !calls.is_empty() => {
                    out.tool_calls = calls.into_iter().map(wire_tool_call).collect();
                }
                _ => out.content = content_text(choice.message.content),
            }
        }
        Ok(out)
    }
}

fn wire_tool_call(call: WireToolCall) -> ToolCall {
    let args = if call.function.arguments.trim().is_empty() {
        json!({})
    } else {
        serde_json::from_str(&call.function.arguments).unwrap_or_else(|err| {
            warn!(tool = %call.function.name, error = %err, "unparseable tool call arguments");
            json!({})
        })
    };
    ToolCall::new(call.function.name, args).with_call_id(call.id)
}

/// Concatenate text across content parts; plain strings pass through.
fn content_text(content: Value) -> String {
    match content {
        Value::String(text) => text,
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            texts.join("\n")
        }
        _ => String::new(),
    }
}

/// Convert internal messages to the chat-completions message array.
///
/// Assistant tool-call turns become `tool_calls` entries with the arguments
/// re-serialised to a JSON string; tool-result turns expand to one
/// `role: tool` message per result.
fn messages_to_wire(messages: &[Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        if message.has_tool_calls() {
            let calls: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| {
                    let arguments = if call.args.is_null() {
                        "{}".to_string()
                    } else {
                        call.args.to_string()
                    };
                    json!({
                        "id": call.call_id,
                        "type": "function",
                        "function": {"name": call.name, "arguments": arguments},
                    })
                })
                .collect();
            out.push(json!({"role": "assistant", "content": "", "tool_calls": calls}));
            continue;
        }
        if message.has_tool_results() {
            for result in &message.tool_results {
                out.push(json!({
                    "role": "tool",
                    "tool_call_id": result.call_id,
                    "name": result.name,
                    "content": result.result.to_string(),
                }));
            }
            continue;
        }

        let mut parts = Vec::new();
        if !message.content.is_empty() {
            parts.push(json!({"type": "text", "text": message.content}));
        }
        for url in &message.images {
            parts.push(json!({"type": "image_url", "image_url": {"url": url}}));
        }
        out.push(json!({"role": message.role, "content": parts}));
    }
    out
}

fn tools_to_wire(defs: &[ToolDef]) -> Vec<Value> {
    defs.iter()
        .map(|def| {
            json!({
                "type": "function",
                "function": {
                    "name": def.name,
                    "description": def.description,
                    "parameters": coerce_parameters(object_schema(&def.parameters)),
                },
            })
        })
        .collect()
}

/// Function parameters must be a top-level object schema with a
/// `properties` map, even when empty.
fn coerce_parameters(mut schema: Value) -> Value {
    let Some(object) = schema.as_object_mut() else {
        return json!({"type": "object", "properties": {}});
    };
    if object.get("type").and_then(Value::as_str) != Some("object") {
        object.insert("type".to_string(), json!("object"));
    }
    if !object.contains_key("properties") {
        object.insert("properties".to_string(), json!({}));
    }
    schema
}
