use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::base::{CallParams, HttpStatusError, Provider, ProviderError, RawResponse, Usage};
use super::retry::{with_retry, RetryConfig};
use crate::config::ModelConfig;
use crate::models::message::{Message, Role};
use crate::models::tool::{ToolCall, ToolDef};
use crate::schema::object_schema;

pub const GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";

const PROVIDER_TAG: &str = "gemini";

/// Adapter for Gemini-style generateContent endpoints.
#[derive(Debug)]
pub struct GeminiProvider {
    api_key: String,
    host: String,
    client: reqwest::Client,
    retry: RetryConfig,
}

impl GeminiProvider {
    pub fn new(config: &ModelConfig, client: reqwest::Client) -> Self {
        Self {
            api_key: config.api_key.clone(),
            host: config
                .host
                .clone()
                .unwrap_or_else(|| GEMINI_HOST.to_string()),
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
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default, rename = "usageMetadata")]
    usage: UsageMetadata,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
    #[serde(default, rename = "functionCall")]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn call(&self, params: CallParams) -> Result<RawResponse, ProviderError> {
        // System messages feed systemInstruction rather than contents.
        let (system, conversational): (Vec<&Message>, Vec<&Message>) = params
            .messages
            .iter()
            .partition(|message| message.role == Role::System);

        let contents = contents_to_wire(&conversational);

        let mut payload = Map::new();
        payload.insert("contents".to_string(), json!(contents));

        let system_parts: Vec<Value> = system
            .iter()
            .filter(|message| !message.content.is_empty())
            .map(|message| json!({"text": message.content}))
            .collect();
        if !system_parts.is_empty() {
            payload.insert(
                "systemInstruction".to_string(),
                json!({"parts": system_parts}),
            );
        }

        let mut generation = Map::new();
        if params.max_tokens > 0 {
            generation.insert("maxOutputTokens".to_string(), json!(params.max_tokens));
        }
        if params.temperature > 0.0 {
            generation.insert("temperature".to_string(), json!(params.temperature));
        }
        if params.top_p > 0.0 {
            generation.insert("topP".to_string(), json!(params.top_p));
        }

        if !params.tool_defs.is_empty() {
            payload.insert("tools".to_string(), json!(tools_to_wire(&params.tool_defs)));
            // Structured output conflicts with tool calling, so it is
            // dropped while tools are present. ANY pushes the model toward
            // an initial tool call; once the conversation carries a
            // functionResponse, AUTO lets it finalize instead of looping.
            let mode = if has_function_response(&contents) {
                "AUTO"
            } else {
                "ANY"
            };
            payload.insert(
                "toolConfig".to_string(),
                json!({"functionCallingConfig": {"mode": mode}}),
            );
        } else if let Some(schema) = params.output_schema.as_deref() {
            generation.insert("responseMimeType".to_string(), json!("application/json"));
            generation.insert(
                "responseSchema".to_string(),
                schema_string_to_gemini(schema),
            );
        }
        if !generation.is_empty() {
            payload.insert("generationConfig".to_string(), Value::Object(generation));
        }
        let payload = Value::Object(payload);

        if crate::router::verbose_messages() {
            debug!(payload = %payload, "gemini request payload");
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.host.trim_end_matches('/'),
            params.model,
            self.api_key,
        );
        let response: GenerateResponse = with_retry(&self.retry, || async {
            let resp = self.client.post(&url).json(&payload).send().await?;
            let status = resp.status().as_u16();
            if status >= 400 {
                let body = resp.text().await.unwrap_or_default();
                return Err(HttpStatusError::new(status, body, PROVIDER_TAG).into());
            }
            Ok(resp.json::<GenerateResponse>().await?)
        })
        .await?;

        let mut out = RawResponse {
            usage: Usage::new(
                response.usage.prompt_token_count,
                response.usage.candidates_token_count,
                response.usage.total_token_count,
            ),
            ..Default::default()
        };
        if let Some(candidate) = response.candidates.into_iter().next() {
            let mut tool_calls = Vec::new();
            let mut texts = Vec::new();
            for part in candidate.content.parts {
                if let Some(call) = part.function_call {
                    if !call.name.is_empty() {
                        // Gemini carries no per-call identifiers; results
                        // pair with calls by order within the turn.
                        tool_calls.push(ToolCall::new(call.name, call.args));
                        continue;
                    }
                }
                if !part.text.is_empty() {
                    texts.push(part.text);
                }
            }
            if tool_calls.is_empty() {
                out.content = texts.join("\n");
            } else {
                out.tool_calls = tool_calls;
            }
        }
        Ok(out)
    }
}

/// Convert non-system messages to Gemini contents. Assistant turns map to
/// role `model`; tool-call turns become `functionCall` parts and
/// tool-result turns become `functionResponse` parts under role `tool`.
fn contents_to_wire(messages: &[&Message]) -> Vec<Value> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        if message.has_tool_calls() {
            let parts: Vec<Value> = message
                .tool_calls
                .iter()
                .map(|call| json!({"functionCall": {"name": call.name, "args": call.args}}))
                .collect();
            out.push(json!({"role": wire_role(message.role), "parts": parts}));
            continue;
        }
        if message.has_tool_results() {
            let parts: Vec<Value> = message
                .tool_results
                .iter()
                .map(|result| {
                    json!({"functionResponse": {"name": result.name, "response": result.result}})
                })
                .collect();
            out.push(json!({"role": "tool", "parts": parts}));
            continue;
        }

        let mut parts = Vec::new();
        if !message.content.is_empty() {
            parts.push(json!({"text": message.content}));
        }
        for url in &message.images {
            parts.push(json!({"fileData": {"fileUri": url}}));
        }
        out.push(json!({"role": wire_role(message.role), "parts": parts}));
    }
    out
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::User => "user",
        // System messages are routed to systemInstruction before encoding.
        Role::System => "user",
    }
}

fn has_function_response(contents: &[Value]) -> bool {
    contents.iter().any(|content| {
        content
            .get("parts")
            .and_then(Value::as_array)
            .is_some_and(|parts| {
                parts
                    .iter()
                    .any(|part| part.get("functionResponse").is_some())
            })
    })
}

/// Gemini expects one tools entry holding every function declaration.
fn tools_to_wire(defs: &[ToolDef]) -> Vec<Value> {
    let declarations: Vec<Value> = defs
        .iter()
        .map(|def| {
            json!({
                "name": def.name,
                "description": def.description,
                "parameters": to_gemini_schema(&object_schema(&def.parameters)),
            })
        })
        .collect();
    vec![json!({"functionDeclarations": declarations})]
}

fn schema_string_to_gemini(schema: &str) -> Value {
    match serde_json::from_str::<Value>(schema) {
        Ok(value) => to_gemini_schema(&value),
        Err(_) => json!({"type": "OBJECT", "properties": {}}),
    }
}

/// Rewrite a standard JSON Schema into Gemini's dialect: upper-case types,
/// meta keys and `additionalProperties` dropped, `items` and `properties`
/// substructure retained.
pub(crate) fn to_gemini_schema(node: &Value) -> Value {
    let Some(object) = node.as_object() else {
        return json!({"type": "OBJECT", "properties": {}});
    };
    match object.get("type").and_then(Value::as_str) {
        Some("string") => json!({"type": "STRING"}),
        Some("integer") => json!({"type": "INTEGER"}),
        Some("number") => json!({"type": "NUMBER"}),
        Some("boolean") => json!({"type": "BOOLEAN"}),
        Some("array") => {
            let items = object
                .get("items")
                .map(to_gemini_schema)
                .unwrap_or_else(|| json!({}));
            json!({"type": "ARRAY", "items": items})
        }
        Some("object") | Some("OBJECT") | None => {
            let mut converted = Map::new();
            if let Some(properties) = object.get("properties").and_then(Value::as_object) {
                for (name, child) in properties {
                    converted.insert(name.clone(), to_gemini_schema(child));
                }
            }
            json!({"type": "OBJECT", "properties": converted})
        }
        Some(_) => json!({"type": "OBJECT", "properties": {}}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolResult;
    use crate::schema::{ParamKind, ToolParameter};
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> GeminiProvider {
        let config = ModelConfig {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: "test_api_key".to_string(),
            host: Some(server.uri()),
            ..Default::default()
        };
        GeminiProvider::new(&config, reqwest::Client::new())
    }

    fn text_body(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": {"parts": [{"text": text}], "role": "model"}
            }],
            "usageMetadata": {
                "promptTokenCount": 7,
                "candidatesTokenCount": 11,
                "totalTokenCount": 18
            }
        })
    }

    #[tokio::test]
    async fn test_call_basic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "test_api_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("Hello there")))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let response = provider
            .call(CallParams {
                model: "gemini-2.0-flash".to_string(),
                messages: vec![Message::user("Hello?")],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.content, "Hello there");
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.usage, Usage::new(7, 11, 18));
    }

    #[tokio::test]
    async fn test_call_joins_text_parts() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{"text": "first"}, {"text": "second"}]}
            }]
        });
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let response = provider
            .call(CallParams {
                model: "gemini-2.0-flash".to_string(),
                messages: vec![Message::user("hi")],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(response.content, "first\nsecond");
    }

    #[tokio::test]
    async fn test_call_decodes_function_calls() {
        let body = json!({
            "candidates": [{
                "content": {"parts": [{
                    "functionCall": {
                        "name": "get_weather",
                        "args": {"location": "Portland, Oregon"}
                    }
                }]}
            }]
        });
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let response = provider
            .call(CallParams {
                model: "gemini-2.0-flash".to_string(),
                messages: vec![Message::user("weather?")],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(response.tool_calls.len(), 1);
        let call = &response.tool_calls[0];
        assert!(call.call_id.is_empty());
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.args, json!({"location": "Portland, Oregon"}));
    }

    #[tokio::test]
    async fn test_system_messages_route_to_system_instruction() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "systemInstruction": {"parts": [{"text": "be helpful"}]}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("ok")))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let result = provider
            .call(CallParams {
                model: "gemini-2.0-flash".to_string(),
                messages: vec![Message::system("be helpful"), Message::user("hi")],
                ..Default::default()
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_tool_config_mode_any_on_first_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "toolConfig": {"functionCallingConfig": {"mode": "ANY"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("ok")))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let result = provider
            .call(CallParams {
                model: "gemini-2.0-flash".to_string(),
                messages: vec![Message::user("weather?")],
                tool_defs: vec![ToolDef {
                    name: "get_weather".to_string(),
                    description: "weather".to_string(),
                    parameters: vec![ToolParameter::new("location", ParamKind::String)],
                }],
                ..Default::default()
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_tool_config_mode_auto_after_function_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "toolConfig": {"functionCallingConfig": {"mode": "AUTO"}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("done")))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let messages = vec![
            Message::user("weather?"),
            Message::new(Role::Assistant)
                .with_tool_calls(vec![ToolCall::new("get_weather", json!({}))]),
            Message::new(Role::Assistant).with_tool_results(vec![ToolResult::new(
                "",
                "get_weather",
                json!({"weather": "sunny"}),
            )]),
        ];
        let result = provider
            .call(CallParams {
                model: "gemini-2.0-flash".to_string(),
                messages,
                tool_defs: vec![ToolDef {
                    name: "get_weather".to_string(),
                    description: "weather".to_string(),
                    parameters: vec![],
                }],
                ..Default::default()
            })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_structured_output_without_tools() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "generationConfig": {
                    "responseMimeType": "application/json",
                    "responseSchema": {
                        "type": "OBJECT",
                        "properties": {"summary": {"type": "STRING"}}
                    }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("{}")))
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let schema = r#"{"type":"object","properties":{"summary":{"type":"string"}}}"#;
        let result = provider
            .call(CallParams {
                model: "gemini-2.0-flash".to_string(),
                messages: vec![Message::user("summarize")],
                output_schema: Some(schema.to_string()),
                ..Default::default()
            })
            .await;
        assert!(result.is_ok());
    }

    #[test]
    fn test_contents_to_wire_roles_and_parts() {
        let user = Message::user("hi").with_images(vec!["https://example.com/a.png".into()]);
        let assistant = Message::assistant("hello");
        let messages = vec![&user, &assistant];
        let wire = contents_to_wire(&messages);

        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[0]["parts"][0]["text"], "hi");
        assert_eq!(
            wire[0]["parts"][1]["fileData"]["fileUri"],
            "https://example.com/a.png"
        );
        assert_eq!(wire[1]["role"], "model");
    }

    #[test]
    fn test_contents_to_wire_tool_turns() {
        let calls = Message::new(Role::Assistant)
            .with_tool_calls(vec![ToolCall::new("echo", json!({"text": "hi"}))]);
        let results = Message::new(Role::Assistant).with_tool_results(vec![ToolResult::new(
            "",
            "echo",
            json!({"echo": "hi"}),
        )]);
        let messages = vec![&calls, &results];
        let wire = contents_to_wire(&messages);

        assert_eq!(wire[0]["role"], "model");
        assert_eq!(wire[0]["parts"][0]["functionCall"]["name"], "echo");
        assert_eq!(
            wire[0]["parts"][0]["functionCall"]["args"],
            json!({"text": "hi"})
        );

        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["parts"][0]["functionResponse"]["name"], "echo");
        assert_eq!(
            wire[1]["parts"][0]["functionResponse"]["response"],
            json!({"echo": "hi"})
        );
        assert!(has_function_response(&wire));
    }

    #[test]
    fn test_to_gemini_schema_converts_types() {
        let schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": "Args",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "name": {"type": "string", "description": "a name"},
                "count": {"type": "integer"},
                "ratio": {"type": "number"},
                "enabled": {"type": "boolean"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "nested": {"type": "object", "properties": {"x": {"type": "integer"}}}
            }
        });
        let converted = to_gemini_schema(&schema);

        assert_eq!(converted["type"], "OBJECT");
        let properties = &converted["properties"];
        assert_eq!(properties["name"], json!({"type": "STRING"}));
        assert_eq!(properties["count"], json!({"type": "INTEGER"}));
        assert_eq!(properties["ratio"], json!({"type": "NUMBER"}));
        assert_eq!(properties["enabled"], json!({"type": "BOOLEAN"}));
        assert_eq!(
            properties["tags"],
            json!({"type": "ARRAY", "items": {"type": "STRING"}})
        );
        assert_eq!(
            properties["nested"],
            json!({"type": "OBJECT", "properties": {"x": {"type": "INTEGER"}}})
        );
        assert!(converted.get("additionalProperties").is_none());
        assert!(converted.get("title").is_none());
    }

    #[test]
    fn test_to_gemini_schema_tolerates_junk() {
        assert_eq!(
            to_gemini_schema(&json!("nope")),
            json!({"type": "OBJECT", "properties": {}})
        );
        assert_eq!(
            schema_string_to_gemini("not json"),
            json!({"type": "OBJECT", "properties": {}})
        );
    }
}
