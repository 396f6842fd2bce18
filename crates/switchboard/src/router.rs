//! Model selection and the tool-calling loop.

use std::any::TypeId;
use std::collections::HashMap;
use std::env;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{self, ModelConfig, Registry};
use crate::errors::RouterError;
use crate::models::message::{Message, Role};
use crate::models::tool::{Tool, ToolDef, ToolResult};
use crate::providers::base::{CallParams, Provider};
use crate::providers::factory::create_provider;
use crate::repair::repair_json;
use crate::schema::{json_schema_for, sanitize_response_schema};

/// Set to `1` to log full message payloads at debug level.
pub const VERBOSE_ENV: &str = "LLM_VERBOSE_MESSAGES";

pub(crate) fn verbose_messages() -> bool {
    env::var(VERBOSE_ENV).map(|value| value == "1").unwrap_or(false)
}

/// A single LLM request.
#[derive(Clone, Default)]
pub struct Request {
    /// Registry key of the model to use; empty selects automatically.
    pub model: String,
    pub messages: Vec<Message>,
    pub allow_web_search: bool,
    pub tools: Vec<Arc<dyn Tool>>,
    /// Output token cap; 0 defers to the model's configured maximum.
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Per-turn deadline covering each model call and the tools it triggers.
    pub timeout: Option<Duration>,
}

/// The surface applications call. `execute_raw` runs the tool loop and
/// returns the final model content as a string.
#[async_trait]
pub trait Client: Send + Sync {
    async fn execute_raw(&self, req: Request) -> Result<String, RouterError>;

    /// Structured-output entry used by [`execute`]. The default ignores the
    /// schema, for clients that cannot forward one.
    async fn execute_with_schema(
        &self,
        req: Request,
        _output_schema: &str,
        _require_structured: bool,
    ) -> Result<String, RouterError> {
        self.execute_raw(req).await
    }
}

/// Run the request through the tool loop and parse the final JSON into `T`.
/// If `T` is `String`, the raw text is returned unparsed.
pub async fn execute<T>(client: &dyn Client, req: Request) -> Result<T, RouterError>
where
    T: DeserializeOwned + JsonSchema + 'static,
{
    let schema = json_schema_for::<T>();
    let raw = client.execute_with_schema(req, &schema, true).await?;

    if TypeId::of::<T>() == TypeId::of::<String>() {
        return serde_json::from_value(Value::String(raw))
            .map_err(|_| RouterError::StructuredOutput);
    }

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(value),
        Err(_) => {
            let (repaired, modified) = repair_json(&raw);
            if modified {
                if let Ok(value) = serde_json::from_str(&repaired) {
                    return Ok(value);
                }
            }
            Err(RouterError::StructuredOutput)
        }
    }
}

/// Routes requests to a model from the registry and drives the tool loop
/// against its provider adapter. Adapters are constructed lazily, one per
/// provider tag, and shared across invocations.
pub struct Router {
    models: Registry,
    clients: Mutex<HashMap<String, Arc<dyn Provider>>>,
    http: reqwest::Client,
    max_tool_turns: u32,
}

impl Router {
    pub fn new(models: Registry) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            models,
            clients: Mutex::new(HashMap::new()),
            http,
            max_tool_turns: 5,
        }
    }

    /// Build a router from `LLM_CONFIG_PATH` or `./config.yaml`.
    pub fn from_default_config() -> Result<Self, RouterError> {
        Ok(Self::new(config::load()?))
    }

    pub fn with_max_tool_turns(mut self, max_tool_turns: u32) -> Self {
        self.max_tool_turns = max_tool_turns;
        self
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Pre-seed the adapter cache for a provider tag, bypassing the
    /// built-in factory. This is how additional providers plug in.
    pub fn register_provider<S: Into<String>>(&self, tag: S, provider: Arc<dyn Provider>) {
        self.clients
            .lock()
            .expect("provider cache lock poisoned")
            .insert(tag.into(), provider);
    }

    fn client_for(&self, mc: &ModelConfig) -> Result<Arc<dyn Provider>, RouterError> {
        let mut clients = self.clients.lock().expect("provider cache lock poisoned");
        if let Some(client) = clients.get(&mc.provider) {
            return Ok(Arc::clone(client));
        }
        let client = create_provider(mc, self.http.clone())?;
        clients.insert(mc.provider.clone(), Arc::clone(&client));
        Ok(client)
    }

    fn select_model<'a, 'b>(
        &'a self,
        req: &'b Request,
    ) -> Result<(&'a ModelConfig, &'b str), RouterError>
    where
        'a: 'b,
    {
        if !req.model.is_empty() {
            let mc = self.models.get(&req.model).ok_or(RouterError::NoMatchingModel)?;

            // OpenAI exposes web search only via sibling model identifiers,
            // so redirect to the configured variant (or the "-web" key).
            if req.allow_web_search && mc.provider == "openai" {
                if let Some(variant) = &mc.web_variant {
                    return self
                        .models
                        .get_key_value(variant)
                        .map(|(key, web)| (web, key.as_str()))
                        .ok_or(RouterError::NoMatchingModel);
                }
                let fallback = format!("{}-web", req.model);
                return self
                    .models
                    .get_key_value(&fallback)
                    .map(|(key, web)| (web, key.as_str()))
                    .ok_or(RouterError::NoMatchingModel);
            }

            if !req.tools.is_empty() && !mc.supports_tools {
                return Err(RouterError::NoMatchingModel);
            }
            if req.allow_web_search && !mc.supports_web_search {
                return Err(RouterError::NoMatchingModel);
            }
            return Ok((mc, req.model.as_str()));
        }

        // Auto-select: first capable model in lexicographic key order.
        for (key, mc) in &self.models {
            if req.allow_web_search && !mc.supports_web_search {
                continue;
            }
            if !req.tools.is_empty() && !mc.supports_tools {
                continue;
            }
            return Ok((mc, key));
        }
        Err(RouterError::NoMatchingModel)
    }

    async fn execute_internal(
        &self,
        req: Request,
        output_schema: Option<&str>,
        require_structured: bool,
    ) -> Result<String, RouterError> {
        let (mc, model_key) = self.select_model(&req)?;
        let client = self.client_for(mc)?;

        let defs: Vec<ToolDef> = req
            .tools
            .iter()
            .map(|tool| ToolDef {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();

        // Forward the schema only when structure is required and the model
        // supports it; otherwise the typed decoder parses and repairs.
        let output_schema = if !require_structured || !mc.supports_structured_output {
            None
        } else {
            output_schema
                .filter(|schema| !schema.is_empty())
                .map(sanitize_response_schema)
        };

        let mut conversation = req.messages.clone();
        let max_turns = if self.max_tool_turns > 0 {
            self.max_tool_turns
        } else {
            3
        };

        for _ in 0..max_turns {
            let turn = self.run_turn(
                client.as_ref(),
                mc,
                model_key,
                &defs,
                output_schema.as_deref(),
                &mut conversation,
                &req,
            );
            // The deadline is per turn, not per invocation: one slow model
            // call must not starve later tool dispatches of their budget.
            let outcome = match req.timeout {
                Some(timeout) if !timeout.is_zero() => tokio::time::timeout(timeout, turn)
                    .await
                    .map_err(|_| RouterError::Timeout)?,
                _ => turn.await,
            }?;
            if let Some(final_text) = outcome {
                return Ok(final_text);
            }
        }
        Err(RouterError::MaxToolTurns)
    }

    /// One turn: a model call, and on a tool-call response the sequential
    /// execution of every requested tool. Returns the final text when the
    /// model produced one.
    #[allow(clippy::too_many_arguments)]
    async fn run_turn(
        &self,
        client: &dyn Provider,
        mc: &ModelConfig,
        model_key: &str,
        defs: &[ToolDef],
        output_schema: Option<&str>,
        conversation: &mut Vec<Message>,
        req: &Request,
    ) -> Result<Option<String>, RouterError> {
        if verbose_messages() {
            debug!(
                provider = %mc.provider,
                model = %mc.model,
                messages = ?conversation,
                tools = ?defs,
                "outgoing messages"
            );
        }

        let start = Instant::now();
        let result = client
            .call(CallParams {
                model: mc.model.clone(),
                messages: conversation.clone(),
                tool_defs: defs.to_vec(),
                output_schema: output_schema.map(str::to_string),
                max_tokens: bounded_tokens(req.max_tokens, mc.max_output_tokens),
                temperature: req.temperature,
                top_p: req.top_p,
            })
            .await;
        let latency = start.elapsed();

        let usage = result.as_ref().map(|resp| resp.usage).unwrap_or_default();
        info!(
            provider = %mc.provider,
            model = %mc.model,
            model_key = %model_key,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            latency_ms = latency.as_millis() as u64,
            error = result.is_err(),
            "llm call"
        );
        let response = result?;

        // No tool call: the content is the final answer.
        if response.tool_calls.is_empty() {
            return Ok(Some(response.content));
        }

        // Echo the model's calls into the conversation so adapters can pair
        // them with the results that follow.
        conversation
            .push(Message::new(Role::Assistant).with_tool_calls(response.tool_calls.clone()));

        let mut results = Vec::with_capacity(response.tool_calls.len());
        for call in &response.tool_calls {
            let tool = req
                .tools
                .iter()
                .find(|tool| tool.name() == call.name)
                .ok_or_else(|| RouterError::UnknownTool(call.name.clone()))?;
            let output = tool
                .execute(call.args.clone())
                .await
                .map_err(RouterError::Tool)?;
            if verbose_messages() {
                debug!(tool = %call.name, args = %call.args, output = %output, "tool executed");
            }
            results.push(ToolResult::new(
                call.call_id.clone(),
                call.name.clone(),
                output,
            ));
        }
        conversation.push(Message::new(Role::Assistant).with_tool_results(results));
        Ok(None)
    }
}

#[async_trait]
impl Client for Router {
    async fn execute_raw(&self, req: Request) -> Result<String, RouterError> {
        self.execute_internal(req, None, false).await
    }

    async fn execute_with_schema(
        &self,
        req: Request,
        output_schema: &str,
        require_structured: bool,
    ) -> Result<String, RouterError> {
        self.execute_internal(req, Some(output_schema), require_structured)
            .await
    }
}

/// Clamp the requested output tokens to the model's configured maximum;
/// an unset request defers to that maximum.
fn bounded_tokens(requested: u32, max: u32) -> u32 {
    if max == 0 {
        return requested;
    }
    if requested == 0 || requested > max {
        return max;
    }
    requested
}
