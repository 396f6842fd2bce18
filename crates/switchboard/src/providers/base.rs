use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::message::Message;
use crate::models::tool::{ToolCall, ToolDef};

/// Everything an adapter needs for one model call.
#[derive(Debug, Clone, Default)]
pub struct CallParams {
    pub model: String,
    pub messages: Vec<Message>,
    pub tool_defs: Vec<ToolDef>,
    pub output_schema: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

/// The provider-neutral result of one model call.
///
/// A non-empty `tool_calls` means the assistant wants tools; otherwise
/// `content` holds the (possibly empty) final text.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }
}

/// An HTTP error response, kept inspectable so retry classification and
/// callers can read the status and body.
#[derive(Debug, Error)]
#[error("{provider} http {status}: {body}")]
pub struct HttpStatusError {
    pub status: u16,
    pub body: String,
    pub provider: String,
}

impl HttpStatusError {
    pub fn new<B: Into<String>, P: Into<String>>(status: u16, body: B, provider: P) -> Self {
        Self {
            status,
            body: body.into(),
            provider: provider.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Status(#[from] HttpStatusError),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl ProviderError {
    /// Whether the error is worth retrying: 429 or 5xx responses, and
    /// network timeouts. Everything else is terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Status(err) => err.status == 429 || err.status >= 500,
            ProviderError::Transport(err) => err.is_timeout(),
        }
    }
}

/// Base trait for provider adapters. An adapter owns all vendor-specific
/// translation between [`CallParams`] and its wire protocol.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    async fn call(&self, params: CallParams) -> Result<RawResponse, ProviderError>;
}
