use thiserror::Error;

use crate::config::ConfigError;
use crate::providers::base::ProviderError;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RouterError {
    #[error("no matching model found")]
    NoMatchingModel,

    #[error("unknown tool requested: {0}")]
    UnknownTool(String),

    #[error("max tool turns exceeded")]
    MaxToolTurns,

    #[error("structured output required but invalid")]
    StructuredOutput,

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("model call timed out")]
    Timeout,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Tool(anyhow::Error),
}

impl From<anyhow::Error> for RouterError {
    fn from(err: anyhow::Error) -> Self {
        RouterError::Tool(err)
    }
}

pub type RouterResult<T> = Result<T, RouterError>;
