use std::sync::Arc;

use super::base::Provider;
use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use crate::config::ModelConfig;
use crate::errors::RouterError;

/// Construct the adapter for a model's provider tag. New providers plug in
/// by implementing [`Provider`] and adding a match arm, or by registering
/// an instance with the router directly.
pub fn create_provider(
    config: &ModelConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn Provider>, RouterError> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config, client))),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config, client))),
        other => Err(RouterError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_providers() {
        let mut config = ModelConfig {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            ..Default::default()
        };
        assert!(create_provider(&config, reqwest::Client::new()).is_ok());

        config.provider = "gemini".to_string();
        assert!(create_provider(&config, reqwest::Client::new()).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let config = ModelConfig {
            provider: "mystery".to_string(),
            ..Default::default()
        };
        let err = create_provider(&config, reqwest::Client::new()).unwrap_err();
        assert!(matches!(err, RouterError::UnknownProvider(tag) if tag == "mystery"));
    }
}
