use std::sync::Mutex;

use async_trait::async_trait;

use super::base::{CallParams, Provider, ProviderError, RawResponse};

/// A scripted provider that returns pre-configured responses and records
/// every call it receives, for testing the orchestrator without a network.
#[derive(Debug, Default)]
pub struct MockProvider {
    responses: Mutex<Vec<RawResponse>>,
    calls: Mutex<Vec<CallParams>>,
}

impl MockProvider {
    /// Create a mock provider with a sequence of responses, served in order.
    pub fn new(responses: Vec<RawResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The model identifier observed on the most recent call.
    pub fn last_model(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .map(|params| params.model.clone())
    }

    /// All recorded calls, in order.
    pub fn recorded_calls(&self) -> Vec<CallParams> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn call(&self, params: CallParams) -> Result<RawResponse, ProviderError> {
        self.calls.lock().unwrap().push(params);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            // Keep returning empty responses once the script runs out.
            Ok(RawResponse::default())
        } else {
            Ok(responses.remove(0))
        }
    }
}
