//! Mock provider for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use sheetsmith_core::error::ProviderError;
use sheetsmith_core::traits::{
    CompletionRequest, CompletionResponse, LlmProvider, ModelInfo, TokenUsage,
};

/// A mock LLM provider for exercising the pipeline without real API calls.
///
/// Returns configurable responses based on prompt content matching, and
/// records every request it receives.
pub struct MockProvider {
    /// Map of prompt substring → response content.
    responses: HashMap<String, String>,
    /// Default response if no prompt matches.
    default_response: String,
    /// Fail every call with this network error message instead of answering.
    failure: Option<String>,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Every request received, in order.
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    /// Create a new mock provider with the given prompt→response mappings.
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            default_response: "{}".to_string(),
            failure: None,
            call_count: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(HashMap::new())
        }
    }

    /// Create a mock whose every call fails with a network error.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(HashMap::new())
        }
    }

    /// Get the number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this provider.
    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    /// Get every request made to this provider.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<CompletionResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        if let Some(message) = &self.failure {
            return Err(ProviderError::NetworkError(message.clone()).into());
        }

        // Find a matching response based on prompt content
        let content = self
            .responses
            .iter()
            .find(|(key, _)| request.prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(CompletionResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                estimated_cost_usd: 0.0,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
            vision: true,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: &str) -> CompletionRequest {
        CompletionRequest {
            model: "mock".into(),
            prompt: prompt.into(),
            system_prompt: None,
            images: vec![],
            max_tokens: 100,
            temperature: 0.0,
            json_output: true,
        }
    }

    #[tokio::test]
    async fn fixed_response() {
        let provider = MockProvider::with_fixed_response("{\"problems\": []}");
        let response = provider.complete(&request("anything")).await.unwrap();
        assert_eq!(response.content, "{\"problems\": []}");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.last_request().unwrap().prompt, "anything");
    }

    #[tokio::test]
    async fn prompt_matching() {
        let mut responses = HashMap::new();
        responses.insert("analyzes a worksheet".to_string(), "{\"analysis\": 1}".to_string());
        responses.insert("practice problems".to_string(), "{\"problems\": []}".to_string());

        let provider = MockProvider::new(responses);

        let resp = provider
            .complete(&request("You are an AI assistant that analyzes a worksheet image."))
            .await
            .unwrap();
        assert!(resp.content.contains("analysis"));

        let resp = provider
            .complete(&request("Generate practice problems based on..."))
            .await
            .unwrap();
        assert!(resp.content.contains("problems"));
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn failing_provider_counts_calls() {
        let provider = MockProvider::failing("connection refused");
        let err = provider.complete(&request("x")).await.unwrap_err();
        assert_eq!(err.to_string(), "network error: connection refused");
        assert_eq!(provider.call_count(), 1);
    }
}
