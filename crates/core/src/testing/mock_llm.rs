//! Mock LLM client.

use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::generate::{CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage};

/// Mock implementation of [`LlmClient`].
///
/// Responses are queued and consumed in order. Requests naming an
/// unavailable model get a 404 without consuming the queue. Once the queue
/// is empty, the default response (if any) is returned.
#[derive(Debug, Default)]
pub struct MockLlmClient {
    queue: Arc<RwLock<VecDeque<Result<String, LlmError>>>>,
    default_response: Arc<RwLock<Option<String>>>,
    unavailable: Arc<RwLock<HashSet<String>>>,
    requests: Arc<RwLock<Vec<CompletionRequest>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_response(&self, text: impl Into<String>) {
        self.queue.write().await.push_back(Ok(text.into()));
    }

    pub async fn push_error(&self, error: LlmError) {
        self.queue.write().await.push_back(Err(error));
    }

    pub async fn set_default_response(&self, text: impl Into<String>) {
        *self.default_response.write().await = Some(text.into());
    }

    pub async fn set_unavailable_model(&self, model: impl Into<String>) {
        self.unavailable.write().await.insert(model.into());
    }

    /// Every request received, in order.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.model().to_string());
        let input_tokens = (request.prompt.len() / 4) as u32;
        self.requests.write().await.push(request);

        if self.unavailable.read().await.contains(&model) {
            return Err(LlmError::Api {
                status: 404,
                message: format!("model: {}", model),
            });
        }

        let next = self.queue.write().await.pop_front();
        let text = match next {
            Some(result) => result?,
            None => self
                .default_response
                .read()
                .await
                .clone()
                .ok_or_else(|| LlmError::Json("no mock response queued".to_string()))?,
        };

        Ok(CompletionResponse {
            usage: LlmUsage {
                input_tokens,
                output_tokens: (text.len() / 4) as u32,
            },
            text,
            model,
        })
    }
}
