//! Mock provider for tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::provider::{
    ChatChunk, ChatMessage, ChatRequest, ChatResponse, Choice, ChunkChoice, ChunkDelta, ModelInfo,
    Provider, Role, StreamReader, TokenUsage,
};
use crate::{IntelligenceError, Result};

/// Configurable in-memory provider
#[derive(Debug)]
pub struct MockProvider {
    name: String,
    patterns: Vec<String>,
    responses: Mutex<VecDeque<String>>,
    request_count: AtomicU32,
    healthy: AtomicBool,
    closed: AtomicBool,
    always_fail: AtomicBool,
    supports_streaming: bool,
}

impl MockProvider {
    /// A provider named `mock` that serves every model
    pub fn new() -> Self {
        Self::with_name("mock")
    }

    /// A provider with a custom registry name serving every model
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            patterns: vec!["*".to_string()],
            responses: Mutex::new(VecDeque::new()),
            request_count: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            always_fail: AtomicBool::new(false),
            supports_streaming: true,
        }
    }

    /// Restrict the model patterns this provider claims to support
    pub fn with_patterns(mut self, patterns: Vec<&str>) -> Self {
        self.patterns = patterns.into_iter().map(str::to_string).collect();
        self
    }

    /// Disable streaming support
    pub fn without_streaming(mut self) -> Self {
        self.supports_streaming = false;
        self
    }

    /// Queue a scripted response; consumed in order, the last one repeats
    pub fn push_response(&self, content: impl Into<String>) {
        self.responses.lock().push_back(content.into());
    }

    /// Replace the scripted responses
    pub fn set_responses(&self, contents: Vec<&str>) {
        let mut responses = self.responses.lock();
        responses.clear();
        responses.extend(contents.into_iter().map(str::to_string));
    }

    /// Toggle the health probe result
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Make every completion fail
    pub fn set_always_fail(&self, fail: bool) {
        self.always_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of completion/stream calls served
    pub fn request_count(&self) -> u32 {
        self.request_count.load(Ordering::SeqCst)
    }

    fn next_content(&self, request: &ChatRequest) -> String {
        let mut responses = self.responses.lock();
        match responses.len() {
            0 => {
                let last = request
                    .messages
                    .last()
                    .map(|m| m.content.as_str())
                    .unwrap_or_default();
                format!("mock response to: {last}")
            }
            1 => responses[0].clone(),
            _ => responses.pop_front().unwrap_or_default(),
        }
    }

    fn check_request(&self, request: &ChatRequest) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IntelligenceError::ProviderClosed);
        }
        if request.messages.is_empty() {
            return Err(IntelligenceError::EmptyMessages);
        }
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(IntelligenceError::Provider(
                "mock provider configured to fail".to_string(),
            ));
        }
        if !self.supports_model(&request.model) {
            return Err(IntelligenceError::InvalidModel(request.model.clone()));
        }
        Ok(())
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.check_request(&request)?;

        let content = self.next_content(&request);
        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| m.content.len() as u32 / 4)
            .sum();
        let completion_tokens = content.len() as u32 / 4;

        Ok(ChatResponse {
            id: format!("mock-{}", Uuid::new_v4()),
            object: "chat.completion".to_string(),
            created: Utc::now().timestamp(),
            model: request.model,
            system_fingerprint: None,
            choices: vec![Choice {
                index: 0,
                message: ChatMessage {
                    role: Role::Assistant,
                    content,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: Some(TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        })
    }

    async fn stream(&self, request: ChatRequest) -> Result<StreamReader> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.check_request(&request)?;
        if !self.supports_streaming {
            return Err(IntelligenceError::StreamNotSupported(self.name.clone()));
        }

        let content = self.next_content(&request);
        let id = format!("mock-{}", Uuid::new_v4());
        let created = Utc::now().timestamp();
        let model = request.model;

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        tokio::spawn(async move {
            let mut mid = content.len() / 2;
            while !content.is_char_boundary(mid) {
                mid -= 1;
            }
            let pieces = [&content[..mid], &content[mid..]];
            let last = pieces.len() - 1;
            for (i, piece) in pieces.iter().enumerate() {
                let chunk = ChatChunk {
                    id: id.clone(),
                    object: "chat.completion.chunk".to_string(),
                    created,
                    model: model.clone(),
                    system_fingerprint: None,
                    choices: vec![ChunkChoice {
                        index: 0,
                        delta: ChunkDelta {
                            role: (i == 0).then_some(Role::Assistant),
                            content: Some((*piece).to_string()),
                        },
                        finish_reason: (i == last).then(|| "stop".to_string()),
                    }],
                };
                if tx.send(Ok(chunk)).await.is_err() {
                    break;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IntelligenceError::ProviderClosed);
        }
        Ok(self
            .patterns
            .iter()
            .map(|p| ModelInfo {
                id: p.clone(),
                provider: self.name.clone(),
                description: "mock model pattern".to_string(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_model(&self, model_id: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| crate::router::pattern_matches(p, model_id))
    }

    async fn health(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IntelligenceError::ProviderClosed);
        }
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IntelligenceError::Provider("mock marked unhealthy".to_string()))
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn request(model: &str) -> ChatRequest {
        ChatRequest::new(model, vec![ChatMessage::user("hi")])
    }

    #[tokio::test]
    async fn scripted_responses_in_order() {
        let provider = MockProvider::new();
        provider.set_responses(vec!["A", "B"]);

        let a = provider.complete(request("m")).await.unwrap();
        assert_eq!(a.choices[0].message.content, "A");
        let b = provider.complete(request("m")).await.unwrap();
        assert_eq!(b.choices[0].message.content, "B");
        // the last response repeats
        let b2 = provider.complete(request("m")).await.unwrap();
        assert_eq!(b2.choices[0].message.content, "B");
    }

    #[tokio::test]
    async fn empty_messages_rejected() {
        let provider = MockProvider::new();
        let err = provider
            .complete(ChatRequest::new("m", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, IntelligenceError::EmptyMessages));
    }

    #[tokio::test]
    async fn closed_provider_rejected() {
        let provider = MockProvider::new();
        provider.close().await.unwrap();
        let err = provider.complete(request("m")).await.unwrap_err();
        assert!(matches!(err, IntelligenceError::ProviderClosed));
    }

    #[tokio::test]
    async fn pattern_restriction_applies() {
        let provider = MockProvider::new().with_patterns(vec!["test*"]);
        assert!(provider.supports_model("test-model"));
        assert!(!provider.supports_model("prod-model"));

        let err = provider.complete(request("prod-model")).await.unwrap_err();
        assert!(matches!(err, IntelligenceError::InvalidModel(_)));
    }

    #[tokio::test]
    async fn stream_accumulates_to_scripted_content() {
        let provider = MockProvider::new();
        provider.set_responses(vec!["streamed answer"]);

        let mut reader = provider.stream(request("m").streaming()).await.unwrap();
        let mut acc = crate::provider::ChunkAccumulator::new();
        while let Some(chunk) = reader.next().await {
            acc.push(&chunk.unwrap());
        }
        let response = acc.to_response();
        assert_eq!(response.choices[0].message.content, "streamed answer");
        assert_eq!(response.choices[0].finish_reason.as_deref(), Some("stop"));
    }
}
