//! Core provider trait and chat-completion types

use std::collections::{BTreeMap, HashMap};
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat-completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(default)]
    pub stream: bool,
    /// Explicit provider override; bypasses pattern routing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: None,
            stream: false,
            provider: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

/// Token accounting reported by a provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One completion choice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A complete (non-streamed) chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Incremental content for one streamed choice
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// One streamed choice fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One frame of a streamed completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChunk {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    pub choices: Vec<ChunkChoice>,
}

/// Reader side of a streamed completion; yields chunks until end of stream
pub type StreamReader = Pin<Box<dyn Stream<Item = Result<ChatChunk>> + Send>>;

/// A model advertised by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub provider: String,
    #[serde(default)]
    pub description: String,
}

/// Contract every LLM backend adapter implements
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Run a full completion
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;

    /// Open a streamed completion
    async fn stream(&self, request: ChatRequest) -> Result<StreamReader>;

    /// Models served by this provider
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Registry name of the provider
    fn name(&self) -> &str;

    /// Whether the given model id matches the provider's pattern set
    fn supports_model(&self, model_id: &str) -> bool;

    /// Lightweight liveness probe
    async fn health(&self) -> Result<()>;

    /// Release resources; later calls fail with `ProviderClosed`
    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
struct AccumulatedChoice {
    role: Option<Role>,
    content: String,
    finish_reason: Option<String>,
}

/// Collects streamed chunks into a consolidated response.
///
/// Identity fields (id, created, model, fingerprint) are captured from the
/// first chunk; per-index deltas are appended in arrival order and the
/// last non-empty finish reason wins.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    id: Option<String>,
    created: i64,
    model: String,
    system_fingerprint: Option<String>,
    choices: BTreeMap<u32, AccumulatedChoice>,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk into the accumulator
    pub fn push(&mut self, chunk: &ChatChunk) {
        if self.id.is_none() {
            self.id = Some(chunk.id.clone());
            self.created = chunk.created;
            self.model = chunk.model.clone();
            self.system_fingerprint = chunk.system_fingerprint.clone();
        }
        for choice in &chunk.choices {
            let acc = self.choices.entry(choice.index).or_default();
            if acc.role.is_none() {
                acc.role = choice.delta.role;
            }
            if let Some(content) = &choice.delta.content {
                acc.content.push_str(content);
            }
            if let Some(reason) = &choice.finish_reason {
                if !reason.is_empty() {
                    acc.finish_reason = Some(reason.clone());
                }
            }
        }
    }

    /// Emit the consolidated response
    pub fn to_response(&self) -> ChatResponse {
        ChatResponse {
            id: self.id.clone().unwrap_or_default(),
            object: "chat.completion".to_string(),
            created: self.created,
            model: self.model.clone(),
            system_fingerprint: self.system_fingerprint.clone(),
            choices: self
                .choices
                .iter()
                .map(|(index, acc)| Choice {
                    index: *index,
                    message: ChatMessage {
                        role: acc.role.unwrap_or(Role::Assistant),
                        content: acc.content.clone(),
                    },
                    finish_reason: acc.finish_reason.clone(),
                })
                .collect(),
            usage: None,
        }
    }
}
