use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use threadline_core::config::LlmConfig;

use crate::llm::{GeminiTransport, LlmError, RetryPolicy};

/// Whether text is being embedded to be stored or to be searched with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingTask {
    Query,
    Document,
}

impl EmbeddingTask {
    fn as_gemini(self) -> &'static str {
        match self {
            Self::Query => "RETRIEVAL_QUERY",
            Self::Document => "RETRIEVAL_DOCUMENT",
        }
    }
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, LlmError>;
}

pub struct GeminiEmbedder {
    transport: GeminiTransport,
    model: String,
}

impl GeminiEmbedder {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self {
            transport: GeminiTransport::from_config(config)?,
            model: config.embedding_model.clone(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.transport = self.transport.with_retry(retry);
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
    embedding: Option<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, LlmError> {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        let request = EmbedContentRequest {
            model: format!("models/{model}"),
            content: EmbedContent { parts: [EmbedPart { text }] },
            task_type: task.as_gemini(),
        };

        let url = self.transport.endpoint(model, "embedContent");
        let response: EmbedContentResponse = self.transport.post_json(&url, &request).await?;
        let values = response.embedding.map(|embedding| embedding.values).unwrap_or_default();
        if values.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(values)
    }
}
