use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use threadline_core::config::LlmConfig;
use threadline_core::domain::chat::{ChatRole, ChatTurn, FunctionCall, TurnPart};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model api key is not configured")]
    MissingApiKey,
    #[error("model client could not be built: {0}")]
    Client(String),
    #[error("model transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model api returned status {status}: {message}")]
    Api { status: u16, message: String },
    #[error("model response could not be decoded: {0}")]
    Decode(String),
    #[error("model returned no usable candidate")]
    EmptyResponse,
}

impl LlmError {
    /// Transport failures, rate limiting and server errors are worth another
    /// attempt; everything else fails the same way twice.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// A tool offered to the model, in the JSON-schema shape Gemini expects.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModelReply {
    pub parts: Vec<TurnPart>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { parts: vec![TurnPart::Text(text.into())] }
    }

    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Self { parts: vec![TurnPart::FunctionCall(FunctionCall::new(name, args))] }
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                TurnPart::FunctionCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn into_turn(self) -> ChatTurn {
        ChatTurn::model(self.parts)
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[ChatTurn],
        tools: &[FunctionDeclaration],
    ) -> Result<ModelReply, LlmError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 2, base_delay_ms: 500, max_delay_ms: 8_000 }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Shared HTTP plumbing for the Gemini `generateContent` and `embedContent`
/// endpoints: API key, timeout and retry.
pub(crate) struct GeminiTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    retry: RetryPolicy,
}

impl GeminiTransport {
    pub(crate) fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or(LlmError::MissingApiKey)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|error| LlmError::Client(error.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
        })
    }

    pub(crate) fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn endpoint(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/v1beta/models/{model}:{method}", self.base_url)
    }

    pub(crate) async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut attempt = 0;
        loop {
            match self.post_once(url, body).await {
                Ok(response) => return Ok(response),
                Err(error) if error.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        event_name = "llm.request.retry",
                        attempt = attempt + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "model request failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn post_once<B, R>(&self, url: &str, body: &B) -> Result<R, LlmError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(url)
            .query(&[("key", self.api_key.expose_secret())])
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: api_error_message(&text),
            });
        }

        serde_json::from_str(&text).map_err(|error| LlmError::Decode(error.to_string()))
    }
}

fn api_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct Envelope {
        error: Option<ApiError>,
    }

    #[derive(Deserialize)]
    struct ApiError {
        message: String,
    }

    serde_json::from_str::<Envelope>(body)
        .ok()
        .and_then(|envelope| envelope.error)
        .map(|error| error.message)
        .unwrap_or_else(|| body.chars().take(512).collect())
}

pub struct GeminiChatModel {
    transport: GeminiTransport,
    model: String,
}

impl GeminiChatModel {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self { transport: GeminiTransport::from_config(config)?, model: config.model.clone() })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.transport = self.transport.with_retry(retry);
        self
    }
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn generate(
        &self,
        system_instruction: &str,
        history: &[ChatTurn],
        tools: &[FunctionDeclaration],
    ) -> Result<ModelReply, LlmError> {
        let request = GenerateContentRequest {
            contents: history.iter().map(Content::from_turn).collect(),
            system_instruction: (!system_instruction.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part::text(system_instruction)],
            }),
            tools: (!tools.is_empty())
                .then(|| vec![ToolDeclaration { function_declarations: tools.to_vec() }]),
        };

        let url = self.transport.endpoint(&self.model, "generateContent");
        let response: GenerateContentResponse = self.transport.post_json(&url, &request).await?;
        response.into_reply()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDeclaration>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolDeclaration {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

impl Content {
    fn from_turn(turn: &ChatTurn) -> Self {
        let role = match turn.role {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        };
        Self { role: Some(role), parts: turn.parts.iter().map(Part::from_turn_part).collect() }
    }
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self { text: Some(text.to_string()), ..Self::default() }
    }

    fn from_turn_part(part: &TurnPart) -> Self {
        match part {
            TurnPart::Text(text) => Self::text(text),
            TurnPart::FunctionCall(call) => Self {
                function_call: Some(json!({ "name": call.name, "args": call.args })),
                thought_signature: call.thought_signature.clone(),
                ..Self::default()
            },
            TurnPart::FunctionResponse { name, response } => Self {
                function_response: Some(json!({ "name": name, "response": response })),
                ..Self::default()
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: Option<bool>,
    function_call: Option<FunctionCallResponse>,
    thought_signature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FunctionCallResponse {
    name: String,
    args: Option<Value>,
}

impl GenerateContentResponse {
    fn into_reply(self) -> Result<ModelReply, LlmError> {
        let content = self
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .ok_or(LlmError::EmptyResponse)?;

        let parts = content
            .parts
            .into_iter()
            .filter(|part| !part.thought.unwrap_or(false))
            .filter_map(|part| {
                if let Some(call) = part.function_call {
                    return Some(TurnPart::FunctionCall(FunctionCall {
                        name: call.name,
                        args: call.args.unwrap_or_else(|| json!({})),
                        thought_signature: part.thought_signature,
                    }));
                }
                part.text.map(TurnPart::Text)
            })
            .collect::<Vec<_>>();

        if parts.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(ModelReply { parts })
    }
}
