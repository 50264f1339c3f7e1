//! Chat-completion clients

use crate::config::SynthesisSettings;
use crate::error::{Result, SearchError};
use crate::network::HttpRequest;
use crate::scheduler::RunContext;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// One completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
}

/// Language model that turns a prompt into an answer
#[async_trait]
pub trait CompletionClient: Send + Sync {
    fn name(&self) -> &str;

    /// Complete `request` before `ctx`'s deadline
    async fn complete(&self, request: &CompletionRequest, ctx: &RunContext) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible chat-completions endpoint
pub struct HttpCompletionClient {
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpCompletionClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
        }
    }

    pub fn from_settings(settings: &SynthesisSettings) -> Self {
        Self::new(&settings.endpoint, &settings.model).with_api_key(settings.api_key.clone())
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    fn name(&self) -> &str {
        "completion"
    }

    async fn complete(&self, request: &CompletionRequest, ctx: &RunContext) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": request.temperature,
            "stream": false,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt },
            ],
        });
        let http = HttpRequest::post(&self.endpoint)
            .bearer(self.api_key.as_deref())
            .json(body);

        let response = ctx.lease().execute_with_timeout(http, ctx.remaining()).await?;
        response.error_for_status(self.name())?;

        let parsed: ChatResponse = response.json()?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| SearchError::MalformedResponse("completion has no content".into()))
    }
}
