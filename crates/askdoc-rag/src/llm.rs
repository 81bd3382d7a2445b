//! LLM client implementations
//!
//! Provides OpenAI and Ollama completion clients behind the
//! [`LlmClient`] trait. Transient failures (connect/timeout, HTTP
//! 429/5xx) are retried once before the error is surfaced as
//! [`RagError::GenerationFailure`].

use askdoc_core::{LlmClient, LlmConfig, LlmProvider, RagError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// One retry for transient failures before giving up
const TRANSIENT_RETRIES: u32 = 1;

struct TransportError {
    message: String,
    transient: bool,
}

impl TransportError {
    fn from_send(err: reqwest::Error, what: &str) -> Self {
        Self {
            transient: err.is_timeout() || err.is_connect(),
            message: format!("{what} request failed: {err}"),
        }
    }

    fn from_status(status: reqwest::StatusCode, body: String, what: &str) -> Self {
        Self {
            transient: status.as_u16() == 429 || status.is_server_error(),
            message: format!("{what} returned {status}: {body}"),
        }
    }

    fn from_parse(err: reqwest::Error, what: &str) -> Self {
        Self {
            transient: false,
            message: format!("failed to parse {what} response: {err}"),
        }
    }
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// OpenAI chat-completions API client
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

impl OpenAiClient {
    /// Create a new OpenAI client
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.openai_api_key.as_ref().ok_or_else(|| {
            RagError::InvalidConfiguration("OpenAI API key required".to_string())
        })?;

        let base_url = config
            .openai_base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key: api_key.clone(),
            base_url,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn request(&self, prompt: &str) -> std::result::Result<String, TransportError> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::from_send(e, "completion"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, body, "openai"));
        }

        let result: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| TransportError::from_parse(e, "completion"))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TransportError {
                transient: false,
                message: "no completion generated".to_string(),
            })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.request(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if err.transient && attempt < TRANSIENT_RETRIES => {
                    tracing::warn!(error = %err.message, "transient generation failure, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(RagError::GenerationFailure(err.message)),
            }
        }
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama API client
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

impl OllamaClient {
    /// Create a new Ollama client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.model.clone())
    }

    async fn request(&self, prompt: &str) -> std::result::Result<String, TransportError> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::from_send(e, "completion"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, body, "ollama"));
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| TransportError::from_parse(e, "completion"))?;

        Ok(result.response)
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.request(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if err.transient && attempt < TRANSIENT_RETRIES => {
                    tracing::warn!(error = %err.message, "transient generation failure, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(RagError::GenerationFailure(err.message)),
            }
        }
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an LLM client from config
pub fn create_llm_client(config: &LlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider {
        LlmProvider::OpenAI | LlmProvider::Azure => {
            Ok(Box::new(OpenAiClient::from_config(config)?))
        }
        LlmProvider::Ollama => Ok(Box::new(OllamaClient::from_config(config))),
    }
}

// ============================================================================
// Tests
// ============================================================================
