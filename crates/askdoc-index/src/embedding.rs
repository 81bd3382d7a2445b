//! Embedding client for generating vector representations
//!
//! Supports OpenAI and Ollama embedding APIs. Transient failures
//! (connect/timeout, HTTP 429/5xx) are retried once before the error is
//! surfaced as [`RagError::EmbeddingFailure`].

use askdoc_core::{LlmConfig, LlmProvider, RagError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

// ============================================================================
// Embedding Trait
// ============================================================================

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Generate embedding for a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts (batch)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get embedding dimension
    fn dimension(&self) -> usize;

    /// Stable `provider/model` identifier
    ///
    /// Recorded when an index is built and checked again at query time:
    /// vectors from different providers or models live in different
    /// embedding spaces and must never be compared.
    fn identity(&self) -> String;
}

// ============================================================================
// Transport errors and retry policy
// ============================================================================

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

    fn into_embedding_failure(self, operation: &str) -> RagError {
        RagError::EmbeddingFailure {
            operation: operation.to_string(),
            message: self.message,
        }
    }
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedding {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest {
    input: Vec<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding client
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536, // Default
        };

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config.openai_api_key.as_ref().ok_or_else(|| {
            RagError::InvalidConfiguration("OpenAI API key required".to_string())
        })?;

        let mut client = Self::new(api_key.clone(), config.embedding_model.clone());
        if let Some(url) = &config.openai_base_url {
            client.base_url = url.clone();
        }
        Ok(client)
    }

    /// Set custom base URL (for Azure or compatible APIs)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    async fn request(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, TransportError> {
        let request = OpenAiEmbeddingRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::from_send(e, "embedding"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, body, "openai embedding"));
        }

        let result: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| TransportError::from_parse(e, "embedding"))?;

        // Sort by index and extract embeddings
        let mut embeddings: Vec<_> = result.data.into_iter().collect();
        embeddings.sort_by_key(|e| e.index);

        Ok(embeddings.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::EmbeddingFailure {
                operation: "embed".to_string(),
                message: "no embedding returned".to_string(),
            })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        loop {
            match self.request(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) if err.transient && attempt < TRANSIENT_RETRIES => {
                    tracing::warn!(error = %err.message, "transient embedding failure, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into_embedding_failure("embed_batch")),
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn identity(&self) -> String {
        format!("openai/{}", self.model)
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedding {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding client
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let dimension = match model.as_str() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768, // Default for most models
        };

        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model,
            dimension,
        }
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.ollama_url.clone(), config.embedding_model.clone())
    }

    async fn request(&self, text: &str) -> std::result::Result<Vec<f32>, TransportError> {
        let request = OllamaEmbeddingRequest {
            model: self.model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::from_send(e, "embedding"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, body, "ollama embedding"));
        }

        let result: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| TransportError::from_parse(e, "embedding"))?;

        Ok(result.embedding)
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut attempt = 0;
        loop {
            match self.request(text).await {
                Ok(vector) => return Ok(vector),
                Err(err) if err.transient && attempt < TRANSIENT_RETRIES => {
                    tracing::warn!(error = %err.message, "transient embedding failure, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into_embedding_failure("embed")),
            }
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Ollama has no native batch embedding; process sequentially
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn identity(&self) -> String {
        format!("ollama/{}", self.model)
    }
}

// ============================================================================
// Factory function
// ============================================================================

/// Create an embedding client from config
pub fn create_embedding_client(config: &LlmConfig) -> Result<Box<dyn EmbeddingClient>> {
    match config.provider {
        LlmProvider::OpenAI | LlmProvider::Azure => {
            Ok(Box::new(OpenAiEmbedding::from_config(config)?))
        }
        LlmProvider::Ollama => Ok(Box::new(OllamaEmbedding::from_config(config))),
    }
}

// ============================================================================
// Tests
// ============================================================================
