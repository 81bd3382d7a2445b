//! Askdoc Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout the askdoc
//! pipeline:
//! - Document and chunk models
//! - Retrieval and answer types
//! - Common error types
//! - The answer-generator trait
//! - Configuration management

pub mod config;

pub use config::{AppConfig, ConfigError, LlmConfig, LlmProvider, LoggingConfig, PipelineConfig};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for pipeline operations
#[derive(Error, Debug)]
pub enum RagError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("source not found: {path}")]
    SourceNotFound {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding failed during {operation}: {message}")]
    EmbeddingFailure { operation: String, message: String },

    #[error("generation failed: {0}")]
    GenerationFailure(String),

    #[error("vector index is empty")]
    EmptyIndex,

    #[error("pipeline not ready: state is {state}, expected {expected}")]
    PipelineNotReady {
        state: &'static str,
        expected: &'static str,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// Document Models
// ============================================================================

/// A loaded source document
///
/// Immutable once loaded. Chunks reference their parent by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier
    pub id: Uuid,

    /// Source identifier (file path)
    pub source: String,

    /// Full text content
    pub content: String,

    /// Arbitrary string metadata (file type, name, ...)
    pub metadata: HashMap<String, String>,

    /// Load timestamp
    pub loaded_at: DateTime<Utc>,
}

impl Document {
    /// Create a new document
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            content: content.into(),
            metadata: HashMap::new(),
            loaded_at: Utc::now(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Content length in characters
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// A bounded segment of a document, the retrieval unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier
    pub id: Uuid,

    /// Parent document ID
    pub document_id: Uuid,

    /// Ordinal position within the parent document
    pub index: u32,

    /// Text content
    pub content: String,

    /// Starting character offset in the parent document
    pub start_offset: usize,

    /// Ending character offset (exclusive)
    pub end_offset: usize,
}

impl Chunk {
    /// Create a new chunk
    pub fn new(
        document_id: Uuid,
        index: u32,
        content: impl Into<String>,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            index,
            content: content.into(),
            start_offset,
            end_offset,
        }
    }

    /// Chunk length in characters
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

// ============================================================================
// Retrieval and Answer Types
// ============================================================================

/// A retrieved chunk with its similarity score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,

    /// Relevance score (higher is better)
    pub score: f32,
}

/// A context passage the generator referenced in its answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based index of the context passage (as rendered in the prompt)
    pub index: u32,

    /// Leading snippet of the cited chunk
    pub snippet: String,
}

/// A generated answer with its supporting context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// The question that was asked
    pub question: String,

    /// Generated answer text
    pub text: String,

    /// Retrieved chunks used as context, in retrieval order
    pub sources: Vec<ScoredChunk>,

    /// Passages the generator cited as `[N]`
    pub citations: Vec<Citation>,

    /// End-to-end processing time in milliseconds
    pub elapsed_ms: u64,
}

// ============================================================================
// Traits
// ============================================================================

/// Trait for answer-generating LLM clients
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a completion for a prompt
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// ============================================================================
// Tests
// ============================================================================
