//! Askdoc RAG - Retrieval-augmented question-answering pipeline
//!
//! Composes the loader, chunker, embedding provider, vector index, and
//! answer generator into an initialize-then-query lifecycle:
//!
//! ```text
//! build:  file -> chunks -> embeddings -> vector index
//! query:  question -> embedding -> top-k chunks -> prompt -> answer
//! ```
//!
//! The lifecycle is an explicit state machine,
//! `Uninitialized -> Indexed -> Ready`, held as a sum type so an
//! unbuilt index can never be queried. `initialize` and `activate` take
//! `&mut self` while `ask` takes `&self`; the borrow checker enforces
//! the mutual-exclusion region between rebuilds and queries, and after
//! `Ready` concurrent `ask` calls are safe (the index is read-only and
//! the HTTP clients are stateless per call).

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use askdoc_core::{
    Answer, Chunk, Citation, LlmClient, PipelineConfig, RagError, Result, ScoredChunk,
};
use askdoc_index::{EmbeddingClient, IndexEntry, SimilarityMetric, VectorIndex};
use askdoc_text::{Chunker, TextLoader};
use regex::Regex;

pub mod cache;
pub mod llm;

pub use cache::{CacheConfig, CacheStatsReport, EmbeddingCache};
pub use llm::{create_llm_client, OllamaClient, OpenAiClient};

/// `[N]` citation markers in generated answers
const CITATION_PATTERN: &str = r"\[(\d+)\]";

/// Snippet length (characters) recorded per citation
const CITATION_SNIPPET_CHARS: usize = 200;

// ============================================================================
// Pipeline State
// ============================================================================

/// Index plus the provenance needed to query it safely
struct BuiltIndex {
    index: VectorIndex,

    /// `provider/model` identity of the embedder the index was built with
    embedder_identity: String,

    /// Source the index was built from
    source: String,
}

/// Lifecycle states of the pipeline
enum PipelineState {
    Uninitialized,
    Indexed(BuiltIndex),
    Ready(BuiltIndex),
}

impl PipelineState {
    fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Indexed(_) => "indexed",
            Self::Ready(_) => "ready",
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Retrieval-augmented question-answering pipeline
pub struct Pipeline {
    embedder: Arc<dyn EmbeddingClient>,
    generator: Arc<dyn LlmClient>,
    config: PipelineConfig,
    cache: EmbeddingCache,
    state: PipelineState,
}

impl Pipeline {
    /// Create a pipeline in the `Uninitialized` state
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        generator: Arc<dyn LlmClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            embedder,
            generator,
            config,
            cache: EmbeddingCache::new(),
            state: PipelineState::Uninitialized,
        }
    }

    /// Replace the embedding cache configuration
    pub fn with_cache_config(mut self, config: &CacheConfig) -> Self {
        self.cache = EmbeddingCache::with_config(config);
        self
    }

    /// Current lifecycle state, for logging and diagnostics
    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    /// Pipeline configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Embedding cache statistics
    pub fn cache_stats(&self) -> CacheStatsReport {
        self.cache.stats()
    }

    /// Load a document, chunk it, embed every chunk, and build the index
    ///
    /// Transitions to `Indexed` on success. Any failure leaves the
    /// pipeline `Uninitialized`; a partially built index is never
    /// retained. Re-initialization replaces the previous index wholesale.
    pub async fn initialize(&mut self, source: impl AsRef<Path>) -> Result<()> {
        // Drop any previous index up front: a failed rebuild must not
        // leave a stale one behind.
        self.state = PipelineState::Uninitialized;

        let document = TextLoader::new().load(source)?;
        let chunker = Chunker::new(self.config.chunk_size, self.config.chunk_overlap)?;
        let chunks = chunker.split(&document);

        tracing::info!(
            source = %document.source,
            chunks = chunks.len(),
            "document loaded and chunked"
        );

        let vectors = self.embed_chunks(&chunks).await?;
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();
        let index = VectorIndex::build(entries, SimilarityMetric::Cosine)?;

        tracing::info!(
            entries = index.len(),
            dimension = index.dimension(),
            "vector index built"
        );

        self.state = PipelineState::Indexed(BuiltIndex {
            index,
            embedder_identity: self.embedder.identity(),
            source: document.source,
        });
        Ok(())
    }

    /// Transition `Indexed -> Ready` after validating the index is usable
    ///
    /// Fails with [`RagError::EmptyIndex`] when nothing was indexed (the
    /// state stays `Indexed`), and [`RagError::PipelineNotReady`] in any
    /// other state.
    pub fn activate(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, PipelineState::Uninitialized) {
            PipelineState::Indexed(built) => {
                if built.index.is_empty() {
                    self.state = PipelineState::Indexed(built);
                    return Err(RagError::EmptyIndex);
                }
                tracing::info!(source = %built.source, "pipeline ready");
                self.state = PipelineState::Ready(built);
                Ok(())
            }
            other => {
                let state = other.name();
                self.state = other;
                Err(RagError::PipelineNotReady {
                    state,
                    expected: "indexed",
                })
            }
        }
    }

    /// Answer a question from the indexed document
    ///
    /// Only legal in `Ready`. Embeds the question with the same provider
    /// used at build time, retrieves the top-k most similar chunks, and
    /// generates an answer conditioned on them.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let started = Instant::now();

        let built = match &self.state {
            PipelineState::Ready(built) => built,
            other => {
                return Err(RagError::PipelineNotReady {
                    state: other.name(),
                    expected: "ready",
                })
            }
        };

        // Vectors from a different provider or model live in a different
        // embedding space; comparing them would silently corrupt retrieval.
        let identity = self.embedder.identity();
        if identity != built.embedder_identity {
            return Err(RagError::InvalidConfiguration(format!(
                "embedding provider changed since index build: built with {}, querying with {}",
                built.embedder_identity, identity
            )));
        }

        let query_vector = self.embed_text(question).await?;
        let sources = built.index.search(&query_vector, self.config.top_k)?;
        tracing::debug!(retrieved = sources.len(), "retrieval complete");

        let prompt = build_prompt(question, &sources, self.config.max_context_length);
        tracing::debug!(prompt_chars = prompt.len(), "calling generator");
        let text = self.generator.generate(&prompt).await?;

        let citations = extract_citations(&text, &sources);

        Ok(Answer {
            question: question.to_string(),
            text,
            sources,
            citations,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Embed one text, consulting the cache first
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.cache.get(text).await {
            return Ok(vector);
        }
        let vector = self.embedder.embed(text).await?;
        self.cache.put(text, vector.clone()).await;
        Ok(vector)
    }

    /// Embed chunk contents, batching everything the cache cannot serve
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());
        let mut missing_slots = Vec::new();
        let mut missing_texts = Vec::new();

        for (slot, chunk) in chunks.iter().enumerate() {
            match self.cache.get(&chunk.content).await {
                Some(vector) => vectors.push(Some(vector)),
                None => {
                    vectors.push(None);
                    missing_slots.push(slot);
                    missing_texts.push(chunk.content.clone());
                }
            }
        }

        if !missing_texts.is_empty() {
            let embedded = self.embedder.embed_batch(&missing_texts).await?;
            if embedded.len() != missing_texts.len() {
                return Err(RagError::EmbeddingFailure {
                    operation: "embed_batch".to_string(),
                    message: format!(
                        "requested {} embeddings, got {}",
                        missing_texts.len(),
                        embedded.len()
                    ),
                });
            }
            for ((slot, text), vector) in
                missing_slots.into_iter().zip(missing_texts).zip(embedded)
            {
                self.cache.put(&text, vector.clone()).await;
                vectors[slot] = Some(vector);
            }
        }

        vectors
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| RagError::EmbeddingFailure {
                    operation: "embed_batch".to_string(),
                    message: "missing embedding for chunk".to_string(),
                })
            })
            .collect()
    }
}

// ============================================================================
// Prompt construction
// ============================================================================

/// Builder for retrieval-augmented prompts
pub struct PromptBuilder {
    system_instruction: String,
    context_sections: Vec<String>,
    question: String,
    instructions: Vec<String>,
}

impl PromptBuilder {
    /// Create a new prompt builder
    pub fn new() -> Self {
        Self {
            system_instruction: String::new(),
            context_sections: Vec::new(),
            question: String::new(),
            instructions: Vec::new(),
        }
    }

    /// Set system instruction
    pub fn system(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Add a context section
    pub fn add_context(mut self, context: impl Into<String>) -> Self {
        self.context_sections.push(context.into());
        self
    }

    /// Set the question
    pub fn question(mut self, q: impl Into<String>) -> Self {
        self.question = q.into();
        self
    }

    /// Add an instruction
    pub fn add_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    /// Build the final prompt
    pub fn build(self) -> String {
        let mut prompt = String::new();

        if !self.system_instruction.is_empty() {
            prompt.push_str(&self.system_instruction);
            prompt.push_str("\n\n");
        }

        if !self.context_sections.is_empty() {
            prompt.push_str("Context:\n");
            for section in &self.context_sections {
                prompt.push_str(section);
                prompt.push_str("\n\n");
            }
        }

        if !self.question.is_empty() {
            prompt.push_str("Question: ");
            prompt.push_str(&self.question);
            prompt.push_str("\n\n");
        }

        if !self.instructions.is_empty() {
            prompt.push_str("Instructions:\n");
            for (i, inst) in self.instructions.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, inst));
            }
            prompt.push('\n');
        }

        prompt.push_str("Answer:");
        prompt
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Assemble the generation prompt from the retrieved chunks, in result
/// order, numbered so the generator can cite them as `[N]`.
fn build_prompt(question: &str, sources: &[ScoredChunk], max_context_length: usize) -> String {
    let mut builder = PromptBuilder::new()
        .system(
            "Use the following pieces of context to answer the question at the end. \
             If you don't know the answer, just say that you don't know, \
             don't try to make up an answer.",
        )
        .question(question)
        .add_instruction("Answer using only the provided context.")
        .add_instruction("Cite the context passages you used as [N].")
        .add_instruction("If the context does not contain the answer, say that you don't know.");

    let mut total = 0usize;
    for (i, scored) in sources.iter().enumerate() {
        if total + scored.chunk.content.len() > max_context_length {
            tracing::debug!(
                included = i,
                retrieved = sources.len(),
                "context budget reached, truncating prompt context"
            );
            break;
        }
        total += scored.chunk.content.len();
        builder = builder.add_context(format!("[{}] {}", i + 1, scored.chunk.content));
    }

    builder.build()
}

/// Map `[N]` markers in the generated answer back to the retrieved chunks
fn extract_citations(answer: &str, sources: &[ScoredChunk]) -> Vec<Citation> {
    let Ok(re) = Regex::new(CITATION_PATTERN) else {
        return Vec::new();
    };

    let mut citations: Vec<Citation> = re
        .captures_iter(answer)
        .filter_map(|cap| cap.get(1))
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .filter(|&n| n >= 1 && n <= sources.len())
        .map(|n| Citation {
            index: n as u32,
            snippet: sources[n - 1]
                .chunk
                .content
                .chars()
                .take(CITATION_SNIPPET_CHARS)
                .collect(),
        })
        .collect();

    citations.sort_by_key(|c| c.index);
    citations.dedup_by_key(|c| c.index);
    citations
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use askdoc_core::Chunk;
    use std::io::Write;
    use uuid::Uuid;

    /// Deterministic embedder counting a few marker words
    struct MockEmbedder {
        identity: String,
    }

    impl MockEmbedder {
        fn new(identity: &str) -> Self {
            Self {
                identity: identity.to_string(),
            }
        }

        fn vectorize(text: &str) -> Vec<f32> {
            let lower = text.to_lowercase();
            let count = |word: &str| lower.matches(word).count() as f32;
            vec![count("alpha"), count("beta"), count("gamma"), 1.0]
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingClient for MockEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(Self::vectorize(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn identity(&self) -> String {
            self.identity.clone()
        }
    }

    /// Generator returning a canned answer with a citation marker
    struct MockGenerator;

    #[async_trait::async_trait]
    impl LlmClient for MockGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("The answer is alpha [1].".to_string())
        }
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(
            Arc::new(MockEmbedder::new("mock/embedder-a")),
            Arc::new(MockGenerator),
            PipelineConfig::default(),
        )
    }

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::with_suffix(".txt").unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    fn scored(index_1based: usize, content: &str) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk::new(
                Uuid::new_v4(),
                index_1based as u32 - 1,
                content,
                0,
                content.len(),
            ),
            score: 1.0 / index_1based as f32,
        }
    }

    #[tokio::test]
    async fn test_ask_before_initialize_fails_with_not_ready() {
        let pipeline = pipeline();

        let err = pipeline.ask("anything?").await.unwrap_err();
        assert!(matches!(
            err,
            RagError::PipelineNotReady {
                state: "uninitialized",
                expected: "ready"
            }
        ));
    }

    #[tokio::test]
    async fn test_activate_before_initialize_fails() {
        let mut pipeline = pipeline();

        let err = pipeline.activate().unwrap_err();
        assert!(matches!(err, RagError::PipelineNotReady { .. }));
        assert_eq!(pipeline.state_name(), "uninitialized");
    }

    #[tokio::test]
    async fn test_initialize_missing_file_stays_uninitialized() {
        let mut pipeline = pipeline();

        let err = pipeline.initialize("no/such/file.txt").await.unwrap_err();
        assert!(matches!(err, RagError::SourceNotFound { .. }));
        assert_eq!(pipeline.state_name(), "uninitialized");
    }

    #[tokio::test]
    async fn test_empty_document_cannot_activate() {
        let file = write_temp("");
        let mut pipeline = pipeline();

        pipeline.initialize(file.path()).await.unwrap();
        assert_eq!(pipeline.state_name(), "indexed");

        let err = pipeline.activate().unwrap_err();
        assert!(matches!(err, RagError::EmptyIndex));
        assert_eq!(pipeline.state_name(), "indexed");
    }

    #[tokio::test]
    async fn test_initialize_then_ask_without_activate_fails() {
        let file = write_temp("alpha is the first letter.");
        let mut pipeline = pipeline();

        pipeline.initialize(file.path()).await.unwrap();

        let err = pipeline.ask("what is alpha?").await.unwrap_err();
        assert!(matches!(
            err,
            RagError::PipelineNotReady {
                state: "indexed",
                expected: "ready"
            }
        ));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let file = write_temp("alpha is the first letter. beta comes second.");
        let mut pipeline = pipeline();

        pipeline.initialize(file.path()).await.unwrap();
        pipeline.activate().unwrap();
        assert_eq!(pipeline.state_name(), "ready");

        let answer = pipeline.ask("what is alpha?").await.unwrap();
        assert_eq!(answer.text, "The answer is alpha [1].");
        assert!(!answer.sources.is_empty());
        assert!(answer.sources.len() <= 3);
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].index, 1);
    }

    #[tokio::test]
    async fn test_embedder_identity_is_checked_at_query_time() {
        let file = write_temp("alpha beta gamma.");
        let mut pipeline = pipeline();

        pipeline.initialize(file.path()).await.unwrap();
        pipeline.activate().unwrap();

        // Swap in a client from a different embedding space
        pipeline.embedder = Arc::new(MockEmbedder::new("mock/embedder-b"));

        let err = pipeline.ask("what is alpha?").await.unwrap_err();
        assert!(matches!(err, RagError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("mock/embedder-a"));
        assert!(err.to_string().contains("mock/embedder-b"));
    }

    #[tokio::test]
    async fn test_reinitialize_requires_activate_again() {
        let first = write_temp("alpha alpha alpha.");
        let second = write_temp("beta beta beta.");
        let mut pipeline = pipeline();

        pipeline.initialize(first.path()).await.unwrap();
        pipeline.activate().unwrap();

        pipeline.initialize(second.path()).await.unwrap();
        assert_eq!(pipeline.state_name(), "indexed");

        let err = pipeline.ask("what is beta?").await.unwrap_err();
        assert!(matches!(err, RagError::PipelineNotReady { .. }));

        pipeline.activate().unwrap();
        let answer = pipeline.ask("what is beta?").await.unwrap();
        assert!(answer.sources[0].chunk.content.contains("beta"));
    }

    #[tokio::test]
    async fn test_chunk_embeddings_are_cached_across_rebuilds() {
        let file = write_temp("alpha is the first letter.");
        let mut pipeline = pipeline();

        pipeline.initialize(file.path()).await.unwrap();
        let misses_after_first = pipeline.cache_stats().misses;
        assert!(misses_after_first > 0);

        pipeline.initialize(file.path()).await.unwrap();
        let stats = pipeline.cache_stats();
        assert_eq!(stats.misses, misses_after_first);
        assert!(stats.hits > 0);
    }

    #[test]
    fn test_prompt_builder_sections() {
        let prompt = PromptBuilder::new()
            .system("You answer from context only.")
            .add_context("[1] Context from document A")
            .add_context("[2] Context from document B")
            .question("What is the answer?")
            .add_instruction("Be concise")
            .add_instruction("Cite sources")
            .build();

        assert!(prompt.starts_with("You answer from context only."));
        assert!(prompt.contains("Context:\n[1] Context from document A"));
        assert!(prompt.contains("Question: What is the answer?"));
        assert!(prompt.contains("1. Be concise"));
        assert!(prompt.contains("2. Cite sources"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_prompt_without_context_still_instructs_honesty() {
        let prompt = build_prompt("what is alpha?", &[], 8000);

        assert!(!prompt.contains("Context:"));
        assert!(prompt.contains("don't know"));
        assert!(prompt.contains("Question: what is alpha?"));
    }

    #[test]
    fn test_prompt_context_respects_budget() {
        let sources = vec![scored(1, &"a".repeat(60)), scored(2, &"b".repeat(60))];

        let prompt = build_prompt("q?", &sources, 100);

        assert!(prompt.contains("[1]"));
        assert!(!prompt.contains("[2]"));
    }

    #[test]
    fn test_extract_citations_maps_and_dedupes() {
        let sources = vec![scored(1, "first passage"), scored(2, "second passage")];

        let citations =
            extract_citations("Both [2] and [1] agree, see [1]. Ignore [7].", &sources);

        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].index, 1);
        assert_eq!(citations[0].snippet, "first passage");
        assert_eq!(citations[1].index, 2);
    }

    #[test]
    fn test_extract_citations_ignores_zero_and_out_of_range() {
        let sources = vec![scored(1, "only passage")];

        let citations = extract_citations("[0] [1] [2]", &sources);

        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].index, 1);
    }
}
