//! End-to-end pipeline tests with deterministic mock clients
//!
//! No network access: the embedder maps texts to keyword-count vectors
//! and the generator replays the context it was given.

use std::io::Write;
use std::sync::Arc;

use askdoc_core::{LlmClient, PipelineConfig, RagError, Result};
use askdoc_index::EmbeddingClient;
use askdoc_rag::Pipeline;

/// Embeds a text as keyword counts, so retrieval behaves predictably
struct KeywordEmbedder;

const KEYWORDS: [&str; 4] = ["solar", "wind", "hydro", "coal"];

#[async_trait::async_trait]
impl EmbeddingClient for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let mut vector: Vec<f32> = KEYWORDS
            .iter()
            .map(|w| lower.matches(w).count() as f32)
            .collect();
        vector.push(1.0);
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        KEYWORDS.len() + 1
    }

    fn identity(&self) -> String {
        "mock/keyword-embedder".to_string()
    }
}

/// Echoes the prompt back so tests can inspect what the generator saw
struct EchoGenerator;

#[async_trait::async_trait]
impl LlmClient for EchoGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        Ok(format!("Answer derived from context [1].\n---\n{prompt}"))
    }
}

fn pipeline(config: PipelineConfig) -> Pipeline {
    Pipeline::new(Arc::new(KeywordEmbedder), Arc::new(EchoGenerator), config)
}

fn write_temp(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::with_suffix(".txt").unwrap();
    write!(file, "{content}").unwrap();
    file
}

const ENERGY_NOTES: &str = "\
Solar panels convert sunlight into electricity and work best at noon.\n\n\
Wind turbines generate power whenever the wind blows, day or night.\n\n\
Hydro plants store energy behind dams and release it on demand.\n\n\
Coal plants burn fuel continuously and are being phased out.\n";

#[tokio::test]
async fn ask_before_initialize_reports_not_ready() {
    let pipeline = pipeline(PipelineConfig::default());

    let err = pipeline.ask("how do solar panels work?").await.unwrap_err();
    assert!(matches!(err, RagError::PipelineNotReady { .. }));
}

#[tokio::test]
async fn full_flow_retrieves_relevant_chunks() {
    let file = write_temp(ENERGY_NOTES);
    let mut pipeline = pipeline(PipelineConfig {
        chunk_size: 80,
        chunk_overlap: 10,
        top_k: 2,
        ..Default::default()
    });

    pipeline.initialize(file.path()).await.unwrap();
    pipeline.activate().unwrap();

    let answer = pipeline.ask("tell me about wind power").await.unwrap();

    assert!(answer.sources.len() <= 2);
    assert!(answer.sources[0].chunk.content.to_lowercase().contains("wind"));
    // The prompt the generator saw contains the top chunk's text
    assert!(answer.text.contains("Wind turbines"));
    assert!(!answer.citations.is_empty());
    assert_eq!(answer.citations[0].index, 1);
}

#[tokio::test]
async fn top_k_clamps_to_single_chunk_document() {
    let file = write_temp("Solar power only.");
    let mut pipeline = pipeline(PipelineConfig::default());

    pipeline.initialize(file.path()).await.unwrap();
    pipeline.activate().unwrap();

    // top_k defaults to 3 but only one chunk exists
    let answer = pipeline.ask("solar?").await.unwrap();
    assert_eq!(answer.sources.len(), 1);
}

#[tokio::test]
async fn repeated_questions_are_deterministic() {
    let file = write_temp(ENERGY_NOTES);
    let mut pipeline = pipeline(PipelineConfig {
        chunk_size: 80,
        chunk_overlap: 10,
        ..Default::default()
    });

    pipeline.initialize(file.path()).await.unwrap();
    pipeline.activate().unwrap();

    let first = pipeline.ask("hydro storage?").await.unwrap();
    let second = pipeline.ask("hydro storage?").await.unwrap();

    let order = |answer: &askdoc_core::Answer| {
        answer
            .sources
            .iter()
            .map(|s| s.chunk.index)
            .collect::<Vec<_>>()
    };
    assert_eq!(order(&first), order(&second));
}

#[tokio::test]
async fn reinitialize_replaces_the_corpus_wholesale() {
    let first = write_temp("Solar solar solar everywhere.");
    let second = write_temp("Coal coal coal remains.");
    let mut pipeline = pipeline(PipelineConfig::default());

    pipeline.initialize(first.path()).await.unwrap();
    pipeline.activate().unwrap();

    pipeline.initialize(second.path()).await.unwrap();
    pipeline.activate().unwrap();

    let answer = pipeline.ask("what about coal?").await.unwrap();
    for source in &answer.sources {
        assert!(source.chunk.content.contains("Coal"));
    }
}

#[tokio::test]
async fn missing_source_surfaces_source_not_found() {
    let mut pipeline = pipeline(PipelineConfig::default());

    let err = pipeline
        .initialize("definitely/not/here.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::SourceNotFound { .. }));
}

#[tokio::test]
async fn invalid_chunk_parameters_surface_invalid_configuration() {
    let file = write_temp(ENERGY_NOTES);
    let mut pipeline = pipeline(PipelineConfig {
        chunk_size: 100,
        chunk_overlap: 100,
        ..Default::default()
    });

    let err = pipeline.initialize(file.path()).await.unwrap_err();
    assert!(matches!(err, RagError::InvalidConfiguration(_)));
    assert_eq!(pipeline.state_name(), "uninitialized");
}
