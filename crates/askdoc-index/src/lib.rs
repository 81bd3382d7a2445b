//! Askdoc Index - In-memory nearest-neighbor search over chunk embeddings
//!
//! Holds `(Chunk, Vector)` entries built once per document set and serves
//! top-k similarity queries. Building is a full-replacement operation;
//! the index is never mutated in place.

use askdoc_core::{Chunk, RagError, Result, ScoredChunk};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

pub mod embedding;

pub use embedding::{create_embedding_client, EmbeddingClient, OllamaEmbedding, OpenAiEmbedding};

// ============================================================================
// Similarity
// ============================================================================

/// Similarity metric, fixed at index build time
///
/// Both metrics yield a descending-friendly score: higher is more similar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityMetric {
    /// Cosine similarity; invariant to vector magnitude
    #[default]
    Cosine,
    /// Euclidean distance, mapped to `1 / (1 + d)`
    Euclidean,
}

impl SimilarityMetric {
    /// Score a pair of equal-length vectors
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        let a = ArrayView1::from(a);
        let b = ArrayView1::from(b);
        match self {
            Self::Cosine => {
                let norm = a.dot(&a).sqrt() * b.dot(&b).sqrt();
                if norm == 0.0 {
                    0.0
                } else {
                    a.dot(&b) / norm
                }
            }
            Self::Euclidean => {
                let diff = a.to_owned() - &b;
                1.0 / (1.0 + diff.dot(&diff).sqrt())
            }
        }
    }
}

impl std::fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Euclidean => write!(f, "euclidean"),
        }
    }
}

// ============================================================================
// Vector Index
// ============================================================================

/// A chunk with its embedding, owned by the index
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// In-memory vector index over chunk embeddings
#[derive(Debug)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
    metric: SimilarityMetric,
}

impl VectorIndex {
    /// Build an index from entries
    ///
    /// All vectors must share one dimension; a mismatch fails with
    /// [`RagError::DimensionMismatch`]. An empty entry set builds an empty
    /// index (dimension 0).
    pub fn build(entries: Vec<IndexEntry>, metric: SimilarityMetric) -> Result<Self> {
        let dimension = entries.first().map(|e| e.vector.len()).unwrap_or(0);

        for entry in &entries {
            if entry.vector.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.vector.len(),
                });
            }
        }

        tracing::debug!(
            entries = entries.len(),
            dimension,
            metric = %metric,
            "vector index built"
        );

        Ok(Self {
            entries,
            dimension,
            metric,
        })
    }

    /// Retrieve the top-k most similar chunks for a query vector
    ///
    /// `k` is clamped to the index size. Searching an empty index returns
    /// an empty vector, not an error. Ties break by insertion order
    /// (earlier chunk wins) so results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let k = k.min(self.entries.len());

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(ordinal, entry)| (ordinal, self.metric.score(query, &entry.vector)))
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(ordinal, score)| ScoredChunk {
                chunk: self.entries[ordinal].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Number of entries in the index
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the index holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension shared by all entries (0 when empty)
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Similarity metric fixed at build time
    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }
}

// ============================================================================
// Tests
// ============================================================================
