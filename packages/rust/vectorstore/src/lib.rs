//! Run-scoped in-memory vector store.
//!
//! The [`VectorStore`] holds embedded text chunks for a single pipeline run
//! and answers nearest-neighbour queries by cosine similarity. It is owned by
//! whoever built it and dropped with it; nothing is shared between runs.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use researchflow_shared::{ResearchFlowError, Result, RetrievedChunk};

/// Status string reported after a successful build.
pub const STATUS_CREATED: &str = "vectorstore_created";

/// A text chunk awaiting storage, tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source: String,
}

impl Chunk {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug)]
struct Entry {
    chunk: Chunk,
    embedding: Vec<f32>,
    norm: f32,
}

/// In-memory nearest-neighbour index over embedded chunks.
#[derive(Debug)]
pub struct VectorStore {
    entries: Vec<Entry>,
    dimension: usize,
}

impl VectorStore {
    /// Build a store from chunks and their embeddings (same length, same order).
    ///
    /// Chunks repeating an earlier `(source, text)` pair are skipped.
    pub fn create(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(ResearchFlowError::validation(format!(
                "got {} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        let Some(dimension) = embeddings.first().map(Vec::len) else {
            return Err(ResearchFlowError::validation(
                "cannot build a vector store from zero chunks",
            ));
        };
        if dimension == 0 {
            return Err(ResearchFlowError::validation("embeddings must not be empty"));
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(chunks.len());

        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            if embedding.len() != dimension {
                return Err(ResearchFlowError::validation(format!(
                    "embedding dimension {} does not match {dimension}",
                    embedding.len()
                )));
            }
            if !seen.insert(chunk_id(&chunk)) {
                debug!(source = %chunk.source, "skipping duplicate chunk");
                continue;
            }
            let norm = l2_norm(&embedding);
            entries.push(Entry {
                chunk,
                embedding,
                norm,
            });
        }

        info!(chunks = entries.len(), dimension, "vector store created");
        Ok(Self { entries, dimension })
    }

    /// Number of stored chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Return the `top_k` chunks most similar to `query_embedding`, best first.
    ///
    /// Ties keep insertion order.
    pub fn query(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        if query_embedding.len() != self.dimension {
            return Err(ResearchFlowError::validation(format!(
                "query dimension {} does not match store dimension {}",
                query_embedding.len(),
                self.dimension
            )));
        }

        let query_norm = l2_norm(query_embedding);
        let mut scored: Vec<(f32, &Entry)> = self
            .entries
            .iter()
            .map(|entry| (cosine(query_embedding, query_norm, entry), entry))
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, entry)| RetrievedChunk {
                text: entry.chunk.text.clone(),
                source: entry.chunk.source.clone(),
                score,
            })
            .collect())
    }
}

/// Content hash identifying a chunk by source and text.
fn chunk_id(chunk: &Chunk) -> String {
    let mut hasher = Sha256::new();
    hasher.update(chunk.source.as_bytes());
    hasher.update([0u8]);
    hasher.update(chunk.text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity; zero vectors score 0.
fn cosine(query: &[f32], query_norm: f32, entry: &Entry) -> f32 {
    if query_norm == 0.0 || entry.norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(&entry.embedding).map(|(a, b)| a * b).sum();
    dot / (query_norm * entry.norm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_store() -> VectorStore {
        let chunks = vec![
            Chunk::new("rust ownership", "https://a.dev"),
            Chunk::new("python typing", "https://b.dev"),
            Chunk::new("rust lifetimes", "https://c.dev"),
        ];
        let embeddings = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.8, 0.2]];
        VectorStore::create(chunks, embeddings).expect("create store")
    }

    #[test]
    fn query_orders_by_similarity() {
        let store = sample_store();
        let hits = store.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "rust ownership");
        assert_eq!(hits[0].source, "https://a.dev");
        assert_eq!(hits[1].text, "rust lifetimes");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn top_k_larger_than_store_returns_everything() {
        let store = sample_store();
        assert_eq!(store.query(&[0.5, 0.5], 10).unwrap().len(), 3);
        assert!(store.query(&[0.5, 0.5], 0).unwrap().is_empty());
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = VectorStore::create(vec![Chunk::new("a", "s")], vec![]).unwrap_err();
        assert!(err.to_string().contains("1 chunks but 0 embeddings"));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(VectorStore::create(vec![], vec![]).is_err());
    }

    #[test]
    fn ragged_dimensions_are_rejected() {
        let chunks = vec![Chunk::new("a", "s"), Chunk::new("b", "s")];
        let err = VectorStore::create(chunks, vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(err.to_string().contains("dimension"));
    }

    #[test]
    fn query_dimension_must_match() {
        let store = sample_store();
        assert!(store.query(&[1.0, 0.0, 0.0], 1).is_err());
    }

    #[test]
    fn duplicate_chunks_are_merged() {
        let chunks = vec![
            Chunk::new("same", "https://a.dev"),
            Chunk::new("same", "https://a.dev"),
            Chunk::new("same", "https://b.dev"),
        ];
        let embeddings = vec![vec![1.0], vec![1.0], vec![1.0]];
        let store = VectorStore::create(chunks, embeddings).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn zero_vectors_score_zero() {
        let store =
            VectorStore::create(vec![Chunk::new("z", "s")], vec![vec![0.0, 0.0]]).unwrap();
        let hits = store.query(&[1.0, 0.0], 1).unwrap();
        assert_eq!(hits[0].score, 0.0);
    }
}
