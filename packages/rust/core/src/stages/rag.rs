use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use researchflow_shared::{ResearchFlowError, Result, RetrievedChunk, SourceRecord, TextEmbedder};
use researchflow_vectorstore::{Chunk, STATUS_CREATED, VectorStore};

use super::{RAG_ANSWERING_TASK, RESEARCH_TASK};
use crate::pipeline::{
    Diagnostics, Invocation, PriorOutputs, Stage, StageInput, StageOutcome, StageResult,
};

pub const STATUS_NO_CHUNKS: &str = "no_chunks";

/// Build info plus the chunks retrieved for the topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagSummary {
    pub status: String,
    pub num_chunks: usize,
    pub query: String,
    #[serde(default)]
    pub chunks: Vec<RetrievedChunk>,
    #[serde(default)]
    pub confidence_note: String,
}

/// Embeds the research, indexes it in a run-owned store, and retrieves
/// the chunks closest to the topic.
pub struct RagAnsweringStage {
    embedder: Arc<dyn TextEmbedder>,
    top_k: usize,
}

impl RagAnsweringStage {
    pub fn new(embedder: Arc<dyn TextEmbedder>, top_k: usize) -> Self {
        Self { embedder, top_k }
    }

    #[instrument(skip_all, fields(top_k = self.top_k))]
    async fn run(&self, input: StageInput<'_>, diagnostics: &mut Diagnostics) -> Result<StageResult> {
        let query = input.context.topic().to_string();
        let chunks = research_chunks(input.prior, diagnostics);

        if chunks.is_empty() {
            diagnostics.line("No research chunks to index, skipping vector store");
            return StageResult::from_serialize(&RagSummary {
                status: STATUS_NO_CHUNKS.to_string(),
                num_chunks: 0,
                query,
                chunks: Vec::new(),
                confidence_note: "No research was available; downstream content is ungrounded."
                    .to_string(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        diagnostics.line(format_args!("Embedding {} research chunks", texts.len()));
        let embeddings = self.embedder.embed(&texts).await?;

        // The store lives only for this call.
        let store = VectorStore::create(chunks, embeddings)?;
        diagnostics.line(format_args!(
            "Vector store created: {} chunks, dimension {}",
            store.len(),
            store.dimension()
        ));

        let query_embedding = self
            .embedder
            .embed(std::slice::from_ref(&query))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ResearchFlowError::stage(RAG_ANSWERING_TASK, "no embedding for query"))?;
        let retrieved = store.query(&query_embedding, self.top_k)?;
        debug!(retrieved = retrieved.len(), "chunks retrieved");
        diagnostics.line(format_args!("Retrieved {} chunks for \"{query}\"", retrieved.len()));

        StageResult::from_serialize(&RagSummary {
            status: STATUS_CREATED.to_string(),
            num_chunks: store.len(),
            confidence_note: confidence_note(&retrieved),
            query,
            chunks: retrieved,
        })
    }
}

impl Stage for RagAnsweringStage {
    fn name(&self) -> &str {
        RAG_ANSWERING_TASK
    }

    fn invoke<'a>(
        &'a self,
        input: StageInput<'a>,
        diagnostics: &'a mut Diagnostics,
    ) -> Invocation<'a> {
        Invocation::deferred(async move { StageOutcome::from(self.run(input, diagnostics).await) })
    }
}

/// Snippets and key points of the research records, tagged with their link.
///
/// When the research output is not a record list, its text is indexed as a
/// single chunk instead.
fn research_chunks(prior: PriorOutputs<'_>, diagnostics: &mut Diagnostics) -> Vec<Chunk> {
    let Some(research) = prior.get(RESEARCH_TASK) else {
        return Vec::new();
    };

    let Some(records) = research.parse_as::<Vec<SourceRecord>>() else {
        warn!("research output is not a record list, indexing it as text");
        diagnostics.line("Research output was not a record list; indexing it as plain text");
        let text = research.to_display_string();
        return if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![Chunk::new(text, RESEARCH_TASK)]
        };
    };

    let mut chunks = Vec::new();
    for record in records {
        if !record.snippet.trim().is_empty() {
            chunks.push(Chunk::new(
                format!("{}: {}", record.title, record.snippet.trim()),
                record.link.clone(),
            ));
        }
        for point in record.key_points {
            if !point.trim().is_empty() {
                chunks.push(Chunk::new(point, record.link.clone()));
            }
        }
    }
    chunks
}

fn confidence_note(chunks: &[RetrievedChunk]) -> String {
    let Some(best) = chunks.iter().map(|c| c.score).reduce(f32::max) else {
        return "Low confidence: nothing matched the query.".to_string();
    };
    let sources: BTreeSet<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    let level = if best >= 0.5 {
        "High"
    } else if best >= 0.3 {
        "Medium"
    } else {
        "Low"
    };
    format!(
        "{level} confidence: best match scored {best:.2} across {} chunks from {} sources.",
        chunks.len(),
        sources.len()
    )
}

/// Retrieved chunks from a RAG stage output, if it kept its shape.
pub(crate) fn retrieved_chunks(prior: PriorOutputs<'_>) -> Vec<RetrievedChunk> {
    prior
        .get(RAG_ANSWERING_TASK)
        .and_then(|r| r.parse_as::<RagSummary>())
        .map(|summary| summary.chunks)
        .unwrap_or_default()
}
