//! Seams to the hosted services the pipeline delegates to.
//!
//! The core crate only talks to these traits; `researchflow-providers` holds
//! the HTTP implementations and tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::SourceRecord;

/// Web search: topic in, ordered source records out.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SourceRecord>>;
}

/// Text embedding. Must return exactly one vector per input, in order.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// A prompt plus the grounding context handed to a text generator.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    /// Role/instructions for the model.
    pub system: String,
    /// The task prompt.
    pub prompt: String,
    /// Ask the backend for a JSON object reply when it supports it.
    pub json_mode: bool,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            json_mode: false,
        }
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }
}

/// Text generation (hosted language model).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}
