//! The four ResearchFlow stages and the factory wiring them together.

mod rag;
mod research;
mod seo;
mod writer;

use std::path::PathBuf;
use std::sync::Arc;

use researchflow_shared::{AppConfig, TextEmbedder, TextGenerator, WebSearch};

use crate::pipeline::Stage;

pub use rag::{RagAnsweringStage, RagSummary};
pub use research::ResearchStage;
pub use seo::SeoOptimizationStage;
pub use writer::ContentWritingStage;

pub const RESEARCH_TASK: &str = "research_task";
pub const RAG_ANSWERING_TASK: &str = "rag_answering_task";
pub const CONTENT_WRITING_TASK: &str = "content_writing_task";
pub const SEO_OPTIMIZATION_TASK: &str = "seo_optimization_task";

/// Hosted capabilities the stages delegate to.
#[derive(Clone)]
pub struct Services {
    pub search: Arc<dyn WebSearch>,
    pub embedder: Arc<dyn TextEmbedder>,
    pub generator: Arc<dyn TextGenerator>,
}

/// Tunables for one pipeline.
#[derive(Debug, Clone)]
pub struct StageOptions {
    pub search_results: usize,
    pub top_k: usize,
    /// Where the SEO stage writes its Markdown artifact. `None` skips it.
    pub seo_output: Option<PathBuf>,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            search_results: 10,
            top_k: 5,
            seo_output: None,
        }
    }
}

impl StageOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            search_results: config.defaults.search_results,
            top_k: config.defaults.top_k,
            seo_output: Some(PathBuf::from(&config.output.dir).join(&config.output.seo_file)),
        }
    }
}

/// research → RAG → writing → SEO, in that order.
pub fn research_pipeline(services: &Services, options: &StageOptions) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ResearchStage::new(
            Arc::clone(&services.search),
            options.search_results,
        )),
        Box::new(RagAnsweringStage::new(
            Arc::clone(&services.embedder),
            options.top_k,
        )),
        Box::new(ContentWritingStage::new(Arc::clone(&services.generator))),
        Box::new(SeoOptimizationStage::new(
            Arc::clone(&services.generator),
            options.seo_output.clone(),
        )),
    ]
}

/// In-memory capability fakes shared by the stage tests.
#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use researchflow_shared::{
        GenerationRequest, Length, PipelineContext, ResearchFlowError, Result, SourceRecord, Tone,
    };

    use super::*;

    pub fn context() -> PipelineContext {
        PipelineContext::new("rust async", Tone::Casual, Length::Short).unwrap()
    }

    pub fn record(title: &str, link: &str, snippet: &str) -> SourceRecord {
        SourceRecord {
            title: title.into(),
            link: link.into(),
            snippet: snippet.into(),
            key_points: Vec::new(),
        }
    }

    pub struct FakeSearch(pub Vec<SourceRecord>);

    #[async_trait]
    impl WebSearch for FakeSearch {
        async fn search(&self, _query: &str, num_results: usize) -> Result<Vec<SourceRecord>> {
            Ok(self.0.iter().take(num_results).cloned().collect())
        }
    }

    /// Embeds text as `[len, vowel count, 1]`, so similar texts land close.
    pub struct FakeEmbedder;

    #[async_trait]
    impl TextEmbedder for FakeEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let vowels = t.chars().filter(|c| "aeiou".contains(*c)).count();
                    vec![t.len() as f32, vowels as f32, 1.0]
                })
                .collect())
        }
    }

    pub struct FailingEmbedder;

    #[async_trait]
    impl TextEmbedder for FailingEmbedder {
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(ResearchFlowError::Provider("embedding quota exceeded".into()))
        }
    }

    /// Replies with a canned answer and records every request.
    pub struct ScriptedGenerator {
        reply: String,
        pub requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        pub fn new(reply: impl Into<String>) -> Self {
            Self {
                reply: reply.into(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn last_prompt(&self) -> String {
            self.requests
                .lock()
                .unwrap()
                .last()
                .map(|r| r.prompt.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }
}
