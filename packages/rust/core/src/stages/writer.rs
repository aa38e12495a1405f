use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::Value;
use tracing::{instrument, warn};

use researchflow_normalize::{NormalizedResult, RawValue, normalize, strip_code_fence};
use researchflow_shared::{GenerationRequest, Length, PipelineContext, Result, RetrievedChunk, TextGenerator};

use super::CONTENT_WRITING_TASK;
use super::rag::retrieved_chunks;
use crate::pipeline::{Diagnostics, Invocation, Stage, StageInput, StageOutcome, StageResult};
use crate::tools::{prompt_template_tool, style_check_tool};

const SYSTEM_PROMPT: &str = "You are a senior content strategist and writer who turns research \
into audience-ready content, prioritizing factual accuracy, clarity, and SEO structure. Every \
factual claim must be traceable to the provided citations.";

const DELIVERABLES: &str = "Respond with a single JSON object with the keys \"blog\" (Markdown), \
\"linkedin\", \"x_thread\" (list of posts), \"newsletter\", \"top10\" (list of the ten most \
important insights) and \"editor_notes\" (mapping of claims to source links).";

/// Turns retrieved research into the blog and social deliverables.
pub struct ContentWritingStage {
    generator: Arc<dyn TextGenerator>,
}

impl ContentWritingStage {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    #[instrument(skip_all, fields(tone = %input.context.tone(), length = %input.context.length()))]
    async fn run(&self, input: StageInput<'_>, diagnostics: &mut Diagnostics) -> Result<StageResult> {
        let chunks = retrieved_chunks(input.prior);
        if chunks.is_empty() {
            diagnostics.line("No retrieved context available; writing from the topic alone");
        }

        let prompt = build_prompt(input.context, &chunks);
        diagnostics.line(format_args!(
            "Drafting content with {} context chunks",
            chunks.len()
        ));

        let reply = self
            .generator
            .generate(&GenerationRequest::new(SYSTEM_PROMPT, prompt).json())
            .await?;

        Ok(match normalize(RawValue::from(strip_code_fence(&reply))) {
            NormalizedResult::Json(Value::Object(mut content)) => {
                let blog = match content.get("blog") {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                let style = style_check_tool(&blog);
                diagnostics.line(format_args!(
                    "Draft ready: {} style suggestions",
                    style.suggestions.len()
                ));
                content.insert(
                    "style_check".to_string(),
                    serde_json::to_value(style).unwrap_or(Value::Null),
                );
                StageResult::Mapping(content)
            }
            other => {
                warn!("writer reply is not a JSON object, keeping it as text");
                diagnostics.line("Writer reply was not a JSON object; keeping raw text");
                StageResult::Text(other.to_string())
            }
        })
    }
}

impl Stage for ContentWritingStage {
    fn name(&self) -> &str {
        CONTENT_WRITING_TASK
    }

    fn invoke<'a>(
        &'a self,
        input: StageInput<'a>,
        diagnostics: &'a mut Diagnostics,
    ) -> Invocation<'a> {
        Invocation::deferred(async move { StageOutcome::from(self.run(input, diagnostics).await) })
    }
}

fn length_hint(length: Length) -> &'static str {
    match length {
        Length::Short => "about 500 words",
        Length::Medium => "about 900 words",
        Length::Long => "about 1500 words",
    }
}

fn build_prompt(context: &PipelineContext, chunks: &[RetrievedChunk]) -> String {
    let format = context.option("format").unwrap_or("blog");
    let mut prompt = prompt_template_tool(format, context.tone().as_str());

    let _ = write!(
        prompt,
        "\n\nTopic: {}\nBlog length: {}\n",
        context.topic(),
        length_hint(context.length())
    );

    if !chunks.is_empty() {
        prompt.push_str("\nResearch context:\n");
        for (i, chunk) in chunks.iter().enumerate() {
            let _ = writeln!(prompt, "[{}] {} (source: {})", i + 1, chunk.text, chunk.source);
        }

        let citations: BTreeSet<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
        prompt.push_str("\nCitations:\n");
        for source in citations {
            let _ = writeln!(prompt, "- {source}");
        }
    }

    prompt.push('\n');
    prompt.push_str(DELIVERABLES);
    prompt
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::pipeline::PriorOutputs;
    use crate::stages::RAG_ANSWERING_TASK;
    use crate::stages::fakes::{ScriptedGenerator, context};

    fn rag_output() -> Vec<(String, StageResult)> {
        vec![(
            RAG_ANSWERING_TASK.to_string(),
            StageResult::from_value(json!({
                "status": "vectorstore_created",
                "num_chunks": 1,
                "query": "rust async",
                "chunks": [{"text": "Futures are lazy.", "source": "https://book.example", "score": 0.9}],
                "confidence_note": "High"
            })),
        )]
    }

    async fn write_with(
        reply: &str,
        prior: &[(String, StageResult)],
    ) -> (StageOutcome, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator::new(reply));
        let stage = ContentWritingStage::new(generator.clone());
        let ctx = context();
        let mut diagnostics = Diagnostics::default();
        let input = StageInput {
            context: &ctx,
            prior: PriorOutputs::new(prior),
        };
        let outcome = stage.invoke(input, &mut diagnostics).resolve().await;
        (outcome, generator)
    }

    #[tokio::test]
    async fn fenced_json_reply_becomes_mapping_with_style_check() {
        let reply = "```json\n{\"blog\": \"Short blog.\", \"top10\": [\"a\"]}\n```";
        let (outcome, generator) = write_with(reply, &rag_output()).await;

        let StageOutcome::Completed(StageResult::Mapping(content)) = outcome else {
            panic!("expected mapping: {outcome:?}");
        };
        assert_eq!(content["blog"], "Short blog.");
        assert_eq!(
            content["style_check"]["suggestions"][0],
            "Consider expanding the introduction for clarity."
        );

        let prompt = generator.last_prompt();
        assert!(prompt.starts_with("Write a blog in a casual tone"));
        assert!(prompt.contains("about 500 words"));
        assert!(prompt.contains("[1] Futures are lazy. (source: https://book.example)"));
        assert!(prompt.contains("- https://book.example"));
        assert!(generator.requests.lock().unwrap()[0].json_mode);
    }

    #[tokio::test]
    async fn prose_reply_is_kept_as_text() {
        let (outcome, generator) = write_with("  Here is your blog post...  ", &[]).await;
        assert_eq!(
            outcome,
            StageOutcome::Completed(StageResult::Text("Here is your blog post...".into()))
        );
        assert!(!generator.last_prompt().contains("Research context"));
    }

    #[tokio::test]
    async fn python_style_reply_is_repaired() {
        let (outcome, _) = write_with("{'blog': 'x', 'linkedin': 'y'}", &rag_output()).await;
        let StageOutcome::Completed(StageResult::Mapping(content)) = outcome else {
            panic!("expected mapping: {outcome:?}");
        };
        assert_eq!(content["linkedin"], "y");
    }
}
