use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use researchflow_normalize::{NormalizedResult, RawValue, normalize, strip_code_fence};
use researchflow_shared::{GenerationRequest, ResearchFlowError, Result, TextGenerator};

use super::{CONTENT_WRITING_TASK, SEO_OPTIMIZATION_TASK};
use crate::pipeline::{
    Diagnostics, Invocation, PriorOutputs, Stage, StageInput, StageOutcome, StageResult,
};
use crate::tools::{seo_keyword_tool, seo_score_tool};

const SYSTEM_PROMPT: &str = "You are an SEO specialist who balances ranking signals with \
readability. Improve structure and metadata while preserving the writer's voice. Do not invent \
new factual claims.";

const DELIVERABLES: &str = "Respond with a single JSON object with the keys \"meta_title\", \
\"meta_description\" (120-155 characters), \"headings\" (H1/H2/H3 outline), \"faq_schema\" \
(3-6 objects with \"question\" and \"answer\"), \"seo_score\" (0-100) and \"suggestions\" \
(prioritized action items).";

/// Longest slice of the draft quoted in the prompt.
const MAX_DRAFT_CHARS: usize = 12_000;

/// Metadata, FAQ and scoring for the writer's blog, plus a Markdown artifact.
pub struct SeoOptimizationStage {
    generator: Arc<dyn TextGenerator>,
    output: Option<PathBuf>,
}

impl SeoOptimizationStage {
    pub fn new(generator: Arc<dyn TextGenerator>, output: Option<PathBuf>) -> Self {
        Self { generator, output }
    }

    #[instrument(skip_all)]
    async fn run(&self, input: StageInput<'_>, diagnostics: &mut Diagnostics) -> Result<StageResult> {
        let topic = input.context.topic();
        let draft = draft_text(input.prior);
        if draft.is_empty() {
            diagnostics.line("No draft found from the writer; optimizing for the topic alone");
        }

        let keywords = seo_keyword_tool(topic);
        let heuristic = seo_score_tool(&draft);
        diagnostics.line(format_args!("Heuristic SEO score: {}", heuristic.score));

        let mut prompt = format!("Topic: {topic}\nTarget keywords: {}\n\n", keywords.keywords.join(", "));
        let excerpt: String = draft.chars().take(MAX_DRAFT_CHARS).collect();
        let _ = write!(prompt, "Draft:\n{excerpt}\n\n{DELIVERABLES}");

        let reply = self
            .generator
            .generate(&GenerationRequest::new(SYSTEM_PROMPT, prompt).json())
            .await?;

        let mut report = match normalize(RawValue::from(strip_code_fence(&reply))) {
            NormalizedResult::Json(Value::Object(map)) => map,
            other => {
                warn!("SEO reply is not a JSON object, wrapping it");
                diagnostics.line("SEO reply was not a JSON object; keeping it under \"report\"");
                let mut map = Map::new();
                map.insert("report".to_string(), Value::from(other));
                map
            }
        };
        report.insert("keywords".to_string(), to_json(&keywords)?);
        report.insert("heuristic_score".to_string(), to_json(&heuristic)?);

        if let Some(path) = &self.output {
            let markdown = render_markdown(topic, &draft, &report);
            match write_artifact(path, &markdown) {
                Ok(()) => {
                    info!(path = %path.display(), "SEO artifact written");
                    diagnostics.line(format_args!("Wrote {}", path.display()));
                }
                Err(e) => {
                    warn!(error = %e, "could not write SEO artifact");
                    diagnostics.line(format_args!("Could not write {}: {e}", path.display()));
                }
            }
        }

        Ok(StageResult::Mapping(report))
    }
}

impl Stage for SeoOptimizationStage {
    fn name(&self) -> &str {
        SEO_OPTIMIZATION_TASK
    }

    fn invoke<'a>(
        &'a self,
        input: StageInput<'a>,
        diagnostics: &'a mut Diagnostics,
    ) -> Invocation<'a> {
        Invocation::deferred(async move { StageOutcome::from(self.run(input, diagnostics).await) })
    }
}

/// The writer's blog, or its whole output when it is not a mapping.
fn draft_text(prior: PriorOutputs<'_>) -> String {
    match prior.get(CONTENT_WRITING_TASK) {
        Some(StageResult::Mapping(content)) => match content.get("blog") {
            Some(Value::String(blog)) => blog.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
        Some(other) => other.to_display_string(),
        None => String::new(),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| ResearchFlowError::stage(SEO_OPTIMIZATION_TASK, e.to_string()))
}

fn write_artifact(path: &Path, markdown: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ResearchFlowError::io(parent, e))?;
    }
    std::fs::write(path, markdown).map_err(|e| ResearchFlowError::io(path, e))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Markdown rendering of the optimized draft.
fn render_markdown(topic: &str, draft: &str, report: &Map<String, Value>) -> String {
    let mut md = String::new();

    let title = report.get("meta_title").map(text_of).unwrap_or_else(|| topic.to_string());
    let _ = writeln!(md, "# {title}\n");
    if let Some(description) = report.get("meta_description") {
        let _ = writeln!(md, "> {}\n", text_of(description));
    }

    if !draft.trim().is_empty() {
        let _ = writeln!(md, "{}\n", draft.trim());
    }

    md.push_str("## SEO\n\n");
    if let Some(score) = report.get("seo_score") {
        let _ = writeln!(md, "- Score: {}", text_of(score));
    }
    if let Some(score) = report.get("heuristic_score").and_then(|h| h.get("score")) {
        let _ = writeln!(md, "- Heuristic score: {score}");
    }
    if let Some(Value::Array(keywords)) = report.get("keywords").and_then(|k| k.get("keywords")) {
        let list: Vec<String> = keywords.iter().map(text_of).collect();
        let _ = writeln!(md, "- Keywords: {}", list.join(", "));
    }

    if let Some(Value::Array(headings)) = report.get("headings") {
        md.push_str("\n### Headings\n\n");
        for heading in headings {
            let _ = writeln!(md, "- {}", text_of(heading));
        }
    }

    if let Some(Value::Array(faq)) = report.get("faq_schema") {
        md.push_str("\n### FAQ\n\n");
        for entry in faq {
            match (entry.get("question"), entry.get("answer")) {
                (Some(q), Some(a)) => {
                    let _ = writeln!(md, "**{}**\n\n{}\n", text_of(q), text_of(a));
                }
                _ => {
                    let _ = writeln!(md, "- {}", text_of(entry));
                }
            }
        }
    }

    if let Some(Value::Array(suggestions)) = report.get("suggestions") {
        md.push_str("\n### Suggestions\n\n");
        for suggestion in suggestions {
            let _ = writeln!(md, "- {}", text_of(suggestion));
        }
    }

    if let Some(report_text) = report.get("report") {
        let _ = writeln!(md, "\n{}", text_of(report_text));
    }

    md
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::stages::fakes::{ScriptedGenerator, context};

    fn writer_output(content: Value) -> Vec<(String, StageResult)> {
        vec![(
            CONTENT_WRITING_TASK.to_string(),
            StageResult::from_value(content),
        )]
    }

    async fn optimize(
        reply: &str,
        prior: &[(String, StageResult)],
        output: Option<PathBuf>,
    ) -> (StageOutcome, Diagnostics, Arc<ScriptedGenerator>) {
        let generator = Arc::new(ScriptedGenerator::new(reply));
        let stage = SeoOptimizationStage::new(generator.clone(), output);
        let ctx = context();
        let mut diagnostics = Diagnostics::default();
        let input = StageInput {
            context: &ctx,
            prior: PriorOutputs::new(prior),
        };
        let outcome = stage.invoke(input, &mut diagnostics).resolve().await;
        (outcome, diagnostics, generator)
    }

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("researchflow-seo-{name}-{}", uuid::Uuid::now_v7()))
    }

    #[tokio::test]
    async fn merges_heuristics_and_writes_markdown() {
        let dir = scratch_dir("ok");
        let path = dir.join("Content.md");
        let reply = json!({
            "meta_title": "Rust Async Guide",
            "meta_description": "Everything about async Rust.",
            "headings": ["H1: Rust Async", "H2: Futures"],
            "faq_schema": [{"question": "Is it fast?", "answer": "Yes."}],
            "seo_score": 82,
            "suggestions": ["Add links"]
        })
        .to_string();
        let prior = writer_output(json!({"blog": "Async Rust uses futures."}));

        let (outcome, diagnostics, generator) = optimize(&reply, &prior, Some(path.clone())).await;
        let StageOutcome::Completed(StageResult::Mapping(report)) = outcome else {
            panic!("expected mapping: {outcome:?}");
        };
        assert_eq!(report["seo_score"], 82);
        assert_eq!(report["keywords"]["main"], "rust async");
        assert_eq!(report["heuristic_score"]["score"], 70);
        assert!(generator.last_prompt().contains("Async Rust uses futures."));

        let markdown = std::fs::read_to_string(&path).unwrap();
        assert!(markdown.starts_with("# Rust Async Guide"));
        assert!(markdown.contains("**Is it fast?**"));
        assert!(markdown.contains("- Keywords: rust async, rust async guide"));
        assert!(diagnostics.as_str().contains("Wrote"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn text_reply_is_wrapped_under_report() {
        let prior = writer_output(json!("free-form draft from the writer"));
        let (outcome, _, generator) = optimize("Looks good overall.", &prior, None).await;
        let StageOutcome::Completed(StageResult::Mapping(report)) = outcome else {
            panic!("expected mapping: {outcome:?}");
        };
        assert_eq!(report["report"], "Looks good overall.");
        assert!(report.contains_key("heuristic_score"));
        assert!(generator.last_prompt().contains("free-form draft from the writer"));
    }

    #[tokio::test]
    async fn unwritable_artifact_does_not_fail_stage() {
        let dir = scratch_dir("blocked");
        std::fs::create_dir_all(&dir).unwrap();
        let blocker = dir.join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let prior = writer_output(json!({"blog": "b"}));
        let (outcome, diagnostics, _) =
            optimize("{}", &prior, Some(blocker.join("Content.md"))).await;

        assert!(matches!(outcome, StageOutcome::Completed(_)));
        assert!(diagnostics.as_str().contains("Could not write"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn draft_falls_back_to_writer_text() {
        let prior = writer_output(json!("plain"));
        assert_eq!(draft_text(PriorOutputs::new(&prior)), "plain");
        assert_eq!(draft_text(PriorOutputs::new(&[])), "");
    }
}
