use std::sync::Arc;

use tracing::{debug, instrument};

use researchflow_shared::{Result, SourceRecord, WebSearch};

use super::RESEARCH_TASK;
use crate::pipeline::{Diagnostics, Invocation, Stage, StageInput, StageOutcome, StageResult};

/// Upper bound on bullets extracted from one snippet.
const MAX_KEY_POINTS: usize = 5;

/// Web search for the topic, one record per hit.
pub struct ResearchStage {
    search: Arc<dyn WebSearch>,
    num_results: usize,
}

impl ResearchStage {
    pub fn new(search: Arc<dyn WebSearch>, num_results: usize) -> Self {
        Self {
            search,
            num_results,
        }
    }

    #[instrument(skip_all, fields(topic = %input.context.topic()))]
    async fn run(&self, input: StageInput<'_>, diagnostics: &mut Diagnostics) -> Result<StageResult> {
        let topic = input.context.topic();
        diagnostics.line(format_args!(
            "Searching the web for \"{topic}\" ({} results)",
            self.num_results
        ));

        let mut records = self.search.search(topic, self.num_results).await?;
        for record in &mut records {
            if record.key_points.is_empty() {
                record.key_points = key_points(&record.snippet);
            }
            diagnostics.line(format_args!("  - {} ({})", record.title, record.link));
        }

        debug!(count = records.len(), "research records collected");
        diagnostics.line(format_args!("Collected {} source records", records.len()));
        StageResult::from_serialize::<Vec<SourceRecord>>(&records)
    }
}

impl Stage for ResearchStage {
    fn name(&self) -> &str {
        RESEARCH_TASK
    }

    fn invoke<'a>(
        &'a self,
        input: StageInput<'a>,
        diagnostics: &'a mut Diagnostics,
    ) -> Invocation<'a> {
        Invocation::deferred(async move { StageOutcome::from(self.run(input, diagnostics).await) })
    }
}

/// Split a snippet into sentence bullets.
fn key_points(snippet: &str) -> Vec<String> {
    snippet
        .split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.len() > 1)
        .take(MAX_KEY_POINTS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PriorOutputs;
    use crate::stages::fakes::{FakeSearch, context, record};

    #[test]
    fn key_points_split_sentences() {
        assert_eq!(
            key_points("Tokio is fast. It is async!  Really? trailing"),
            vec!["Tokio is fast.", "It is async!", "Really?", "trailing"]
        );
        assert!(key_points("").is_empty());
        assert_eq!(key_points("a. b. c. d. e. f. g.").len(), MAX_KEY_POINTS);
    }

    #[tokio::test]
    async fn records_gain_key_points() {
        let stage = ResearchStage::new(
            Arc::new(FakeSearch(vec![
                record("One", "https://one.example", "First fact. Second fact."),
                record("Two", "https://two.example", "Other."),
                record("Three", "https://three.example", "Dropped."),
            ])),
            2,
        );
        let ctx = context();
        let mut diagnostics = Diagnostics::default();
        let input = StageInput {
            context: &ctx,
            prior: PriorOutputs::new(&[]),
        };

        let outcome = stage.invoke(input, &mut diagnostics).resolve().await;
        let StageOutcome::Completed(result) = outcome else {
            panic!("research failed: {outcome:?}");
        };
        let records: Vec<SourceRecord> = result.parse_as().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key_points, vec!["First fact.", "Second fact."]);
        assert!(diagnostics.as_str().contains("https://one.example"));
        assert!(diagnostics.as_str().contains("Collected 2 source records"));
    }
}
