//! Sequential stage runner: context → stage 1 → … → stage N → aggregate result.
//!
//! Stages run strictly one after another. Each one sees the run context and
//! every earlier stage's output, and writes free-form trace lines into one
//! shared [`Diagnostics`] buffer. The first failing stage halts the run; the
//! runner itself never returns an error.

use std::fmt::{self, Write as _};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{info, instrument, warn};

use researchflow_shared::{PipelineContext, ResearchFlowError, Result, RunId};

/// Aggregate key holding the failure message of a halted run.
pub const ERROR_KEY: &str = "error";

// ---------------------------------------------------------------------------
// Stage results
// ---------------------------------------------------------------------------

/// The output of one stage: a mapping, a sequence, or opaque text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StageResult {
    Mapping(Map<String, Value>),
    Sequence(Vec<Value>),
    Text(String),
}

impl StageResult {
    /// Classify a JSON value. Scalars other than strings become their JSON text.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::Mapping(map),
            Value::Array(items) => Self::Sequence(items),
            Value::String(text) => Self::Text(text),
            other => Self::Text(other.to_string()),
        }
    }

    /// Serialize a typed stage record.
    pub fn from_serialize<T: Serialize>(record: &T) -> Result<Self> {
        serde_json::to_value(record)
            .map(Self::from_value)
            .map_err(|e| ResearchFlowError::parse(format!("stage output not serializable: {e}")))
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Mapping(map) => Value::Object(map.clone()),
            Self::Sequence(items) => Value::Array(items.clone()),
            Self::Text(text) => Value::String(text.clone()),
        }
    }

    pub fn as_mapping(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Read the result through its documented shape.
    ///
    /// Returns `None` when an earlier stage broke its convention, so callers
    /// can fall back instead of failing.
    pub fn parse_as<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.to_value()).ok()
    }

    /// Human-readable form: text as-is, structures as compact JSON.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            other => other.to_value().to_string(),
        }
    }
}

/// What a stage reports back to the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Completed(StageResult),
    Failed(String),
}

impl From<Result<StageResult>> for StageOutcome {
    fn from(result: Result<StageResult>) -> Self {
        match result {
            Ok(output) => Self::Completed(output),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// A stage's answer at the call boundary: ready now, or after awaiting.
pub enum Invocation<'a> {
    Immediate(StageOutcome),
    Deferred(BoxFuture<'a, StageOutcome>),
}

impl<'a> Invocation<'a> {
    pub fn deferred(future: impl Future<Output = StageOutcome> + Send + 'a) -> Self {
        Self::Deferred(Box::pin(future))
    }

    /// Drive the invocation to a concrete outcome.
    pub async fn resolve(self) -> StageOutcome {
        match self {
            Self::Immediate(outcome) => outcome,
            Self::Deferred(future) => future.await,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage inputs
// ---------------------------------------------------------------------------

/// Trace text collected across a whole run, in the order it was written.
#[derive(Debug, Default)]
pub struct Diagnostics {
    text: String,
}

impl Diagnostics {
    /// Append one line.
    pub fn line(&mut self, message: impl fmt::Display) {
        let _ = writeln!(self.text, "{message}");
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Write for Diagnostics {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.text.push_str(s);
        Ok(())
    }
}

/// Outputs of the stages that already completed, in run order.
#[derive(Debug, Clone, Copy)]
pub struct PriorOutputs<'a>(&'a [(String, StageResult)]);

impl<'a> PriorOutputs<'a> {
    pub fn new(outputs: &'a [(String, StageResult)]) -> Self {
        Self(outputs)
    }

    /// Most recent output recorded under `stage`.
    pub fn get(&self, stage: &str) -> Option<&'a StageResult> {
        self.0
            .iter()
            .rev()
            .find(|(name, _)| name == stage)
            .map(|(_, output)| output)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Everything a stage may read.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub context: &'a PipelineContext,
    pub prior: PriorOutputs<'a>,
}

/// One unit of pipeline work.
pub trait Stage: Send + Sync {
    /// Name the output is recorded under.
    fn name(&self) -> &str;

    /// Start the stage. Trace text goes to `diagnostics`.
    fn invoke<'a>(
        &'a self,
        input: StageInput<'a>,
        diagnostics: &'a mut Diagnostics,
    ) -> Invocation<'a>;
}

// ---------------------------------------------------------------------------
// Run record
// ---------------------------------------------------------------------------

/// The stage that halted a run, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: String,
    pub message: String,
}

/// Everything one run produced. Nothing in here outlives the caller's use of it.
#[derive(Debug)]
pub struct PipelineRun {
    pub id: RunId,
    pub started_at: DateTime<Utc>,
    pub elapsed: std::time::Duration,
    outputs: Vec<(String, StageResult)>,
    failure: Option<StageFailure>,
    diagnostics: String,
}

impl PipelineRun {
    /// Stage name → output, plus `"error"` when a stage failed.
    ///
    /// Outputs of stages that completed before the failure are kept.
    pub fn aggregate(&self) -> Value {
        let mut map = Map::new();
        for (name, output) in &self.outputs {
            map.insert(name.clone(), output.to_value());
        }
        if let Some(failure) = &self.failure {
            map.insert(ERROR_KEY.to_string(), Value::String(failure.message.clone()));
        }
        Value::Object(map)
    }

    pub fn outputs(&self) -> &[(String, StageResult)] {
        &self.outputs
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn diagnostics(&self) -> &str {
        &self.diagnostics
    }

    /// `(aggregate result, diagnostic text)`.
    pub fn into_parts(self) -> (Value, String) {
        (self.aggregate(), self.diagnostics)
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a stage is invoked. `index` is 1-based.
    fn stage_started(&self, name: &str, index: usize, total: usize);
    /// Called once a stage has resolved.
    fn stage_finished(&self, name: &str, outcome: &StageOutcome);
    /// Called when the run is over, successful or not.
    fn done(&self, run: &PipelineRun);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _name: &str, _index: usize, _total: usize) {}
    fn stage_finished(&self, _name: &str, _outcome: &StageOutcome) {}
    fn done(&self, _run: &PipelineRun) {}
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Run `stages` in order against `context`.
///
/// Never fails: a stage that reports failure (or panics) ends the run and
/// its message is recorded under `"error"` in the aggregate.
#[instrument(skip_all, fields(topic = %context.topic(), stages = stages.len()))]
pub async fn run_pipeline(
    context: &PipelineContext,
    stages: &[Box<dyn Stage>],
    progress: &dyn ProgressReporter,
) -> PipelineRun {
    let id = RunId::new();
    let started_at = Utc::now();
    let start = Instant::now();
    let total = stages.len();

    info!(run_id = %id, "starting pipeline run");

    let mut outputs: Vec<(String, StageResult)> = Vec::with_capacity(total);
    let mut diagnostics = Diagnostics::default();
    let mut failure = None;

    for (i, stage) in stages.iter().enumerate() {
        let name = stage.name().to_string();
        progress.stage_started(&name, i + 1, total);
        diagnostics.line(format_args!("# Stage {}/{total}: {name}", i + 1));

        let input = StageInput {
            context,
            prior: PriorOutputs::new(&outputs),
        };
        let outcome = invoke_guarded(stage.as_ref(), input, &mut diagnostics).await;
        progress.stage_finished(&name, &outcome);

        match outcome {
            StageOutcome::Completed(output) => {
                diagnostics.line(format_args!("# Stage {name} completed"));
                info!(stage = %name, "stage completed");
                outputs.push((name, output));
            }
            StageOutcome::Failed(message) => {
                diagnostics.line(format_args!("\n\nStage {name} failed: {message}"));
                warn!(stage = %name, error = %message, "stage failed, halting run");
                failure = Some(StageFailure {
                    stage: name,
                    message,
                });
                break;
            }
        }
    }

    let run = PipelineRun {
        id,
        started_at,
        elapsed: start.elapsed(),
        outputs,
        failure,
        diagnostics: diagnostics.into_string(),
    };

    progress.done(&run);

    info!(
        run_id = %run.id,
        completed = run.outputs.len(),
        success = run.is_success(),
        elapsed_ms = run.elapsed.as_millis(),
        "pipeline run finished"
    );

    run
}

/// Invoke a stage and resolve it, turning a panic into a failed outcome.
async fn invoke_guarded(
    stage: &dyn Stage,
    input: StageInput<'_>,
    diagnostics: &mut Diagnostics,
) -> StageOutcome {
    let start = AssertUnwindSafe(move || {
        let diagnostics = diagnostics;
        stage.invoke(input, diagnostics)
    });
    let invocation = match std::panic::catch_unwind(start) {
        Ok(invocation) => invocation,
        Err(payload) => return StageOutcome::Failed(panic_message(payload.as_ref())),
    };

    match AssertUnwindSafe(invocation.resolve()).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(payload) => StageOutcome::Failed(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    format!("stage panicked: {detail}")
}
