//! Split a normalized run result into optional display regions.
//!
//! Every region is optional; a missing or oddly shaped section is omitted,
//! never an error. Only the export text is always produced.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use researchflow_normalize::NormalizedResult;

use crate::stages::{CONTENT_WRITING_TASK, RAG_ANSWERING_TASK, RESEARCH_TASK, SEO_OPTIMIZATION_TASK};

/// Spellings the writer has used for its top-10 list, in lookup order.
pub const TOP10_KEYS: [&str; 3] = ["top10", "top_10", "top10_insights"];

/// The writer's deliverables, as far as they could be found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WritingRegion {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blog: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x_thread: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newsletter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top10: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentationModel {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub research: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub writing: Option<WritingRegion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo: Option<Value>,
    /// Failure message of a halted run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Downloadable artifact text: indented JSON, or the plain string.
    pub export: String,
}

impl PresentationModel {
    /// True when no region besides the export could be extracted.
    pub fn is_bare(&self) -> bool {
        self.research.is_none()
            && self.retrieval.is_none()
            && self.writing.is_none()
            && self.seo.is_none()
    }
}

pub fn present(normalized: &NormalizedResult) -> PresentationModel {
    let export = normalized.to_export_string();

    let Some(map) = normalized.as_mapping() else {
        debug!("result is not a mapping, only export is available");
        return PresentationModel {
            research: None,
            retrieval: None,
            writing: None,
            seo: None,
            error: None,
            export,
        };
    };

    PresentationModel {
        research: map.get(RESEARCH_TASK).cloned(),
        retrieval: map.get(RAG_ANSWERING_TASK).cloned(),
        writing: map
            .get(CONTENT_WRITING_TASK)
            .and_then(Value::as_object)
            .map(writing_region),
        seo: map.get(SEO_OPTIMIZATION_TASK).cloned(),
        error: map.get("error").map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
        export,
    }
}

fn writing_region(content: &Map<String, Value>) -> WritingRegion {
    let field = |key: &str| content.get(key).filter(|v| !v.is_null()).cloned();

    WritingRegion {
        blog: field("blog"),
        linkedin: field("linkedin"),
        x_thread: field("x_thread"),
        newsletter: field("newsletter"),
        top10: top10(content),
    }
}

/// First non-empty top-10 entry; omitted when that entry is not a list.
fn top10(content: &Map<String, Value>) -> Option<Vec<Value>> {
    let value = TOP10_KEYS
        .iter()
        .filter_map(|key| content.get(*key))
        .find(|v| is_present(v))?;

    match value {
        Value::Array(items) => Some(items.clone()),
        other => {
            debug!(kind = value_kind(other), "top-10 entry is not a list, omitting");
            None
        }
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Number(_) => true,
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
