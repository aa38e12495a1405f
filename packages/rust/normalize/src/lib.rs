//! Output normalization for pipeline results.
//!
//! Coerces whatever a pipeline run produced (text that may hold JSON or
//! terminal escape codes, raw bytes, mappings, sequences, opaque objects)
//! into either a JSON value or a display string. [`normalize`] is total:
//! every parse, repair, or encode failure degrades to a less structured
//! form instead of surfacing an error.

mod cleanup;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Number, Value};
use tracing::debug;

pub use cleanup::{strip_ansi, strip_code_fence};

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// An arbitrary, not-yet-normalized result value.
#[derive(Debug, Clone)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    /// May be NaN or infinite, which JSON cannot carry.
    Float(f64),
    Text(String),
    /// Raw bytes, expected to be UTF-8 but not guaranteed.
    Bytes(Vec<u8>),
    Sequence(Vec<RawValue>),
    Mapping(BTreeMap<String, RawValue>),
    /// An already-parsed JSON value.
    Json(Value),
    /// Anything else; only its `Display` form is known.
    Opaque(Opaque),
}

impl RawValue {
    /// Wrap a value that has no JSON representation (errors, handles, ...).
    pub fn opaque(value: impl fmt::Display + Send + Sync + 'static) -> Self {
        Self::Opaque(Opaque(Arc::new(value)))
    }
}

/// A value known only through its `Display` implementation.
#[derive(Clone)]
pub struct Opaque(Arc<dyn fmt::Display + Send + Sync>);

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Opaque").field(&self.0.to_string()).finish()
    }
}

impl fmt::Display for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Value> for RawValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for RawValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A JSON-safe value, or a string to show as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResult {
    Json(Value),
    Text(String),
}

impl NormalizedResult {
    /// True for JSON objects and arrays.
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Json(Value::Object(_) | Value::Array(_)))
    }

    /// The top-level mapping, if the result is one.
    pub fn as_mapping(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Json(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    /// Text for the downloadable artifact.
    ///
    /// Structured results are pretty-printed with two-space indentation and
    /// non-ASCII characters left unescaped; everything else uses its string
    /// form.
    pub fn to_export_string(&self) -> String {
        match self {
            Self::Json(value @ (Value::Object(_) | Value::Array(_))) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for NormalizedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

impl From<NormalizedResult> for Value {
    fn from(result: NormalizedResult) -> Self {
        match result {
            NormalizedResult::Json(value) => value,
            NormalizedResult::Text(text) => Value::String(text),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Normalize an arbitrary result value. Never fails.
///
/// 1. Bytes are decoded as UTF-8, lossily if they are not valid.
/// 2. Text has escape sequences and surrounding whitespace removed. If it
///    then starts with `{` or `[` it is parsed as JSON, retried once with
///    single quotes swapped for double quotes, and otherwise kept as text.
/// 3. Mappings and sequences are converted to JSON, with values JSON cannot
///    carry replaced by their string form.
/// 4. Scalars pass through when JSON can represent them and become their
///    string form otherwise.
pub fn normalize(value: RawValue) -> NormalizedResult {
    match value {
        RawValue::Bytes(bytes) => normalize_text(&decode_bytes(bytes)),
        RawValue::Text(text) | RawValue::Json(Value::String(text)) => normalize_text(&text),
        structured @ (RawValue::Sequence(_)
        | RawValue::Mapping(_)
        | RawValue::Json(Value::Array(_) | Value::Object(_))) => {
            NormalizedResult::Json(to_json_lossy(structured))
        }
        RawValue::Json(scalar) => NormalizedResult::Json(scalar),
        RawValue::Null => NormalizedResult::Json(Value::Null),
        RawValue::Bool(b) => NormalizedResult::Json(Value::Bool(b)),
        RawValue::Int(n) => NormalizedResult::Json(Value::Number(n.into())),
        RawValue::Float(f) => match Number::from_f64(f) {
            Some(n) => NormalizedResult::Json(Value::Number(n)),
            None => NormalizedResult::Text(f.to_string()),
        },
        RawValue::Opaque(opaque) => NormalizedResult::Text(opaque.to_string()),
    }
}

/// Clean a string and try to recover JSON from it.
fn normalize_text(text: &str) -> NormalizedResult {
    let stripped = strip_ansi(text);
    let cleaned = stripped.trim();

    if !(cleaned.starts_with('{') || cleaned.starts_with('[')) {
        return NormalizedResult::Text(cleaned.to_string());
    }

    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => NormalizedResult::Json(value),
        Err(first) => match serde_json::from_str::<Value>(&cleanup::repair_quotes(cleaned)) {
            Ok(value) => {
                debug!(error = %first, "parsed after quote repair");
                NormalizedResult::Json(value)
            }
            Err(second) => {
                debug!(%first, %second, "text is not JSON, keeping as display string");
                NormalizedResult::Text(cleaned.to_string())
            }
        },
    }
}

fn decode_bytes(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "bytes are not valid UTF-8, decoding lossily");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}

/// Convert to JSON, stringifying anything JSON has no form for.
///
/// Nested text is kept verbatim; only top-level text gets cleaned and parsed.
fn to_json_lossy(value: RawValue) -> Value {
    match value {
        RawValue::Null => Value::Null,
        RawValue::Bool(b) => Value::Bool(b),
        RawValue::Int(n) => Value::Number(n.into()),
        RawValue::Float(f) => {
            Number::from_f64(f).map_or_else(|| Value::String(f.to_string()), Value::Number)
        }
        RawValue::Text(text) => Value::String(text),
        RawValue::Bytes(bytes) => Value::String(decode_bytes(bytes)),
        RawValue::Sequence(items) => Value::Array(items.into_iter().map(to_json_lossy).collect()),
        RawValue::Mapping(entries) => Value::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key, to_json_lossy(value)))
                .collect(),
        ),
        RawValue::Json(value) => value,
        RawValue::Opaque(opaque) => Value::String(opaque.to_string()),
    }
}
