//! Core domain types shared by every ResearchFlow crate.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ResearchFlowError;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tone / Length
// ---------------------------------------------------------------------------

/// Voice requested for generated content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Friendly,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Professional => "professional",
            Self::Casual => "casual",
            Self::Friendly => "friendly",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tone {
    type Err = ResearchFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "professional" => Ok(Self::Professional),
            "casual" => Ok(Self::Casual),
            "friendly" => Ok(Self::Friendly),
            other => Err(ResearchFlowError::validation(format!(
                "unknown tone '{other}': expected professional, casual, or friendly"
            ))),
        }
    }
}

/// Target size of generated content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Length {
    Short,
    #[default]
    Medium,
    Long,
}

impl Length {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
        }
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Length {
    type Err = ResearchFlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" => Ok(Self::Short),
            "medium" => Ok(Self::Medium),
            "long" => Ok(Self::Long),
            other => Err(ResearchFlowError::validation(format!(
                "unknown length '{other}': expected short, medium, or long"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineContext
// ---------------------------------------------------------------------------

/// Options supplied once at run start. Read-only for the duration of a run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineContext {
    topic: String,
    tone: Tone,
    length: Length,
    #[serde(flatten)]
    extra: BTreeMap<String, String>,
}

impl PipelineContext {
    /// Build a context for `topic`. The topic is trimmed and must not be blank.
    pub fn new(topic: &str, tone: Tone, length: Length) -> crate::Result<Self> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(ResearchFlowError::validation("topic must not be blank"));
        }
        Ok(Self {
            topic: topic.to_string(),
            tone,
            length,
            extra: BTreeMap::new(),
        })
    }

    /// Attach a free-form option. Reserved names are ignored.
    pub fn with_option(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        if !matches!(name.as_str(), "topic" | "tone" | "length") {
            self.extra.insert(name, value.into());
        }
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn tone(&self) -> Tone {
        self.tone
    }

    pub fn length(&self) -> Length {
        self.length
    }

    /// Look up any option by name, including the built-in ones.
    pub fn option(&self, name: &str) -> Option<&str> {
        match name {
            "topic" => Some(&self.topic),
            "tone" => Some(self.tone.as_str()),
            "length" => Some(self.length.as_str()),
            _ => self.extra.get(name).map(String::as_str),
        }
    }
}

// ---------------------------------------------------------------------------
// Research / retrieval records
// ---------------------------------------------------------------------------

/// One web search hit, as produced by the research stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: String,
    /// Short bullet points extracted from the snippet.
    #[serde(default)]
    pub key_points: Vec<String>,
}

/// A chunk returned from a vector similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    /// Link of the research record the chunk came from.
    pub source: String,
    /// Cosine similarity to the query embedding.
    #[serde(default)]
    pub score: f32,
}
