//! Shared types, error model, configuration, and capability traits for ResearchFlow.
//!
//! This crate is the foundation depended on by all other ResearchFlow crates.
//! It provides:
//! - [`ResearchFlowError`]: the unified error type
//! - Domain types ([`PipelineContext`], [`SourceRecord`], [`RetrievedChunk`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading)
//! - External service seams ([`WebSearch`], [`TextEmbedder`], [`TextGenerator`])

pub mod capabilities;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use capabilities::{GenerationRequest, TextEmbedder, TextGenerator, WebSearch};
pub use config::{
    AppConfig, DefaultsConfig, OpenAiConfig, OutputConfig, SerperConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_api_keys,
};
pub use error::{ResearchFlowError, Result};
pub use types::{Length, PipelineContext, RetrievedChunk, RunId, SourceRecord, Tone};
