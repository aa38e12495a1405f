//! Core pipeline orchestration and presentation for ResearchFlow.
//!
//! This crate ties together web research, retrieval, content writing, and
//! SEO optimization into one sequential run, and splits the normalized
//! result into display regions.

pub mod pipeline;
pub mod presenter;
pub mod stages;
pub mod tools;

pub use pipeline::{
    Diagnostics, Invocation, PipelineRun, PriorOutputs, ProgressReporter, SilentProgress, Stage,
    StageFailure, StageInput, StageOutcome, StageResult, run_pipeline,
};
pub use presenter::{PresentationModel, WritingRegion, present};
pub use stages::{Services, StageOptions, research_pipeline};
