//! sheetsmith-core: Worksheet analysis and practice-problem pipeline.
//!
//! This crate defines the data model, the LLM provider trait, the prompt
//! templates, and the three-stage analyze → generate → customize pipeline
//! that the rest of sheetsmith builds on.

pub mod actions;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod session;
pub mod traits;

pub use error::{ProviderError, Stage, StageError};
pub use model::{GeneratedProblemSet, IdentifiedConcept, Problem, WorksheetAnalysis};
pub use pipeline::{PipelineConfig, WorksheetPipeline, DEFAULT_PROBLEM_COUNT};
pub use session::SessionContext;
