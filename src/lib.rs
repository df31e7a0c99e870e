//! AI insight generation pipeline for personal finance data.
//!
//! Turns a user's raw financial records into a cached, typed, displayable
//! insight: context assembly, a text-generation call, tolerant response
//! parsing, schema-dispatch normalization, and bounded persistence.
//!
//! The external collaborators (the analysis-record store, the financial
//! read store, the text generator, and the market-context search) are
//! traits; see [`store`], [`finance`], [`generate`] and [`market`].
//! [`pipeline::InsightPipeline`] wires them together.

pub mod cache;
pub mod context;
pub mod error;
pub mod finance;
pub mod generate;
pub mod market;
pub mod parsing;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod sections;
pub mod store;
pub mod types;

pub use error::{GenerationError, GenerationErrorKind, PipelineError, StoreError};
pub use pipeline::{InsightPipeline, RunOptions};
pub use types::{
    AnalysisRecord, InsightSection, InsightType, PipelineResult, SearchContext, SectionKind,
    Severity, StructuredData,
};
