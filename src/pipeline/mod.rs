// Enrichment pipeline: missing names -> clean -> criteria merge -> taxonomy

pub mod clean;
pub mod criteria;
pub mod missing_names;
pub mod orchestrator;
pub mod popular_names;
pub mod taxonomy;

pub use orchestrator::{Orchestrator, PipelineReport, PipelineState};
