/// Runtime pipeline module - Gateway

mod pipeline;
mod summary;

pub use pipeline::{compose_report, AgentSet, ArtifactPaths, ChartPipeline};
pub use summary::{RunSummary, StageReport};
