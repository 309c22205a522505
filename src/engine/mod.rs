pub mod pipeline;
pub mod results;

pub use pipeline::{PipelineStage, StackingPipeline};
pub use results::{FoldStatus, FoldSummary, GatingEntry, LearnerDiagnostics, RunNote, StackingReport};
