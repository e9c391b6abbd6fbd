//! Document summarization pipeline: chunking, map, reduce, and the controller that sequences them.

pub mod chunking;
pub mod mapper;
mod pipeline;
pub mod prompts;
pub mod reducer;
mod settings;
#[cfg(test)]
mod testing;
pub mod types;

pub use pipeline::{SummarizerApi, SummaryPipeline};
pub use prompts::{PassKind, PromptTemplate, PromptTemplates, TemplateError};
pub use settings::SummarizerSettings;
pub use types::{
    CancelFlag, Chunk, ChunkingError, DocumentSource, ExtractionError, FinalSummary,
    PipelineError, PipelineState, RequestContext, SummaryReport,
};
