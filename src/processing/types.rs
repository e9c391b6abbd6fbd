//! Core data types and error definitions for the summarization pipeline.

use crate::completion::{CompletionError, Credential};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

/// Line marker the final prompt asks the model to emit.
pub const CATEGORY_LABEL: &str = "Category of the Document";

/// Errors produced while splitting raw text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// A zero-length window can never make progress.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap must leave at least one fresh character per chunk.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge {
        /// Requested overlap.
        overlap: usize,
        /// Requested chunk size.
        chunk_size: usize,
    },
}

/// Errors produced while loading text out of a PDF.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// Upload could not be written to or read from disk.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The PDF parser rejected the document.
    #[error("Failed to parse PDF: {0}")]
    Parse(String),
}

/// Errors produced by the reduce stage.
#[derive(Debug, Error)]
pub enum ReduceError {
    /// Nothing to reduce.
    #[error("no partial summaries to combine")]
    NoPartials,
    /// An intermediate combine pass failed.
    #[error("combine pass {pass} failed: {source}")]
    Combine {
        /// One-based index of the intermediate pass.
        pass: usize,
        /// Underlying service error.
        #[source]
        source: CompletionError,
    },
    /// The final structured pass failed.
    #[error("final summary pass failed: {0}")]
    Final(#[source] CompletionError),
}

/// Pipeline stages, in the order a successful request visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Request accepted, nothing done yet.
    Idle,
    /// Reading text out of the document.
    Extracting,
    /// Splitting the text into chunks.
    Chunking,
    /// Summarizing each chunk.
    Mapping,
    /// Combining partial summaries.
    Reducing,
    /// Final summary produced.
    Done,
    /// Terminal failure.
    Failed,
}

impl PipelineState {
    /// Lowercase stage name used in logs and API errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Mapping => "mapping",
            Self::Reducing => "reducing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request-fatal errors. Each one names the stage that failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No API key was supplied for the request.
    #[error("No API key supplied for the completion service")]
    MissingCredential,
    /// The PDF could not be read.
    #[error("Could not extract text from the document: {0}")]
    ExtractionFailure(#[from] ExtractionError),
    /// The document contained no extractable text.
    #[error("Could not extract text from the document: no text layer found")]
    EmptyDocument,
    /// The chunker produced nothing or was misconfigured.
    #[error("Could not split document into chunks: {0}")]
    ChunkingFailure(String),
    /// No summary could be produced.
    #[error("Summarization failed during {stage}: {message}")]
    SummarizationFailure {
        /// Stage that gave up.
        stage: PipelineState,
        /// Underlying service error or reason.
        message: String,
    },
    /// The caller cancelled the request.
    #[error("Summarization cancelled during {stage}")]
    Cancelled {
        /// Stage that observed the cancellation.
        stage: PipelineState,
    },
}

impl PipelineError {
    /// Stage in which the failure occurred.
    pub fn stage(&self) -> PipelineState {
        match self {
            Self::MissingCredential => PipelineState::Idle,
            Self::ExtractionFailure(_) | Self::EmptyDocument => PipelineState::Extracting,
            Self::ChunkingFailure(_) => PipelineState::Chunking,
            Self::SummarizationFailure { stage, .. } | Self::Cancelled { stage } => *stage,
        }
    }
}

impl From<ChunkingError> for PipelineError {
    fn from(error: ChunkingError) -> Self {
        Self::ChunkingFailure(error.to_string())
    }
}

impl From<ReduceError> for PipelineError {
    fn from(error: ReduceError) -> Self {
        Self::SummarizationFailure {
            stage: PipelineState::Reducing,
            message: error.to_string(),
        }
    }
}

/// One bounded segment of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based position in the document.
    pub index: usize,
    /// Chunk contents, including the overlap carried from the previous chunk.
    pub text: String,
}

/// Condensed text for one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSummary {
    /// Index of the chunk this summary was produced from.
    pub source_chunk_index: usize,
    /// Generated text.
    pub text: String,
}

/// A chunk the completion service could not summarize.
#[derive(Debug, Clone)]
pub struct ChunkFailure {
    /// Index of the failed chunk.
    pub index: usize,
    /// Service error observed for that chunk.
    pub error: CompletionError,
}

/// Result of the map stage: successes and failures, both ordered by chunk index.
#[derive(Debug, Clone, Default)]
pub struct MapOutcome {
    /// Successfully produced partial summaries.
    pub partials: Vec<PartialSummary>,
    /// Chunks that failed.
    pub failures: Vec<ChunkFailure>,
}

/// Final document summary as returned by the completion service.
///
/// The text is never repaired: if the model omitted the category line, [`Self::category`]
/// returns `None` and callers decide what to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalSummary {
    text: String,
}

impl FinalSummary {
    /// Wrap generated text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Full summary text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume into the raw text.
    pub fn into_text(self) -> String {
        self.text
    }

    /// Category from the last `| Category of the Document | <value> |` line, if any.
    pub fn category(&self) -> Option<&str> {
        self.text.lines().rev().find_map(|line| {
            let cells: Vec<&str> = line
                .trim()
                .trim_matches('|')
                .split('|')
                .map(str::trim)
                .collect();
            match cells.as_slice() {
                [label, value] if label.eq_ignore_ascii_case(CATEGORY_LABEL) && !value.is_empty() => {
                    Some(*value)
                }
                _ => None,
            }
        })
    }

    /// Number of non-empty paragraphs, excluding the category line.
    pub fn paragraph_count(&self) -> usize {
        self.text
            .split("\n\n")
            .map(str::trim)
            .filter(|block| !block.is_empty())
            .filter(|block| !block.starts_with('|'))
            .count()
    }
}

/// Where the document for a request comes from.
#[derive(Debug, Clone)]
pub enum DocumentSource {
    /// PDF already on disk; left untouched after processing.
    Path(PathBuf),
    /// Uploaded PDF bytes; persisted to a temporary file for the duration of the request.
    Upload {
        /// Original file name, used for logging only.
        file_name: String,
        /// Raw PDF bytes.
        bytes: Vec<u8>,
    },
    /// Text that has already been extracted.
    Text(String),
}

/// Cooperative cancellation flag shared between the caller and a running pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; the pipeline stops before its next completion call.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-request state threaded through the pipeline.
#[derive(Debug)]
pub struct RequestContext {
    /// Identifier attached to every log line of this request.
    pub request_id: Uuid,
    /// API key for the completion service.
    pub credential: Option<Credential>,
    /// Document to summarize.
    pub source: DocumentSource,
    /// Caller-controlled cancellation.
    pub cancel: CancelFlag,
    states: Vec<PipelineState>,
}

impl RequestContext {
    /// Start a new request in the `Idle` state.
    pub fn new(source: DocumentSource, credential: Option<Credential>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            credential,
            source,
            cancel: CancelFlag::new(),
            states: vec![PipelineState::Idle],
        }
    }

    /// Attach a caller-owned cancellation flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Idle)
    }

    /// Every state visited so far, in order.
    pub fn history(&self) -> &[PipelineState] {
        &self.states
    }

    pub(crate) fn transition(&mut self, next: PipelineState) {
        tracing::debug!(
            request_id = %self.request_id,
            from = %self.state(),
            to = %next,
            "Pipeline transition"
        );
        self.states.push(next);
    }
}

/// Outcome of a successful request.
#[derive(Debug, Clone)]
pub struct SummaryReport {
    /// Identifier of the request that produced this report.
    pub request_id: Uuid,
    /// Final summary text.
    pub summary: FinalSummary,
    /// Number of chunks the document was split into.
    pub chunk_count: usize,
    /// Indexes of chunks the completion service failed on.
    pub failed_chunks: Vec<usize>,
    /// Intermediate combine passes run before the final pass.
    pub reduction_passes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_is_read_from_trailing_table_line() {
        let summary = FinalSummary::new(
            "First paragraph.\n\nSecond paragraph.\n\n| Category of the Document | Legal Home Document |",
        );
        assert_eq!(summary.category(), Some("Legal Home Document"));
        assert_eq!(summary.paragraph_count(), 2);
    }

    #[test]
    fn missing_category_is_not_fabricated() {
        let summary = FinalSummary::new("Only one paragraph without a tag.");
        assert_eq!(summary.category(), None);
        assert_eq!(summary.text(), "Only one paragraph without a tag.");
    }

    #[test]
    fn pipeline_errors_name_their_stage() {
        assert_eq!(PipelineError::MissingCredential.stage(), PipelineState::Idle);
        assert_eq!(PipelineError::EmptyDocument.stage(), PipelineState::Extracting);
        assert_eq!(
            PipelineError::from(ChunkingError::InvalidChunkSize).stage(),
            PipelineState::Chunking
        );
        assert_eq!(
            PipelineError::from(ReduceError::NoPartials).stage(),
            PipelineState::Reducing
        );
    }

    #[test]
    fn context_tracks_transitions() {
        let mut context = RequestContext::new(DocumentSource::Text("abc".into()), None);
        assert_eq!(context.state(), PipelineState::Idle);
        context.transition(PipelineState::Failed);
        assert_eq!(context.history(), &[PipelineState::Idle, PipelineState::Failed]);
    }

    #[test]
    fn cancel_flag_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        flag.cancel();
        assert!(observer.is_cancelled());
    }
}
