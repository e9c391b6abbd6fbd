//! Map stage: one condensation call per chunk.

use super::prompts::{PassKind, PromptTemplates};
use super::settings::SummarizerSettings;
use super::types::{
    CancelFlag, Chunk, ChunkFailure, MapOutcome, PartialSummary, PipelineError, PipelineState,
};
use crate::completion::CompletionClient;
use futures_util::stream::{self, StreamExt};

/// Condense a single chunk.
///
/// A service error is returned as a [`ChunkFailure`] so the caller can decide whether the
/// remaining partial summaries are good enough.
pub async fn summarize_chunk(
    chunk: &Chunk,
    client: &dyn CompletionClient,
    templates: &PromptTemplates,
    settings: &SummarizerSettings,
) -> Result<PartialSummary, ChunkFailure> {
    let prompt = templates.render(PassKind::Map, &chunk.text);
    client
        .complete(settings.request(prompt))
        .await
        .map(|text| PartialSummary {
            source_chunk_index: chunk.index,
            text,
        })
        .map_err(|error| ChunkFailure {
            index: chunk.index,
            error,
        })
}

/// Condense every chunk with at most `settings.map_concurrency` calls in flight.
///
/// Results are returned in chunk order regardless of completion order. The cancellation flag
/// is checked before each call; once set, no further calls are issued and the stage fails
/// with [`PipelineError::Cancelled`].
pub async fn map_chunks(
    chunks: &[Chunk],
    client: &dyn CompletionClient,
    templates: &PromptTemplates,
    settings: &SummarizerSettings,
    cancel: &CancelFlag,
) -> Result<MapOutcome, PipelineError> {
    let results: Vec<Option<Result<PartialSummary, ChunkFailure>>> =
        stream::iter(chunks.iter().cloned())
            .map(|chunk: Chunk| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                let result = summarize_chunk(&chunk, client, templates, settings).await;
                match &result {
                    Ok(partial) => tracing::debug!(
                        chunk = chunk.index,
                        chars = partial.text.chars().count(),
                        "Chunk summarized"
                    ),
                    Err(failure) => tracing::warn!(
                        chunk = failure.index,
                        error = %failure.error,
                        "Chunk summarization failed"
                    ),
                }
                Some(result)
            })
            .buffer_unordered(settings.map_concurrency.max(1))
            .collect()
            .await;

    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled {
            stage: PipelineState::Mapping,
        });
    }

    let mut outcome = MapOutcome::default();
    for result in results.into_iter().flatten() {
        match result {
            Ok(partial) => outcome.partials.push(partial),
            Err(failure) => outcome.failures.push(failure),
        }
    }
    outcome.partials.sort_by_key(|partial| partial.source_chunk_index);
    outcome.failures.sort_by_key(|failure| failure.index);
    Ok(outcome)
}
