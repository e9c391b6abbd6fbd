//! Reduce stage: bounded recursive combination of partial summaries.
//!
//! Partial summaries are joined in chunk order. While the final prompt would exceed the input
//! budget, the texts are packed into budget-sized batches and each batch is condensed with the
//! combine template; every such level counts as one intermediate pass. The last call always uses
//! the final template, which carries the document-level guidelines.

use super::prompts::{PassKind, PromptTemplates};
use super::settings::SummarizerSettings;
use super::types::{FinalSummary, PartialSummary, ReduceError};
use crate::completion::CompletionClient;
use futures_util::stream::{self, StreamExt, TryStreamExt};

/// Separator placed between summaries so their content does not run together.
pub const SUMMARY_DELIMITER: &str = "\n\n---\n\n";

/// Final summary plus the number of intermediate passes needed to reach it.
#[derive(Debug, Clone)]
pub struct ReduceOutcome {
    /// Output of the final pass, unmodified.
    pub summary: FinalSummary,
    /// Combine passes run before the final pass.
    pub intermediate_passes: usize,
}

/// Combine partial summaries into the final document summary.
pub async fn reduce(
    partials: &[PartialSummary],
    client: &dyn CompletionClient,
    templates: &PromptTemplates,
    settings: &SummarizerSettings,
) -> Result<ReduceOutcome, ReduceError> {
    if partials.is_empty() {
        return Err(ReduceError::NoPartials);
    }

    let mut ordered: Vec<&PartialSummary> = partials.iter().collect();
    ordered.sort_by_key(|partial| partial.source_chunk_index);
    let mut texts: Vec<String> = ordered.into_iter().map(|p| p.text.clone()).collect();

    let mut passes = 0usize;
    loop {
        let combined = texts.join(SUMMARY_DELIMITER);
        if fits(&combined, PassKind::Final, templates, settings) {
            break;
        }
        if passes >= settings.max_reduce_passes {
            tracing::warn!(
                passes,
                summaries = texts.len(),
                input_budget = settings.input_budget,
                "Reduction pass limit reached; running final pass over budget"
            );
            break;
        }

        passes += 1;
        let batches = pack_batches(&texts, templates, settings);
        tracing::debug!(
            pass = passes,
            summaries = texts.len(),
            batches = batches.len(),
            "Running intermediate combine pass"
        );
        texts = combine_level(batches, client, templates, settings)
            .await
            .map_err(|source| ReduceError::Combine {
                pass: passes,
                source,
            })?;
    }

    let prompt = templates.render(PassKind::Final, &texts.join(SUMMARY_DELIMITER));
    let text = client
        .complete(settings.request(prompt))
        .await
        .map_err(ReduceError::Final)?;

    Ok(ReduceOutcome {
        summary: FinalSummary::new(text),
        intermediate_passes: passes,
    })
}

fn fits(
    text: &str,
    pass: PassKind,
    templates: &PromptTemplates,
    settings: &SummarizerSettings,
) -> bool {
    settings.measure(&templates.render(pass, text)) <= settings.input_budget
}

/// Greedily pack consecutive texts into batches whose combine prompt fits the budget.
///
/// A text that does not fit even on its own becomes a batch by itself. Batches of two or more
/// texts always shrink the list; singleton batches still get condensed.
fn pack_batches(
    texts: &[String],
    templates: &PromptTemplates,
    settings: &SummarizerSettings,
) -> Vec<Vec<String>> {
    let mut batches: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for text in texts {
        if current.is_empty() {
            current.push(text.clone());
            continue;
        }
        let mut candidate = current.join(SUMMARY_DELIMITER);
        candidate.push_str(SUMMARY_DELIMITER);
        candidate.push_str(text);
        if fits(&candidate, PassKind::Combine, templates, settings) {
            current.push(text.clone());
        } else {
            batches.push(std::mem::take(&mut current));
            current.push(text.clone());
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Condense every batch of one level, preserving order.
async fn combine_level(
    batches: Vec<Vec<String>>,
    client: &dyn CompletionClient,
    templates: &PromptTemplates,
    settings: &SummarizerSettings,
) -> Result<Vec<String>, crate::completion::CompletionError> {
    stream::iter(batches)
        .map(|batch| async move {
            let prompt = templates.render(PassKind::Combine, &batch.join(SUMMARY_DELIMITER));
            client.complete(settings.request(prompt)).await
        })
        .buffered(settings.map_concurrency.max(1))
        .try_collect()
        .await
}
