//! Character chunking and token accounting.
//!
//! Highlights:
//!
//! - Character windows: chunk lengths are measured in `char`s, never bytes, so a chunk never
//!   splits a code point and `TEXT_SPLITTER_CHUNK_SIZE` means the same thing for any script.
//! - Separator preference: each window breaks after the last separator it contains (the
//!   default is `"\n"`), and falls back to a hard cut when there is none.
//! - Exact overlap: consecutive chunks share exactly `overlap` characters, so dropping the first
//!   `overlap` characters of every chunk after the first reconstructs the input.
//! - Token budgets: the reduce stage measures prompts with `tiktoken-rs`, falling back to
//!   `cl100k_base` when the hosted model has no published encoding (Llama, Mixtral, ...).

use anyhow::Error as TokenizerError;
use std::sync::Arc;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size, o200k_base, p50k_base,
    r50k_base,
};

use super::types::{Chunk, ChunkingError};

/// Measures prompt length in model tokens.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const MIN_INPUT_BUDGET: usize = 1024;
const MAX_INPUT_BUDGET: usize = 8192;

/// Split `text` into overlapping chunks of at most `chunk_size` characters.
///
/// Returns an empty vector for empty input. Fails only on impossible settings: a zero
/// `chunk_size`, or an `overlap` that would leave no room for new text.
pub fn chunk_text(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    separator: &str,
) -> Result<Vec<Chunk>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::OverlapTooLarge {
            overlap,
            chunk_size,
        });
    }
    if text.is_empty() {
        return Ok(Vec::new());
    }

    // Byte offset of every char boundary, including the end of the string.
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = bounds.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        if char_len - start <= chunk_size {
            chunks.push(Chunk {
                index: chunks.len(),
                text: text[bounds[start]..].to_string(),
            });
            break;
        }

        let window_end = start + chunk_size;
        let split = separator_split(text, &bounds, start, window_end, overlap, separator)
            .unwrap_or(window_end);
        chunks.push(Chunk {
            index: chunks.len(),
            text: text[bounds[start]..bounds[split]].to_string(),
        });
        start = split - overlap;
    }

    Ok(chunks)
}

/// Char index just past the last separator inside the window, if that still advances the
/// next chunk's start beyond `start`.
fn separator_split(
    text: &str,
    bounds: &[usize],
    start: usize,
    window_end: usize,
    overlap: usize,
    separator: &str,
) -> Option<usize> {
    if separator.is_empty() {
        return None;
    }
    let window = &text[bounds[start]..bounds[window_end]];
    let found = window.rfind(separator)?;
    let split_byte = bounds[start] + found + separator.len();
    let split = bounds.binary_search(&split_byte).ok()?;
    (split > start + overlap).then_some(split)
}

/// Rebuild the original text from its chunks by dropping the shared prefix of each chunk.
pub fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
    let mut text = String::new();
    for chunk in chunks {
        if chunk.index == 0 {
            text.push_str(&chunk.text);
        } else {
            text.extend(chunk.text.chars().skip(overlap));
        }
    }
    text
}

/// Determine the reduce-stage input budget in tokens.
///
/// Precedence:
/// 1) Explicit override (`SUMMARY_INPUT_BUDGET`) wins and is clamped at `>= 1`.
/// 2) Otherwise a quarter of the model's context window, clamped into `[1024, 8192]` so that
///    the final pass leaves ample room for the generated summary.
pub fn determine_input_budget(override_budget: Option<usize>, model: &str) -> usize {
    if let Some(explicit) = override_budget {
        return explicit.max(1);
    }
    let window = completion_context_window(model);
    (window / 4).clamp(MIN_INPUT_BUDGET, MAX_INPUT_BUDGET)
}

/// Look up the context window for a hosted completion model.
pub fn completion_context_window(model: &str) -> usize {
    let normalized = model.to_lowercase();
    match normalized.as_str() {
        value if value.starts_with("llama-3.1") || value.starts_with("llama-3.3") => 131_072,
        value if value.starts_with("llama3") || value.starts_with("llama-3") => 8192,
        value if value.starts_with("mixtral-8x7b") => 32_768,
        value if value.starts_with("gemma") => 8192,
        _ => {
            let size = get_context_size(model);
            tracing::trace!(model, size, "Using tiktoken context window estimate");
            size
        }
    }
}

/// Build a token counter for the given completion model.
///
/// Uses the model's own encoding when `tiktoken-rs` knows it and `cl100k_base` otherwise.
/// Fails only if no encoding can be loaded at all.
pub fn build_token_counter(model: &str) -> Result<TokenCounter, TokenizerError> {
    let normalized = model.trim();
    let encoding = Arc::new(resolve_encoding(normalized)?);
    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

/// Counter that treats every character as one token.
pub fn char_counter() -> TokenCounter {
    Arc::new(|segment: &str| segment.chars().count())
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            match model {
                "o200k_base" => o200k_base(),
                "p50k_base" => p50k_base(),
                "r50k_base" | "gpt2" => r50k_base(),
                _ => cl100k_base(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(chunks: &[Chunk]) -> Vec<&str> {
        chunks.iter().map(|chunk| chunk.text.as_str()).collect()
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunks = chunk_text("", 10, 2, "\n").expect("valid settings");
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let text = "A".repeat(50);
        let chunks = chunk_text(&text, 1000, 200, "\n").expect("valid settings");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn text_of_exactly_chunk_size_is_a_single_chunk() {
        let text = "x".repeat(10);
        let chunks = chunk_text(&text, 10, 3, "\n").expect("valid settings");
        assert_eq!(texts(&chunks), vec![text.as_str()]);
    }

    #[test]
    fn breaks_after_last_separator_in_window() {
        let text = "aaaa\nbbbb\ncccc";
        let chunks = chunk_text(text, 10, 0, "\n").expect("valid settings");
        assert_eq!(texts(&chunks), vec!["aaaa\nbbbb\n", "cccc"]);
    }

    #[test]
    fn falls_back_to_hard_break_without_separator() {
        let text = "abcdefghij";
        let chunks = chunk_text(text, 4, 1, "\n").expect("valid settings");
        assert_eq!(texts(&chunks), vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn consecutive_chunks_share_exact_overlap() {
        let text = "line one\nline two\nline three\nline four\nline five\n";
        let overlap = 4;
        let chunks = chunk_text(text, 16, overlap, "\n").expect("valid settings");
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail: String = pair[0]
                .text
                .chars()
                .skip(pair[0].text.chars().count() - overlap)
                .collect();
            let head: String = pair[1].text.chars().take(overlap).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text = "ééééé\nüüüüü\nßßßßß";
        let chunks = chunk_text(text, 7, 2, "\n").expect("valid settings");
        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 7);
        }
        assert_eq!(reassemble(&chunks, 2), text);
    }

    #[test]
    fn rejects_invalid_settings() {
        assert!(matches!(
            chunk_text("abc", 0, 0, "\n"),
            Err(ChunkingError::InvalidChunkSize)
        ));
        assert!(matches!(
            chunk_text("abc", 5, 5, "\n"),
            Err(ChunkingError::OverlapTooLarge { .. })
        ));
    }

    #[test]
    fn chunking_terminates_and_reconstructs_for_all_size_overlap_pairs() {
        let corpus = [
            "The quick brown fox\njumps over\nthe lazy dog.\n\nAnd again.".to_string(),
            "no separators at all in this one".to_string(),
            "\n\n\n\n\n\n\n\n".to_string(),
            "a\nb\nc\nd\ne\nf\ng\nh\ni\nj\nk".to_string(),
            "mixé\nüñíçødé\ntëxt".repeat(7),
        ];
        for text in &corpus {
            let char_len = text.chars().count();
            for chunk_size in 1..=24 {
                for overlap in 0..chunk_size {
                    for separator in ["\n", "\n\n", " ", ""] {
                        let chunks = chunk_text(text, chunk_size, overlap, separator)
                            .expect("valid settings");
                        assert!(!chunks.is_empty());
                        assert!(chunks.len() <= char_len);
                        for (position, chunk) in chunks.iter().enumerate() {
                            assert_eq!(chunk.index, position);
                            assert!(chunk.text.chars().count() <= chunk_size);
                        }
                        assert_eq!(
                            &reassemble(&chunks, overlap),
                            text,
                            "size={chunk_size} overlap={overlap} sep={separator:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn input_budget_prefers_override() {
        assert_eq!(determine_input_budget(Some(500), "llama-3.3-70b-versatile"), 500);
        assert_eq!(determine_input_budget(Some(0), "gpt-4o-mini"), 1);
    }

    #[test]
    fn input_budget_is_clamped_for_large_windows() {
        assert_eq!(determine_input_budget(None, "llama-3.3-70b-versatile"), 8192);
        assert_eq!(determine_input_budget(None, "llama3-8b-8192"), 2048);
    }

    #[test]
    fn token_counter_falls_back_to_cl100k_for_unknown_models() {
        let counter = build_token_counter("llama-3.3-70b-versatile").expect("encoding");
        let tokens = counter("The quick brown fox jumps over the lazy dog.");
        assert!(tokens > 0);
        assert!(tokens < 20);
    }

    #[test]
    fn char_counter_counts_scalars() {
        assert_eq!(char_counter()("héllo"), 5);
    }
}
