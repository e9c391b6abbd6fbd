use super::chunking::{TokenCounter, build_token_counter, char_counter, determine_input_budget};
use crate::completion::CompletionRequest;
use crate::config::Config;
use std::fmt;

/// Tunables for one summarization pipeline, resolved once at start-up.
#[derive(Clone)]
pub struct SummarizerSettings {
    /// Model identifier sent with every completion call.
    pub model: String,
    /// Sampling temperature sent with every completion call.
    pub temperature: f32,
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Preferred chunk break point.
    pub separator: String,
    /// Largest prompt (in tokens) the reduce stage sends in one call.
    pub input_budget: usize,
    /// Maximum in-flight completion calls within one stage.
    pub map_concurrency: usize,
    /// Upper bound on intermediate reduction passes.
    pub max_reduce_passes: usize,
    /// How prompt length is measured against `input_budget`.
    pub token_counter: TokenCounter,
}

impl SummarizerSettings {
    /// Resolve settings from runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        let token_counter = match build_token_counter(&config.completion_model) {
            Ok(counter) => counter,
            Err(error) => {
                tracing::warn!(
                    model = %config.completion_model,
                    error = %error,
                    "Tokenizer unavailable; measuring prompts in characters"
                );
                char_counter()
            }
        };
        let input_budget =
            determine_input_budget(config.summary_input_budget, &config.completion_model);
        tracing::debug!(
            model = %config.completion_model,
            input_budget,
            budget_override = ?config.summary_input_budget,
            "Derived reduce input budget"
        );

        Self {
            model: config.completion_model.clone(),
            temperature: config.completion_temperature,
            chunk_size: config.text_splitter_chunk_size,
            chunk_overlap: config.text_splitter_chunk_overlap,
            separator: config.text_splitter_separator.clone(),
            input_budget,
            map_concurrency: config.summary_map_concurrency.max(1),
            max_reduce_passes: config.summary_max_reduce_passes,
            token_counter,
        }
    }

    /// Build a completion request for `prompt` with this pipeline's model settings.
    pub fn request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest {
            prompt,
            temperature: self.temperature,
            model: self.model.clone(),
        }
    }

    /// Prompt length as seen by the budget check.
    pub fn measure(&self, prompt: &str) -> usize {
        (self.token_counter)(prompt)
    }
}

impl Default for SummarizerSettings {
    /// Built-in defaults; prompt length is measured in characters.
    fn default() -> Self {
        Self {
            model: "llama-3.3-70b-versatile".into(),
            temperature: 0.2,
            chunk_size: 1000,
            chunk_overlap: 200,
            separator: "\n".into(),
            input_budget: 8192,
            map_concurrency: 4,
            max_reduce_passes: 4,
            token_counter: char_counter(),
        }
    }
}

impl fmt::Debug for SummarizerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummarizerSettings")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("separator", &self.separator)
            .field("input_budget", &self.input_budget)
            .field("map_concurrency", &self.map_concurrency)
            .field("max_reduce_passes", &self.max_reduce_passes)
            .finish_non_exhaustive()
    }
}
