//! Pipeline controller sequencing extraction, chunking, map, and reduce.

use super::chunking::chunk_text;
use super::mapper::map_chunks;
use super::prompts::PromptTemplates;
use super::reducer::reduce;
use super::settings::SummarizerSettings;
use super::types::{
    DocumentSource, PipelineError, PipelineState, RequestContext, SummaryReport,
};
use crate::completion::{CompletionProvider, Credential, HostedProvider};
use crate::config::Config;
use crate::extraction::{TempUpload, extract_pdf_text};
use crate::metrics::{MetricsSnapshot, SummaryMetrics};
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Instrument;

/// Runs one document through `Idle → Extracting → Chunking → Mapping → Reducing → Done`.
///
/// The pipeline itself is immutable and shared across requests; everything request-specific
/// (credential, document, cancellation, state history) lives in the [`RequestContext`].
pub struct SummaryPipeline {
    settings: SummarizerSettings,
    templates: PromptTemplates,
    provider: Arc<dyn CompletionProvider>,
    upload_dir: PathBuf,
    default_credential: Option<Credential>,
    metrics: Arc<SummaryMetrics>,
}

/// Abstraction over the pipeline used by external surfaces (HTTP, CLI).
#[async_trait]
pub trait SummarizerApi: Send + Sync {
    /// Summarize the document described by `context`.
    async fn summarize(&self, context: &mut RequestContext) -> Result<SummaryReport, PipelineError>;

    /// Credential used when a request does not bring its own.
    fn default_credential(&self) -> Option<Credential>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl SummaryPipeline {
    /// Assemble a pipeline from explicit parts.
    pub fn new(
        settings: SummarizerSettings,
        templates: PromptTemplates,
        provider: Arc<dyn CompletionProvider>,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            settings,
            templates,
            provider,
            upload_dir,
            default_credential: None,
            metrics: Arc::new(SummaryMetrics::new()),
        }
    }

    /// Use `credential` for requests that do not supply one.
    pub fn with_default_credential(mut self, credential: Option<Credential>) -> Self {
        self.default_credential = credential;
        self
    }

    /// Build the production pipeline from runtime configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let mut templates = PromptTemplates::default();
        if let Some(path) = &config.summary_final_prompt_file {
            templates = templates
                .with_final_template_file(path)
                .context("failed to load final prompt template")?;
            tracing::info!(path = %path.display(), "Loaded custom final prompt");
        }
        let provider =
            HostedProvider::from_config(config).context("failed to build completion provider")?;

        Ok(Self::new(
            SummarizerSettings::from_config(config),
            templates,
            Arc::new(provider),
            config.upload_dir.clone(),
        )
        .with_default_credential(config.api_key.clone()))
    }

    /// Run the pipeline for one request, leaving `context` in `Done` or `Failed`.
    pub async fn run(&self, context: &mut RequestContext) -> Result<SummaryReport, PipelineError> {
        let span = tracing::info_span!("summarize", request_id = %context.request_id);
        let result = self.execute(context).instrument(span).await;

        match &result {
            Ok(report) => {
                context.transition(PipelineState::Done);
                self.metrics.record_success(
                    report.chunk_count as u64,
                    report.failed_chunks.len() as u64,
                    report.reduction_passes as u64,
                );
                tracing::info!(
                    request_id = %context.request_id,
                    chunks = report.chunk_count,
                    failed_chunks = report.failed_chunks.len(),
                    reduction_passes = report.reduction_passes,
                    category = report.summary.category().unwrap_or("<missing>"),
                    "Summary complete"
                );
            }
            Err(error) => {
                context.transition(PipelineState::Failed);
                self.metrics.record_failure();
                tracing::warn!(
                    request_id = %context.request_id,
                    stage = %error.stage(),
                    error = %error,
                    "Summary failed"
                );
            }
        }

        result
    }

    async fn execute(&self, context: &mut RequestContext) -> Result<SummaryReport, PipelineError> {
        let credential = context
            .credential
            .clone()
            .ok_or(PipelineError::MissingCredential)?;

        context.transition(PipelineState::Extracting);
        let text = self.load_text(&context.source).await?;
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyDocument);
        }

        context.transition(PipelineState::Chunking);
        let chunks = chunk_text(
            &text,
            self.settings.chunk_size,
            self.settings.chunk_overlap,
            &self.settings.separator,
        )?;
        if chunks.is_empty() {
            return Err(PipelineError::ChunkingFailure(
                "chunker produced no chunks".to_string(),
            ));
        }
        tracing::info!(
            chars = text.chars().count(),
            chunks = chunks.len(),
            chunk_size = self.settings.chunk_size,
            overlap = self.settings.chunk_overlap,
            "Document chunked"
        );

        context.transition(PipelineState::Mapping);
        let client = self.provider.client_for(&credential);
        let outcome = map_chunks(
            &chunks,
            client.as_ref(),
            &self.templates,
            &self.settings,
            &context.cancel,
        )
        .await?;
        for failure in &outcome.failures {
            tracing::warn!(
                chunk = failure.index,
                error = %failure.error,
                "Partial map failure; continuing without chunk"
            );
        }
        if outcome.partials.is_empty() {
            let message = match outcome.failures.last() {
                Some(last) => format!(
                    "all {} chunks failed; last error: {}",
                    outcome.failures.len(),
                    last.error
                ),
                None => "no partial summaries were produced".to_string(),
            };
            return Err(PipelineError::SummarizationFailure {
                stage: PipelineState::Mapping,
                message,
            });
        }
        if context.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled {
                stage: PipelineState::Reducing,
            });
        }

        context.transition(PipelineState::Reducing);
        let reduced = reduce(
            &outcome.partials,
            client.as_ref(),
            &self.templates,
            &self.settings,
        )
        .await?;

        Ok(SummaryReport {
            request_id: context.request_id,
            summary: reduced.summary,
            chunk_count: chunks.len(),
            failed_chunks: outcome.failures.iter().map(|failure| failure.index).collect(),
            reduction_passes: reduced.intermediate_passes,
        })
    }

    async fn load_text(&self, source: &DocumentSource) -> Result<String, PipelineError> {
        match source {
            DocumentSource::Path(path) => Ok(extract_pdf_text(path).await?),
            DocumentSource::Upload { file_name, bytes } => {
                tracing::info!(file_name = %file_name, bytes = bytes.len(), "Processing upload");
                let upload = TempUpload::persist(&self.upload_dir, file_name, bytes)?;
                let text = extract_pdf_text(upload.path()).await?;
                Ok(text)
            }
            DocumentSource::Text(text) => Ok(text.clone()),
        }
    }
}

#[async_trait]
impl SummarizerApi for SummaryPipeline {
    async fn summarize(&self, context: &mut RequestContext) -> Result<SummaryReport, PipelineError> {
        self.run(context).await
    }

    fn default_credential(&self) -> Option<Credential> {
        self.default_credential.clone()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
