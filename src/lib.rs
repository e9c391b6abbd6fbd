#![deny(missing_docs)]

//! Core library for the docsum PDF summarization service.

/// HTTP routing and REST handlers.
pub mod api;
/// Hosted text-completion client and retry wrapper.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// PDF text extraction and temporary upload storage.
pub mod extraction;
/// Structured logging and tracing setup.
pub mod logging;
/// Summarization metrics helpers.
pub mod metrics;
/// Map-reduce summarization pipeline.
pub mod processing;
