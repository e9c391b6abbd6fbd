use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsum::completion::Credential;
use docsum::processing::{DocumentSource, RequestContext, SummaryPipeline};
use docsum::{api, config, logging};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "docsum",
    version,
    about = "Summarize PDF documents with a hosted LLM"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Port to bind; overrides SERVER_PORT.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Summarize a single PDF and print the result to stdout.
    Summarize {
        /// Path to the PDF.
        pdf: PathBuf,
        /// API key for the completion service; defaults to the configured key.
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::init_config().context("invalid configuration")?;
    logging::init_tracing();
    let pipeline = SummaryPipeline::from_config(config)?;

    match cli.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(pipeline, port.or(config.server_port)).await,
        Command::Summarize { pdf, api_key } => summarize(pipeline, pdf, api_key).await,
    }
}

async fn serve(pipeline: SummaryPipeline, port: Option<u16>) -> Result<()> {
    let app = api::create_router(Arc::new(pipeline));
    let (listener, port) = bind_listener(port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app).await.context("server error")
}

async fn summarize(pipeline: SummaryPipeline, pdf: PathBuf, api_key: Option<String>) -> Result<()> {
    use docsum::processing::SummarizerApi;

    let credential = api_key
        .and_then(Credential::new)
        .or_else(|| pipeline.default_credential());
    let mut context = RequestContext::new(DocumentSource::Path(pdf.clone()), credential);
    let report = pipeline
        .run(&mut context)
        .await
        .with_context(|| format!("failed to summarize {}", pdf.display()))?;

    if !report.failed_chunks.is_empty() {
        tracing::warn!(
            failed = ?report.failed_chunks,
            "Summary produced without some chunks"
        );
    }
    println!("{}", report.summary.text());
    Ok(())
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
