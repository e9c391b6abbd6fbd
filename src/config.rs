use crate::completion::Credential;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CHUNK_SIZE: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;
const DEFAULT_SEPARATOR: &str = "\n";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
const DEFAULT_MAP_CONCURRENCY: usize = 4;
const DEFAULT_MAX_REDUCE_PASSES: usize = 4;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the summarizer.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Hosted completion backend.
    pub completion_provider: CompletionProvider,
    /// Optional override for the provider's API base URL.
    pub completion_base_url: Option<String>,
    /// Model identifier sent with every completion request.
    pub completion_model: String,
    /// Sampling temperature sent with every completion request.
    pub completion_temperature: f32,
    /// Upper bound for a single completion attempt, in seconds.
    pub completion_timeout_secs: u64,
    /// Retries after the first failed attempt for retryable errors.
    pub completion_max_retries: u32,
    /// Base delay of the exponential retry backoff, in milliseconds.
    pub completion_retry_backoff_ms: u64,
    /// Process-wide fallback credential; requests may supply their own.
    #[serde(skip)]
    pub api_key: Option<Credential>,
    /// Maximum chunk length in characters.
    pub text_splitter_chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Preferred break point inside a chunk window.
    pub text_splitter_separator: String,
    /// Optional override for the reduce-stage input budget (tokens).
    pub summary_input_budget: Option<usize>,
    /// Maximum number of in-flight completion calls within one stage.
    pub summary_map_concurrency: usize,
    /// Upper bound on intermediate reduction passes.
    pub summary_max_reduce_passes: usize,
    /// Optional file replacing the built-in final-pass prompt.
    pub summary_final_prompt_file: Option<PathBuf>,
    /// Directory holding transient copies of uploaded documents.
    pub upload_dir: PathBuf,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported hosted completion backends. Both speak the OpenAI chat-completions protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// Groq's OpenAI-compatible endpoint.
    Groq,
    /// OpenAI's hosted API.
    OpenAI,
}

impl CompletionProvider {
    /// Base URL used when `COMPLETION_BASE_URL` is not set.
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Groq => "https://api.groq.com/openai/v1",
            Self::OpenAI => "https://api.openai.com/v1",
        }
    }

    /// Model used when `COMPLETION_MODEL` is not set.
    pub fn default_model(self) -> &'static str {
        match self {
            Self::Groq => "llama-3.3-70b-versatile",
            Self::OpenAI => "gpt-4o-mini",
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_variable(self) -> &'static str {
        match self {
            Self::Groq => "GROQ_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let completion_provider = match load_env_optional("COMPLETION_PROVIDER") {
            Some(value) => value
                .parse()
                .map_err(|()| ConfigError::InvalidValue("COMPLETION_PROVIDER".to_string()))?,
            None => CompletionProvider::Groq,
        };

        let config = Self {
            completion_provider,
            completion_base_url: load_env_optional("COMPLETION_BASE_URL"),
            completion_model: load_env_optional("COMPLETION_MODEL")
                .unwrap_or_else(|| completion_provider.default_model().to_string()),
            completion_temperature: parse_env_or(
                "COMPLETION_TEMPERATURE",
                DEFAULT_TEMPERATURE,
            )?,
            completion_timeout_secs: parse_env_or("COMPLETION_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            completion_max_retries: parse_env_or("COMPLETION_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            completion_retry_backoff_ms: parse_env_or(
                "COMPLETION_RETRY_BACKOFF_MS",
                DEFAULT_RETRY_BACKOFF_MS,
            )?,
            api_key: load_env_optional(completion_provider.api_key_variable())
                .and_then(Credential::new),
            text_splitter_chunk_size: parse_env_or("TEXT_SPLITTER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
            text_splitter_chunk_overlap: parse_env_or(
                "TEXT_SPLITTER_CHUNK_OVERLAP",
                DEFAULT_CHUNK_OVERLAP,
            )?,
            text_splitter_separator: env::var("TEXT_SPLITTER_SEPARATOR")
                .map(|value| unescape_separator(&value))
                .unwrap_or_else(|_| DEFAULT_SEPARATOR.to_string()),
            summary_input_budget: parse_env_optional("SUMMARY_INPUT_BUDGET")?,
            summary_map_concurrency: parse_env_or(
                "SUMMARY_MAP_CONCURRENCY",
                DEFAULT_MAP_CONCURRENCY,
            )?
            .max(1),
            summary_max_reduce_passes: parse_env_or(
                "SUMMARY_MAX_REDUCE_PASSES",
                DEFAULT_MAX_REDUCE_PASSES,
            )?,
            summary_final_prompt_file: load_env_optional("SUMMARY_FINAL_PROMPT_FILE")
                .map(PathBuf::from),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("docsum")),
            server_port: parse_env_optional("SERVER_PORT")?,
        };

        if config.text_splitter_chunk_overlap >= config.text_splitter_chunk_size {
            return Err(ConfigError::InvalidValue(
                "TEXT_SPLITTER_CHUNK_OVERLAP (must be smaller than TEXT_SPLITTER_CHUNK_SIZE)"
                    .to_string(),
            ));
        }

        Ok(config)
    }

    /// Effective API base URL for the configured provider.
    pub fn base_url(&self) -> &str {
        self.completion_base_url
            .as_deref()
            .unwrap_or_else(|| self.completion_provider.default_base_url())
    }

    /// Per-attempt timeout for completion calls.
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs.max(1))
    }

    /// Base delay for retry backoff.
    pub fn completion_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.completion_retry_backoff_ms)
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    Ok(parse_env_optional(key)?.unwrap_or(default))
}

/// Allow `\n` and `\t` escapes so separators can be set from a `.env` file.
fn unescape_separator(raw: &str) -> String {
    raw.replace("\\n", "\n").replace("\\t", "\t")
}

impl std::str::FromStr for CompletionProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        provider = ?config.completion_provider,
        base_url = %config.base_url(),
        model = %config.completion_model,
        chunk_size = config.text_splitter_chunk_size,
        chunk_overlap = config.text_splitter_chunk_overlap,
        api_key_present = config.api_key.is_some(),
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
