use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::retry::{Attempted, RetryPolicy, Retryable};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} while downloading {url}")]
    Status { url: String, status: u16 },

    #[error("Network error while downloading {url}: {message}")]
    Transport {
        url: String,
        message: String,
        timeout: bool,
    },

    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Schema is neither valid JSON nor YAML: {0}")]
    Parse(String),
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Transport { .. } => true,
            FetchError::Io { .. } | FetchError::Parse(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaSource {
    Url(String),
    File(PathBuf),
}

impl SchemaSource {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SchemaSource::Url(trimmed.to_string())
        } else {
            SchemaSource::File(PathBuf::from(trimmed))
        }
    }

    /// Short file-system friendly name used for output artifacts.
    pub fn stem(&self) -> String {
        let raw = match self {
            SchemaSource::Url(url) => {
                let without_scheme = url.split("://").nth(1).unwrap_or(url);
                let without_query = without_scheme.split(['?', '#']).next().unwrap_or("");
                let mut segments = without_query.split('/').filter(|s| !s.is_empty());
                let host = segments.next().unwrap_or("schema").to_string();
                match segments.last() {
                    Some(last) => format!("{}_{}", host, strip_extension(last)),
                    None => host,
                }
            }
            SchemaSource::File(path) => path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "schema".to_string()),
        };
        sanitize_name(&raw)
    }
}

impl std::fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaSource::Url(url) => f.write_str(url),
            SchemaSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

fn strip_extension(segment: &str) -> &str {
    match segment.rsplit_once('.') {
        Some((stem, ext)) if matches!(ext, "json" | "yaml" | "yml") => stem,
        _ => segment,
    }
}

/// Keeps alphanumerics, `-` and `_`; everything else becomes `_`.
pub fn sanitize_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "schema".to_string()
    } else {
        trimmed.chars().take(60).collect()
    }
}

pub struct SchemaFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl SchemaFetcher {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("apicov/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, retry }
    }

    /// Raw schema text plus the number of attempts the download took.
    pub async fn fetch_text(&self, source: &SchemaSource) -> Attempted<String, FetchError> {
        match source {
            SchemaSource::File(path) => Attempted {
                result: read_file(path).await,
                attempts: 1,
            },
            SchemaSource::Url(url) => {
                info!(url = %url, "downloading schema");
                self.retry
                    .run("schema download", || self.download(url))
                    .await
            }
        }
    }

    pub async fn fetch(&self, source: &SchemaSource) -> Result<Value, FetchError> {
        let text = self.fetch_text(source).await.result?;
        parse_document(&text)
    }

    async fn download(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json, application/yaml, text/yaml, */*")
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: e.to_string(),
                timeout: e.is_timeout(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
            timeout: e.is_timeout(),
        })
    }
}

async fn read_file(path: &Path) -> Result<String, FetchError> {
    tokio::fs::read_to_string(path).await.map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// JSON first, YAML as fallback.
pub fn parse_document(text: &str) -> Result<Value, FetchError> {
    let text = text.trim_start_matches('\u{feff}');
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(json_err) => {
            debug!(error = %json_err, "schema is not JSON, trying YAML");
            serde_yaml::from_str::<Value>(text).map_err(|yaml_err| {
                FetchError::Parse(format!("JSON: {}; YAML: {}", json_err, yaml_err))
            })
        }
    }
}
