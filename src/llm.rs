use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::LlmConfig;
use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        retry_after: Option<u64>,
        message: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LlmError {
    /// Maps a non-success HTTP status from a provider.
    pub fn from_status(status: u16, retry_after: Option<u64>, message: String) -> Self {
        match status {
            401 | 403 => LlmError::Authentication(message),
            408 => LlmError::Timeout,
            429 => LlmError::RateLimited {
                retry_after,
                message,
            },
            500..=599 => LlmError::ServiceUnavailable(message),
            _ => LlmError::InvalidRequest(message),
        }
    }
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. }
                | LlmError::Network(_)
                | LlmError::Timeout
                | LlmError::ServiceUnavailable(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after, .. } => retry_after.map(Duration::from_secs),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else if err.is_decode() {
            LlmError::InvalidResponse(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

/// Opaque text-in/text-out language model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Human-readable provider/model label for reports.
    fn name(&self) -> String;

    async fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

pub struct LlmClient {
    http_client: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let provider = config.provider.as_str();
        if !crate::config::SUPPORTED_PROVIDERS.contains(&provider) {
            return Err(LlmError::Configuration(format!("unknown provider '{}'", provider)));
        }

        let has_key = config.api_key.as_ref().map_or(false, |k| !k.trim().is_empty());
        if !has_key && provider != "ollama" {
            return Err(LlmError::Configuration(format!(
                "no API key configured for provider '{}'. Set APICOV_LLM__API_KEY (or LLM_API_KEY / OPENAI_API_KEY), or run 'apicov config --api-key <KEY>'",
                provider
            )));
        }
        if config.model.trim().is_empty() {
            return Err(LlmError::Configuration("no model configured".to_string()));
        }
        if provider == "azure" && config.base_url.is_none() {
            return Err(LlmError::Configuration(
                "Azure OpenAI requires llm.base_url pointing at the deployment".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout.max(1)))
            .build()
            .map_err(|e| LlmError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    fn api_key(&self) -> &str {
        self.config.api_key.as_deref().unwrap_or("")
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        provider: &str,
    ) -> Result<T, LlmError> {
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let error_text = response.text().await.unwrap_or_default();
            let snippet: String = error_text.chars().take(300).collect();
            return Err(LlmError::from_status(
                status.as_u16(),
                retry_after,
                format!("{} API request failed ({}): {}", provider, status, snippet),
            ));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("{} response: {}", provider, e)))
    }

    async fn call_openai_api(&self, system: &str, prompt: &str, azure: bool) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            model: Option<&'a str>,
            messages: Vec<ChatMessage<'a>>,
            max_tokens: u32,
            temperature: f32,
        }

        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatResponseMessage,
        }

        #[derive(Deserialize)]
        struct ChatResponseMessage {
            #[serde(default)]
            content: Option<String>,
        }

        let request = ChatRequest {
            // Azure selects the model through the deployment URL
            model: if azure { None } else { Some(self.config.model.as_str()) },
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: prompt },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.openai.com/v1/chat/completions");

        let builder = self.http_client.post(url).json(&request);
        let builder = if azure {
            builder.header("api-key", self.api_key())
        } else {
            builder.bearer_auth(self.api_key())
        };

        let label = if azure { "Azure OpenAI" } else { "OpenAI" };
        let response: ChatResponse = self.send_json(builder, label).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse(format!("no choices in {} response", label)))
    }

    async fn call_gemini_api(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct GeminiRequest {
            contents: Vec<GeminiContent>,
            #[serde(rename = "generationConfig")]
            generation_config: GeminiGenerationConfig,
        }

        #[derive(Serialize, Deserialize)]
        struct GeminiContent {
            parts: Vec<GeminiPart>,
        }

        #[derive(Serialize, Deserialize)]
        struct GeminiPart {
            #[serde(default)]
            text: String,
        }

        #[derive(Serialize)]
        struct GeminiGenerationConfig {
            temperature: f32,
            #[serde(rename = "maxOutputTokens")]
            max_output_tokens: u32,
        }

        #[derive(Deserialize)]
        struct GeminiResponse {
            #[serde(default)]
            candidates: Vec<GeminiCandidate>,
        }

        #[derive(Deserialize)]
        struct GeminiCandidate {
            content: GeminiContent,
        }

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: format!("{}\n\n{}", system, prompt),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_tokens,
            },
        };

        let base = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://generativelanguage.googleapis.com/v1beta/models");
        let url = format!("{}/{}:generateContent", base.trim_end_matches('/'), self.config.model);

        let builder = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key())])
            .json(&request);
        let response: GeminiResponse = self.send_json(builder, "Gemini").await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .map(|candidate| candidate.content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("no candidates in Gemini response".to_string()));
        }
        Ok(text)
    }

    async fn call_claude_api(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct ClaudeRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            temperature: f32,
            system: &'a str,
            messages: Vec<ClaudeMessage<'a>>,
        }

        #[derive(Serialize)]
        struct ClaudeMessage<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Deserialize)]
        struct ClaudeResponse {
            content: Vec<ClaudeContent>,
        }

        #[derive(Deserialize)]
        struct ClaudeContent {
            #[serde(default)]
            text: String,
        }

        let request = ClaudeRequest {
            model: &self.config.model,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature.min(1.0),
            system,
            messages: vec![ClaudeMessage { role: "user", content: prompt }],
        };

        let url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("https://api.anthropic.com/v1/messages");
        let builder = self
            .http_client
            .post(url)
            .header("x-api-key", self.api_key())
            .header("anthropic-version", "2023-06-01")
            .json(&request);

        let response: ClaudeResponse = self.send_json(builder, "Claude").await?;
        let text: String = response.content.into_iter().map(|c| c.text).collect();
        if text.is_empty() {
            return Err(LlmError::InvalidResponse("empty Claude response".to_string()));
        }
        Ok(text)
    }

    async fn call_ollama_api(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct OllamaRequest<'a> {
            model: &'a str,
            system: &'a str,
            prompt: &'a str,
            stream: bool,
            options: OllamaOptions,
        }

        #[derive(Serialize)]
        struct OllamaOptions {
            temperature: f32,
            num_predict: u32,
        }

        #[derive(Deserialize)]
        struct OllamaResponse {
            response: String,
            #[serde(default)]
            done: bool,
        }

        let request = OllamaRequest {
            model: &self.config.model,
            system,
            prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = self
            .config
            .base_url
            .as_deref()
            .unwrap_or("http://localhost:11434/api/generate");
        let builder = self.http_client.post(url).json(&request);

        let response: OllamaResponse = self.send_json(builder, "Ollama").await?;
        if !response.done {
            return Err(LlmError::InvalidResponse("Ollama response not complete".to_string()));
        }
        Ok(response.response)
    }
}

#[async_trait]
impl TextGenerator for LlmClient {
    fn name(&self) -> String {
        let (provider, _) = crate::config::Config::provider_info(&self.config.provider);
        format!("{} ({})", provider, self.config.model)
    }

    async fn generate(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        debug!(
            provider = %self.config.provider,
            prompt_chars = prompt.len(),
            "calling language model"
        );
        match self.config.provider.as_str() {
            "gemini" => self.call_gemini_api(system, prompt).await,
            "claude" => self.call_claude_api(system, prompt).await,
            "ollama" => self.call_ollama_api(system, prompt).await,
            "azure" => self.call_openai_api(system, prompt, true).await,
            _ => self.call_openai_api(system, prompt, false).await,
        }
    }
}

/// Rough token estimate used for prompt budgeting: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(LlmError::from_status(401, None, "x".into()), LlmError::Authentication(_)));
        assert!(matches!(
            LlmError::from_status(429, Some(7), "x".into()),
            LlmError::RateLimited { retry_after: Some(7), .. }
        ));
        assert!(matches!(LlmError::from_status(503, None, "x".into()), LlmError::ServiceUnavailable(_)));
        assert!(matches!(LlmError::from_status(400, None, "x".into()), LlmError::InvalidRequest(_)));
    }

    #[test]
    fn test_retryability() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(LlmError::Network("reset".into()).is_retryable());
        assert!(!LlmError::Authentication("bad key".into()).is_retryable());
        assert!(!LlmError::InvalidResponse("garbage".into()).is_retryable());

        let limited = LlmError::RateLimited { retry_after: Some(3), message: "slow down".into() };
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_missing_credential_is_a_configuration_error() {
        let config = LlmConfig {
            api_key: None,
            ..LlmConfig::default()
        };
        assert!(matches!(LlmClient::from_config(&config), Err(LlmError::Configuration(_))));

        let local = LlmConfig {
            provider: "ollama".to_string(),
            api_key: None,
            model: "llama3.1:latest".to_string(),
            ..LlmConfig::default()
        };
        assert!(LlmClient::from_config(&local).is_ok());
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
