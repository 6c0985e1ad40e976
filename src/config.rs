use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const ENV_PREFIX: &str = "APICOV";
pub const CONFIG_PATH_ENV: &str = "APICOV_CONFIG";

/// Legacy credential variables, consulted in order when no key is configured.
const LEGACY_KEY_VARS: [&str; 2] = ["LLM_API_KEY", "OPENAI_API_KEY"];

pub const SUPPORTED_PROVIDERS: [&str; 5] = ["openai", "azure", "gemini", "claude", "ollama"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub algorithm: AlgorithmConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    /// Seconds.
    pub timeout: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            api_key: None,
            model: "gpt-4".to_string(),
            base_url: None,
            timeout: 60,
            temperature: 0.7,
            max_tokens: 3000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmConfig {
    pub chunk_size: usize,
    pub chunking_threshold: usize,
    pub max_prompt_tokens: usize,
    pub max_combinations_per_endpoint: usize,
    pub max_string_length: usize,
    pub expand_outlines: bool,
    pub fail_fast: bool,
    pub retry: RetryConfig,
}

impl Default for AlgorithmConfig {
    fn default() -> Self {
        Self {
            chunk_size: 12,
            chunking_threshold: 15,
            max_prompt_tokens: 6000,
            max_combinations_per_endpoint: 25,
            max_string_length: 64,
            expand_outlines: true,
            fail_fast: false,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub output_dir: PathBuf,
    pub brd_dir: PathBuf,
    pub template_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            brd_dir: PathBuf::from("brd"),
            template_dir: None,
        }
    }
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            if !path.trim().is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(".apicov").join("config.yml"))
    }

    /// Defaults < config file < `APICOV_*` environment < legacy key variables.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| anyhow!("Failed to read configuration from {}: {}", path.display(), e))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| anyhow!("Invalid configuration in {}: {}", path.display(), e))?;

        config.apply_legacy_env();
        Ok(config)
    }

    fn apply_legacy_env(&mut self) {
        if self.has_api_key() {
            return;
        }
        for var in LEGACY_KEY_VARS {
            if let Ok(value) = std::env::var(var) {
                if !value.trim().is_empty() {
                    tracing::debug!(variable = var, "using API key from legacy environment variable");
                    self.llm.api_key = Some(value);
                    return;
                }
            }
        }
    }

    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path).await?;
        Ok(config_path)
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_yaml::to_string(self)?;
        fs::write(path, content).await?;

        Ok(())
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.llm.api_key = Some(api_key);
    }

    pub fn set_model(&mut self, model: String) {
        self.llm.model = model;
    }

    pub fn set_provider(&mut self, provider: &str) {
        let provider = provider.to_lowercase();
        let (_, models) = Self::provider_info(&provider);
        let default_model = models.first().cloned().unwrap_or_default();

        // Switching provider invalidates a model name from the previous one
        if self.llm.provider != provider {
            self.llm.model = default_model.clone();
        } else if self.llm.model.is_empty() {
            self.llm.model = default_model;
        }

        self.llm.base_url = match provider.as_str() {
            "openai" => Some("https://api.openai.com/v1/chat/completions".to_string()),
            "gemini" => Some("https://generativelanguage.googleapis.com/v1beta/models".to_string()),
            "claude" => Some("https://api.anthropic.com/v1/messages".to_string()),
            "ollama" => Some("http://localhost:11434/api/generate".to_string()),
            // Azure deployments have no default endpoint
            _ => None,
        };
        self.llm.provider = provider;
    }

    pub fn has_api_key(&self) -> bool {
        self.llm
            .api_key
            .as_ref()
            .map_or(false, |key| !key.trim().is_empty())
    }

    /// Ollama runs locally and is the only provider usable without a key.
    pub fn is_ai_configured(&self) -> bool {
        !self.llm.model.is_empty() && (self.has_api_key() || self.llm.provider == "ollama")
    }

    pub fn provider_info(provider: &str) -> (String, Vec<String>) {
        match provider {
            "openai" => ("OpenAI".to_string(), vec!["gpt-4".to_string(), "gpt-4o".to_string(), "gpt-3.5-turbo".to_string()]),
            "azure" => ("Azure OpenAI".to_string(), vec!["gpt-4".to_string(), "gpt-35-turbo".to_string()]),
            "gemini" => ("Google Gemini".to_string(), vec!["gemini-1.5-pro".to_string(), "gemini-1.5-flash".to_string()]),
            "claude" => ("Anthropic Claude".to_string(), vec!["claude-3-5-sonnet-20240620".to_string(), "claude-3-haiku-20240307".to_string()]),
            "ollama" => ("Local Ollama".to_string(), vec!["llama3.1:latest".to_string(), "qwen2.5-coder:latest".to_string()]),
            _ => ("Unknown".to_string(), vec![]),
        }
    }

    pub fn validate_all_settings(&self) -> ValidationResult {
        let mut issues = Vec::new();
        let mut warnings = Vec::new();

        let provider = self.llm.provider.as_str();
        if !SUPPORTED_PROVIDERS.contains(&provider) {
            issues.push(format!(
                "Unknown provider: {} (supported: {})",
                provider,
                SUPPORTED_PROVIDERS.join(", ")
            ));
        }

        // Validate API key
        match self.llm.api_key.as_deref() {
            Some(key) if key.trim().is_empty() => issues.push("API key is empty".to_string()),
            Some(key) if key.len() < 10 => warnings.push("API key seems too short".to_string()),
            Some(key) if provider == "openai" && !key.starts_with("sk-") => {
                warnings.push("OpenAI API keys typically start with 'sk-'".to_string())
            }
            Some(_) => {}
            None if provider != "ollama" => issues.push(format!(
                "API key is required for provider '{}'. Set {}_LLM__API_KEY or LLM_API_KEY",
                provider, ENV_PREFIX
            )),
            None => {}
        }

        if self.llm.model.is_empty() {
            issues.push("Model name is required".to_string());
        }
        if provider == "azure" && self.llm.base_url.is_none() {
            issues.push("Base URL is required for Azure OpenAI".to_string());
        }

        if self.llm.timeout == 0 {
            warnings.push("Timeout is set to 0, which may cause immediate timeouts".to_string());
        } else if self.llm.timeout > 300 {
            warnings.push("Timeout is very high (>5 minutes), consider reducing it".to_string());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            issues.push("Temperature must be between 0.0 and 2.0".to_string());
        }

        let algorithm = &self.algorithm;
        if algorithm.chunk_size == 0 {
            issues.push("Chunk size must be at least 1".to_string());
        }
        if algorithm.chunking_threshold < algorithm.chunk_size {
            warnings.push(format!(
                "Chunking threshold ({}) is below chunk size ({})",
                algorithm.chunking_threshold, algorithm.chunk_size
            ));
        }
        if algorithm.retry.max_attempts == 0 {
            warnings.push("Retry attempts is 0, every call will be tried exactly once".to_string());
        }
        if algorithm.retry.initial_backoff_ms > algorithm.retry.max_backoff_ms {
            warnings.push("Initial backoff exceeds the maximum backoff".to_string());
        }
        if algorithm.max_string_length == 0 {
            issues.push("Maximum string length must be at least 1".to_string());
        }

        if let Some(dir) = &self.paths.template_dir {
            if !dir.is_dir() {
                warnings.push(format!("Template directory does not exist: {}", dir.display()));
            }
        }

        ValidationResult {
            is_valid: issues.is_empty(),
            issues,
            warnings,
        }
    }
}

/// Checks a user-supplied coverage percentage.
pub fn validate_coverage_percentage(value: u8) -> Result<u8> {
    if (1..=100).contains(&value) {
        Ok(value)
    } else {
        Err(anyhow!("Coverage percentage must be between 1 and 100, got {}", value))
    }
}

#[derive(Debug)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.algorithm.chunk_size, 12);
        assert_eq!(config.algorithm.chunking_threshold, 15);
        assert_eq!(config.algorithm.retry.max_attempts, 3);
        assert_eq!(config.llm.max_tokens, 3000);
        assert_eq!(config.llm.provider, "openai");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "algorithm:\n  chunk_size: 4\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.algorithm.chunk_size, 4);
        assert_eq!(config.algorithm.chunking_threshold, 15);
        assert_eq!(config.llm.model, "gpt-4");
    }

    #[test]
    fn test_missing_key_is_an_issue_except_for_ollama() {
        let mut config = Config::default();
        config.llm.api_key = None;
        assert!(!config.validate_all_settings().is_valid);

        config.set_provider("ollama");
        let result = config.validate_all_settings();
        assert!(result.is_valid, "{:?}", result.issues);
        assert!(config.is_ai_configured());
    }

    #[test]
    fn test_set_provider_resets_model_and_url() {
        let mut config = Config::default();
        config.set_provider("claude");
        assert_eq!(config.llm.provider, "claude");
        assert!(config.llm.model.starts_with("claude"));
        assert_eq!(config.llm.base_url.as_deref(), Some("https://api.anthropic.com/v1/messages"));
    }

    #[test]
    fn test_coverage_percentage_range() {
        assert!(validate_coverage_percentage(0).is_err());
        assert!(validate_coverage_percentage(101).is_err());
        assert_eq!(validate_coverage_percentage(50).unwrap(), 50);
    }
}
