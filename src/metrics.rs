//! Plain-text analytics: one report per pipeline algorithm plus a run summary.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

const RULE_WIDTH: usize = 80;
pub const RUN_SUMMARY_FILE: &str = "run_summary.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    Analyzer,
    Generator,
    Filter,
    Parser,
}

impl AlgorithmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::Analyzer => "analyzer",
            AlgorithmKind::Generator => "generator",
            AlgorithmKind::Filter => "filter",
            AlgorithmKind::Parser => "parser",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language model traffic of one component or of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LlmUsage {
    pub calls: usize,
    pub attempts: usize,
    pub failures: usize,
    pub prompt_chars: usize,
    pub response_chars: usize,
}

impl LlmUsage {
    /// Records one logical call; `response` is `None` when every attempt failed.
    pub fn record(&mut self, prompt: &str, response: Option<&str>, attempts: u32) {
        self.calls += 1;
        self.attempts += attempts as usize;
        self.prompt_chars += prompt.chars().count();
        match response {
            Some(text) => self.response_chars += text.chars().count(),
            None => self.failures += 1,
        }
    }

    pub fn merge(&mut self, other: &LlmUsage) {
        self.calls += other.calls;
        self.attempts += other.attempts;
        self.failures += other.failures;
        self.prompt_chars += other.prompt_chars;
        self.response_chars += other.response_chars;
    }

    pub fn estimated_prompt_tokens(&self) -> usize {
        chars_to_tokens(self.prompt_chars)
    }

    pub fn estimated_response_tokens(&self) -> usize {
        chars_to_tokens(self.response_chars)
    }

    fn write_lines(&self, lines: &mut Vec<String>) {
        lines.push(format!("Calls: {}", self.calls));
        lines.push(format!("Attempts: {}", self.attempts));
        lines.push(format!("Failed calls: {}", self.failures));
        lines.push(format!(
            "Prompt: {} characters (~{} tokens)",
            self.prompt_chars,
            self.estimated_prompt_tokens()
        ));
        lines.push(format!(
            "Response: {} characters (~{} tokens)",
            self.response_chars,
            self.estimated_response_tokens()
        ));
    }
}

/// Same chars/4 estimate as `llm::estimate_tokens`.
fn chars_to_tokens(chars: usize) -> usize {
    (chars + 3) / 4
}

/// Report for one algorithm run, built up field by field.
#[derive(Debug, Clone)]
pub struct AlgorithmReport {
    pub name: String,
    pub kind: AlgorithmKind,
    pub timestamp: DateTime<Local>,
    pub elapsed: Option<Duration>,
    pub input: Vec<(String, String)>,
    pub output: Vec<(String, String)>,
    pub details: Vec<(String, String)>,
    pub llm: Option<LlmUsage>,
}

impl AlgorithmReport {
    pub fn new(name: &str, kind: AlgorithmKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            timestamp: Local::now(),
            elapsed: None,
            input: Vec::new(),
            output: Vec::new(),
            details: Vec::new(),
            llm: None,
        }
    }

    pub fn input(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.input.push((key.to_string(), value.to_string()));
        self
    }

    pub fn output(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.output.push((key.to_string(), value.to_string()));
        self
    }

    pub fn detail(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.details.push((key.to_string(), value.to_string()));
        self
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    pub fn llm(mut self, usage: LlmUsage) -> Self {
        self.llm = Some(usage);
        self
    }

    /// `snake_case` form of the name used in file names.
    pub fn file_stem(&self) -> String {
        self.name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    pub fn format(&self) -> String {
        let mut lines = Vec::new();
        lines.push("=".repeat(RULE_WIDTH));
        lines.push(format!("Algorithm Analysis Report: {}", self.name));
        lines.push("=".repeat(RULE_WIDTH));
        lines.push(String::new());

        section(&mut lines, "ALGORITHM INFORMATION");
        lines.push(format!("Algorithm Name: {}", self.name));
        lines.push(format!("Algorithm Type: {}", self.kind));
        lines.push(format!("Timestamp: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S")));
        if let Some(elapsed) = self.elapsed {
            lines.push(format!("Execution Time: {:.3} seconds", elapsed.as_secs_f64()));
        }
        lines.push(format!("LLM Call: {}", if self.llm.is_some() { "Yes" } else { "No" }));
        lines.push(String::new());

        for (title, entries) in [
            ("INPUT", &self.input),
            ("OUTPUT", &self.output),
            ("ALGORITHM-SPECIFIC METRICS", &self.details),
        ] {
            if entries.is_empty() {
                continue;
            }
            section(&mut lines, title);
            lines.extend(entries.iter().map(|(key, value)| format!("{}: {}", key, value)));
            lines.push(String::new());
        }

        if let Some(usage) = &self.llm {
            section(&mut lines, "LLM CALL ANALYSIS");
            usage.write_lines(&mut lines);
            lines.push(String::new());
        }

        lines.push("=".repeat(RULE_WIDTH));
        lines.join("\n")
    }
}

fn section(lines: &mut Vec<String>, title: &str) {
    lines.push(title.to_string());
    lines.push("-".repeat(RULE_WIDTH));
}

/// Inputs and totals of a complete `generate` run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub schema_source: String,
    pub api_title: String,
    pub spec_version: String,
    pub provider: String,
    pub brd: Option<String>,
    pub endpoints_total: usize,
    pub endpoints_in_scope: usize,
    pub coverage_percentage: Option<f64>,
    pub parameters: usize,
    pub combinations: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub rows: usize,
    pub placeholder_rows: usize,
    pub csv_path: Option<PathBuf>,
    pub llm: LlmUsage,
    pub elapsed: Duration,
    /// Pre-formatted diagnostics report.
    pub diagnostics: String,
}

impl RunSummary {
    pub fn format(&self) -> String {
        let mut lines = Vec::new();
        lines.push("=".repeat(RULE_WIDTH));
        lines.push("Run Summary".to_string());
        lines.push("=".repeat(RULE_WIDTH));
        lines.push(String::new());

        section(&mut lines, "INPUTS");
        lines.push(format!("Schema: {}", self.schema_source));
        lines.push(format!("API: {} ({})", self.api_title, self.spec_version));
        lines.push(format!("BRD: {}", self.brd.as_deref().unwrap_or("none")));
        lines.push(format!("Model: {}", self.provider));
        lines.push(String::new());

        section(&mut lines, "COUNTS");
        lines.push(format!("Endpoints: {} total, {} in scope", self.endpoints_total, self.endpoints_in_scope));
        if let Some(pct) = self.coverage_percentage {
            lines.push(format!("BRD coverage: {:.1}%", pct));
        }
        lines.push(format!("Parameters: {}", self.parameters));
        lines.push(format!("Combinations: {}", self.combinations));
        lines.push(format!("Chunks: {} ({} failed)", self.chunks, self.failed_chunks));
        lines.push(format!("Scenario rows: {} ({} placeholders)", self.rows, self.placeholder_rows));
        if let Some(path) = &self.csv_path {
            lines.push(format!("CSV: {}", path.display()));
        }
        lines.push(format!("Elapsed: {:.1}s", self.elapsed.as_secs_f64()));
        lines.push(String::new());

        section(&mut lines, "LLM USAGE");
        self.llm.write_lines(&mut lines);
        lines.push(String::new());

        section(&mut lines, "DIAGNOSTICS");
        lines.push(self.diagnostics.trim_end().to_string());
        lines.push(String::new());
        lines.push("=".repeat(RULE_WIDTH));
        lines.join("\n")
    }
}

/// Writes analytics files into one directory and remembers what it wrote.
pub struct MetricsCollector {
    dir: PathBuf,
    saved: Vec<PathBuf>,
}

impl MetricsCollector {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            saved: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    /// Writes `<YYYYMMDD_HHMMSS>_<kind>_<name>.txt`.
    pub async fn save(&mut self, report: &AlgorithmReport) -> Result<PathBuf> {
        let file_name = format!(
            "{}_{}_{}.txt",
            report.timestamp.format("%Y%m%d_%H%M%S"),
            report.kind,
            report.file_stem()
        );
        self.write(&file_name, report.format()).await
    }

    pub async fn save_run_summary(&mut self, summary: &RunSummary) -> Result<PathBuf> {
        self.write(RUN_SUMMARY_FILE, summary.format()).await
    }

    async fn write(&mut self, file_name: &str, content: String) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| anyhow!("Failed to create {}: {}", self.dir.display(), e))?;
        let path = self.dir.join(file_name);
        fs::write(&path, content)
            .await
            .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
        debug!(path = %path.display(), "analytics report written");
        self.saved.push(path.clone());
        Ok(path)
    }
}
