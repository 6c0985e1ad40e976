//! Business Requirement Documents: model, persistence and construction from
//! a schema or from a free-form requirements document.

use anyhow::{anyhow, Result};
use chrono::Local;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::document_processor::ExtractedDocument;
use crate::llm::TextGenerator;
use crate::metrics::LlmUsage;
use crate::retry::RetryPolicy;
use crate::schema::{ApiSchema, Endpoint, EndpointKey, HttpMethod};
use crate::schema_fetcher::sanitize_name;
use crate::template_engine::{PromptTemplates, BRD_FROM_DOCUMENT, BRD_FROM_SCHEMA, BRD_SYSTEM_PROMPT};

/// Characters of document text sent to the model.
pub const MAX_DOCUMENT_CHARS: usize = 12_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementPriority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl RequirementPriority {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "critical" => Some(RequirementPriority::Critical),
            "high" => Some(RequirementPriority::High),
            "medium" => Some(RequirementPriority::Medium),
            "low" => Some(RequirementPriority::Low),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementPriority::Critical => "critical",
            RequirementPriority::High => "high",
            RequirementPriority::Medium => "medium",
            RequirementPriority::Low => "low",
        }
    }
}

impl fmt::Display for RequirementPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RequirementPriority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .and_then(RequirementPriority::from_name)
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl RequirementStatus {
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphabetic())
            .collect();
        match normalized.as_str() {
            "pending" => Some(RequirementStatus::Pending),
            "inprogress" => Some(RequirementStatus::InProgress),
            "completed" | "done" => Some(RequirementStatus::Completed),
            "blocked" => Some(RequirementStatus::Blocked),
            _ => None,
        }
    }
}

impl<'de> Deserialize<'de> for RequirementStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .as_deref()
            .and_then(RequirementStatus::from_name)
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrdTestScenario {
    pub scenario_id: String,
    pub scenario_name: String,
    pub description: String,
    pub test_steps: Vec<String>,
    pub expected_result: String,
    pub priority: RequirementPriority,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrdRequirement {
    pub requirement_id: String,
    pub title: String,
    pub description: String,
    pub endpoint_path: String,
    pub endpoint_method: String,
    pub priority: RequirementPriority,
    pub status: RequirementStatus,
    pub test_scenarios: Vec<BrdTestScenario>,
    pub acceptance_criteria: Vec<String>,
    /// `METHOD /path` entries.
    pub related_endpoints: Vec<String>,
}

impl BrdRequirement {
    /// The requirement's own endpoint, when both path and a known method are set.
    pub fn endpoint_key(&self) -> Option<EndpointKey> {
        let path = self.endpoint_path.trim();
        if path.is_empty() {
            return None;
        }
        let method = HttpMethod::from_name(&self.endpoint_method)?;
        Some(EndpointKey::new(method.as_str(), path))
    }

    /// Parsed related endpoints, plus the entries that are not `METHOD /path`.
    pub fn related_keys(&self) -> (Vec<EndpointKey>, Vec<String>) {
        let mut keys = Vec::new();
        let mut unparseable = Vec::new();
        for entry in &self.related_endpoints {
            match EndpointKey::parse(entry) {
                Some(key) => keys.push(key),
                None => unparseable.push(entry.clone()),
            }
        }
        (keys, unparseable)
    }

    /// Own endpoint first, then related ones, without duplicates.
    pub fn referenced_keys(&self) -> Vec<EndpointKey> {
        let mut keys: Vec<EndpointKey> = self.endpoint_key().into_iter().collect();
        for key in self.related_keys().0 {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }

    pub fn covers(&self, key: &EndpointKey) -> bool {
        self.endpoint_key().as_ref() == Some(key) || self.related_keys().0.contains(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Brd {
    pub brd_id: String,
    pub title: String,
    pub description: String,
    pub api_name: String,
    pub api_version: String,
    pub created_date: String,
    pub requirements: Vec<BrdRequirement>,
    pub metadata: Map<String, Value>,
}

impl Brd {
    pub fn referenced_endpoints(&self) -> BTreeSet<EndpointKey> {
        self.requirements
            .iter()
            .flat_map(BrdRequirement::referenced_keys)
            .collect()
    }

    pub fn requirements_for(&self, key: &EndpointKey) -> Vec<&BrdRequirement> {
        self.requirements.iter().filter(|r| r.covers(key)).collect()
    }

    /// Fills ids, dates and names the model or a hand-written file left out.
    pub fn fill_defaults(&mut self, api_name: &str, api_version: &str) {
        let now = Local::now();
        if self.brd_id.trim().is_empty() {
            self.brd_id = format!("BRD-{}", now.format("%Y%m%d%H%M%S"));
        }
        if self.created_date.trim().is_empty() {
            self.created_date = now.format("%Y-%m-%d").to_string();
        }
        if self.api_name.trim().is_empty() {
            self.api_name = api_name.to_string();
        }
        if self.api_version.trim().is_empty() {
            self.api_version = api_version.to_string();
        }
        if self.title.trim().is_empty() {
            self.title = format!("{} Business Requirements", self.api_name);
        }

        let mut scenario_counter = 0;
        for (index, requirement) in self.requirements.iter_mut().enumerate() {
            if requirement.requirement_id.trim().is_empty() {
                requirement.requirement_id = format!("REQ-{:03}", index + 1);
            }
            requirement.endpoint_method = requirement.endpoint_method.trim().to_uppercase();
            requirement.endpoint_path = requirement.endpoint_path.trim().to_string();
            for scenario in &mut requirement.test_scenarios {
                scenario_counter += 1;
                if scenario.scenario_id.trim().is_empty() {
                    scenario.scenario_id = format!("TS-{:03}", scenario_counter);
                }
            }
        }
    }
}

/// Directory of persisted BRD JSON files.
#[derive(Debug, Clone)]
pub struct BrdStore {
    dir: PathBuf,
}

impl BrdStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Accepts a path, a file name inside the store, or a name without `.json`.
    pub fn resolve(&self, name_or_path: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(name_or_path);
        if direct.is_file() {
            return Some(direct);
        }
        let in_store = self.dir.join(name_or_path);
        if in_store.is_file() {
            return Some(in_store);
        }
        let with_extension = self.dir.join(format!("{}.json", name_or_path));
        with_extension.is_file().then_some(with_extension)
    }

    pub async fn load(&self, name_or_path: &str) -> Result<Brd> {
        let path = self
            .resolve(name_or_path)
            .ok_or_else(|| anyhow!("BRD '{}' not found (looked in {})", name_or_path, self.dir.display()))?;
        load_brd_file(&path).await
    }

    /// Saves pretty JSON to `path`, or to `<dir>/<brd_id>.json`.
    pub async fn save(&self, brd: &Brd, path: Option<&Path>) -> Result<PathBuf> {
        let target = match path {
            Some(path) => path.to_path_buf(),
            None => self.dir.join(format!("{}.json", sanitize_name(&brd.brd_id))),
        };
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| anyhow!("Failed to create {}: {}", parent.display(), e))?;
            }
        }
        let content = serde_json::to_string_pretty(brd)?;
        fs::write(&target, content)
            .await
            .map_err(|e| anyhow!("Failed to write {}: {}", target.display(), e))?;
        info!(path = %target.display(), requirements = brd.requirements.len(), "BRD saved");
        Ok(target)
    }

    /// `*.json` files directly inside the store, sorted by name.
    pub fn list(&self) -> Vec<PathBuf> {
        if !self.dir.is_dir() {
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&self.dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
            })
            .collect();
        files.sort();
        files
    }
}

pub async fn load_brd_file(path: &Path) -> Result<Brd> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read BRD {}: {}", path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| anyhow!("Invalid BRD JSON in {}: {}", path.display(), e))
}

/// Finds the JSON object in a model response: a ```json fence first, then
/// the first balanced `{...}` block.
pub fn extract_json_block(text: &str) -> Option<&str> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        let candidate = body[..end].trim();
        if candidate.starts_with('{') {
            return Some(candidate);
        }
    }

    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_brd_response(text: &str) -> Result<Brd> {
    let block = extract_json_block(text).ok_or_else(|| anyhow!("response contains no JSON object"))?;
    let brd: Brd = serde_json::from_str(block).map_err(|e| anyhow!("response JSON is not a BRD: {}", e))?;
    if brd.requirements.is_empty() {
        return Err(anyhow!("BRD in response has no requirements"));
    }
    Ok(brd)
}

/// Selection score for BRD-from-schema: method weight plus parameter weight.
pub fn priority_score(endpoint: &Endpoint) -> u32 {
    let method = match endpoint.method {
        HttpMethod::Post | HttpMethod::Put | HttpMethod::Delete => 100,
        HttpMethod::Get => 50,
        HttpMethod::Patch => 30,
        HttpMethod::Head => 20,
        HttpMethod::Options => 10,
        HttpMethod::Trace => 30,
    };
    let params = (endpoint.parameters.len() as u32 * 5).min(50);
    let required = endpoint.required_parameter_count() as u32 * 3;
    method + params + required
}

pub fn suggested_priority(endpoint: &Endpoint) -> RequirementPriority {
    match endpoint.method {
        HttpMethod::Post | HttpMethod::Put | HttpMethod::Delete => RequirementPriority::High,
        HttpMethod::Get if endpoint.parameters.len() > 5 => RequirementPriority::High,
        _ => RequirementPriority::Medium,
    }
}

/// Number of endpoints kept for a coverage percentage: at least one.
pub fn target_count(total: usize, percentage: u8) -> usize {
    ((total * percentage as usize) / 100).max(1).min(total.max(1))
}

/// Highest-scoring endpoints first; equal scores keep schema order.
pub fn select_by_coverage(endpoints: &[Endpoint], percentage: u8) -> Vec<&Endpoint> {
    if endpoints.is_empty() {
        return Vec::new();
    }
    let mut ranked: Vec<&Endpoint> = endpoints.iter().collect();
    ranked.sort_by(|a, b| priority_score(b).cmp(&priority_score(a)));
    ranked.truncate(target_count(endpoints.len(), percentage));
    ranked
}

fn suggested_scenarios(endpoint: &Endpoint) -> Vec<&'static str> {
    let mut names = match endpoint.method {
        HttpMethod::Get => vec![
            "Valid request with correct parameters",
            "Request with missing required parameters",
            "Request with invalid parameter values",
        ],
        HttpMethod::Post => vec![
            "Create resource with valid data",
            "Create resource with missing required fields",
            "Create resource with invalid data format",
            "Create resource with duplicate data",
        ],
        HttpMethod::Put | HttpMethod::Patch => vec![
            "Update resource with valid data",
            "Update non-existent resource",
            "Update resource with invalid data",
        ],
        HttpMethod::Delete => vec![
            "Delete existing resource",
            "Delete non-existent resource",
            "Delete resource with dependencies",
        ],
        _ => vec!["Valid request"],
    };
    if endpoint.parameters.iter().any(|p| p.required) {
        names.push("Test with all required parameters");
    }
    if endpoint.parameters.iter().any(|p| !p.required) {
        names.push("Test with optional parameters");
    }
    names
}

/// BRD built from the schema alone, one requirement per selected endpoint.
pub fn heuristic_brd(schema: &ApiSchema, percentage: u8) -> Brd {
    let selected = select_by_coverage(&schema.endpoints, percentage);
    let mut scenario_counter = 0;

    let requirements = selected
        .iter()
        .enumerate()
        .map(|(index, endpoint)| {
            let priority = suggested_priority(endpoint);
            let title = endpoint
                .summary
                .clone()
                .unwrap_or_else(|| format!("{} {}", endpoint.method, endpoint.path));
            let test_scenarios = suggested_scenarios(endpoint)
                .into_iter()
                .map(|name| {
                    scenario_counter += 1;
                    BrdTestScenario {
                        scenario_id: format!("TS-{:03}", scenario_counter),
                        scenario_name: name.to_string(),
                        priority,
                        tags: vec![endpoint.method.as_str().to_lowercase()],
                        ..Default::default()
                    }
                })
                .collect();
            BrdRequirement {
                requirement_id: format!("REQ-{:03}", index + 1),
                title,
                description: endpoint.description.clone().unwrap_or_default(),
                endpoint_path: endpoint.path.clone(),
                endpoint_method: endpoint.method.as_str().to_string(),
                priority,
                status: RequirementStatus::Pending,
                test_scenarios,
                acceptance_criteria: vec![format!(
                    "{} {} responds successfully to a valid request",
                    endpoint.method, endpoint.path
                )],
                related_endpoints: Vec::new(),
            }
        })
        .collect();

    let mut metadata = Map::new();
    metadata.insert("source".to_string(), json!("schema"));
    metadata.insert("coverage_percentage".to_string(), json!(percentage));
    metadata.insert("total_endpoints".to_string(), json!(schema.endpoints.len()));
    metadata.insert("selected_endpoints".to_string(), json!(selected.len()));

    let mut brd = Brd {
        description: format!(
            "Requirements for {} of {} endpoints ({}% coverage)",
            selected.len(),
            schema.endpoints.len(),
            percentage
        ),
        requirements,
        metadata,
        ..Default::default()
    };
    brd.fill_defaults(&schema.title, &schema.api_version);
    brd
}

/// Result of building a BRD, with the model traffic it took.
#[derive(Debug)]
pub struct BrdOutcome {
    pub brd: Brd,
    pub usage: LlmUsage,
    /// False when the heuristic BRD was used.
    pub from_model: bool,
    pub warning: Option<String>,
}

pub struct BrdBuilder<'a> {
    generator: Option<&'a dyn TextGenerator>,
    templates: &'a PromptTemplates,
    retry: RetryPolicy,
}

impl<'a> BrdBuilder<'a> {
    pub fn new(generator: Option<&'a dyn TextGenerator>, templates: &'a PromptTemplates, retry: RetryPolicy) -> Self {
        Self {
            generator,
            templates,
            retry,
        }
    }

    /// Top `percentage`% of endpoints by priority score, enriched by the
    /// model when one is available.
    pub async fn from_schema(&self, schema: &ApiSchema, percentage: u8) -> Result<BrdOutcome> {
        let heuristic = heuristic_brd(schema, percentage);
        let Some(generator) = self.generator else {
            return Ok(BrdOutcome {
                brd: heuristic,
                usage: LlmUsage::default(),
                from_model: false,
                warning: None,
            });
        };

        let selected = select_by_coverage(&schema.endpoints, percentage);
        let data = json!({
            "api_title": schema.title,
            "api_version": schema.api_version,
            "today": Local::now().format("%Y-%m-%d").to_string(),
            "endpoints": selected.iter().map(|endpoint| json!({
                "method": endpoint.method.as_str(),
                "path": endpoint.path,
                "priority": suggested_priority(endpoint).as_str(),
                "summary": endpoint.summary,
                "parameters": endpoint.parameters.iter().map(|p| format!(
                    "{} ({}, {}{})",
                    p.name,
                    p.location,
                    p.param_type,
                    if p.required { ", required" } else { "" }
                )).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        });
        let prompt = self.templates.render(BRD_FROM_SCHEMA, &data)?;

        let (response, usage) = self.call(generator, &prompt, "brd-from-schema").await;
        let parsed = response.and_then(|text| parse_brd_response(&text));
        match parsed {
            Ok(mut brd) => {
                brd.fill_defaults(&schema.title, &schema.api_version);
                brd.metadata.insert("source".to_string(), json!("schema+llm"));
                brd.metadata.insert("coverage_percentage".to_string(), json!(percentage));
                Ok(BrdOutcome {
                    brd,
                    usage,
                    from_model: true,
                    warning: None,
                })
            }
            Err(e) => {
                warn!(error = %e, "model BRD unusable, keeping heuristic BRD");
                Ok(BrdOutcome {
                    brd: heuristic,
                    usage,
                    from_model: false,
                    warning: Some(format!("model BRD unusable, heuristic BRD used: {}", e)),
                })
            }
        }
    }

    /// Converts extracted requirement text into a BRD through the model.
    pub async fn from_document(&self, document: &ExtractedDocument, api_name: Option<&str>) -> Result<BrdOutcome> {
        let generator = self
            .generator
            .ok_or_else(|| anyhow!("Parsing a document into a BRD needs a configured language model"))?;

        let total_chars = document.content.chars().count();
        let truncated = total_chars > MAX_DOCUMENT_CHARS;
        let content: String = document.content.chars().take(MAX_DOCUMENT_CHARS).collect();
        if truncated {
            debug!(document = %document.name, total_chars, "document truncated for prompt");
        }

        let data = json!({
            "api_name": api_name,
            "today": Local::now().format("%Y-%m-%d").to_string(),
            "document_name": document.name,
            "truncated": truncated,
            "content_chars": MAX_DOCUMENT_CHARS,
            "content": content,
        });
        let prompt = self.templates.render(BRD_FROM_DOCUMENT, &data)?;

        let (response, usage) = self.call(generator, &prompt, "brd-from-document").await;
        let mut brd = response
            .and_then(|text| parse_brd_response(&text))
            .map_err(|e| anyhow!("Could not build a BRD from {}: {}", document.name, e))?;

        let fallback_name = api_name.unwrap_or_else(|| document.name.as_str());
        brd.fill_defaults(fallback_name, "");
        brd.metadata.insert("source".to_string(), json!("document"));
        brd.metadata.insert("document".to_string(), json!(document.path.display().to_string()));
        brd.metadata.insert("document_format".to_string(), json!(document.format.to_string()));

        Ok(BrdOutcome {
            brd,
            usage,
            from_model: true,
            warning: truncated.then(|| {
                format!(
                    "{} truncated to {} of {} characters",
                    document.name, MAX_DOCUMENT_CHARS, total_chars
                )
            }),
        })
    }

    async fn call(&self, generator: &dyn TextGenerator, prompt: &str, label: &str) -> (Result<String>, LlmUsage) {
        let attempted = self
            .retry
            .run(label, || generator.generate(BRD_SYSTEM_PROMPT, prompt))
            .await;
        let mut usage = LlmUsage::default();
        usage.record(prompt, attempted.result.as_deref().ok(), attempted.attempts);
        (attempted.result.map_err(|e| anyhow!("{}", e)), usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParamLocation, ParamType, Parameter};

    fn endpoint(method: HttpMethod, path: &str, params: usize, required: usize) -> Endpoint {
        let mut endpoint = Endpoint::new(method, path);
        for i in 0..params {
            let mut p = Parameter::new(format!("p{}", i), ParamLocation::Query, ParamType::String);
            p.required = i < required;
            endpoint.parameters.push(p);
        }
        endpoint
    }

    #[test]
    fn test_lenient_priority_and_status() {
        let req: BrdRequirement = serde_json::from_str(
            r#"{"requirement_id": "REQ-1", "priority": "HIGH", "status": "In Progress"}"#,
        )
        .unwrap();
        assert_eq!(req.priority, RequirementPriority::High);
        assert_eq!(req.status, RequirementStatus::InProgress);

        let req: BrdRequirement =
            serde_json::from_str(r#"{"priority": "urgent", "status": null}"#).unwrap();
        assert_eq!(req.priority, RequirementPriority::Medium);
        assert_eq!(req.status, RequirementStatus::Pending);
    }

    #[test]
    fn test_requirement_keys() {
        let req = BrdRequirement {
            endpoint_path: "/pets".to_string(),
            endpoint_method: "get".to_string(),
            related_endpoints: vec!["POST /pets".to_string(), "/pets/{id}".to_string(), "GET /pets".to_string()],
            ..Default::default()
        };
        let (related, unparseable) = req.related_keys();
        assert_eq!(related.len(), 2);
        assert_eq!(unparseable, vec!["/pets/{id}"]);
        assert_eq!(req.referenced_keys().len(), 2);
        assert!(req.covers(&EndpointKey::new("POST", "/pets")));
        assert!(!req.covers(&EndpointKey::new("DELETE", "/pets")));
    }

    #[test]
    fn test_extract_json_block() {
        let fenced = "Here you go:\n```json\n{\"a\": 1}\n```\nthanks";
        assert_eq!(extract_json_block(fenced), Some("{\"a\": 1}"));

        let bare = "prefix {\"a\": {\"b\": \"}\"}} suffix";
        assert_eq!(extract_json_block(bare), Some("{\"a\": {\"b\": \"}\"}}"));

        assert_eq!(extract_json_block("no json here"), None);
        assert_eq!(extract_json_block("{\"open\": true"), None);
    }

    #[test]
    fn test_priority_score() {
        assert_eq!(priority_score(&endpoint(HttpMethod::Post, "/a", 2, 1)), 100 + 10 + 3);
        assert_eq!(priority_score(&endpoint(HttpMethod::Get, "/a", 20, 0)), 50 + 50);
        assert_eq!(priority_score(&endpoint(HttpMethod::Options, "/a", 0, 0)), 10);
    }

    #[test]
    fn test_select_by_coverage_keeps_at_least_one() {
        let endpoints = vec![
            endpoint(HttpMethod::Get, "/a", 0, 0),
            endpoint(HttpMethod::Delete, "/a", 0, 0),
            endpoint(HttpMethod::Patch, "/b", 0, 0),
        ];
        let selected = select_by_coverage(&endpoints, 10);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].method, HttpMethod::Delete);

        let all = select_by_coverage(&endpoints, 100);
        let order: Vec<HttpMethod> = all.iter().map(|e| e.method).collect();
        assert_eq!(order, vec![HttpMethod::Delete, HttpMethod::Get, HttpMethod::Patch]);
    }

    #[test]
    fn test_fill_defaults_numbers_requirements() {
        let mut brd = Brd {
            requirements: vec![BrdRequirement::default(), BrdRequirement::default()],
            ..Default::default()
        };
        brd.fill_defaults("Petstore", "1.0");
        assert!(brd.brd_id.starts_with("BRD-"));
        assert_eq!(brd.api_name, "Petstore");
        assert_eq!(brd.requirements[1].requirement_id, "REQ-002");
    }

    #[tokio::test]
    async fn test_store_round_trip_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let store = BrdStore::new(dir.path());
        let mut brd = Brd {
            brd_id: "BRD-pets".to_string(),
            ..Default::default()
        };
        brd.fill_defaults("Petstore", "1.0");

        let path = store.save(&brd, None).await.unwrap();
        assert_eq!(store.list(), vec![path.clone()]);
        assert_eq!(store.load("BRD-pets").await.unwrap(), brd);
        assert!(store.load("missing").await.is_err());
    }
}
