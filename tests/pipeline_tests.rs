use apicov::app::{App, BrdChoice, GenerateRequest, COVERAGE_REPORT_FILE, SCHEMA_FILE};
use apicov::brd_validator::REPORT_FILE;
use apicov::cli::Commands;
use apicov::config::Config;
use apicov::error_handler::IssueKind;
use apicov::llm::{LlmError, TextGenerator};
use apicov::metrics::RUN_SUMMARY_FILE;
use apicov::postman_export::default_output_path;
use apicov::template_engine::GHERKIN_SYSTEM_PROMPT;
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

const SCENARIOS: &str = r#"Here are the scenarios:

```gherkin
Feature: GET /pets
  @REQ-001
  Scenario: List pets
    Given the pet store is running
    When I send a GET request to "/pets"
    Then the response status is 200

  Scenario: Reject a zero limit
    Given the pet store is running
    When I send a GET request to "/pets" with limit 0
    Then the response status is 400
```
"#;

/// Answers scenario prompts with fixed Gherkin and anything else with prose.
struct Scripted {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TextGenerator for Scripted {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn generate(&self, system: &str, _prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if system == GHERKIN_SYSTEM_PROMPT {
            Ok(SCENARIOS.to_string())
        } else {
            Ok("I could not produce JSON for this request.".to_string())
        }
    }
}

struct Down;

#[async_trait]
impl TextGenerator for Down {
    fn name(&self) -> String {
        "down".to_string()
    }

    async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::ServiceUnavailable("maintenance".to_string()))
    }
}

struct Workspace {
    dir: TempDir,
    schema: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let schema = dir.path().join("petstore.json");
        let doc = json!({
            "openapi": "3.0.1",
            "info": {"title": "Petstore", "version": "1.0.0"},
            "paths": {
                "/pets": {
                    "get": {
                        "parameters": [
                            {"name": "limit", "in": "query", "schema": {"type": "integer", "minimum": 1, "maximum": 50}}
                        ]
                    },
                    "post": {
                        "requestBody": {"content": {"application/json": {"schema": {
                            "type": "object",
                            "properties": {"name": {"type": "string", "maxLength": 20}}
                        }}}}
                    }
                },
                "/pets/{petId}": {
                    "delete": {
                        "parameters": [{"name": "petId", "in": "path", "required": true, "schema": {"type": "integer"}}]
                    }
                }
            }
        });
        std::fs::write(&schema, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
        Self { dir, schema }
    }

    fn config(&self) -> Config {
        let mut config = Config::default();
        config.paths.output_dir = self.dir.path().join("out");
        config.paths.brd_dir = self.dir.path().join("brd");
        config.algorithm.retry.max_attempts = 2;
        config.algorithm.retry.initial_backoff_ms = 0;
        config.algorithm.retry.max_backoff_ms = 0;
        config
    }

    fn request(&self) -> GenerateRequest {
        let mut request = GenerateRequest::new(self.schema.to_string_lossy());
        request.quiet = true;
        request
    }

    fn write_brd(&self, name: &str, requirements: serde_json::Value) -> PathBuf {
        let dir = self.dir.path().join("brd");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{}.json", name));
        let brd = json!({
            "brd_id": "BRD-PETS",
            "title": "Pet listing",
            "requirements": requirements,
        });
        std::fs::write(&path, brd.to_string()).unwrap();
        path
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn test_generate_without_brd_writes_all_outputs() {
    let workspace = Workspace::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let app = App::with_generator(workspace.config(), Box::new(Scripted { calls: calls.clone() })).unwrap();

    let artifacts = app.run_generate(&workspace.request()).await.unwrap();

    // Three endpoints fit in one chunk.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(artifacts.rows.len(), 2);
    assert!(artifacts.coverage.is_none());
    assert!(artifacts.run_dir.join(SCHEMA_FILE).exists());
    assert!(artifacts.run_dir.file_name().unwrap().to_string_lossy().ends_with("_petstore"));

    let csv = read(&artifacts.csv_path);
    assert!(csv.starts_with("Feature,Scenario,Tags,Given,When,Then,All Steps"));
    assert_eq!(csv.lines().count(), 3);

    let summary = read(&artifacts.run_dir.join("analytics").join(RUN_SUMMARY_FILE));
    assert!(summary.contains("scripted"));
    assert!(artifacts.reports.iter().any(|p| p.to_string_lossy().contains("scenario_generator")));
}

#[tokio::test]
async fn test_existing_brd_scopes_and_reports_coverage() {
    let workspace = Workspace::new();
    workspace.write_brd(
        "pets",
        json!([
            {"requirement_id": "REQ-001", "endpoint_method": "GET", "endpoint_path": "/pets", "priority": "high"},
            {"requirement_id": "REQ-002", "endpoint_method": "DELETE", "endpoint_path": "/pets/{id}"}
        ]),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let app = App::with_generator(workspace.config(), Box::new(Scripted { calls })).unwrap();

    let mut request = workspace.request();
    request.brd = BrdChoice::Existing("pets".to_string());
    let artifacts = app.run_generate(&request).await.unwrap();

    let coverage = artifacts.coverage.as_ref().unwrap();
    assert_eq!(coverage.total, 3);
    assert_eq!(coverage.covered, 1);
    assert_eq!(coverage.uncovered.len(), 2);

    let validation = artifacts.validation.as_ref().unwrap();
    assert_eq!(
        validation.orphaned.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
        vec!["DELETE /pets/{id}"]
    );
    assert!(artifacts
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::OrphanedRequirement));

    let validation_report = read(&artifacts.run_dir.join(REPORT_FILE));
    assert!(validation_report.contains("DELETE /pets/{petId} differs only in placeholder names"));

    let coverage_report = read(&artifacts.run_dir.join(COVERAGE_REPORT_FILE));
    assert!(coverage_report.contains("Coverage: 33.3%"));
    assert!(coverage_report.contains("REQ-001 (2 scenarios)"));
}

#[tokio::test]
async fn test_brd_matching_nothing_is_fatal() {
    let workspace = Workspace::new();
    let path = workspace.write_brd(
        "owners",
        json!([{"requirement_id": "REQ-001", "endpoint_method": "GET", "endpoint_path": "/owners"}]),
    );
    let app = App::with_generator(
        workspace.config(),
        Box::new(Scripted {
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    )
    .unwrap();

    let mut request = workspace.request();
    request.brd = BrdChoice::Existing(path.to_string_lossy().to_string());
    let err = app.run_generate(&request).await.unwrap_err();
    assert!(err.to_string().contains("No endpoints in scope"));
}

#[tokio::test]
async fn test_generated_brd_falls_back_to_heuristic() {
    let workspace = Workspace::new();
    let app = App::with_generator(
        workspace.config(),
        Box::new(Scripted {
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    )
    .unwrap();

    let mut request = workspace.request();
    request.brd = BrdChoice::FromSchema;
    request.coverage = 50;
    let artifacts = app.run_generate(&request).await.unwrap();

    // floor(3 * 50 / 100) = 1 endpoint, the highest-scoring write operation.
    let coverage = artifacts.coverage.as_ref().unwrap();
    assert_eq!(coverage.covered, 1);
    let brd_path = artifacts.brd_path.as_ref().unwrap();
    assert!(brd_path.starts_with(workspace.dir.path().join("brd")));
    assert!(artifacts
        .issues
        .iter()
        .any(|i| i.kind == IssueKind::UnparseableResponse));
}

#[tokio::test]
async fn test_failing_model_yields_placeholder_rows() {
    let workspace = Workspace::new();
    let app = App::with_generator(workspace.config(), Box::new(Down)).unwrap();

    let artifacts = app.run_generate(&workspace.request()).await.unwrap();
    assert_eq!(artifacts.rows.len(), 3);
    assert!(artifacts.rows.iter().all(|r| r.is_placeholder()));
    assert!(artifacts.issues.iter().any(|i| i.kind == IssueKind::ChunkFailure));
    assert!(artifacts.csv_path.exists());
}

#[tokio::test]
async fn test_fail_fast_aborts_on_chunk_failure() {
    let workspace = Workspace::new();
    let mut config = workspace.config();
    config.algorithm.fail_fast = true;
    let app = App::with_generator(config, Box::new(Down)).unwrap();

    assert!(app.run_generate(&workspace.request()).await.is_err());
}

#[tokio::test]
async fn test_missing_credential_is_fatal_before_any_work() {
    let workspace = Workspace::new();
    let mut config = workspace.config();
    config.llm.provider = "openai".to_string();
    config.llm.api_key = None;
    let app = App::from_config(config).unwrap();

    let err = app.run_generate(&workspace.request()).await.unwrap_err();
    assert!(err.to_string().contains("API key"));
    assert!(!workspace.dir.path().join("out").exists());
}

#[tokio::test]
async fn test_schema_without_endpoints_is_fatal() {
    let workspace = Workspace::new();
    let empty = workspace.dir.path().join("empty.json");
    std::fs::write(
        &empty,
        json!({"openapi": "3.0.0", "info": {"title": "Empty", "version": "1"}, "paths": {}}).to_string(),
    )
    .unwrap();
    let app = App::with_generator(workspace.config(), Box::new(Down)).unwrap();

    let mut request = workspace.request();
    request.schema = empty.to_string_lossy().to_string();
    assert!(app.run_generate(&request).await.is_err());
}

#[tokio::test]
async fn test_generated_csv_exports_to_postman() {
    let workspace = Workspace::new();
    let mut app = App::with_generator(
        workspace.config(),
        Box::new(Scripted {
            calls: Arc::new(AtomicUsize::new(0)),
        }),
    )
    .unwrap();
    let artifacts = app.run_generate(&workspace.request()).await.unwrap();

    app.run_command(Commands::Postman {
        csv: artifacts.csv_path.clone(),
        output: None,
        base_url: Some("https://petstore.example.com".to_string()),
    })
    .await
    .unwrap();

    let collection: serde_json::Value =
        serde_json::from_str(&read(&default_output_path(&artifacts.csv_path))).unwrap();
    let items = collection["item"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["request"]["method"], "GET");
    assert_eq!(items[0]["request"]["url"]["raw"], "{{baseUrl}}/pets");
    assert_eq!(items[1]["event"][0]["script"]["exec"][2], "Then the response status is 400");
}
