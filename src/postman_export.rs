//! Postman collection export of a scenarios CSV: one request item per
//! scenario row, with the row's steps as the item's test script.

use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::csv_export::read_scenarios_csv;
use crate::gherkin::ScenarioRow;
use crate::schema::EndpointKey;
use crate::scope::{scenario_endpoint, REQUEST_STEP};

pub const COLLECTION_SCHEMA: &str = "https://schema.getpostman.com/json/collection/v2.1.0/collection.json";
pub const BASE_URL_VARIABLE: &str = "baseUrl";

#[derive(Debug, Clone)]
pub struct PostmanExport {
    pub collection: Value,
    pub items: usize,
    /// Rows left out: placeholders and rows with no recognizable endpoint.
    pub skipped: Vec<String>,
}

/// `/pets/{petId}` becomes `["pets", ":petId"]`.
fn postman_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => format!(":{}", name),
            None => segment.to_string(),
        })
        .collect()
}

fn item(row: &ScenarioRow, endpoint: &EndpointKey) -> Value {
    let segments = postman_path(&endpoint.path);
    let host = format!("{{{{{}}}}}", BASE_URL_VARIABLE);
    json!({
        "name": format!("{} - {}", endpoint, row.scenario),
        "request": {
            "method": endpoint.method,
            "header": [],
            "url": {
                "raw": format!("{}/{}", host, segments.join("/")),
                "host": [host],
                "path": segments,
            },
        },
        "event": [{
            "listen": "test",
            "script": {
                "type": "text/javascript",
                "exec": row.steps,
            },
        }],
    })
}

pub fn build_collection(rows: &[ScenarioRow], name: &str, base_url: Option<&str>) -> Result<PostmanExport> {
    let request_step = Regex::new(REQUEST_STEP)?;
    let mut items = Vec::new();
    let mut skipped = Vec::new();

    for row in rows {
        if row.is_placeholder() {
            skipped.push(format!("{} (placeholder)", row.feature));
            continue;
        }
        match scenario_endpoint(row, &request_step) {
            Some(endpoint) => items.push(item(row, &endpoint)),
            None => {
                debug!(feature = %row.feature, scenario = %row.scenario, "no endpoint for scenario");
                skipped.push(format!("{}: {} (no endpoint)", row.feature, row.scenario));
            }
        }
    }

    let count = items.len();
    let collection = json!({
        "info": {
            "name": name,
            "schema": COLLECTION_SCHEMA,
        },
        "item": items,
        "variable": [{
            "key": BASE_URL_VARIABLE,
            "value": base_url.unwrap_or(""),
        }],
    });
    Ok(PostmanExport {
        items: count,
        collection,
        skipped,
    })
}

/// `<dir>/<stem>.postman.json` next to the CSV.
pub fn default_output_path(csv: &Path) -> PathBuf {
    csv.with_extension("postman.json")
}

/// Reads a scenarios CSV and writes its collection; returns the written path.
pub async fn export_csv(csv: &Path, output: Option<&Path>, base_url: Option<&str>) -> Result<(PathBuf, PostmanExport)> {
    let rows = read_scenarios_csv(csv).await?;
    let name = csv
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "scenarios".to_string());
    let export = build_collection(&rows, &name, base_url)?;

    let target = output.map(Path::to_path_buf).unwrap_or_else(|| default_output_path(csv));
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow!("Failed to create {}: {}", parent.display(), e))?;
        }
    }
    fs::write(&target, serde_json::to_string_pretty(&export.collection)?)
        .await
        .map_err(|e| anyhow!("Failed to write {}: {}", target.display(), e))?;
    Ok((target, export))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(feature: &str, scenario: &str, steps: &[&str]) -> ScenarioRow {
        ScenarioRow {
            feature: feature.to_string(),
            scenario: scenario.to_string(),
            tags: Vec::new(),
            given: Vec::new(),
            when: Vec::new(),
            then: Vec::new(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
            parsed: true,
        }
    }

    #[test]
    fn test_items_take_method_and_path_from_feature() {
        let rows = vec![
            row("POST /users", "Create user", &["Given a new user", "When I post it", "Then 201"]),
            row("DELETE /users/{userId}", "Remove user", &["When I delete it"]),
        ];
        let export = build_collection(&rows, "users", Some("https://api.example.com")).unwrap();
        assert_eq!(export.items, 2);

        let first = &export.collection["item"][0];
        assert_eq!(first["request"]["method"], "POST");
        assert!(first["request"]["url"]["raw"].as_str().unwrap().ends_with("/users"));
        assert_eq!(first["event"][0]["script"]["exec"][2], "Then 201");

        let second = &export.collection["item"][1];
        assert_eq!(second["request"]["url"]["path"], json!(["users", ":userId"]));
        assert_eq!(export.collection["variable"][0]["value"], "https://api.example.com");
    }

    #[test]
    fn test_endpoint_falls_back_to_request_step() {
        let rows = vec![row("Pet listing", "List", &["When I send a GET request to \"/pets\""])];
        let export = build_collection(&rows, "pets", None).unwrap();
        assert_eq!(export.collection["item"][0]["request"]["method"], "GET");
    }

    #[test]
    fn test_placeholders_and_unknown_endpoints_are_skipped() {
        let rows = vec![
            ScenarioRow::placeholder("GET /pets", None),
            row("Free text", "Nothing to call", &["Given nothing"]),
        ];
        let export = build_collection(&rows, "pets", None).unwrap();
        assert_eq!(export.items, 0);
        assert_eq!(export.skipped.len(), 2);
    }

    #[test]
    fn test_default_output_sits_next_to_csv() {
        assert_eq!(
            default_output_path(Path::new("out/run/20240101_000000_pets_scenarios.csv")),
            PathBuf::from("out/run/20240101_000000_pets_scenarios.postman.json")
        );
    }
}
