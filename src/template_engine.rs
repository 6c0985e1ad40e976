use anyhow::{anyhow, Result};
use handlebars::{handlebars_helper, no_escape, Handlebars};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

pub const GHERKIN_SCENARIOS: &str = "gherkin_scenarios";
pub const BRD_FROM_DOCUMENT: &str = "brd_from_document";
pub const BRD_FROM_SCHEMA: &str = "brd_from_schema";

const BUILT_IN: [(&str, &str); 3] = [
    (GHERKIN_SCENARIOS, include_str!("../templates/gherkin_scenarios.hbs")),
    (BRD_FROM_DOCUMENT, include_str!("../templates/brd_from_document.hbs")),
    (BRD_FROM_SCHEMA, include_str!("../templates/brd_from_schema.hbs")),
];

pub const GHERKIN_SYSTEM_PROMPT: &str = "You are a senior QA engineer who writes precise, executable Gherkin scenarios for REST APIs. Respond with Gherkin only.";
pub const BRD_SYSTEM_PROMPT: &str = "You are a business analyst who turns API documentation and requirement documents into structured Business Requirement Documents. Respond with valid JSON only.";

handlebars_helper!(upper: |text: str| text.to_uppercase());
handlebars_helper!(lower: |text: str| text.to_lowercase());
handlebars_helper!(join: |items: array, separator: str| items
    .iter()
    .map(|item| match item {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
    .collect::<Vec<_>>()
    .join(separator));

/// Prompt templates: built-ins, optionally overridden by `<name>.hbs` files
/// from a user template directory.
pub struct PromptTemplates {
    handlebars: Handlebars<'static>,
    overridden: Vec<String>,
}

impl PromptTemplates {
    pub fn new() -> Result<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.register_escape_fn(no_escape);
        handlebars.register_helper("upper", Box::new(upper));
        handlebars.register_helper("lower", Box::new(lower));
        handlebars.register_helper("join", Box::new(join));

        for (name, content) in BUILT_IN {
            handlebars
                .register_template_string(name, content)
                .map_err(|e| anyhow!("Built-in template '{}' is invalid: {}", name, e))?;
        }

        Ok(Self {
            handlebars,
            overridden: Vec::new(),
        })
    }

    pub fn with_template_dir(template_dir: Option<&Path>) -> Result<Self> {
        let mut templates = Self::new()?;
        let Some(dir) = template_dir else {
            return Ok(templates);
        };
        if !dir.is_dir() {
            debug!(dir = %dir.display(), "template directory not found, using built-in prompts");
            return Ok(templates);
        }

        for (name, _) in BUILT_IN {
            let path = dir.join(format!("{}.hbs", name));
            if !path.is_file() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| anyhow!("Failed to read template {}: {}", path.display(), e))?;
            templates
                .handlebars
                .register_template_string(name, content)
                .map_err(|e| anyhow!("Invalid template {}: {}", path.display(), e))?;
            info!(template = name, path = %path.display(), "using custom prompt template");
            templates.overridden.push(name.to_string());
        }

        Ok(templates)
    }

    pub fn render<T: Serialize>(&self, name: &str, data: &T) -> Result<String> {
        self.handlebars
            .render(name, data)
            .map_err(|e| anyhow!("Failed to render prompt '{}': {}", name, e))
    }

    /// Names of built-in templates replaced from the template directory.
    pub fn overridden(&self) -> &[String] {
        &self.overridden
    }

    pub fn names() -> Vec<&'static str> {
        BUILT_IN.iter().map(|(name, _)| *name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_built_in_templates_render() {
        let templates = PromptTemplates::new().unwrap();
        let prompt = templates
            .render(
                GHERKIN_SCENARIOS,
                &json!({
                    "api_title": "Petstore",
                    "api_version": "1.0",
                    "spec_version": "OpenAPI 3.0",
                    "chunk_index": 1,
                    "chunk_count": 1,
                    "endpoint_count": 1,
                    "has_requirements": true,
                    "endpoints": [{
                        "method": "GET",
                        "path": "/pets/{id}",
                        "parameters": [{"name": "id", "location": "path", "type": "string", "required": true, "domain": "\"string\""}],
                        "combination_count": 1,
                        "combinations": ["id=\"string\""],
                        "requirements": [{"id": "REQ-001", "priority": "high", "title": "Fetch pet", "acceptance": ["returns 200", "returns the pet"]}]
                    }]
                }),
            )
            .unwrap();

        assert!(prompt.contains("### GET /pets/{id}"));
        assert!(prompt.contains("- id (path, string, required): \"string\""));
        assert!(prompt.contains("REQ-001 [HIGH] Fetch pet. Acceptance: returns 200; returns the pet"));
    }

    #[test]
    fn test_custom_template_directory_overrides_built_in() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("brd_from_schema.hbs"), "custom {{api_title}}").unwrap();

        let templates = PromptTemplates::with_template_dir(Some(dir.path())).unwrap();
        assert_eq!(templates.overridden(), &["brd_from_schema".to_string()]);
        assert_eq!(
            templates.render(BRD_FROM_SCHEMA, &json!({"api_title": "X"})).unwrap(),
            "custom X"
        );
    }
}
