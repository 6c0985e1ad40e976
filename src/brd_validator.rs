use anyhow::{anyhow, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::brd::Brd;
use crate::schema::{placeholder_shape, EndpointKey};
use crate::scope::coverage_percentage;

pub const REPORT_FILE: &str = "brd_validation_report.txt";

const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq)]
pub struct RequirementIssue {
    pub requirement_id: String,
    pub endpoint: String,
    pub error: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BrdValidation {
    pub brd_id: String,
    pub total_brd_endpoints: usize,
    pub total_schema_endpoints: usize,
    pub matched_endpoints: usize,
    pub match_percentage: f64,
    /// In the BRD, absent from the schema.
    pub orphaned: BTreeSet<EndpointKey>,
    /// In the schema, not referenced by the BRD.
    pub missing: BTreeSet<EndpointKey>,
    pub issues: Vec<RequirementIssue>,
}

impl BrdValidation {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty() && self.orphaned.is_empty()
    }

    pub fn format_report(&self) -> String {
        let mut lines = Vec::new();
        let rule = |c: &str| c.repeat(RULE_WIDTH);

        lines.push(rule("="));
        lines.push(format!("BRD Validation Report: {}", self.brd_id));
        lines.push(rule("="));
        lines.push(String::new());

        lines.push("SUMMARY".to_string());
        lines.push(rule("-"));
        lines.push(format!("Status: {}", if self.is_valid() { "✓ VALID" } else { "✗ INVALID" }));
        lines.push(format!("BRD Endpoints: {}", self.total_brd_endpoints));
        lines.push(format!("Schema Endpoints: {}", self.total_schema_endpoints));
        lines.push(format!("Matched Endpoints: {}", self.matched_endpoints));
        lines.push(format!("Match Percentage: {:.2}%", self.match_percentage));
        lines.push(String::new());

        for (title, keys) in [
            ("ORPHANED ENDPOINTS (in BRD but not in schema)", &self.orphaned),
            ("MISSING ENDPOINTS (in schema but not in BRD)", &self.missing),
        ] {
            lines.push(title.to_string());
            lines.push(rule("-"));
            if keys.is_empty() {
                lines.push("  none".to_string());
            }
            lines.extend(keys.iter().map(|key| format!("  - {}", key)));
            lines.push(String::new());
        }

        lines.push("REQUIREMENT ISSUES".to_string());
        lines.push(rule("-"));
        if self.issues.is_empty() {
            lines.push("  none".to_string());
            lines.push(String::new());
        }
        for issue in &self.issues {
            lines.push(format!("Requirement: {}", issue.requirement_id));
            lines.push(format!("  Endpoint: {}", issue.endpoint));
            lines.push(format!("  Error: {}", issue.error));
            if let Some(suggestion) = &issue.suggestion {
                lines.push(format!("  Suggestion: {}", suggestion));
            }
            lines.push(String::new());
        }

        lines.push("RECOMMENDATIONS".to_string());
        lines.push(rule("-"));
        if !self.orphaned.is_empty() {
            lines.push("• Remove or update orphaned endpoints in the BRD".to_string());
        }
        if !self.missing.is_empty() {
            lines.push(format!("• Consider adding {} missing endpoints to the BRD", self.missing.len()));
        }
        if self.match_percentage < 100.0 {
            lines.push(format!("• Improve BRD coverage (currently {:.2}%)", self.match_percentage));
        }
        if self.orphaned.is_empty() && self.missing.is_empty() {
            lines.push("• BRD is well-aligned with the schema".to_string());
        }
        lines.push(String::new());
        lines.push(rule("="));
        lines.join("\n")
    }

    pub async fn write_report(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| anyhow!("Failed to create {}: {}", dir.display(), e))?;
        let path = dir.join(REPORT_FILE);
        fs::write(&path, self.format_report())
            .await
            .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;
        Ok(path)
    }
}

/// Compares BRD endpoint references with the schema's endpoints. Matching is
/// exact; placeholder-name differences only produce suggestions.
pub fn validate(brd: &Brd, schema_endpoints: &[EndpointKey]) -> BrdValidation {
    let schema_set: BTreeSet<EndpointKey> = schema_endpoints.iter().cloned().collect();
    let brd_set = brd.referenced_endpoints();

    let orphaned: BTreeSet<EndpointKey> = brd_set.difference(&schema_set).cloned().collect();
    let missing: BTreeSet<EndpointKey> = schema_set.difference(&brd_set).cloned().collect();
    let matched = brd_set.intersection(&schema_set).count();

    let mut issues = Vec::new();
    for requirement in &brd.requirements {
        let id = requirement.requirement_id.clone();
        match requirement.endpoint_key() {
            None => issues.push(RequirementIssue {
                requirement_id: id.clone(),
                endpoint: format!("{} {}", requirement.endpoint_method, requirement.endpoint_path)
                    .trim()
                    .to_string(),
                error: "Requirement has no valid endpoint method and path".to_string(),
                suggestion: None,
            }),
            Some(key) if !schema_set.contains(&key) => issues.push(RequirementIssue {
                requirement_id: id.clone(),
                endpoint: key.to_string(),
                error: "Endpoint not found in schema".to_string(),
                suggestion: suggest(&key, &schema_set),
            }),
            Some(_) => {}
        }

        let (related, unparseable) = requirement.related_keys();
        for entry in unparseable {
            issues.push(RequirementIssue {
                requirement_id: id.clone(),
                endpoint: entry,
                error: "Related endpoint is not in 'METHOD /path' form and was ignored".to_string(),
                suggestion: None,
            });
        }
        for key in related.into_iter().filter(|k| !schema_set.contains(k)) {
            issues.push(RequirementIssue {
                requirement_id: id.clone(),
                endpoint: key.to_string(),
                error: "Related endpoint not found in schema".to_string(),
                suggestion: suggest(&key, &schema_set),
            });
        }
    }

    BrdValidation {
        brd_id: brd.brd_id.clone(),
        total_brd_endpoints: brd_set.len(),
        total_schema_endpoints: schema_set.len(),
        matched_endpoints: matched,
        match_percentage: coverage_percentage(matched, schema_set.len()),
        orphaned,
        missing,
        issues,
    }
}

/// Same method and same path shape first; otherwise the closest path by
/// matching segments when more than half of them agree.
fn suggest(key: &EndpointKey, schema: &BTreeSet<EndpointKey>) -> Option<String> {
    let same_method: Vec<&EndpointKey> = schema.iter().filter(|k| k.method == key.method).collect();

    let shape = placeholder_shape(&key.path);
    if let Some(candidate) = same_method.iter().find(|k| placeholder_shape(&k.path) == shape) {
        return Some(format!(
            "{} differs only in placeholder names; rename it in the BRD to match",
            candidate
        ));
    }

    let segments: Vec<&str> = key.path.trim_matches('/').split('/').collect();
    let mut best: Option<(f64, &EndpointKey)> = None;
    for candidate in same_method {
        let other: Vec<&str> = candidate.path.trim_matches('/').split('/').collect();
        if other.len() != segments.len() {
            continue;
        }
        let agreeing = segments
            .iter()
            .zip(&other)
            .filter(|(a, b)| a == b || a.starts_with('{') || b.starts_with('{'))
            .count();
        let score = agreeing as f64 / segments.len() as f64;
        if best.map_or(true, |(best_score, _)| score > best_score) {
            best = Some((score, candidate));
        }
    }
    best.filter(|(score, _)| *score > 0.5)
        .map(|(_, candidate)| format!("Did you mean {}?", candidate))
}
