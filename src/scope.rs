//! BRD scope filter: which endpoints a BRD covers, and which generated
//! scenarios exercise each requirement.

use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::brd::Brd;
use crate::gherkin::ScenarioRow;
use crate::schema::{Endpoint, EndpointKey};

/// `When I send a GET request to "/pets"`.
pub const REQUEST_STEP: &str = r#"(?i)\b(GET|PUT|POST|DELETE|OPTIONS|HEAD|PATCH|TRACE)\s+request\s+to\s+"([^"]+)""#;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub total: usize,
    pub covered: usize,
    pub uncovered: Vec<EndpointKey>,
    /// `covered / total * 100`, 0 for an empty schema.
    pub percentage: f64,
}

pub fn coverage_percentage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        covered as f64 / total as f64 * 100.0
    }
}

/// Endpoints referenced by some requirement, by own endpoint or related
/// entry. Paths compare as exact strings. Inputs are left untouched.
pub fn filter_by_brd(endpoints: &[Endpoint], brd: &Brd) -> (Vec<Endpoint>, CoverageReport) {
    let referenced = brd.referenced_endpoints();
    let (scoped, uncovered): (Vec<&Endpoint>, Vec<&Endpoint>) =
        endpoints.iter().partition(|e| referenced.contains(&e.key()));

    let report = CoverageReport {
        total: endpoints.len(),
        covered: scoped.len(),
        uncovered: uncovered.iter().map(|e| e.key()).collect(),
        percentage: coverage_percentage(scoped.len(), endpoints.len()),
    };
    (scoped.into_iter().cloned().collect(), report)
}

/// Generated scenarios that exercise one requirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequirementCoverage {
    pub requirement_id: String,
    pub endpoints: Vec<EndpointKey>,
    pub scenario_count: usize,
}

impl RequirementCoverage {
    pub fn is_covered(&self) -> bool {
        self.scenario_count > 0
    }
}

/// Endpoint a scenario row targets: its feature name when that is
/// `METHOD /path`, otherwise the first `<METHOD> request to "<path>"` step.
pub fn scenario_endpoint(row: &ScenarioRow, request_step: &Regex) -> Option<EndpointKey> {
    if let Some(key) = EndpointKey::parse(&row.feature) {
        return Some(key);
    }
    row.steps.iter().find_map(|step| {
        let captures = request_step.captures(step)?;
        Some(EndpointKey::new(&captures[1], &captures[2]))
    })
}

pub fn requirement_coverage(brd: &Brd, rows: &[ScenarioRow]) -> Result<Vec<RequirementCoverage>> {
    let request_step = Regex::new(REQUEST_STEP)?;
    let targets: Vec<(Option<EndpointKey>, &ScenarioRow)> = rows
        .iter()
        .filter(|row| !row.is_placeholder())
        .map(|row| (scenario_endpoint(row, &request_step), row))
        .collect();

    Ok(brd
        .requirements
        .iter()
        .map(|requirement| {
            let endpoints = requirement.referenced_keys();
            let scenario_count = targets
                .iter()
                .filter(|(key, row)| {
                    key.as_ref().map_or(false, |k| endpoints.contains(k))
                        || (!requirement.requirement_id.is_empty()
                            && row
                                .tags
                                .iter()
                                .any(|t| t.trim_start_matches('@').eq_ignore_ascii_case(&requirement.requirement_id)))
                })
                .count();
            RequirementCoverage {
                requirement_id: requirement.requirement_id.clone(),
                endpoints,
                scenario_count,
            }
        })
        .collect())
}

/// Text of `coverage_report.txt`.
pub fn render_coverage_report(report: &CoverageReport, requirements: &[RequirementCoverage]) -> String {
    let mut out = String::new();
    out.push_str("BRD COVERAGE REPORT\n");
    out.push_str(&"=".repeat(60));
    out.push('\n');
    out.push_str(&format!("Total endpoints: {}\n", report.total));
    out.push_str(&format!("Covered by BRD: {}\n", report.covered));
    out.push_str(&format!("Coverage: {:.1}%\n\n", report.percentage));

    out.push_str(&format!("Endpoints not in the BRD ({}):\n", report.uncovered.len()));
    if report.uncovered.is_empty() {
        out.push_str("  none\n");
    }
    for key in &report.uncovered {
        out.push_str(&format!("  - {}\n", key));
    }

    if !requirements.is_empty() {
        let exercised = requirements.iter().filter(|r| r.is_covered()).count();
        out.push_str(&format!(
            "\nRequirements exercised by generated scenarios: {}/{}\n",
            exercised,
            requirements.len()
        ));
        for requirement in requirements {
            let marker = if requirement.is_covered() { "✅" } else { "❌" };
            let endpoints: BTreeSet<String> = requirement.endpoints.iter().map(|k| k.to_string()).collect();
            out.push_str(&format!(
                "  {} {} ({} scenarios) {}\n",
                marker,
                requirement.requirement_id,
                requirement.scenario_count,
                endpoints.into_iter().collect::<Vec<_>>().join(", ")
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brd::BrdRequirement;
    use crate::schema::HttpMethod;

    fn requirement(id: &str, method: &str, path: &str) -> BrdRequirement {
        BrdRequirement {
            requirement_id: id.to_string(),
            endpoint_method: method.to_string(),
            endpoint_path: path.to_string(),
            ..Default::default()
        }
    }

    fn row(feature: &str, steps: &[&str], tags: &[&str]) -> ScenarioRow {
        ScenarioRow {
            feature: feature.to_string(),
            scenario: "s".to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            given: Vec::new(),
            when: Vec::new(),
            then: Vec::new(),
            steps: steps.iter().map(|s| s.to_string()).collect(),
            parsed: true,
        }
    }

    #[test]
    fn test_related_endpoints_count_as_covered() {
        let endpoints = vec![
            Endpoint::new(HttpMethod::Get, "/pets"),
            Endpoint::new(HttpMethod::Post, "/pets"),
            Endpoint::new(HttpMethod::Get, "/pets/{id}"),
        ];
        let mut req = requirement("REQ-001", "GET", "/pets");
        req.related_endpoints = vec!["GET /pets/{id}".to_string()];
        let brd = Brd {
            requirements: vec![req],
            ..Default::default()
        };

        let (scoped, report) = filter_by_brd(&endpoints, &brd);
        assert_eq!(scoped.len(), 2);
        assert_eq!(report.uncovered, vec![EndpointKey::new("POST", "/pets")]);
    }

    #[test]
    fn test_placeholder_names_must_match_exactly() {
        let endpoints = vec![Endpoint::new(HttpMethod::Get, "/pets/{petId}")];
        let brd = Brd {
            requirements: vec![requirement("REQ-001", "GET", "/pets/{id}")],
            ..Default::default()
        };
        let (scoped, report) = filter_by_brd(&endpoints, &brd);
        assert!(scoped.is_empty());
        assert_eq!(report.percentage, 0.0);
    }

    #[test]
    fn test_scenarios_are_attributed_to_requirements() {
        let brd = Brd {
            requirements: vec![
                requirement("REQ-001", "GET", "/pets"),
                requirement("REQ-002", "DELETE", "/pets/{id}"),
                requirement("REQ-003", "POST", "/orders"),
            ],
            ..Default::default()
        };
        let rows = vec![
            row("GET /pets", &["When I send a GET request to \"/pets\""], &[]),
            row("Pet removal", &["When I send a DELETE request to \"/pets/{id}\""], &[]),
            row("Orders", &["Given nothing"], &["REQ-003"]),
            ScenarioRow::placeholder("GET /pets", None),
        ];

        let coverage = requirement_coverage(&brd, &rows).unwrap();
        let counts: Vec<usize> = coverage.iter().map(|c| c.scenario_count).collect();
        assert_eq!(counts, vec![1, 1, 1]);

        let text = render_coverage_report(
            &CoverageReport {
                total: 3,
                covered: 3,
                uncovered: Vec::new(),
                percentage: 100.0,
            },
            &coverage,
        );
        assert!(text.contains("Requirements exercised by generated scenarios: 3/3"));
    }
}
