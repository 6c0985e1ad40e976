use apicov::brd::{Brd, BrdRequirement};
use apicov::combination;
use apicov::csv_export::to_csv_string;
use apicov::domain::{DomainBuilder, ValueKind};
use apicov::error_handler::ErrorHandler;
use apicov::gherkin::GherkinParser;
use apicov::scenario_generator::plan_endpoints;
use apicov::schema::{normalize, EndpointKey};
use apicov::scope::{coverage_percentage, filter_by_brd};
use serde_json::{json, Value};

fn petstore() -> Value {
    json!({
        "openapi": "3.0.1",
        "info": {"title": "Petstore", "version": "1.0.0"},
        "paths": {
            "/pets": {
                "get": {
                    "parameters": [
                        {"name": "limit", "in": "query", "schema": {"type": "integer", "minimum": 1, "maximum": 100}},
                        {"name": "status", "in": "query", "schema": {"type": "string", "enum": ["available", "pending", "sold"]}}
                    ]
                },
                "post": {
                    "requestBody": {
                        "content": {"application/json": {"schema": {
                            "type": "object",
                            "required": ["name"],
                            "properties": {"name": {"type": "string"}, "vaccinated": {"type": "boolean"}}
                        }}}
                    }
                }
            },
            "/pets/{id}": {
                "get": {
                    "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}]
                }
            }
        }
    })
}

fn requirement(id: &str, method: &str, path: &str) -> BrdRequirement {
    BrdRequirement {
        requirement_id: id.to_string(),
        endpoint_method: method.to_string(),
        endpoint_path: path.to_string(),
        ..Default::default()
    }
}

#[test]
fn test_unconstrained_path_parameter_gives_one_placeholder_combination() {
    let schema = normalize(&petstore()).unwrap();
    let endpoint = schema
        .endpoints
        .iter()
        .find(|e| e.key() == EndpointKey::new("GET", "/pets/{id}"))
        .unwrap();

    let mut errors = ErrorHandler::new(false);
    let plans = plan_endpoints(std::slice::from_ref(endpoint), None, &DomainBuilder::default(), &mut errors);
    let plan = &plans[0];

    assert_eq!(plan.domains.len(), 1);
    assert_eq!(plan.domains[0].1.values()[0].kind, ValueKind::Placeholder);
    assert_eq!(plan.combinations.len(), 1);
    assert!(plan.combinations[0].get("path.id").is_some());
}

#[test]
fn test_every_domain_value_appears_in_some_combination() {
    let schema = normalize(&petstore()).unwrap();
    let mut errors = ErrorHandler::new(false);
    let plans = plan_endpoints(&schema.endpoints, None, &DomainBuilder::default(), &mut errors);

    for plan in &plans {
        let longest = plan.domains.iter().map(|(_, d)| d.len()).max().unwrap_or(1);
        assert!(plan.combinations.len() <= longest.max(1), "{}", plan.key());
        assert!(
            combination::required_pairs(&plan.domains).is_subset(&combination::covered_pairs(&plan.combinations)),
            "{}",
            plan.key()
        );
    }
}

#[test]
fn test_brd_scope_reports_uncovered_endpoints() {
    let schema = json!({
        "openapi": "3.0.0",
        "info": {"title": "Pets", "version": "1"},
        "paths": {"/pets": {"get": {}, "post": {}}}
    });
    let schema = normalize(&schema).unwrap();
    let brd = Brd {
        brd_id: "BRD-PETS".to_string(),
        requirements: vec![requirement("REQ-001", "GET", "/pets")],
        ..Default::default()
    };

    let (scoped, report) = filter_by_brd(&schema.endpoints, &brd);
    assert_eq!(scoped.len(), 1);
    assert_eq!(report.total, 2);
    assert_eq!(report.covered, 1);
    assert_eq!(report.percentage, 50.0);
    assert_eq!(
        report.uncovered.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
        vec!["POST /pets"]
    );
}

#[test]
fn test_brd_without_matches_scopes_nothing() {
    let schema = normalize(&petstore()).unwrap();
    let brd = Brd {
        requirements: vec![requirement("REQ-001", "DELETE", "/owners")],
        ..Default::default()
    };
    let (scoped, report) = filter_by_brd(&schema.endpoints, &brd);
    assert!(scoped.is_empty());
    assert_eq!(report.covered, 0);
    assert_eq!(report.percentage, 0.0);
}

#[test]
fn test_empty_endpoint_list_is_zero_percent() {
    assert_eq!(coverage_percentage(0, 0), 0.0);

    let brd = Brd {
        requirements: vec![requirement("REQ-001", "GET", "/pets")],
        ..Default::default()
    };
    for brd in [Brd::default(), brd] {
        let (scoped, report) = filter_by_brd(&[], &brd);
        assert!(scoped.is_empty());
        assert_eq!(report.total, 0);
        assert_eq!(report.covered, 0);
        assert_eq!(report.percentage, 0.0);
        assert!(report.uncovered.is_empty());
    }
}

#[test]
fn test_gherkin_to_csv() {
    let text = r#"
Feature: GET /pets
  @smoke @REQ-001
  Scenario: List pets with a limit
    Given the pet store has pets
    When I send a GET request to "/pets" with limit 1
    Then the response status is 200
    And the response has at most 1 pet

  Scenario: Reject an invalid status
    Given the pet store has pets
    When I send a GET request to "/pets" with status "unknown"
    Then the response status is 400
"#;
    let rows = GherkinParser::new(true).parse(text);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.feature == "GET /pets"));
    assert_eq!(rows[0].tags, vec!["smoke", "REQ-001"]);
    assert_eq!(rows[0].then.len(), 2);

    let csv = to_csv_string(&rows);
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("Feature,Scenario,Tags,Given,When,Then,All Steps"));
    let first = lines.next().unwrap();
    assert!(first.starts_with("GET /pets,List pets with a limit,"));
    assert!(first.contains("Then the response status is 200; And the response has at most 1 pet"));
}

#[test]
fn test_malformed_response_gives_one_placeholder_row() {
    let rows = GherkinParser::new(true).parse("I'm sorry, I can't produce scenarios for this API.");
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_placeholder());
    assert!(rows[0].steps[0].contains("I'm sorry"));
}
