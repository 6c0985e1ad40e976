//! Single-parameter coverage: every (parameter, value) pair appears in at
//! least one combination, without the full cartesian product.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::domain::{render_value, ValueDomain, ValueKind};

/// One parameter's chosen value inside a combination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    /// `location.name` key of the parameter.
    pub parameter: String,
    pub value: Value,
    pub kind: ValueKind,
}

/// One value per parameter, in parameter order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Combination {
    pub assignments: Vec<Assignment>,
}

impl Combination {
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn get(&self, parameter: &str) -> Option<&Value> {
        self.assignments
            .iter()
            .find(|a| a.parameter == parameter)
            .map(|a| &a.value)
    }

    /// True when any assigned value is an invalid sample.
    pub fn is_negative(&self) -> bool {
        self.assignments.iter().any(|a| a.kind == ValueKind::Invalid)
    }

    /// `id="1", limit=10`, or `(no parameters)`.
    pub fn describe(&self) -> String {
        if self.assignments.is_empty() {
            return "(no parameters)".to_string();
        }
        self.assignments
            .iter()
            .map(|a| format!("{}={}", short_name(&a.parameter), render_value(&a.value)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn short_name(key: &str) -> &str {
    key.split_once('.').map(|(_, name)| name).unwrap_or(key)
}

/// Builds `max |domain|` combinations where combination `i` takes value
/// `i mod |domain|` of each parameter, then drops duplicates keeping the
/// first occurrence. Zero parameters yield exactly one empty combination.
pub fn generate(domains: &[(String, ValueDomain)]) -> Vec<Combination> {
    let rounds = domains.iter().map(|(_, d)| d.len()).max().unwrap_or(0);
    if domains.is_empty() || rounds == 0 {
        return vec![Combination::default()];
    }

    let mut combinations: Vec<Combination> = Vec::with_capacity(rounds);
    for i in 0..rounds {
        let assignments = domains
            .iter()
            .filter_map(|(key, domain)| {
                let sample = domain.get(i % domain.len().max(1))?;
                Some(Assignment {
                    parameter: key.clone(),
                    value: sample.value.clone(),
                    kind: sample.kind,
                })
            })
            .collect();
        let combination = Combination { assignments };
        if !combinations.contains(&combination) {
            combinations.push(combination);
        }
    }

    combinations
}

/// Every (parameter, rendered value) pair present in the combinations.
pub fn covered_pairs(combinations: &[Combination]) -> BTreeSet<(String, String)> {
    combinations
        .iter()
        .flat_map(|c| c.assignments.iter())
        .map(|a| (a.parameter.clone(), a.value.to_string()))
        .collect()
}

/// Every (parameter, rendered value) pair the domains define.
pub fn required_pairs(domains: &[(String, ValueDomain)]) -> BTreeSet<(String, String)> {
    domains
        .iter()
        .flat_map(|(key, domain)| {
            domain
                .values()
                .iter()
                .map(move |v| (key.clone(), v.value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainBuilder;
    use crate::schema::{Constraints, ParamLocation, ParamType, Parameter};
    use serde_json::json;

    fn domain_of(param_type: ParamType, constraints: Constraints) -> ValueDomain {
        let param = Parameter {
            constraints,
            ..Parameter::new("x", ParamLocation::Query, param_type)
        };
        DomainBuilder::default().build(&param)
    }

    #[test]
    fn test_cyclic_assignment_wraps_short_domains() {
        let domains = vec![
            ("query.flag".to_string(), domain_of(ParamType::Boolean, Constraints::default())),
            (
                "query.size".to_string(),
                domain_of(
                    ParamType::String,
                    Constraints {
                        enum_values: vec![json!("s"), json!("m"), json!("l")],
                        ..Default::default()
                    },
                ),
            ),
        ];
        let combos = generate(&domains);
        assert_eq!(combos.len(), 3);
        assert_eq!(combos[2].get("query.flag"), Some(&json!(true)));
        assert_eq!(combos[2].get("query.size"), Some(&json!("l")));
        assert_eq!(covered_pairs(&combos), required_pairs(&domains));
    }

    #[test]
    fn test_zero_parameters_give_one_empty_combination() {
        let combos = generate(&[]);
        assert_eq!(combos.len(), 1);
        assert!(combos[0].is_empty());
        assert_eq!(combos[0].describe(), "(no parameters)");
    }

    #[test]
    fn test_describe_uses_short_names() {
        let domains = vec![("path.id".to_string(), domain_of(ParamType::String, Constraints::default()))];
        let combos = generate(&domains);
        assert_eq!(combos[0].describe(), "id=\"string\"");
    }
}
