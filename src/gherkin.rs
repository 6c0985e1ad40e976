//! Line-oriented Gherkin parser that flattens scenarios into rows.
//!
//! Parsing never fails: segments that cannot be turned into a scenario
//! produce a placeholder row, so the row count keeps reflecting how much of
//! the model output was usable.

use serde::Serialize;

pub const PLACEHOLDER_SCENARIO: &str = "Scenario could not be parsed";

const EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioRow {
    pub feature: String,
    pub scenario: String,
    pub tags: Vec<String>,
    pub given: Vec<String>,
    pub when: Vec<String>,
    pub then: Vec<String>,
    /// Every step in source order, keywords included.
    pub steps: Vec<String>,
    pub parsed: bool,
}

impl ScenarioRow {
    pub fn placeholder(feature: &str, detail: Option<String>) -> Self {
        Self {
            feature: feature.to_string(),
            scenario: PLACEHOLDER_SCENARIO.to_string(),
            tags: Vec::new(),
            given: Vec::new(),
            when: Vec::new(),
            then: Vec::new(),
            steps: detail.into_iter().collect(),
            parsed: false,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        !self.parsed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Given,
    When,
    Then,
}

#[derive(Debug, Default)]
struct Draft {
    name: String,
    tags: Vec<String>,
    given: Vec<String>,
    when: Vec<String>,
    then: Vec<String>,
    steps: Vec<String>,
    section: Option<Section>,
    outline: bool,
    in_examples: bool,
    example_header: Option<Vec<String>>,
    example_rows: Vec<Vec<String>>,
}

impl Draft {
    fn add_step(&mut self, keyword: &str, text: &str) {
        let section = match keyword {
            "Given" => Section::Given,
            "When" => Section::When,
            "Then" => Section::Then,
            // And/But/* continue the last opened section; a leading one counts as Given
            _ => self.section.unwrap_or(Section::Given),
        };
        self.section = Some(section);

        let step = format!("{} {}", keyword, text.trim());
        match section {
            Section::Given => self.given.push(step.clone()),
            Section::When => self.when.push(step.clone()),
            Section::Then => self.then.push(step.clone()),
        }
        self.steps.push(step);
    }

    fn add_table_row(&mut self, cells: Vec<String>) {
        if self.in_examples {
            if self.example_header.is_none() {
                self.example_header = Some(cells);
            } else {
                self.example_rows.push(cells);
            }
            return;
        }
        // Step data table: keep it with the step it belongs to
        let rendered = format!("| {} |", cells.join(" | "));
        let target = match self.section {
            Some(Section::Given) => self.given.last_mut(),
            Some(Section::When) => self.when.last_mut(),
            Some(Section::Then) => self.then.last_mut(),
            None => None,
        };
        if let Some(step) = target {
            step.push(' ');
            step.push_str(&rendered);
        }
        if let Some(step) = self.steps.last_mut() {
            step.push(' ');
            step.push_str(&rendered);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GherkinParser {
    expand_outlines: bool,
}

impl Default for GherkinParser {
    fn default() -> Self {
        Self::new(true)
    }
}

const STEP_KEYWORDS: [&str; 6] = ["Given", "When", "Then", "And", "But", "*"];

/// Splits `When I call it` (also `when: I call it`) into (`When`, `I call it`).
fn split_step(line: &str) -> Option<(&'static str, &str)> {
    STEP_KEYWORDS.iter().find_map(|&keyword| {
        let head = line.get(..keyword.len())?;
        if !head.eq_ignore_ascii_case(keyword) {
            return None;
        }
        let rest = &line[keyword.len()..];
        let rest = match rest.strip_prefix(':') {
            Some(after_colon) => after_colon,
            None if rest.starts_with(char::is_whitespace) => rest,
            None => return None,
        };
        let text = rest.trim();
        (!text.is_empty()).then_some((keyword, text))
    })
}

/// `@smoke @REQ-001` becomes `["smoke", "REQ-001"]`; a `#` ends the tag line.
fn parse_tags(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split_whitespace()
        .take_while(|token| !token.starts_with('#'))
        .filter_map(|token| token.strip_prefix('@'))
        .filter(|tag| !tag.is_empty())
        .map(String::from)
}

impl GherkinParser {
    pub fn new(expand_outlines: bool) -> Self {
        Self { expand_outlines }
    }

    pub fn parse(&self, text: &str) -> Vec<ScenarioRow> {
        let mut state = ParseState::new(self.expand_outlines);
        let mut in_doc_string = false;

        for raw in text.lines() {
            let line = raw.trim();
            if line.starts_with("\"\"\"") {
                in_doc_string = !in_doc_string;
                continue;
            }
            if in_doc_string || line.is_empty() || line.starts_with("```") || line.starts_with('#') {
                continue;
            }

            if let Some(name) = keyword_value(line, &["Feature:"]) {
                state.start_feature(name);
            } else if keyword_value(line, &["Background:"]).is_some() {
                state.start_background();
            } else if let Some(name) = keyword_value(line, &["Scenario Outline:", "Scenario Template:"]) {
                state.start_scenario(name, true);
            } else if let Some(name) = keyword_value(line, &["Scenario:", "Example:"]) {
                state.start_scenario(name, false);
            } else if keyword_value(line, &["Examples:", "Scenarios:"]).is_some() {
                state.start_examples();
            } else if line.starts_with('@') {
                state.pending_tags.extend(parse_tags(line));
            } else if line.starts_with('|') {
                let cells = line
                    .trim_matches('|')
                    .split('|')
                    .map(|cell| cell.trim().to_string())
                    .collect();
                if let Some(draft) = state.current.as_mut() {
                    draft.add_table_row(cells);
                }
            } else if let Some((keyword, step)) = split_step(line) {
                if let Some(draft) = state.current.as_mut() {
                    draft.add_step(keyword, step);
                }
            }
            // Anything else is free-form description text
        }

        state.finish(text)
    }
}

fn keyword_value<'l>(line: &'l str, keywords: &[&str]) -> Option<&'l str> {
    keywords
        .iter()
        .find_map(|keyword| line.strip_prefix(keyword))
        .map(str::trim)
}

fn with_background(background: Option<&[String]>, own: &[String]) -> Vec<String> {
    background
        .unwrap_or_default()
        .iter()
        .chain(own.iter())
        .cloned()
        .collect()
}

struct ParseState {
    expand_outlines: bool,
    feature: String,
    feature_tags: Vec<String>,
    feature_open: bool,
    feature_rows: usize,
    pending_tags: Vec<String>,
    background: Option<Draft>,
    current: Option<Draft>,
    current_is_background: bool,
    rows: Vec<ScenarioRow>,
}

impl ParseState {
    fn new(expand_outlines: bool) -> Self {
        Self {
            expand_outlines,
            feature: String::new(),
            feature_tags: Vec::new(),
            feature_open: false,
            feature_rows: 0,
            pending_tags: Vec::new(),
            background: None,
            current: None,
            current_is_background: false,
            rows: Vec::new(),
        }
    }

    fn start_feature(&mut self, name: &str) {
        self.close_current();
        self.close_feature();
        self.feature = name.to_string();
        self.feature_tags = std::mem::take(&mut self.pending_tags);
        self.feature_open = true;
        self.feature_rows = 0;
        self.background = None;
    }

    fn start_background(&mut self) {
        self.close_current();
        self.pending_tags.clear();
        self.current = Some(Draft::default());
        self.current_is_background = true;
    }

    fn start_scenario(&mut self, name: &str, outline: bool) {
        self.close_current();
        let mut tags = self.feature_tags.clone();
        for tag in std::mem::take(&mut self.pending_tags) {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        self.current = Some(Draft {
            name: name.to_string(),
            tags,
            outline,
            ..Default::default()
        });
        self.current_is_background = false;
    }

    fn start_examples(&mut self) {
        // Tags on an Examples block have no column to go to
        self.pending_tags.clear();
        if let Some(draft) = self.current.as_mut() {
            draft.in_examples = true;
            draft.example_header = None;
        }
    }

    fn close_current(&mut self) {
        let Some(draft) = self.current.take() else {
            return;
        };
        if self.current_is_background {
            self.current_is_background = false;
            self.background = Some(draft);
            return;
        }
        let rows = self.rows_for(draft);
        self.feature_rows += rows.len();
        self.rows.extend(rows);
    }

    fn close_feature(&mut self) {
        if self.feature_open && self.feature_rows == 0 {
            self.rows.push(ScenarioRow::placeholder(
                &self.feature,
                Some("feature contains no scenarios".to_string()),
            ));
        }
        self.feature_open = false;
    }

    fn rows_for(&self, draft: Draft) -> Vec<ScenarioRow> {
        if draft.steps.is_empty() {
            let mut row = ScenarioRow::placeholder(&self.feature, Some("scenario has no steps".to_string()));
            if !draft.name.is_empty() {
                row.scenario = format!("{}: {}", PLACEHOLDER_SCENARIO, draft.name);
            }
            row.tags = draft.tags;
            return vec![row];
        }

        let bg = self.background.as_ref();
        let base = ScenarioRow {
            feature: self.feature.clone(),
            scenario: draft.name.clone(),
            tags: draft.tags.clone(),
            given: with_background(bg.map(|b| b.given.as_slice()), &draft.given),
            when: with_background(bg.map(|b| b.when.as_slice()), &draft.when),
            then: with_background(bg.map(|b| b.then.as_slice()), &draft.then),
            steps: with_background(bg.map(|b| b.steps.as_slice()), &draft.steps),
            parsed: true,
        };

        let header = match (&draft.example_header, draft.outline && self.expand_outlines) {
            (Some(header), true) if !draft.example_rows.is_empty() => header,
            _ => return vec![base],
        };

        draft
            .example_rows
            .iter()
            .enumerate()
            .map(|(index, values)| {
                let substitute = |text: &str| {
                    header.iter().zip(values).fold(text.to_string(), |acc, (column, value)| {
                        acc.replace(&format!("<{}>", column), value)
                    })
                };
                let substitute_all =
                    |items: &[String]| -> Vec<String> { items.iter().map(|s| substitute(s)).collect() };
                ScenarioRow {
                    feature: base.feature.clone(),
                    scenario: format!("{} (Example {})", substitute(&base.scenario), index + 1),
                    tags: base.tags.clone(),
                    given: substitute_all(&base.given),
                    when: substitute_all(&base.when),
                    then: substitute_all(&base.then),
                    steps: substitute_all(&base.steps),
                    parsed: true,
                }
            })
            .collect()
    }

    fn finish(mut self, text: &str) -> Vec<ScenarioRow> {
        self.close_current();
        self.close_feature();

        if self.rows.is_empty() {
            let excerpt: String = text.trim().chars().take(EXCERPT_CHARS).collect();
            let detail = if excerpt.is_empty() {
                "empty response".to_string()
            } else {
                format!("raw response: {}", excerpt)
            };
            self.rows.push(ScenarioRow::placeholder("", Some(detail)));
        }
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_and_goes_to_given() {
        let rows = GherkinParser::default().parse("Feature: F\nScenario: S\nAnd a thing\nWhen x\nThen y\n");
        assert_eq!(rows[0].given, vec!["And a thing"]);
    }

    #[test]
    fn test_step_data_tables_stay_with_their_step() {
        let text = "Feature: F\nScenario: S\nGiven users\n| name |\n| ann |\nWhen listed\nThen ok\n";
        let rows = GherkinParser::default().parse(text);
        assert_eq!(rows[0].given, vec!["Given users | name | | ann |"]);
    }

    #[test]
    fn test_colon_and_lowercase_step_keywords() {
        let text = "Feature: GET /pets\nScenario: S\nGiven: the API is up\nwhen: I call it\nTHEN 200\nand: a list\n";
        let rows = GherkinParser::default().parse(text);
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_placeholder());
        assert_eq!(rows[0].given, vec!["Given the API is up"]);
        assert_eq!(rows[0].when, vec!["When I call it"]);
        assert_eq!(rows[0].then, vec!["Then 200", "And a list"]);
    }

    #[test]
    fn test_keyword_prefix_of_a_word_is_not_a_step() {
        assert_eq!(split_step("Whenever it rains"), None);
        assert_eq!(split_step("Then:"), None);
        assert_eq!(split_step("* a bullet"), Some(("*", "a bullet")));
    }

    #[test]
    fn test_tags_lose_their_at_sign() {
        let text = "@api\nFeature: F\n@smoke @REQ-001 # trailing comment\nScenario: S\nGiven a\nWhen b\nThen c\n";
        let rows = GherkinParser::default().parse(text);
        assert_eq!(rows[0].tags, vec!["api", "smoke", "REQ-001"]);
    }

    #[test]
    fn test_empty_text_is_one_placeholder() {
        let rows = GherkinParser::default().parse("   ");
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_placeholder());
        assert_eq!(rows[0].steps, vec!["empty response"]);
    }
}
