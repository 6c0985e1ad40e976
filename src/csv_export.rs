use anyhow::{anyhow, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::gherkin::{ScenarioRow, PLACEHOLDER_SCENARIO};

pub const CSV_HEADERS: [&str; 7] = ["Feature", "Scenario", "Tags", "Given", "When", "Then", "All Steps"];

/// Separator between steps inside one cell.
pub const STEP_SEPARATOR: &str = "; ";

/// Quotes a field when it contains a comma, quote, CR or LF.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn record(fields: &[String]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

pub fn row_fields(row: &ScenarioRow) -> [String; 7] {
    [
        row.feature.clone(),
        row.scenario.clone(),
        row.tags.join(" "),
        row.given.join(STEP_SEPARATOR),
        row.when.join(STEP_SEPARATOR),
        row.then.join(STEP_SEPARATOR),
        row.steps.join(STEP_SEPARATOR),
    ]
}

pub fn to_csv_string(rows: &[ScenarioRow]) -> String {
    let header: Vec<String> = CSV_HEADERS.iter().map(|h| h.to_string()).collect();
    let mut out = record(&header);
    for row in rows {
        out.push_str(&record(&row_fields(row)));
    }
    out
}

/// Writes `<timestamp>_<name>_scenarios.csv` into `dir` and returns its path.
pub async fn write_scenarios_csv(rows: &[ScenarioRow], dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .await
        .map_err(|e| anyhow!("Failed to create {}: {}", dir.display(), e))?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("{}_{}_scenarios.csv", timestamp, name));
    fs::write(&path, to_csv_string(rows))
        .await
        .map_err(|e| anyhow!("Failed to write {}: {}", path.display(), e))?;

    Ok(path)
}

/// Splits CSV text into records, honoring quoted fields with embedded
/// commas, doubled quotes and line breaks.
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records
}

fn cell(record: &[String], index: Option<usize>) -> String {
    index.and_then(|i| record.get(i)).cloned().unwrap_or_default()
}

fn split_steps(text: &str) -> Vec<String> {
    text.split(STEP_SEPARATOR)
        .map(str::trim)
        .filter(|step| !step.is_empty())
        .map(String::from)
        .collect()
}

/// Reads rows back from CSV text written by [`to_csv_string`]. Columns are
/// located by header name; `Feature` and `Scenario` are required.
pub fn rows_from_csv(text: &str) -> Result<Vec<ScenarioRow>> {
    let mut records = parse_records(text.trim_start_matches('\u{feff}')).into_iter();
    let header = records.next().ok_or_else(|| anyhow!("CSV is empty"))?;
    let column = |name: &str| header.iter().position(|h| h.trim().eq_ignore_ascii_case(name));
    let feature = column("Feature").ok_or_else(|| anyhow!("CSV has no 'Feature' column"))?;
    let scenario = column("Scenario").ok_or_else(|| anyhow!("CSV has no 'Scenario' column"))?;
    let [tags, given, when, then, all] = ["Tags", "Given", "When", "Then", "All Steps"].map(|name| column(name));

    Ok(records
        .filter(|record| record.iter().any(|field| !field.trim().is_empty()))
        .map(|record| {
            let scenario_name = cell(&record, Some(scenario));
            ScenarioRow {
                feature: cell(&record, Some(feature)),
                parsed: scenario_name != PLACEHOLDER_SCENARIO,
                scenario: scenario_name,
                tags: cell(&record, tags).split_whitespace().map(String::from).collect(),
                given: split_steps(&cell(&record, given)),
                when: split_steps(&cell(&record, when)),
                then: split_steps(&cell(&record, then)),
                steps: split_steps(&cell(&record, all)),
            }
        })
        .collect())
}

pub async fn read_scenarios_csv(path: &Path) -> Result<Vec<ScenarioRow>> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    rows_from_csv(&text).map_err(|e| anyhow!("{}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaping() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_steps_are_semicolon_joined() {
        let row = ScenarioRow {
            feature: "GET /pets".to_string(),
            scenario: "List pets".to_string(),
            tags: vec!["get".to_string(), "positive".to_string()],
            given: vec!["Given the API is up".to_string()],
            when: vec!["When I send a GET request to \"/pets\"".to_string()],
            then: vec!["Then the status is 200".to_string(), "And a list is returned".to_string()],
            steps: vec![
                "Given the API is up".to_string(),
                "When I send a GET request to \"/pets\"".to_string(),
                "Then the status is 200".to_string(),
                "And a list is returned".to_string(),
            ],
            parsed: true,
        };

        let csv = to_csv_string(&[row]);
        let mut lines = csv.split("\r\n");
        assert_eq!(lines.next(), Some("Feature,Scenario,Tags,Given,When,Then,All Steps"));
        let data = lines.next().unwrap();
        assert!(data.starts_with("GET /pets,List pets,get positive,Given the API is up,"));
        assert!(data.contains("Then the status is 200; And a list is returned"));
    }

    #[test]
    fn test_quoted_fields_survive_reading() {
        let records = parse_records("a,\"b,\"\"c\"\"\",\"two\nlines\"\r\nx,,z\r\n");
        assert_eq!(
            records,
            vec![
                vec!["a".to_string(), "b,\"c\"".to_string(), "two\nlines".to_string()],
                vec!["x".to_string(), String::new(), "z".to_string()],
            ]
        );
    }

    #[test]
    fn test_rows_read_back_from_written_csv() {
        let row = ScenarioRow {
            feature: "POST /pets".to_string(),
            scenario: "Create, then fetch".to_string(),
            tags: vec!["post".to_string()],
            given: vec!["Given a \"new\" pet".to_string()],
            when: vec!["When I send a POST request to \"/pets\"".to_string()],
            then: vec!["Then the status is 201".to_string()],
            steps: vec![
                "Given a \"new\" pet".to_string(),
                "When I send a POST request to \"/pets\"".to_string(),
                "Then the status is 201".to_string(),
            ],
            parsed: true,
        };
        let placeholder = ScenarioRow::placeholder("GET /pets", None);

        let rows = rows_from_csv(&to_csv_string(&[row.clone(), placeholder])).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], row);
        assert!(rows[1].is_placeholder());
    }

    #[test]
    fn test_missing_feature_column_is_an_error() {
        assert!(rows_from_csv("Name,Steps\r\nx,y\r\n").is_err());
        assert!(rows_from_csv("").is_err());
    }
}
