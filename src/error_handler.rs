use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// A recoverable condition met during a run. Every one of these ends up in
/// the printed summary and in the run summary file.
#[derive(Debug, Clone)]
pub struct ProcessingIssue {
    pub kind: IssueKind,
    /// Endpoint key, chunk number, requirement id or file the issue is about.
    pub context: Option<String>,
    pub message: String,
    pub recoverable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueKind {
    SchemaWarning,
    ConstraintFallback,
    OrphanedRequirement,
    UnparseableResponse,
    ChunkFailure,
    DocumentExtraction,
    Configuration,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::SchemaWarning => "schema warning",
            IssueKind::ConstraintFallback => "constraint fallback",
            IssueKind::OrphanedRequirement => "orphaned requirement",
            IssueKind::UnparseableResponse => "unparseable response",
            IssueKind::ChunkFailure => "chunk failure",
            IssueKind::DocumentExtraction => "document extraction",
            IssueKind::Configuration => "configuration",
        };
        f.write_str(label)
    }
}

impl fmt::Display for ProcessingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "[{}] {}: {}", self.kind, context, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

pub struct ErrorHandler {
    fail_fast: bool,
    issues: Vec<ProcessingIssue>,
}

impl ErrorHandler {
    pub fn new(fail_fast: bool) -> Self {
        Self {
            fail_fast,
            issues: Vec::new(),
        }
    }

    /// Records the issue and reports whether the pipeline may continue.
    pub fn handle(&mut self, issue: ProcessingIssue) -> bool {
        warn!(kind = %issue.kind, context = issue.context.as_deref().unwrap_or("-"), "{}", issue.message);

        let should_continue = match issue.kind {
            // Configuration errors are always critical
            IssueKind::Configuration => false,
            IssueKind::ChunkFailure => !self.fail_fast,
            _ => issue.recoverable,
        };

        self.issues.push(issue);
        should_continue
    }

    pub fn record(&mut self, kind: IssueKind, context: Option<String>, message: impl Into<String>) {
        self.handle(ProcessingIssue {
            kind,
            context,
            message: message.into(),
            recoverable: kind != IssueKind::Configuration,
        });
    }

    pub fn issues(&self) -> &[ProcessingIssue] {
        &self.issues
    }

    pub fn count(&self, kind: IssueKind) -> usize {
        self.issues.iter().filter(|i| i.kind == kind).count()
    }

    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn get_summary(&self) -> BTreeMap<IssueKind, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Plain-text block for report files.
    pub fn format_report(&self) -> String {
        if self.issues.is_empty() {
            return "No issues recorded.\n".to_string();
        }

        let mut out = String::new();
        for (kind, count) in self.get_summary() {
            out.push_str(&format!("{}: {}\n", kind, count));
        }
        out.push('\n');
        for issue in &self.issues {
            out.push_str(&format!("- {}\n", issue));
        }
        out
    }

    pub fn print_summary(&self) {
        if !self.has_issues() {
            return;
        }

        println!("\n📊 Processing Summary");
        println!("===================");
        for (kind, count) in self.get_summary() {
            let marker = match kind {
                IssueKind::ChunkFailure | IssueKind::Configuration => "❌",
                _ => "⚠️ ",
            };
            println!("{} {}: {}", marker, kind, count);
        }
        for issue in self.issues.iter().take(20) {
            println!("   {}", issue);
        }
        if self.issues.len() > 20 {
            println!("   ... and {} more (see run_summary.txt)", self.issues.len() - 20);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_failures_continue_unless_fail_fast() {
        let issue = ProcessingIssue {
            kind: IssueKind::ChunkFailure,
            context: Some("chunk 2".to_string()),
            message: "rate limited".to_string(),
            recoverable: true,
        };

        let mut lenient = ErrorHandler::new(false);
        assert!(lenient.handle(issue.clone()));

        let mut strict = ErrorHandler::new(true);
        assert!(!strict.handle(issue));
        assert_eq!(strict.count(IssueKind::ChunkFailure), 1);
    }

    #[test]
    fn test_configuration_is_never_continuable() {
        let mut handler = ErrorHandler::new(false);
        let carry_on = handler.handle(ProcessingIssue {
            kind: IssueKind::Configuration,
            context: None,
            message: "missing API key".to_string(),
            recoverable: true,
        });
        assert!(!carry_on);
    }

    #[test]
    fn test_report_lists_every_issue() {
        let mut handler = ErrorHandler::new(false);
        handler.record(IssueKind::SchemaWarning, None, "missing info");
        handler.record(IssueKind::OrphanedRequirement, Some("REQ-1".to_string()), "GET /gone");

        let report = handler.format_report();
        assert!(report.contains("schema warning: 1"));
        assert!(report.contains("[orphaned requirement] REQ-1: GET /gone"));
    }
}
