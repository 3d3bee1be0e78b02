//! Validation report model shared by every gate.
//!
//! A report is assembled once per `validate` call. Severity only moves up the
//! `pass < warn < fail` lattice and scores only move down.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gate verdict, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Warn,
    Fail,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pass => "pass",
            Status::Warn => "warn",
            Status::Fail => "fail",
        }
    }

    pub fn is_fail(self) -> bool {
        self == Status::Fail
    }
}

/// Scores in `[0, 1]`; every check starts at 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub format: f64,
    pub instruction_fidelity: f64,
    pub safety: f64,
}

impl Default for Scores {
    fn default() -> Self {
        Self {
            format: 1.0,
            instruction_fidelity: 1.0,
            safety: 1.0,
        }
    }
}

/// How the optional reasoning-engine fidelity check ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalCheck {
    /// Disabled, or no instruction was supplied.
    NotRun,
    Completed,
    Timeout,
    /// The engine could not be reached or exited with an error.
    Unavailable,
    /// The engine answered but the answer was not a usable rating.
    Malformed,
}

/// One structured finding, in the order it was detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Issue {
    TooLong { chars: usize, max_length: usize },
    Truncated,
    InvalidJson { error: String },
    SchemaMismatch { errors: Vec<String> },
    UnsafeTerms { terms: Vec<String> },
    LowFidelity { score: f64 },
    LowSafety { score: f64 },
    ExternalCheckFailed { outcome: ExternalCheck, error: String },
}

impl Issue {
    pub fn describe(&self) -> String {
        match self {
            Issue::TooLong { chars, max_length } => {
                format!("response too long ({chars} chars, max {max_length})")
            }
            Issue::Truncated => "possible truncation detected".to_string(),
            Issue::InvalidJson { error } => format!("not valid JSON: {error}"),
            Issue::SchemaMismatch { errors } => {
                format!("schema mismatch: {}", errors.join("; "))
            }
            Issue::UnsafeTerms { terms } => format!("unsafe terms: {}", terms.join(", ")),
            Issue::LowFidelity { score } => format!("low instruction fidelity ({score:.2})"),
            Issue::LowSafety { score } => format!("low safety score ({score:.2})"),
            Issue::ExternalCheckFailed { outcome, error } => {
                format!("external check {outcome:?}: {error}")
            }
        }
    }
}

/// Outcome of format, schema, safety, and fidelity checks on one artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub status: Status,
    pub scores: Scores,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub parsed: Option<Value>,
    pub external_feedback: Option<Value>,
    pub external_check: ExternalCheck,
}

impl ValidationReport {
    pub fn has_issue(&self, pred: impl Fn(&Issue) -> bool) -> bool {
        self.issues.iter().any(pred)
    }

    /// Human-readable issue list, one line per issue.
    pub fn issue_lines(&self) -> Vec<String> {
        self.issues.iter().map(Issue::describe).collect()
    }
}

/// Accumulates findings for a single report. Consumed by [`ReportBuilder::finish`].
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    status: Status,
    scores: Scores,
    issues: Vec<Issue>,
    suggestions: Vec<String>,
    parsed: Option<Value>,
    external_feedback: Option<Value>,
    external_check: ExternalCheck,
}

impl Default for ReportBuilder {
    fn default() -> Self {
        Self {
            status: Status::Pass,
            scores: Scores::default(),
            issues: Vec::new(),
            suggestions: Vec::new(),
            parsed: None,
            external_feedback: None,
            external_check: ExternalCheck::NotRun,
        }
    }
}

impl ReportBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn scores(&self) -> Scores {
        self.scores
    }

    /// Raise severity; a lower status never replaces a higher one.
    pub fn raise(&mut self, status: Status) {
        self.status = self.status.max(status);
    }

    pub fn issue(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn penalize_format(&mut self, by: f64) {
        self.scores.format = clamp_score(self.scores.format - by);
    }

    pub fn cap_format(&mut self, cap: f64) {
        self.scores.format = clamp_score(self.scores.format.min(cap));
    }

    pub fn cap_fidelity(&mut self, cap: f64) {
        self.scores.instruction_fidelity = clamp_score(self.scores.instruction_fidelity.min(cap));
    }

    pub fn cap_safety(&mut self, cap: f64) {
        self.scores.safety = clamp_score(self.scores.safety.min(cap));
    }

    pub fn parsed(&mut self, value: Value) {
        self.parsed = Some(value);
    }

    pub fn external(&mut self, outcome: ExternalCheck, feedback: Option<Value>) {
        self.external_check = outcome;
        self.external_feedback = feedback;
    }

    pub fn suggestions<I: IntoIterator<Item = String>>(&mut self, items: I) {
        self.suggestions.extend(items);
    }

    pub fn finish(self) -> ValidationReport {
        ValidationReport {
            status: self.status,
            scores: self.scores,
            issues: self.issues,
            suggestions: self.suggestions,
            parsed: self.parsed,
            external_feedback: self.external_feedback,
            external_check: self.external_check,
        }
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
