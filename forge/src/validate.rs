//! Response validator: format, schema, safety, and instruction-fidelity checks.
//!
//! Every step can only lower scores or raise severity. The validator never
//! fails: parse errors, schema errors, and an unreachable or confused
//! reasoning engine all end up as [`Issue`]s on the returned report.

use std::sync::LazyLock;

use minijinja::context;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::extract::json_candidate;
use crate::core::report::{ExternalCheck, Issue, ReportBuilder, Status, ValidationReport};
use crate::core::safety;
use crate::io::engine::ReasoningEngine;
use crate::prompt::{self, FIDELITY_CHECK};

pub const DEFAULT_MAX_LENGTH: usize = 2500;

const PLAN_SCHEMA_SOURCE: &str = include_str!("../schemas/plan.schema.json");

/// Instruction used when a plan is re-validated between planning and synthesis.
pub const PLAN_VALIDATION_INSTRUCTION: &str = "Validate system plan for schema compliance.";

static PLAN_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    serde_json::from_str(PLAN_SCHEMA_SOURCE).expect("embedded plan schema should be valid JSON")
});

/// The fixed plan schema: `framework`, `language`, `llm` and `components` are required.
pub fn plan_schema() -> &'static Value {
    &PLAN_SCHEMA
}

const LENGTH_PENALTY: f64 = 0.3;
const TRUNCATION_PENALTY: f64 = 0.2;
const SCHEMA_MISMATCH_FORMAT: f64 = 0.5;
const MIN_FIDELITY: f64 = 0.6;
const MIN_SAFETY: f64 = 0.5;

/// Per-call switches for [`ResponseValidator::validate`].
#[derive(Debug, Clone, Copy)]
pub struct ValidateOptions<'a> {
    pub schema: Option<&'a Value>,
    pub instruction: Option<&'a str>,
    pub require_json: bool,
    pub run_external_check: bool,
}

impl Default for ValidateOptions<'_> {
    fn default() -> Self {
        Self {
            schema: None,
            instruction: None,
            require_json: false,
            run_external_check: true,
        }
    }
}

/// Rating returned by the reasoning engine for the fidelity check.
#[derive(Debug, Clone, PartialEq)]
struct FidelityRating {
    fidelity: Option<f64>,
    safety: Option<f64>,
    suggestions: Vec<String>,
}

pub struct ResponseValidator<E: ReasoningEngine> {
    engine: E,
    max_length: usize,
}

impl<E: ReasoningEngine> ResponseValidator<E> {
    pub fn new(engine: E, max_length: usize) -> Self {
        Self { engine, max_length }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Validate `text` and return a fresh report.
    #[instrument(skip_all, fields(text_chars = tracing::field::Empty, require_json = opts.require_json, has_schema = opts.schema.is_some()))]
    pub fn validate(&self, text: &str, opts: &ValidateOptions<'_>) -> ValidationReport {
        let mut report = ReportBuilder::new();

        let chars = text.chars().count();
        tracing::Span::current().record("text_chars", chars);
        if chars > self.max_length {
            report.issue(Issue::TooLong {
                chars,
                max_length: self.max_length,
            });
            report.penalize_format(LENGTH_PENALTY);
            report.raise(Status::Warn);
        }

        let tail = text.trim_end();
        if tail.ends_with("...") || tail.ends_with('\u{2026}') {
            report.issue(Issue::Truncated);
            report.penalize_format(TRUNCATION_PENALTY);
        }

        if opts.require_json || opts.schema.is_some() {
            check_structure(text, opts.schema, &mut report);
        }

        let hits = safety::scan(text);
        if !hits.is_empty() {
            warn!(terms = ?hits, "unsafe terms detected");
            report.issue(Issue::UnsafeTerms { terms: hits });
            report.cap_safety(0.0);
            report.raise(Status::Fail);
        }

        match opts.instruction {
            Some(instruction) if opts.run_external_check => {
                self.external_check(text, instruction, &mut report);
            }
            _ => {}
        }

        let report = report.finish();
        debug!(status = report.status.as_str(), issues = report.issues.len(), "validation complete");
        report
    }

    fn external_check(&self, text: &str, instruction: &str, report: &mut ReportBuilder) {
        let check_prompt = match prompt::render(
            FIDELITY_CHECK,
            context! { instruction => instruction, text => text },
        ) {
            Ok(p) => p,
            Err(err) => {
                report.external(ExternalCheck::Unavailable, None);
                report.issue(Issue::ExternalCheckFailed {
                    outcome: ExternalCheck::Unavailable,
                    error: format!("{err:#}"),
                });
                return;
            }
        };

        let response = match self.engine.invoke(&check_prompt) {
            Ok(response) => response,
            Err(err) => {
                let outcome = if err.is_timeout() {
                    ExternalCheck::Timeout
                } else {
                    ExternalCheck::Unavailable
                };
                warn!(err = %err, "external fidelity check unavailable");
                report.external(outcome, None);
                report.issue(Issue::ExternalCheckFailed {
                    outcome,
                    error: err.to_string(),
                });
                return;
            }
        };

        let feedback = match parse_feedback(&response) {
            Ok(value) => value,
            Err(error) => {
                report.external(ExternalCheck::Malformed, None);
                report.issue(Issue::ExternalCheckFailed {
                    outcome: ExternalCheck::Malformed,
                    error,
                });
                return;
            }
        };

        let rating = match FidelityRating::from_feedback(&feedback) {
            Ok(rating) => rating,
            Err(error) => {
                report.external(ExternalCheck::Malformed, Some(feedback));
                report.issue(Issue::ExternalCheckFailed {
                    outcome: ExternalCheck::Malformed,
                    error,
                });
                return;
            }
        };

        report.external(ExternalCheck::Completed, Some(feedback));
        if let Some(score) = rating.fidelity {
            report.cap_fidelity(score);
            if score < MIN_FIDELITY {
                report.raise(Status::Warn);
                report.issue(Issue::LowFidelity { score });
            }
        }
        if let Some(score) = rating.safety {
            report.cap_safety(score);
            if score < MIN_SAFETY {
                report.raise(Status::Fail);
                report.issue(Issue::LowSafety { score });
            }
        }
        report.suggestions(rating.suggestions);
    }
}

fn check_structure(text: &str, schema: Option<&Value>, report: &mut ReportBuilder) {
    let parsed: Value = match serde_json::from_str(text.trim()) {
        Ok(value) => value,
        Err(err) => {
            report.issue(Issue::InvalidJson {
                error: err.to_string(),
            });
            report.cap_format(0.0);
            report.raise(Status::Fail);
            return;
        }
    };

    if let Some(schema) = schema {
        let errors = schema_errors(schema, &parsed);
        if !errors.is_empty() {
            report.issue(Issue::SchemaMismatch { errors });
            report.cap_format(SCHEMA_MISMATCH_FORMAT);
            report.raise(Status::Warn);
        }
    }
    report.parsed(parsed);
}

/// Validate `instance` against `schema`; an uncompilable schema is reported as
/// a single error.
pub fn schema_errors(schema: &Value, instance: &Value) -> Vec<String> {
    match jsonschema::validator_for(schema) {
        Ok(compiled) => compiled
            .iter_errors(instance)
            .map(|err| err.to_string())
            .collect(),
        Err(err) => vec![format!("invalid schema: {err}")],
    }
}

fn parse_feedback(response: &str) -> Result<Value, String> {
    let candidate = json_candidate(response)
        .ok_or_else(|| "external check response contained no JSON".to_string())?;
    let value: Value = serde_json::from_str(candidate)
        .map_err(|err| format!("external check response is not valid JSON: {err}"))?;
    if !value.is_object() {
        return Err("external check response is not a JSON object".to_string());
    }
    Ok(value)
}

impl FidelityRating {
    fn from_feedback(feedback: &Value) -> Result<Self, String> {
        Ok(Self {
            fidelity: score_field(feedback, "instruction_fidelity_score")?,
            safety: score_field(feedback, "safety_score")?,
            suggestions: suggestions_field(feedback),
        })
    }
}

fn score_field(feedback: &Value, key: &str) -> Result<Option<f64>, String> {
    match feedback.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("{key} is not a finite number")),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("{key} is not numeric: {s:?}")),
        Some(other) => Err(format!("{key} has unexpected type: {other}")),
    }
}

fn suggestions_field(feedback: &Value) -> Vec<String> {
    match feedback.get("suggestions") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}
