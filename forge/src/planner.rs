//! Plan production: turn a composed instruction into a structured plan.

use minijinja::context;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::core::extract::json_candidate;
use crate::core::report::{Issue, ValidationReport};
use crate::io::engine::ReasoningEngine;
use crate::prompt::{self, PLANNER};
use crate::validate::{ResponseValidator, ValidateOptions, plan_schema};

/// Result of a plan-production run. `plan` is set only when `success` is true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_report: Option<ValidationReport>,
}

impl PlanOutcome {
    pub fn produced(plan: Value, attempts: u32, report: ValidationReport) -> Self {
        Self {
            success: true,
            plan: Some(plan),
            error: None,
            attempts,
            validation_report: Some(report),
        }
    }

    pub fn failed(
        error: impl Into<String>,
        attempts: u32,
        report: Option<ValidationReport>,
    ) -> Self {
        Self {
            success: false,
            plan: None,
            error: Some(error.into()),
            attempts,
            validation_report: report,
        }
    }
}

/// Anything that can turn `(composed instruction, objective)` into a plan.
///
/// Retries are the producer's concern; the pipeline calls `produce` once.
pub trait PlanProducer {
    fn produce(&self, instruction: &str, objective: &str) -> PlanOutcome;
}

impl<T: PlanProducer + ?Sized> PlanProducer for &T {
    fn produce(&self, instruction: &str, objective: &str) -> PlanOutcome {
        (**self).produce(instruction, objective)
    }
}

/// Settings for [`EnginePlanner`].
#[derive(Debug, Clone, Copy)]
pub struct PlannerSettings {
    pub max_attempts: u32,
    pub max_length: usize,
    pub external_check: bool,
}

/// Default producer: asks the reasoning engine for plan JSON and validates it
/// against the plan schema, feeding rejected attempts back into the next prompt.
pub struct EnginePlanner<'a, E: ReasoningEngine> {
    engine: &'a E,
    settings: PlannerSettings,
}

/// Why a single attempt was rejected.
struct Rejection {
    feedback: Vec<String>,
    report: Option<ValidationReport>,
}

impl<'a, E: ReasoningEngine> EnginePlanner<'a, E> {
    pub fn new(engine: &'a E, settings: PlannerSettings) -> Self {
        Self { engine, settings }
    }

    fn attempt(
        &self,
        instruction: &str,
        objective: &str,
        attempt: u32,
        feedback: &[String],
    ) -> Result<(Value, ValidationReport), Rejection> {
        let planning_prompt = prompt::render(
            PLANNER,
            context! {
                instruction => instruction,
                objective => objective,
                attempt => attempt,
                feedback => feedback,
            },
        )
        .map_err(|err| Rejection {
            feedback: vec![format!("{err:#}")],
            report: None,
        })?;

        let response = self.engine.invoke(&planning_prompt).map_err(|err| Rejection {
            feedback: vec![format!("reasoning engine error: {err}")],
            report: None,
        })?;

        let candidate = json_candidate(&response).ok_or_else(|| Rejection {
            feedback: vec!["response did not contain a JSON object".to_string()],
            report: None,
        })?;

        let validator = ResponseValidator::new(self.engine, self.settings.max_length);
        let opts = ValidateOptions {
            schema: Some(plan_schema()),
            instruction: Some(objective),
            require_json: true,
            run_external_check: self.settings.external_check,
        };
        let report = validator.validate(candidate, &opts);

        let schema_mismatch = report.has_issue(|i| matches!(i, Issue::SchemaMismatch { .. }));
        match report.parsed.clone() {
            Some(plan @ Value::Object(_)) if !report.status.is_fail() && !schema_mismatch => {
                Ok((plan, report))
            }
            Some(Value::Object(_)) | None => Err(Rejection {
                feedback: report.issue_lines(),
                report: Some(report),
            }),
            Some(_) => Err(Rejection {
                feedback: vec!["plan must be a JSON object".to_string()],
                report: Some(report),
            }),
        }
    }
}

impl<E: ReasoningEngine> PlanProducer for EnginePlanner<'_, E> {
    #[instrument(skip_all, fields(max_attempts = self.settings.max_attempts))]
    fn produce(&self, instruction: &str, objective: &str) -> PlanOutcome {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut feedback: Vec<String> = Vec::new();
        let mut last_report = None;

        for attempt in 1..=max_attempts {
            debug!(attempt, "requesting plan");
            match self.attempt(instruction, objective, attempt, &feedback) {
                Ok((plan, report)) => {
                    info!(attempt, status = report.status.as_str(), "plan produced");
                    return PlanOutcome::produced(plan, attempt, report);
                }
                Err(rejection) => {
                    warn!(attempt, problems = ?rejection.feedback, "plan attempt rejected");
                    feedback = rejection.feedback;
                    if rejection.report.is_some() {
                        last_report = rejection.report;
                    }
                }
            }
        }

        let summary = if feedback.is_empty() {
            "no usable plan".to_string()
        } else {
            feedback.join("; ")
        };
        PlanOutcome::failed(
            format!("plan production failed after {max_attempts} attempts: {summary}"),
            max_attempts,
            last_report,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::report::Status;
    use crate::io::engine::EngineError;
    use crate::test_support::{ScriptedEngine, sample_plan_json};

    fn settings(max_attempts: u32) -> PlannerSettings {
        PlannerSettings {
            max_attempts,
            max_length: 2500,
            external_check: false,
        }
    }

    #[test]
    fn first_valid_plan_is_returned() {
        let engine = ScriptedEngine::new(vec![Ok(sample_plan_json())]);
        let planner = EnginePlanner::new(&engine, settings(3));

        let outcome = planner.produce("composed instruction", "build a todo app");

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.plan.as_ref().and_then(|p| p["framework"].as_str()), Some("graph"));
        assert_eq!(
            outcome.validation_report.as_ref().map(|r| r.status),
            Some(Status::Pass)
        );
        let prompts = engine.prompts();
        assert!(prompts[0].contains("## Plan Contract"));
        assert!(prompts[0].contains("composed instruction"));
        assert!(!prompts[0].contains("<previous_attempt>"));
    }

    #[test]
    fn fenced_plan_is_accepted() {
        let fenced = format!("Here you go:\n```json\n{}\n```", sample_plan_json());
        let engine = ScriptedEngine::new(vec![Ok(fenced)]);
        let planner = EnginePlanner::new(&engine, settings(1));

        let outcome = planner.produce("i", "o");
        assert!(outcome.success, "{outcome:?}");
    }

    #[test]
    fn rejected_attempt_feeds_issues_into_retry() {
        let engine = ScriptedEngine::new(vec![
            Ok(r#"{"framework": "graph"}"#.to_string()),
            Ok(sample_plan_json()),
        ]);
        let planner = EnginePlanner::new(&engine, settings(3));

        let outcome = planner.produce("i", "o");

        assert!(outcome.success);
        assert_eq!(outcome.attempts, 2);
        let prompts = engine.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("<previous_attempt>"));
        assert!(prompts[1].contains("Attempt 1 was rejected"));
        assert!(prompts[1].contains("schema mismatch"));
    }

    #[test]
    fn exhausted_attempts_report_failure() {
        let engine = ScriptedEngine::new(vec![
            Err(EngineError::EmptyResponse),
            Ok("no json here".to_string()),
        ]);
        let planner = EnginePlanner::new(&engine, settings(2));

        let outcome = planner.produce("i", "o");

        assert!(!outcome.success);
        assert!(outcome.plan.is_none());
        assert_eq!(outcome.attempts, 2);
        let error = outcome.error.unwrap_or_default();
        assert!(error.contains("after 2 attempts"), "{error}");
        assert!(error.contains("did not contain a JSON object"), "{error}");
    }

    #[test]
    fn unsafe_plan_is_rejected_with_report() {
        let unsafe_plan = sample_plan_json().replace("Reads input", "Runs a phishing campaign");
        let engine = ScriptedEngine::new(vec![Ok(unsafe_plan)]);
        let planner = EnginePlanner::new(&engine, settings(1));

        let outcome = planner.produce("i", "o");

        assert!(!outcome.success);
        let report = outcome.validation_report.expect("report");
        assert_eq!(report.status, Status::Fail);
    }
}
