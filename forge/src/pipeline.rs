//! Orchestration for a single `forge run`.
//!
//! A linear sequence of gates: compose, validate the composed instruction,
//! produce a plan, validate the plan, normalize it, synthesize code. A `fail`
//! report or a stage fault ends the run with a result tagged by that stage.
//! Nothing is retried here; retries belong to the plan producer.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::compose::PromptComposer;
use crate::core::plan::{Plan, normalize_plan};
use crate::core::report::ValidationReport;
use crate::io::config::ForgeConfig;
use crate::io::embedder::Embedder;
use crate::io::engine::ReasoningEngine;
use crate::io::knowledge::KnowledgeStore;
use crate::planner::PlanProducer;
use crate::synthesize::{CodeSynthesizer, FileSummary};
use crate::validate::{
    PLAN_VALIDATION_INSTRUCTION, ResponseValidator, ValidateOptions, plan_schema,
};

/// Configuration for a single pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub output_dir: PathBuf,
    pub persist: bool,
    /// Number of memory records retrieved for the composed prompt.
    pub retrieval_k: usize,
    pub max_length: usize,
    pub external_check: bool,
}

impl PipelineConfig {
    pub fn from_forge(cfg: &ForgeConfig) -> Self {
        Self {
            output_dir: cfg.output_dir.clone(),
            persist: cfg.persist,
            retrieval_k: cfg.retrieval_k,
            max_length: cfg.validator.max_length,
            external_check: cfg.validator.external_check,
        }
    }
}

/// Collaborators injected into [`run_pipeline`].
pub struct PipelineDeps<'a, E: ReasoningEngine, P: PlanProducer, M: Embedder> {
    pub engine: &'a E,
    pub planner: &'a P,
    pub store: &'a KnowledgeStore<M>,
}

/// Summary carried by a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub objective: String,
    pub plan: Plan,
    pub plan_validation: ValidationReport,
    pub generated_files: Vec<FileSummary>,
    /// Absolute location of the generated files.
    pub output_dir: PathBuf,
}

/// Terminal state of a run, tagged by the stage where it stopped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineOutcome {
    PromptValidation {
        #[serde(skip_serializing_if = "Option::is_none")]
        report: Option<ValidationReport>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    ReaderPlanning {
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        attempts: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        validation_report: Option<ValidationReport>,
    },
    PlanValidation {
        report: ValidationReport,
    },
    CodeGeneration {
        error: String,
    },
    Done(Box<PipelineSummary>),
}

impl PipelineOutcome {
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineOutcome::PromptValidation { .. } => "prompt_validation",
            PipelineOutcome::ReaderPlanning { .. } => "reader_planning",
            PipelineOutcome::PlanValidation { .. } => "plan_validation",
            PipelineOutcome::CodeGeneration { .. } => "code_generation",
            PipelineOutcome::Done(_) => "done",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: PipelineOutcome,
}

impl PipelineResult {
    fn halted(outcome: PipelineOutcome) -> Self {
        warn!(stage = outcome.stage(), "pipeline halted");
        Self {
            success: false,
            outcome,
        }
    }

    fn done(summary: PipelineSummary) -> Self {
        Self {
            success: true,
            outcome: PipelineOutcome::Done(Box::new(summary)),
        }
    }

    pub fn stage(&self) -> &'static str {
        self.outcome.stage()
    }

    pub fn summary(&self) -> Option<&PipelineSummary> {
        match &self.outcome {
            PipelineOutcome::Done(summary) => Some(summary.as_ref()),
            _ => None,
        }
    }
}

/// Run the full pipeline for one objective.
#[instrument(skip_all, fields(objective_chars = objective.chars().count()))]
pub fn run_pipeline<E, P, M>(
    objective: &str,
    deps: &PipelineDeps<'_, E, P, M>,
    config: &PipelineConfig,
) -> PipelineResult
where
    E: ReasoningEngine,
    P: PlanProducer,
    M: Embedder,
{
    let validator = ResponseValidator::new(deps.engine, config.max_length);

    let instruction = match PromptComposer::new(deps.store).compose(objective, config.retrieval_k)
    {
        Ok(instruction) => instruction,
        Err(err) => {
            error!(err = %format!("{err:#}"), "prompt composition failed");
            return PipelineResult::halted(PipelineOutcome::PromptValidation {
                report: None,
                error: Some(format!("{err:#}")),
            });
        }
    };
    info!(chars = instruction.chars().count(), "composed instruction");

    let prompt_report = validator.validate(
        &instruction,
        &ValidateOptions {
            schema: None,
            instruction: Some(objective),
            require_json: false,
            run_external_check: config.external_check,
        },
    );
    info!(status = prompt_report.status.as_str(), "prompt validated");
    if prompt_report.status.is_fail() {
        return PipelineResult::halted(PipelineOutcome::PromptValidation {
            report: Some(prompt_report),
            error: None,
        });
    }

    let produced = deps.planner.produce(&instruction, objective);
    let raw_plan = match produced.plan {
        Some(plan) if produced.success => plan,
        _ => {
            return PipelineResult::halted(PipelineOutcome::ReaderPlanning {
                error: produced.error,
                attempts: produced.attempts,
                validation_report: produced.validation_report,
            });
        }
    };
    info!(attempts = produced.attempts, "plan produced");

    let plan_report = validate_plan(&validator, &raw_plan, config.external_check);
    info!(status = plan_report.status.as_str(), "plan validated");
    if plan_report.status.is_fail() {
        return PipelineResult::halted(PipelineOutcome::PlanValidation {
            report: plan_report,
        });
    }

    let normalized = normalize_plan(&raw_plan);
    if !normalized.overwritten.is_empty() {
        warn!(
            names = ?normalized.overwritten,
            "duplicate component names; later declarations replaced earlier ones"
        );
    }
    let plan = normalized.plan;

    let synthesizer = CodeSynthesizer::new(deps.engine, &config.output_dir, config.persist);
    let output = match synthesizer.synthesize(&plan) {
        Ok(output) => output,
        Err(err) => {
            error!(err = %err, "code generation failed");
            return PipelineResult::halted(PipelineOutcome::CodeGeneration {
                error: err.to_string(),
            });
        }
    };
    info!(files = output.files.len(), "pipeline complete");

    PipelineResult::done(PipelineSummary {
        objective: objective.to_string(),
        plan,
        plan_validation: plan_report,
        generated_files: output.summaries(),
        output_dir: absolute_dir(&config.output_dir),
    })
}

fn validate_plan<E: ReasoningEngine>(
    validator: &ResponseValidator<E>,
    raw_plan: &Value,
    external_check: bool,
) -> ValidationReport {
    let plan_text = match serde_json::to_string(raw_plan) {
        Ok(text) => text,
        Err(err) => err.to_string(),
    };
    validator.validate(
        &plan_text,
        &ValidateOptions {
            schema: Some(plan_schema()),
            instruction: Some(PLAN_VALIDATION_INSTRUCTION),
            require_json: true,
            run_external_check: external_check,
        },
    )
}

fn absolute_dir(dir: &Path) -> PathBuf {
    std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::embedder::HashingEmbedder;
    use crate::planner::PlanOutcome;
    use crate::test_support::ScriptedEngine;
    use serde_json::json;

    struct FailingPlanner;

    impl PlanProducer for FailingPlanner {
        fn produce(&self, _instruction: &str, _objective: &str) -> PlanOutcome {
            PlanOutcome::failed("planner gave up", 3, None)
        }
    }

    #[test]
    fn planner_failure_surfaces_error_and_attempts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = KnowledgeStore::new(temp.path().join("mem"), HashingEmbedder::new(64));
        let engine = ScriptedEngine::new(Vec::new());
        let deps = PipelineDeps {
            engine: &engine,
            planner: &FailingPlanner,
            store: &store,
        };
        let config = PipelineConfig {
            output_dir: temp.path().join("out"),
            persist: true,
            retrieval_k: 3,
            max_length: 2500,
            external_check: false,
        };

        let result = run_pipeline("build a todo app", &deps, &config);

        assert!(!result.success);
        assert_eq!(result.stage(), "reader_planning");
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["stage"], json!("reader_planning"));
        assert_eq!(value["error"], json!("planner gave up"));
        assert_eq!(value["attempts"], json!(3));
        assert!(value.get("validation_report").is_none());
        assert!(!temp.path().join("out").exists());
    }

    #[test]
    fn outcome_stage_names_match_serialized_tag() {
        let outcomes = [
            PipelineOutcome::PromptValidation {
                report: None,
                error: Some("x".to_string()),
            },
            PipelineOutcome::CodeGeneration {
                error: "x".to_string(),
            },
        ];
        for outcome in outcomes {
            let value = serde_json::to_value(&outcome).expect("serialize");
            assert_eq!(value["stage"], json!(outcome.stage()));
        }
    }
}
