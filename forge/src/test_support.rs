//! Test-only helpers: scripted reasoning engines, fixed insights and plans,
//! and a scratch workspace.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

use crate::core::insight::{BehavioralInsights, CorrectiveKnowledge, InsightPackage, SystemContext};
use crate::io::embedder::HashingEmbedder;
use crate::io::engine::{EngineError, ReasoningEngine};
use crate::io::knowledge::KnowledgeStore;
use crate::pipeline::PipelineConfig;

/// Replays queued responses in order and records every prompt it receives.
///
/// An exhausted queue answers with [`EngineError::EmptyResponse`].
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    responses: RefCell<VecDeque<Result<String, EngineError>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedEngine {
    pub fn new(responses: Vec<Result<String, EngineError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ReasoningEngine for ScriptedEngine {
    fn invoke(&self, prompt: &str) -> Result<String, EngineError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or(Err(EngineError::EmptyResponse))
    }
}

/// Answers by prompt kind: fidelity checks, planning requests, and component
/// requests each get their own response.
#[derive(Debug)]
pub struct RoutingEngine {
    rating: String,
    plan: String,
    fail_component: Option<String>,
    prompts: RefCell<Vec<String>>,
}

impl RoutingEngine {
    /// Rates everything highly and plans the Reader/Writer graph plan.
    pub fn new() -> Self {
        Self {
            rating: passing_rating(),
            plan: sample_plan_json(),
            fail_component: None,
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn with_rating(mut self, rating: impl Into<String>) -> Self {
        self.rating = rating.into();
        self
    }

    pub fn with_plan(mut self, plan: impl Into<String>) -> Self {
        self.plan = plan.into();
        self
    }

    /// Make code generation for `name` fail with a timeout.
    pub fn failing_component(mut self, name: impl Into<String>) -> Self {
        self.fail_component = Some(name.into());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn prompts_containing(&self, marker: &str) -> usize {
        self.prompts
            .borrow()
            .iter()
            .filter(|p| p.contains(marker))
            .count()
    }
}

impl Default for RoutingEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReasoningEngine for RoutingEngine {
    fn invoke(&self, prompt: &str) -> Result<String, EngineError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        if prompt.starts_with("You are a strict validator.") {
            return Ok(self.rating.clone());
        }
        if prompt.starts_with("## Plan Contract") {
            return Ok(self.plan.clone());
        }
        if prompt.starts_with("## Component Contract") {
            let name = prompt
                .lines()
                .find_map(|line| line.strip_prefix("- Name: "))
                .unwrap_or("unknown")
                .trim()
                .to_string();
            if self.fail_component.as_deref() == Some(name.as_str()) {
                return Err(EngineError::Timeout { timeout_secs: 1 });
            }
            return Ok(format!("def {name}(state):\n    return state\n"));
        }
        Err(EngineError::Failed {
            code: Some(2),
            stderr: "unrecognized prompt".to_string(),
        })
    }
}

/// A rating that passes every threshold.
pub fn passing_rating() -> String {
    json!({
        "instruction_fidelity_score": 0.92,
        "safety_score": 0.98,
        "suggestions": ["Describe the persistence layer."]
    })
    .to_string()
}

/// Insight with every field populated.
pub fn sample_insight(session_id: &str) -> InsightPackage {
    InsightPackage {
        session_id: session_id.to_string(),
        system_context: SystemContext {
            preferred_llm: Some("gpt-4o".to_string()),
            preferred_embedding_model: Some("text-embedding-3-small".to_string()),
            active_tools: vec!["search".to_string(), "calculator".to_string()],
        },
        behavioral_insights: BehavioralInsights {
            user_style_preference: Some("concise modules".to_string()),
            code_framework_preference: Some("langgraph".to_string()),
            common_errors: vec!["missing retry on timeouts".to_string()],
            fix_patterns: vec!["wrap remote calls with backoff".to_string()],
        },
        corrective_knowledge: CorrectiveKnowledge {
            insight_summary: Some("Weather apps need caching of forecasts.".to_string()),
            recommendations: vec!["cache responses for ten minutes".to_string()],
            relevance_tags: vec!["weather".to_string(), "api".to_string()],
        },
    }
}

/// [`sample_insight`] with a specific preferred LLM.
pub fn insight_with_llm(session_id: &str, llm: &str) -> InsightPackage {
    let mut insight = sample_insight(session_id);
    insight.system_context.preferred_llm = Some(llm.to_string());
    insight
}

/// Raw plan with Reader then Writer, components as a list.
pub fn reader_writer_plan(framework: &str, language: &str) -> Value {
    json!({
        "framework": framework,
        "language": language,
        "llm": "gpt-4",
        "embedding_model": "text-embedding-3-small",
        "components": [
            {
                "name": "Reader",
                "description": "Reads input and extracts the task.",
                "inputs": ["query"],
                "outputs": ["task"],
                "dependencies": []
            },
            {
                "name": "Writer",
                "description": "Writes the final answer.",
                "inputs": ["task"],
                "outputs": ["answer"],
                "dependencies": ["Reader"]
            }
        ],
        "termination_policy": {"max_steps": 5},
        "files": null
    })
}

/// [`reader_writer_plan`] for a Python graph target, serialized.
pub fn sample_plan_json() -> String {
    reader_writer_plan("graph", "python").to_string()
}

/// Scratch directory holding a memory dir and an output dir.
pub struct TempWorkspace {
    dir: TempDir,
}

impl TempWorkspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.dir.path().join("rag_memory")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("generated_code")
    }

    pub fn store(&self) -> KnowledgeStore<HashingEmbedder> {
        KnowledgeStore::new(self.memory_dir(), HashingEmbedder::new(64))
    }

    /// Persisting pipeline config with the external check enabled.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            output_dir: self.output_dir(),
            persist: true,
            retrieval_k: 3,
            max_length: 2500,
            external_check: true,
        }
    }
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
