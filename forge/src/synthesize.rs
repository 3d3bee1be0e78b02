//! Code synthesis: one generated file per plan component plus an orchestrator.
//!
//! Generation is sequential in plan order. Every file is produced before any
//! is written, so a failed engine call leaves the output directory untouched.

use std::path::{Path, PathBuf};

use minijinja::context;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::core::framework::{
    FrameworkKind, GraphWiring, LanguageKind, component_filename, is_plain_file_stem,
    orchestrator_filename,
};
use crate::core::plan::{Component, Plan};
use crate::io::config::write_atomic;
use crate::io::engine::{EngineError, ReasoningEngine};
use crate::prompt::{
    self, COMPONENT, ORCHESTRATOR_GRAPH_LISTING, ORCHESTRATOR_GRAPH_PYTHON, ORCHESTRATOR_STUB,
};

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("plan declares no components")]
    MissingComponents,
    #[error("component name {component:?} cannot be used as a file name")]
    UnsafeComponentName { component: String },
    #[error("code generation failed for component {component}: {source}")]
    Generation {
        component: String,
        #[source]
        source: EngineError,
    },
    #[error("render {target}: {message}")]
    Render { target: String, message: String },
    #[error("write {}: {message}", .path.display())]
    Persist { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub name: String,
    pub content: String,
    /// Content length in characters.
    pub size: usize,
}

impl GeneratedFile {
    fn new(name: String, content: String) -> Self {
        let size = content.chars().count();
        Self {
            name,
            content,
            size,
        }
    }

    pub fn summary(&self) -> FileSummary {
        FileSummary {
            name: self.name.clone(),
            size: self.size,
        }
    }
}

/// Name and size of a generated file, as reported in pipeline summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisStatus {
    /// Files exist in memory only.
    Generated,
    /// Files were also written to the output directory.
    Persisted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SynthesisOutput {
    pub status: SynthesisStatus,
    pub files: Vec<GeneratedFile>,
}

impl SynthesisOutput {
    pub fn summaries(&self) -> Vec<FileSummary> {
        self.files.iter().map(GeneratedFile::summary).collect()
    }
}

pub struct CodeSynthesizer<'a, E: ReasoningEngine> {
    engine: &'a E,
    output_dir: PathBuf,
    persist: bool,
}

impl<'a, E: ReasoningEngine> CodeSynthesizer<'a, E> {
    pub fn new(engine: &'a E, output_dir: impl Into<PathBuf>, persist: bool) -> Self {
        Self {
            engine,
            output_dir: output_dir.into(),
            persist,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Generate every component file and the orchestrator, then persist them
    /// when enabled.
    #[instrument(skip_all, fields(framework = %plan.framework, language = %plan.language, components = plan.components.len()))]
    pub fn synthesize(&self, plan: &Plan) -> Result<SynthesisOutput, SynthesisError> {
        if plan.components.is_empty() {
            return Err(SynthesisError::MissingComponents);
        }
        if let Some(bad) = plan
            .components
            .names()
            .into_iter()
            .find(|name| !is_plain_file_stem(name))
        {
            return Err(SynthesisError::UnsafeComponentName {
                component: bad.to_string(),
            });
        }
        let language = LanguageKind::from_name(&plan.language);

        let mut files: Vec<GeneratedFile> = Vec::new();
        for component in &plan.components {
            let content = self.generate_component(plan, component)?;
            push_file(
                &mut files,
                GeneratedFile::new(component_filename(&component.name, language), content),
            );
        }

        let orchestrator = render_orchestrator(plan, language)?;
        push_file(
            &mut files,
            GeneratedFile::new(orchestrator_filename(language), orchestrator),
        );

        if !self.persist {
            return Ok(SynthesisOutput {
                status: SynthesisStatus::Generated,
                files,
            });
        }

        for file in &files {
            let path = self.output_dir.join(&file.name);
            write_atomic(&path, file.content.as_bytes()).map_err(|err| {
                SynthesisError::Persist {
                    path: path.clone(),
                    message: format!("{err:#}"),
                }
            })?;
            debug!(path = %path.display(), size = file.size, "wrote generated file");
        }
        info!(
            files = files.len(),
            output_dir = %self.output_dir.display(),
            "generated files persisted"
        );
        Ok(SynthesisOutput {
            status: SynthesisStatus::Persisted,
            files,
        })
    }

    fn generate_component(
        &self,
        plan: &Plan,
        component: &Component,
    ) -> Result<String, SynthesisError> {
        let spec = &component.spec;
        let request = prompt::render(
            COMPONENT,
            context! {
                name => &component.name,
                description => spec.description.as_deref().unwrap_or("N/A"),
                inputs => list_repr(&spec.inputs),
                outputs => list_repr(&spec.outputs),
                dependencies => list_repr(&spec.dependencies),
                framework => &plan.framework,
                language => &plan.language,
                llm => &plan.llm,
                embedding_model => plan.embedding_model.as_deref().unwrap_or("N/A"),
            },
        )
        .map_err(|err| SynthesisError::Render {
            target: component.name.clone(),
            message: format!("{err:#}"),
        })?;

        debug!(component = %component.name, "generating component");
        self.engine
            .invoke(&request)
            .map(|response| response.trim().to_string())
            .map_err(|source| SynthesisError::Generation {
                component: component.name.clone(),
                source,
            })
    }
}

/// Add `file`, replacing any earlier file of the same name in place.
fn push_file(files: &mut Vec<GeneratedFile>, file: GeneratedFile) {
    match files.iter_mut().find(|existing| existing.name == file.name) {
        Some(existing) => *existing = file,
        None => files.push(file),
    }
}

fn list_repr(items: &[Value]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn render_orchestrator(plan: &Plan, language: LanguageKind) -> Result<String, SynthesisError> {
    let render_err = |err: anyhow::Error| SynthesisError::Render {
        target: orchestrator_filename(language),
        message: format!("{err:#}"),
    };
    let rendered = match FrameworkKind::from_name(&plan.framework) {
        FrameworkKind::Graph => {
            let wiring =
                GraphWiring::linear(&plan.components).ok_or(SynthesisError::MissingComponents)?;
            if language == LanguageKind::Python {
                prompt::render(
                    ORCHESTRATOR_GRAPH_PYTHON,
                    context! {
                        nodes => wiring.nodes,
                        edges => wiring.edges,
                        entry => wiring.entry,
                        terminal => wiring.terminal,
                    },
                )
            } else {
                prompt::render(
                    ORCHESTRATOR_GRAPH_LISTING,
                    context! {
                        c => language.line_comment(),
                        language => &plan.language,
                        ext => language.extension(),
                        nodes => wiring.nodes,
                        edges => wiring.edges,
                        entry => wiring.entry,
                        terminal => wiring.terminal,
                    },
                )
            }
        }
        FrameworkKind::Other(name) => {
            let framework = if name.is_empty() {
                "unspecified framework".to_string()
            } else {
                name
            };
            prompt::render(
                ORCHESTRATOR_STUB,
                context! {
                    c => language.line_comment(),
                    framework => framework,
                    names => plan.components.names(),
                },
            )
        }
    };
    let mut text = rendered.map_err(render_err)?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::plan::normalize_plan;
    use crate::test_support::{ScriptedEngine, reader_writer_plan};
    use serde_json::json;

    fn two_responses() -> ScriptedEngine {
        ScriptedEngine::new(vec![
            Ok("  def Reader(state):\n    return state\n".to_string()),
            Ok("def Writer(state):\n    return state".to_string()),
        ])
    }

    #[test]
    fn graph_plan_yields_component_files_and_wired_orchestrator() {
        let engine = two_responses();
        let synthesizer = CodeSynthesizer::new(&engine, "unused", false);
        let plan = normalize_plan(&reader_writer_plan("graph", "python")).plan;

        let output = synthesizer.synthesize(&plan).expect("synthesize");

        assert_eq!(output.status, SynthesisStatus::Generated);
        let names: Vec<&str> = output.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["reader.py", "writer.py", "main.py"]);
        assert_eq!(output.files[0].content, "def Reader(state):\n    return state");
        assert_eq!(output.files[0].size, output.files[0].content.chars().count());

        let main = &output.files[2].content;
        assert!(main.contains("from reader import Reader"));
        assert!(main.contains(r#"graph.add_edge("Reader", "Writer")"#));
        assert!(main.contains(r#"graph.set_entry_point("Reader")"#));
        assert!(main.contains(r#"graph.add_edge("Writer", END)"#));
        let reader_node = main.find(r#"add_node("Reader""#).expect("reader node");
        let writer_node = main.find(r#"add_node("Writer""#).expect("writer node");
        assert!(reader_node < writer_node);
    }

    #[test]
    fn component_prompt_carries_plan_metadata() {
        let engine = two_responses();
        let synthesizer = CodeSynthesizer::new(&engine, "unused", false);
        let plan = normalize_plan(&reader_writer_plan("graph", "python")).plan;

        synthesizer.synthesize(&plan).expect("synthesize");

        let prompts = engine.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains("- Name: Reader"));
        assert!(prompts[0].contains("- LLM Model: gpt-4"));
        assert!(prompts[0].contains(r#"- Inputs: ["query"]"#));
        assert!(prompts[1].contains("- Name: Writer"));
    }

    #[test]
    fn graph_plan_for_other_language_lists_wiring_in_comments() {
        let engine = two_responses();
        let synthesizer = CodeSynthesizer::new(&engine, "unused", false);
        let plan = normalize_plan(&reader_writer_plan("LangGraph", "rust")).plan;

        let output = synthesizer.synthesize(&plan).expect("synthesize");

        let names: Vec<&str> = output.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["reader.rs", "writer.rs", "main.rs"]);
        let main = &output.files[2].content;
        assert!(main.contains("// entry: Reader"));
        assert!(main.contains("// edge: Reader -> Writer"));
        assert!(main.contains("// terminal: Writer"));
    }

    #[test]
    fn unknown_framework_gets_stub_naming_it() {
        let engine = two_responses();
        let synthesizer = CodeSynthesizer::new(&engine, "unused", false);
        let plan = normalize_plan(&reader_writer_plan("crewai", "cobol")).plan;

        let output = synthesizer.synthesize(&plan).expect("synthesize");

        let main = output.files.last().expect("orchestrator");
        assert_eq!(main.name, "main.txt");
        assert!(main.content.contains("# Orchestrator for crewai"));
        assert!(main.content.contains("Reader, Writer"));
    }

    #[test]
    fn missing_components_is_a_configuration_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("out");
        let engine = ScriptedEngine::new(Vec::new());
        let synthesizer = CodeSynthesizer::new(&engine, &out, true);
        let plan = normalize_plan(&json!({"framework": "graph", "language": "python", "llm": "x"})).plan;

        let err = synthesizer.synthesize(&plan).expect_err("should fail");

        assert!(matches!(err, SynthesisError::MissingComponents));
        assert!(!out.exists());
        assert!(engine.prompts().is_empty());
    }

    #[test]
    fn path_like_component_name_is_rejected_before_generation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("out");
        let engine = two_responses();
        let synthesizer = CodeSynthesizer::new(&engine, &out, true);
        let plan = normalize_plan(&json!({
            "framework": "graph",
            "language": "python",
            "llm": "x",
            "components": {"Reader": {}, "../Escaped": {}}
        }))
        .plan;

        let err = synthesizer.synthesize(&plan).expect_err("should fail");

        match err {
            SynthesisError::UnsafeComponentName { component } => assert_eq!(component, "../Escaped"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(engine.prompts().is_empty());
        assert!(!out.exists());
        assert!(!temp.path().join("escaped.py").exists());
    }

    #[test]
    fn generation_failure_writes_nothing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("out");
        let engine = ScriptedEngine::new(vec![
            Ok("ok".to_string()),
            Err(EngineError::Timeout { timeout_secs: 1 }),
        ]);
        let synthesizer = CodeSynthesizer::new(&engine, &out, true);
        let plan = normalize_plan(&reader_writer_plan("graph", "python")).plan;

        let err = synthesizer.synthesize(&plan).expect_err("should fail");

        match err {
            SynthesisError::Generation { component, source } => {
                assert_eq!(component, "Writer");
                assert!(source.is_timeout());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!out.exists());
    }

    #[test]
    fn persisted_files_overwrite_existing_ones() {
        let temp = tempfile::tempdir().expect("tempdir");
        let out = temp.path().join("out");
        std::fs::create_dir_all(&out).expect("mkdir");
        std::fs::write(out.join("reader.py"), "stale").expect("seed");
        let engine = two_responses();
        let synthesizer = CodeSynthesizer::new(&engine, &out, true);
        let plan = normalize_plan(&reader_writer_plan("graph", "python")).plan;

        let output = synthesizer.synthesize(&plan).expect("synthesize");

        assert_eq!(output.status, SynthesisStatus::Persisted);
        for file in &output.files {
            let on_disk = std::fs::read_to_string(out.join(&file.name)).expect("read");
            assert_eq!(on_disk, file.content);
        }
        assert_ne!(
            std::fs::read_to_string(out.join("reader.py")).expect("read"),
            "stale"
        );
    }

    #[test]
    fn size_counts_characters_not_bytes() {
        let engine = ScriptedEngine::new(vec![
            Ok("print('café')".to_string()),
            Ok("print('→')".to_string()),
        ]);
        let synthesizer = CodeSynthesizer::new(&engine, "unused", false);
        let plan = normalize_plan(&reader_writer_plan("custom", "python")).plan;

        let output = synthesizer.synthesize(&plan).expect("synthesize");

        assert_eq!(output.files[0].size, 13);
        assert_eq!(output.files[0].content.len(), 14);
        assert_eq!(output.files[1].size, 10);
        assert_eq!(output.files[0].summary().size, 13);
    }

    #[test]
    fn colliding_filenames_keep_first_position_with_last_content() {
        let engine = ScriptedEngine::new(vec![
            Ok("first".to_string()),
            Ok("second".to_string()),
            Ok("component main".to_string()),
        ]);
        let synthesizer = CodeSynthesizer::new(&engine, "unused", false);
        let plan = normalize_plan(&json!({
            "framework": "custom",
            "language": "python",
            "llm": "x",
            "components": {"Parser": {}, "PARSER": {}, "Main": {}}
        }))
        .plan;

        let output = synthesizer.synthesize(&plan).expect("synthesize");

        let names: Vec<&str> = output.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["parser.py", "main.py"]);
        assert_eq!(output.files[0].content, "second");
        assert!(output.files[1].content.contains("Orchestrator for custom"));
    }
}
