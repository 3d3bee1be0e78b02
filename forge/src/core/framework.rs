//! Framework and target-language kinds that drive orchestrator generation.

use serde::Serialize;

use crate::core::plan::Components;

/// Supported orchestration styles. Each kind has exactly one orchestrator generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameworkKind {
    /// Node/edge graph runtimes (`graph`, `langgraph`, `stategraph`).
    Graph,
    /// Anything else; carries the declared name for the stub.
    Other(String),
}

impl FrameworkKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "graph" | "langgraph" | "stategraph" => FrameworkKind::Graph,
            _ => FrameworkKind::Other(name.trim().to_string()),
        }
    }
}

/// Target language of the generated files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageKind {
    Python,
    Rust,
    TypeScript,
    JavaScript,
    Go,
    Java,
    Kotlin,
    CSharp,
    Cpp,
    Ruby,
    Unknown,
}

impl LanguageKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "python" | "python3" | "py" => LanguageKind::Python,
            "rust" | "rs" => LanguageKind::Rust,
            "typescript" | "ts" => LanguageKind::TypeScript,
            "javascript" | "js" | "node" | "nodejs" => LanguageKind::JavaScript,
            "go" | "golang" => LanguageKind::Go,
            "java" => LanguageKind::Java,
            "kotlin" | "kt" => LanguageKind::Kotlin,
            "c#" | "csharp" | "cs" => LanguageKind::CSharp,
            "c++" | "cpp" => LanguageKind::Cpp,
            "ruby" | "rb" => LanguageKind::Ruby,
            _ => LanguageKind::Unknown,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            LanguageKind::Python => "py",
            LanguageKind::Rust => "rs",
            LanguageKind::TypeScript => "ts",
            LanguageKind::JavaScript => "js",
            LanguageKind::Go => "go",
            LanguageKind::Java => "java",
            LanguageKind::Kotlin => "kt",
            LanguageKind::CSharp => "cs",
            LanguageKind::Cpp => "cpp",
            LanguageKind::Ruby => "rb",
            LanguageKind::Unknown => "txt",
        }
    }

    pub fn line_comment(self) -> &'static str {
        match self {
            LanguageKind::Python | LanguageKind::Ruby | LanguageKind::Unknown => "#",
            _ => "//",
        }
    }
}

/// True when `name` can become a file name inside the output directory: not
/// blank, no path separators, no drive or root prefix, no `..`.
pub fn is_plain_file_stem(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && !name.contains("..")
        && !name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0'))
}

/// Derived filename for a component: lowercase name plus target extension.
pub fn component_filename(name: &str, language: LanguageKind) -> String {
    format!("{}.{}", name.to_lowercase(), language.extension())
}

/// Reserved orchestrator filename for a target language.
pub fn orchestrator_filename(language: LanguageKind) -> String {
    format!("main.{}", language.extension())
}

/// Deterministic linear wiring of components in plan order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphWiring {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<(String, String)>,
    pub entry: String,
    pub terminal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub name: String,
    pub module: String,
}

impl GraphWiring {
    /// First component is the entry, last is terminal, edges follow declaration
    /// order. `None` when there are no components.
    pub fn linear(components: &Components) -> Option<Self> {
        let names = components.names();
        let entry = names.first()?.to_string();
        let terminal = names.last()?.to_string();
        let nodes = names
            .iter()
            .map(|name| GraphNode {
                name: name.to_string(),
                module: name.to_lowercase(),
            })
            .collect();
        let edges = names
            .windows(2)
            .map(|pair| (pair[0].to_string(), pair[1].to_string()))
            .collect();
        Some(Self {
            nodes,
            edges,
            entry,
            terminal,
        })
    }
}
