//! Prompt and generated-file templates rendered with minijinja.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::Environment;
use serde::Serialize;

pub const COMPOSE_GENERIC: &str = "compose_generic";
pub const COMPOSE_MEMORY: &str = "compose_memory";
pub const FIDELITY_CHECK: &str = "fidelity_check";
pub const PLANNER: &str = "planner";
pub const COMPONENT: &str = "component";
pub const ORCHESTRATOR_GRAPH_PYTHON: &str = "orchestrator_graph_python";
pub const ORCHESTRATOR_GRAPH_LISTING: &str = "orchestrator_graph_listing";
pub const ORCHESTRATOR_STUB: &str = "orchestrator_stub";

/// First line of every rendered fidelity-check prompt.
pub const FIDELITY_CHECK_HEADER: &str = "You are a strict validator.";
/// First line of every rendered planning prompt.
pub const PLANNER_HEADER: &str = "## Plan Contract";
/// First line of every rendered component prompt.
pub const COMPONENT_HEADER: &str = "## Component Contract";

const TEMPLATES: &[(&str, &str)] = &[
    (COMPOSE_GENERIC, include_str!("prompts/compose_generic.md")),
    (COMPOSE_MEMORY, include_str!("prompts/compose_memory.md")),
    (FIDELITY_CHECK, include_str!("prompts/fidelity_check.md")),
    (PLANNER, include_str!("prompts/planner.md")),
    (COMPONENT, include_str!("prompts/component.md")),
    (
        ORCHESTRATOR_GRAPH_PYTHON,
        include_str!("prompts/orchestrator_graph_python.j2"),
    ),
    (
        ORCHESTRATOR_GRAPH_LISTING,
        include_str!("prompts/orchestrator_graph_listing.j2"),
    ),
    (ORCHESTRATOR_STUB, include_str!("prompts/orchestrator_stub.j2")),
];

static ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    for &(name, source) in TEMPLATES {
        env.add_template(name, source)
            .expect("embedded template should be valid");
    }
    env
});

/// Render a named template; the output is trimmed and ends without a newline.
pub fn render<S: Serialize>(name: &str, ctx: S) -> Result<String> {
    let template = ENV
        .get_template(name)
        .with_context(|| format!("load template {name}"))?;
    let rendered = template
        .render(ctx)
        .with_context(|| format!("render template {name}"))?;
    Ok(rendered.trim().to_string())
}
