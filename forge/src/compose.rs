//! Retrieval-augmented instruction composer.
//!
//! Pulls the nearest corrective insights for an objective and merges them,
//! in retrieval order, ahead of the objective and a fixed design instruction.
//! With no retrieved records the composer asks for a free-form design instead.

use anyhow::Result;
use minijinja::context;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::insight::{ContextRecord, InsightPackage};
use crate::io::embedder::Embedder;
use crate::io::knowledge::KnowledgeStore;
use crate::prompt::{self, COMPOSE_GENERIC, COMPOSE_MEMORY};

/// Characters of raw record text kept when a record cannot be decoded.
pub const RAW_PREFIX_CHARS: usize = 500;

const NOT_AVAILABLE: &str = "N/A";

/// One rendered memory block.
#[derive(Debug, Clone, Serialize)]
struct MemoryBlock {
    decoded: bool,
    preferred_llm: String,
    embedding_model: String,
    active_tools: String,
    style_preference: String,
    framework_preference: String,
    common_errors: String,
    fix_patterns: String,
    insight_summary: String,
    recommendations: String,
    tags: String,
    raw: String,
}

impl MemoryBlock {
    fn from_record(record: &ContextRecord) -> Self {
        match serde_json::from_str::<InsightPackage>(&record.text) {
            Ok(insight) => Self::decoded(&insight),
            Err(err) => {
                debug!(err = %err, "memory record did not decode; using raw prefix");
                Self::degraded(&record.text)
            }
        }
    }

    fn decoded(insight: &InsightPackage) -> Self {
        let sys = &insight.system_context;
        let beh = &insight.behavioral_insights;
        let corr = &insight.corrective_knowledge;
        Self {
            decoded: true,
            preferred_llm: or_na(sys.preferred_llm.as_deref()),
            embedding_model: or_na(sys.preferred_embedding_model.as_deref()),
            active_tools: list_or_na(&sys.active_tools),
            style_preference: or_na(beh.user_style_preference.as_deref()),
            framework_preference: or_na(beh.code_framework_preference.as_deref()),
            common_errors: list_or_na(&beh.common_errors),
            fix_patterns: list_or_na(&beh.fix_patterns),
            insight_summary: or_na(corr.insight_summary.as_deref()),
            recommendations: list_or_na(&corr.recommendations),
            tags: list_or_na(&corr.relevance_tags),
            raw: String::new(),
        }
    }

    fn degraded(text: &str) -> Self {
        Self {
            decoded: false,
            preferred_llm: String::new(),
            embedding_model: String::new(),
            active_tools: String::new(),
            style_preference: String::new(),
            framework_preference: String::new(),
            common_errors: String::new(),
            fix_patterns: String::new(),
            insight_summary: String::new(),
            recommendations: String::new(),
            tags: String::new(),
            raw: text.chars().take(RAW_PREFIX_CHARS).collect(),
        }
    }
}

fn or_na(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

fn list_or_na(items: &[String]) -> String {
    if items.is_empty() {
        return NOT_AVAILABLE.to_string();
    }
    items.join(", ")
}

/// Render the instruction for `objective` from already-retrieved records.
pub fn compose_from_records(objective: &str, records: &[ContextRecord]) -> Result<String> {
    if records.is_empty() {
        return prompt::render(COMPOSE_GENERIC, context! { objective => objective.trim() });
    }
    let blocks: Vec<MemoryBlock> = records.iter().map(MemoryBlock::from_record).collect();
    prompt::render(
        COMPOSE_MEMORY,
        context! { blocks => blocks, objective => objective.trim() },
    )
}

/// Composer bound to a knowledge store.
pub struct PromptComposer<'a, M: Embedder> {
    store: &'a KnowledgeStore<M>,
}

impl<'a, M: Embedder> PromptComposer<'a, M> {
    pub fn new(store: &'a KnowledgeStore<M>) -> Self {
        Self { store }
    }

    /// Retrieve up to `k` insights for `objective` and compose the instruction.
    #[instrument(skip_all, fields(k))]
    pub fn compose(&self, objective: &str, k: usize) -> Result<String> {
        let records = self.store.retrieve(objective, k);
        debug!(records = records.len(), "composing instruction");
        compose_from_records(objective, &records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::embedder::HashingEmbedder;
    use crate::test_support::{insight_with_llm, sample_insight};

    #[test]
    fn empty_store_emits_generic_design_block() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = KnowledgeStore::new(temp.path(), HashingEmbedder::new(64));
        let text = PromptComposer::new(&store)
            .compose("build a todo app", 3)
            .expect("compose");

        assert!(text.contains("build a todo app"));
        assert!(text.contains("freely choosing any suitable framework"));
        assert!(!text.contains("Memory Block"));
        assert!(!text.contains("Corrective Memory"));
    }

    #[test]
    fn stored_insight_appears_as_memory_block() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = KnowledgeStore::new(temp.path(), HashingEmbedder::new(64));
        store.store(&insight_with_llm("s-1", "gpt-4"));

        let text = PromptComposer::new(&store)
            .compose("build a todo app", 3)
            .expect("compose");

        assert!(text.contains("[Memory Block 1]"));
        assert!(text.contains("Preferred LLM: gpt-4"));
        assert!(text.contains("build a todo app"));
        assert!(text.contains("Include modularity, a validation flow, and error handling."));
    }

    #[test]
    fn blocks_follow_retrieval_order_then_objective() {
        let records = vec![
            ContextRecord {
                text: serde_json::to_string(&insight_with_llm("a", "first-model"))
                    .expect("encode"),
                similarity_score: 0.9,
            },
            ContextRecord {
                text: serde_json::to_string(&insight_with_llm("b", "second-model"))
                    .expect("encode"),
                similarity_score: 0.4,
            },
        ];
        let text = compose_from_records("make a chat bot", &records).expect("compose");
        let first = text.find("first-model").expect("first");
        let second = text.find("second-model").expect("second");
        let objective = text.find("make a chat bot").expect("objective");
        assert!(first < second);
        assert!(second < objective);
        assert!(text.contains("[Memory Block 2]"));
    }

    #[test]
    fn undecodable_record_degrades_to_truncated_raw_block() {
        let raw = format!("plain note {}", "x".repeat(2 * RAW_PREFIX_CHARS));
        let records = vec![ContextRecord {
            text: raw.clone(),
            similarity_score: 0.5,
        }];
        let text = compose_from_records("obj", &records).expect("compose");
        assert!(text.contains("[Unparsed Memory Block 1] plain note"));
        assert!(!text.contains(&raw));
        assert!(text.contains(&raw[..RAW_PREFIX_CHARS]));
    }

    #[test]
    fn missing_fields_render_as_not_available() {
        let mut insight = sample_insight("s-1");
        insight.system_context.preferred_llm = None;
        insight.corrective_knowledge.relevance_tags.clear();
        let records = vec![ContextRecord {
            text: serde_json::to_string(&insight).expect("encode"),
            similarity_score: 1.0,
        }];
        let text = compose_from_records("obj", &records).expect("compose");
        assert!(text.contains("Preferred LLM: N/A"));
        assert!(text.contains("Relevant Tags: N/A"));
    }
}
