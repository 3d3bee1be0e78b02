//! Corrective-insight records and their retrieved form.

use serde::{Deserialize, Serialize};

/// Structured record of prior corrective feedback. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InsightPackage {
    pub session_id: String,
    #[serde(default)]
    pub system_context: SystemContext,
    #[serde(default)]
    pub behavioral_insights: BehavioralInsights,
    #[serde(default)]
    pub corrective_knowledge: CorrectiveKnowledge,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemContext {
    pub preferred_llm: Option<String>,
    pub preferred_embedding_model: Option<String>,
    pub active_tools: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralInsights {
    pub user_style_preference: Option<String>,
    pub code_framework_preference: Option<String>,
    pub common_errors: Vec<String>,
    pub fix_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectiveKnowledge {
    pub insight_summary: Option<String>,
    pub recommendations: Vec<String>,
    pub relevance_tags: Vec<String>,
}

/// One retrieved memory item. Higher `similarity_score` means closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub text: String,
    pub similarity_score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_package_decodes_with_defaults() {
        let package: InsightPackage = serde_json::from_str(
            r#"{"session_id":"s-1","system_context":{"preferred_llm":"gpt-4"}}"#,
        )
        .expect("decode");
        assert_eq!(package.system_context.preferred_llm.as_deref(), Some("gpt-4"));
        assert!(package.behavioral_insights.common_errors.is_empty());
        assert!(package.corrective_knowledge.insight_summary.is_none());
    }

    #[test]
    fn package_without_session_id_is_rejected() {
        let err = serde_json::from_str::<InsightPackage>(r#"{"system_context":{}}"#);
        assert!(err.is_err());
    }
}
