//! Plan model and the one-time normalization of its component shape.
//!
//! A producer may describe components either as a list of `{name, ...}`
//! objects or as a name-keyed object. [`normalize_plan`] folds both into a
//! single ordered, name-keyed [`Components`] value; nothing downstream looks
//! at the raw shape again.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Description of one component the synthesizer must implement.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ComponentSpec {
    pub description: Option<String>,
    pub inputs: Vec<Value>,
    pub outputs: Vec<Value>,
    pub dependencies: Vec<Value>,
    /// Keys the producer sent that the synthesizer does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ComponentSpec {
    /// Lenient decode: objects map field by field, a bare string becomes the
    /// description, anything else yields an empty spec.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => {
                let mut extra = map.clone();
                extra.remove("name");
                let description = extra.remove("description").and_then(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Null => None,
                    other => Some(other.to_string()),
                });
                Self {
                    description,
                    inputs: take_list(&mut extra, "inputs"),
                    outputs: take_list(&mut extra, "outputs"),
                    dependencies: take_list(&mut extra, "dependencies"),
                    extra,
                }
            }
            Value::String(s) => Self {
                description: Some(s.clone()),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

fn take_list(map: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match map.remove(key) {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other],
    }
}

/// A named component in plan order.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub spec: ComponentSpec,
}

/// Ordered, name-keyed component mapping.
///
/// Inserting an existing name replaces its spec in place (the entry keeps its
/// original position), mirroring how an insertion-ordered map behaves.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Components {
    entries: Vec<Component>,
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. Returns `true` when an existing entry was overwritten.
    pub fn insert(&mut self, name: impl Into<String>, spec: ComponentSpec) -> bool {
        let name = name.into();
        if let Some(existing) = self.entries.iter_mut().find(|c| c.name == name) {
            existing.spec = spec;
            return true;
        }
        self.entries.push(Component { name, spec });
        false
    }

    pub fn get(&self, name: &str) -> Option<&ComponentSpec> {
        self.entries
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.spec)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Component> {
        self.entries.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Components {
    type Item = &'a Component;
    type IntoIter = std::slice::Iter<'a, Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Serialize for Components {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for component in &self.entries {
            map.serialize_entry(&component.name, &component.spec)?;
        }
        map.end()
    }
}

/// Structured architecture description consumed by the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub framework: String,
    pub language: String,
    pub llm: String,
    pub embedding_model: Option<String>,
    pub components: Components,
    pub termination_policy: Option<Value>,
    pub files: Option<Value>,
}

/// Result of [`normalize_plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedPlan {
    pub plan: Plan,
    /// Names whose earlier declaration was overwritten by a later one.
    pub overwritten: Vec<String>,
}

pub const DEFAULT_LANGUAGE: &str = "python";

/// Fold a raw plan value into the canonical [`Plan`] shape.
///
/// List-shaped components keep entries that are objects with a string `name`;
/// later entries win on duplicate names. Missing or non-collection
/// `components` normalize to an empty mapping.
pub fn normalize_plan(raw: &Value) -> NormalizedPlan {
    let mut components = Components::new();
    let mut overwritten = Vec::new();

    match raw.get("components") {
        Some(Value::Array(items)) => {
            for item in items {
                let Some(name) = item.get("name").and_then(Value::as_str) else {
                    continue;
                };
                if components.insert(name, ComponentSpec::from_value(item)) {
                    overwritten.push(name.to_string());
                }
            }
        }
        Some(Value::Object(map)) => {
            for (name, spec) in map {
                components.insert(name.as_str(), ComponentSpec::from_value(spec));
            }
        }
        _ => {}
    }

    let plan = Plan {
        framework: string_field(raw, "framework").unwrap_or_default(),
        language: string_field(raw, "language").unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        llm: string_field(raw, "llm").unwrap_or_default(),
        embedding_model: string_field(raw, "embedding_model"),
        components,
        termination_policy: raw.get("termination_policy").filter(|v| !v.is_null()).cloned(),
        files: raw.get("files").filter(|v| !v.is_null()).cloned(),
    };
    NormalizedPlan { plan, overwritten }
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_components_normalize_to_mapping_in_order() {
        let raw = json!({
            "framework": "graph",
            "language": "python",
            "llm": "gpt-4",
            "components": [
                {"name": "Reader", "description": "reads", "inputs": ["query"]},
                {"name": "Writer", "description": "writes"}
            ]
        });
        let normalized = normalize_plan(&raw);
        assert_eq!(normalized.plan.components.names(), vec!["Reader", "Writer"]);
        let reader = normalized.plan.components.get("Reader").expect("reader");
        assert_eq!(reader.description.as_deref(), Some("reads"));
        assert_eq!(reader.inputs, vec![json!("query")]);
        assert!(!reader.extra.contains_key("name"));
        assert!(normalized.overwritten.is_empty());
    }

    /// Duplicate names overwrite silently: the later spec wins and keeps the
    /// first position. This is preserved behavior and is reported, not rejected.
    #[test]
    fn duplicate_names_last_write_wins() {
        let raw = json!({
            "components": [
                {"name": "Reader", "description": "first"},
                {"name": "Writer", "description": "writer"},
                {"name": "Reader", "description": "second"}
            ]
        });
        let normalized = normalize_plan(&raw);
        assert_eq!(normalized.plan.components.len(), 2);
        assert_eq!(normalized.plan.components.names(), vec!["Reader", "Writer"]);
        assert_eq!(
            normalized
                .plan
                .components
                .get("Reader")
                .and_then(|c| c.description.as_deref()),
            Some("second")
        );
        assert_eq!(normalized.overwritten, vec!["Reader".to_string()]);
    }

    #[test]
    fn list_items_without_name_are_skipped() {
        let raw = json!({"components": [{"description": "anon"}, "bare", {"name": "Only"}]});
        let normalized = normalize_plan(&raw);
        assert_eq!(normalized.plan.components.names(), vec!["Only"]);
    }

    #[test]
    fn mapping_components_keep_declaration_order() {
        let raw = json!({"components": {"Zeta": {}, "Alpha": {"description": "a"}}});
        let normalized = normalize_plan(&raw);
        assert_eq!(normalized.plan.components.names(), vec!["Zeta", "Alpha"]);
    }

    #[test]
    fn missing_components_normalize_to_empty() {
        let normalized = normalize_plan(&json!({"framework": "graph"}));
        assert!(normalized.plan.components.is_empty());
        assert_eq!(normalized.plan.language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn components_serialize_as_ordered_object() {
        let normalized = normalize_plan(&json!({"components": [{"name": "B"}, {"name": "A"}]}));
        let text = serde_json::to_string(&normalized.plan.components).expect("serialize");
        assert!(text.find("\"B\"").expect("B") < text.find("\"A\"").expect("A"));
    }
}
