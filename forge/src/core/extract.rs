//! Locate a JSON payload inside free-form model output.

use std::sync::LazyLock;

use regex::Regex;

static FENCED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)```").expect("fence regex should be valid")
});

/// Return the slice of `text` most likely to hold a JSON document.
///
/// Order of preference: the whole trimmed text when it already starts with
/// `{` or `[`, the first fenced code block, then the span from the first `{`
/// to the last `}`. Returns `None` when none of these apply.
pub fn json_candidate(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }
    if let Some(inner) = FENCED_RE.captures(trimmed).and_then(|caps| caps.get(1)) {
        return Some(inner.as_str().trim());
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (start < end).then(|| &trimmed[start..=end])
}
