//! Unsafe-intent denylist scan.

/// Terms that mark a request or artifact as unsafe. Matched as
/// case-insensitive substrings.
pub const DENYLIST: &[&str] = &[
    "hack",
    "exploit",
    "bypass",
    "malware",
    "injection",
    "attack",
    "phishing",
    "illegal",
    "bomb",
    "terror",
    "kill",
];

/// Return every denylisted term contained in `text`, in denylist order.
pub fn scan(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    DENYLIST
        .iter()
        .filter(|term| lower.contains(*term))
        .map(|term| (*term).to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_is_case_insensitive_and_lists_all_hits() {
        let hits = scan("How to HACK a server and plant MalWare");
        assert_eq!(hits, vec!["hack".to_string(), "malware".to_string()]);
    }

    #[test]
    fn scan_matches_substrings() {
        // Substring semantics: "skills" contains "kill".
        assert_eq!(scan("list your skills"), vec!["kill".to_string()]);
    }

    #[test]
    fn clean_text_has_no_hits() {
        assert!(scan("build a todo app with a sqlite backend").is_empty());
    }
}
