//! Pattern-based extraction of probable function and type names.
//!
//! This is a language-agnostic heuristic used only to build memory queries;
//! it makes no attempt to parse the code.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static KEYWORD_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:def|class|function|func|fn|struct|interface|enum|namespace)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("keyword definition regex")
});

static SQL_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bcreate\s+(?:or\s+replace\s+)?(?:table|view|function|procedure|trigger|index)\s+(?:if\s+not\s+exists\s+)?([A-Za-z_][A-Za-z0-9_.]*)",
    )
    .expect("sql definition regex")
});

static TYPED_DEFINITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*(?:[A-Za-z_][\w:<>,\*&\[\]]*\s+)+\**&?([A-Za-z_]\w*)\s*\(")
        .expect("typed definition regex")
});

const NOT_SYMBOLS: &[&str] = &[
    "if", "else", "for", "while", "switch", "return", "new", "delete", "sizeof", "catch", "throw",
    "elif", "case", "do", "print", "assert", "await", "yield", "not", "and", "or", "in",
];

/// Returns up to `limit` distinct probable symbol names in order of appearance.
pub fn extract_symbol_names(code: &str, limit: usize) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();

    for regex in [&*KEYWORD_DEFINITION, &*SQL_DEFINITION] {
        for captures in regex.captures_iter(code) {
            if let Some(name) = captures.get(1) {
                found.push((name.start(), name.as_str().to_string()));
            }
        }
    }

    for captures in TYPED_DEFINITION.captures_iter(code) {
        // `return foo(...)` and friends look like typed definitions.
        let leading = captures
            .get(0)
            .and_then(|m| m.as_str().split_whitespace().next())
            .unwrap_or_default();
        if NOT_SYMBOLS.contains(&leading) {
            continue;
        }
        if let Some(name) = captures.get(1) {
            found.push((name.start(), name.as_str().to_string()));
        }
    }

    found.sort_by_key(|(pos, _)| *pos);

    let mut seen: HashSet<String> = HashSet::new();
    found
        .into_iter()
        .map(|(_, name)| name)
        .filter(|name| name.len() >= 2 && !NOT_SYMBOLS.contains(&name.as_str()))
        .filter(|name| seen.insert(name.clone()))
        .take(limit)
        .collect()
}
