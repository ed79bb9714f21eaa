//! Heuristic entity extraction from free text.
//!
//! A pure function over observation text. Mines path-like tokens, code
//! identifiers, and a causal-language flag; no I/O, no state.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

/// Extensions that make a path-like token count as a source file.
const SOURCE_EXTENSIONS: [&str; 24] = [
    "rs", "ts", "tsx", "js", "jsx", "py", "go", "java", "kt", "rb", "c", "h", "cpp", "hpp", "cs",
    "swift", "sh", "sql", "json", "yaml", "yml", "toml", "md", "css",
];

/// Markers whose presence flags causal language. English plus the Chinese
/// equivalents seen in real narratives.
const CAUSAL_MARKERS: [&str; 10] = [
    "because", "so that", "therefore", "due to", "caused by", "in order to", "which means",
    "因为", "所以", "由于",
];

/// Identifier-looking tokens that carry no signal.
const STOP_WORDS: [&str; 12] = [
    "the", "and", "for", "that", "this", "with", "from", "was", "are", "not", "has", "have",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    /// Path-like tokens with a separator and a recognized extension.
    pub files: Vec<String>,
    /// camelCase or snake_case tokens of length ≥ 3, stop-words removed.
    pub identifiers: Vec<String>,
    /// Drives retention immunity.
    pub has_causal_language: bool,
}

fn file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Token with at least one path separator and a dotted extension.
        Regex::new(r"[\w.\-]+(?:/[\w.\-]+)+\.([A-Za-z0-9]+)").expect("file regex compiles")
    })
}

fn identifier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // snake_case (one or more underscores) or camelCase (lower then upper).
        Regex::new(r"\b(?:[a-z][a-z0-9]*(?:_[a-z0-9]+)+|[a-z]+(?:[A-Z][a-z0-9]+)+)\b")
            .expect("identifier regex compiles")
    })
}

/// Extract files, identifiers, and the causal-language flag from `text`.
pub fn extract(text: &str) -> Extracted {
    let mut files = Vec::new();
    let mut seen_files = HashSet::new();
    for caps in file_regex().captures_iter(text) {
        let whole = caps.get(0).expect("match exists").as_str();
        let ext = caps.get(1).expect("extension group").as_str().to_lowercase();
        if !SOURCE_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        if seen_files.insert(whole.to_lowercase()) {
            files.push(whole.to_string());
        }
    }

    let mut identifiers = Vec::new();
    let mut seen_idents = HashSet::new();
    for m in identifier_regex().find_iter(text) {
        let token = m.as_str();
        if token.len() < 3 || STOP_WORDS.contains(&token) {
            continue;
        }
        if seen_idents.insert(token.to_string()) {
            identifiers.push(token.to_string());
        }
    }

    let lower = text.to_lowercase();
    let has_causal_language = CAUSAL_MARKERS.iter().any(|m| lower.contains(m));

    Extracted {
        files,
        identifiers,
        has_causal_language,
    }
}

/// Deduplicated concatenation of caller concepts and extracted identifiers.
pub fn enrich_concepts(user_concepts: &[String], extracted: &Extracted) -> Vec<String> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for concept in user_concepts.iter().chain(extracted.identifiers.iter()) {
        if seen.insert(concept.clone()) {
            out.push(concept.clone());
        }
    }
    out
}

/// Caller files plus extracted files not already present, compared
/// case-insensitively.
pub fn enrich_files(user_files: &[String], extracted_files: &[String]) -> Vec<String> {
    let mut out: Vec<String> = user_files.to_vec();
    let mut seen: HashSet<String> = user_files.iter().map(|f| f.to_lowercase()).collect();
    for file in extracted_files {
        if seen.insert(file.to_lowercase()) {
            out.push(file.clone());
        }
    }
    out
}
