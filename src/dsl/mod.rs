//! # DSL v2.1 — parsing and text utilities
//!
//! The typed logical language used throughout the pipeline. Grammar
//! tokens: predicate identifiers `[A-Za-z_][A-Za-z0-9_]*`, atoms
//! `Name(arg1, arg2)`, reserved keywords `and or not implies true false
//! forall exists`, the arrow `->`, plus a prefix S-expression form.

pub mod expr;
pub mod parser;
pub mod sanitize;

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub use expr::Expr;
pub use parser::{ExpressionParser, ParseMode, ParsedExpression};
pub use sanitize::{normalize_operators, sanitize_expression, strip_comparisons};

use crate::ontology::is_logical_keyword;

/// Errors raised by the expression parser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DslError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown predicate: {0}")]
    UnknownPredicate(String),

    #[error("Predicate '{predicate}' arity mismatch: expected {expected}, got {actual}")]
    ArityMismatch {
        predicate: String,
        expected: usize,
        actual: usize,
    },

    #[error("Type mismatch for argument '{argument}' of '{predicate}': expected sort '{expected}', found '{found}'")]
    TypeMismatch {
        predicate: String,
        argument: String,
        expected: String,
        found: String,
    },
}

fn atom_head_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("static regex"))
}

fn ident_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*").expect("static regex"))
}

/// Extract the predicate symbols mentioned in a logical expression string,
/// in first-seen order. Works on both infix (`Pred(a) and Q(b)`) and
/// prefix (`(and Pred(a) Q(b))`) text without a full parse, which makes it
/// safe to call on unvalidated LLM output.
pub fn extract_predicate_names(text: &str) -> Vec<String> {
    let raw = text.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let mut seen = std::collections::BTreeSet::new();
    let mut names = Vec::new();
    for caps in atom_head_regex().captures_iter(raw) {
        let name = &caps[1];
        if is_logical_keyword(name) {
            continue;
        }
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }
    if !names.is_empty() {
        return names;
    }

    // Fallback for bare 0-ary conjunctions: "A and B and not C".
    static AND_SPLIT: OnceLock<Regex> = OnceLock::new();
    let splitter = AND_SPLIT.get_or_init(|| Regex::new(r"\b[aA][nN][dD]\b").expect("static regex"));
    for part in splitter.split(raw) {
        let mut token = part.trim();
        if token.is_empty() {
            continue;
        }
        token = token.trim_start_matches('(').trim_end_matches(')').trim();
        if let Some(stripped) = token.strip_prefix("not ") {
            token = stripped.trim();
        }
        let Some(m) = ident_regex().find(token) else {
            continue;
        };
        let name = m.as_str();
        if is_logical_keyword(name) {
            continue;
        }
        if seen.insert(name.to_string()) {
            names.push(name.to_string());
        }
    }
    names
}

/// Normalize an atom string like `Pred(a, b)` into the stable key form
/// `Pred(a,b)`. A leading `not ` is peeled off; non-atom text is trimmed
/// and returned as-is.
pub fn normalize_atom_text(text: &str) -> String {
    let mut atom = text.trim();
    if let Some(stripped) = atom.strip_prefix("not ") {
        atom = stripped.trim();
    }
    if !atom.contains('(') || !atom.ends_with(')') {
        return atom.to_string();
    }
    let Some((name, rest)) = atom.split_once('(') else {
        return atom.to_string();
    };
    let args_body = &rest[..rest.len() - 1];
    let args: Vec<&str> = args_body
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();
    if args.is_empty() {
        name.trim().to_string()
    } else {
        format!("{}({})", name.trim(), args.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_names_infix_and_prefix() {
        assert_eq!(
            extract_predicate_names("Consenso(x, c) and CapacitaContrattuale(x)"),
            vec!["Consenso", "CapacitaContrattuale"]
        );
        assert_eq!(
            extract_predicate_names("(and Consenso(x, c) BuonaFede(x))"),
            vec!["Consenso", "BuonaFede"]
        );
    }

    #[test]
    fn test_extract_names_bare_conjunction_fallback() {
        assert_eq!(
            extract_predicate_names("ContrattoValido and not Inadempimento"),
            vec!["ContrattoValido", "Inadempimento"]
        );
    }

    #[test]
    fn test_extract_names_skips_keywords_and_dedupes() {
        assert_eq!(
            extract_predicate_names("not(Colpa(x)) or Colpa(x)"),
            vec!["Colpa"]
        );
        assert!(extract_predicate_names("").is_empty());
    }

    #[test]
    fn test_normalize_atom_text() {
        assert_eq!(normalize_atom_text("Pred( a , b )"), "Pred(a,b)");
        assert_eq!(normalize_atom_text("not Pred(a)"), "Pred(a)");
        assert_eq!(normalize_atom_text("Pred()"), "Pred");
        assert_eq!(normalize_atom_text("  Mora  "), "Mora");
    }
}
