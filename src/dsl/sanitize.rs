//! Expression sanitation applied before parsing.
//!
//! LLM output mixes unicode connectives, comparison sugar and irregular
//! whitespace. Sanitation rewrites all of that into the plain boolean
//! surface the parser accepts. The logic layer is boolean, not numeric:
//! comparisons are collapsed into their predicate atom and the right-hand
//! side is discarded.

use std::sync::OnceLock;

use regex::Regex;

/// Replace unicode logical operators with their ASCII keywords.
pub fn normalize_operators(expr: &str) -> String {
    expr.replace('\u{2228}', " or ")
        .replace('\u{2227}', " and ")
        .replace('\u{00AC}', " not ")
        .replace('\u{2192}', " -> ")
        .replace('\u{21D2}', " -> ")
}

fn prefix_comparison_inner() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\(\s*(>=|<=|>|<|=)\s*\(\s*(?P<pred>[A-Za-z_][A-Za-z0-9_]*)\s+(?P<args>[^()]+?)\)\s*(?P<rhs>[^\s()]+)?\s*\)",
        )
        .expect("static regex")
    })
}

fn prefix_comparison_call() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\(\s*(>=|<=|>|<|=)\s*(?P<pred>[A-Za-z_][A-Za-z0-9_]*)\s*\((?P<args>[^()]+?)\)\s*(?P<rhs>[^\s()]+)?\s*\)",
        )
        .expect("static regex")
    })
}

fn infix_comparison() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?P<pred>[A-Za-z_][A-Za-z0-9_]*)\s*\((?P<args>[^()]+?)\)\s*(>=|<=|>|<|=)\s*(?P<rhs>[A-Za-z0-9_.\-]+)",
        )
        .expect("static regex")
    })
}

fn rebuild_atom(pred: &str, args_blob: &str) -> String {
    let args: Vec<&str> = args_blob
        .split([',', ' '])
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    if args.is_empty() {
        pred.to_string()
    } else {
        format!("{}({})", pred, args.join(", "))
    }
}

/// Strip comparison sugar, keeping only the predicate atom.
///
/// Handles the prefix forms `(>= (Pred a b) rhs)` and `(>= Pred(a, b) rhs)`
/// as well as the infix form `Pred(a, b) >= rhs`.
pub fn strip_comparisons(expr: &str) -> String {
    let mut text = expr.to_string();
    for re in [prefix_comparison_inner(), prefix_comparison_call()] {
        text = re
            .replace_all(&text, |caps: &regex::Captures<'_>| {
                rebuild_atom(&caps["pred"], &caps["args"])
            })
            .into_owned();
    }
    infix_comparison()
        .replace_all(&text, |caps: &regex::Captures<'_>| {
            rebuild_atom(&caps["pred"], &caps["args"])
        })
        .into_owned()
}

/// Full sanitation pass: operator normalization, comparison stripping and
/// whitespace collapsing. Empty input stays empty.
pub fn sanitize_expression(expr: &str) -> String {
    let text = expr.trim();
    if text.is_empty() {
        return String::new();
    }
    let text = normalize_operators(text);
    let text = strip_comparisons(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
