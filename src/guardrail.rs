//! # Guardrail Checker
//!
//! Strict static validation of a refined program before it is trusted:
//! DSL version, declared sorts/predicates against the canonical registry,
//! and strict parses of every rule and of the query. A failing guardrail
//! routes the orchestrator into the fallback branch; it never becomes a
//! user-facing error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::dsl::{DslError, ExpressionParser, ParseMode};
use crate::ontology::{Ontology, DSL_VERSION};
use crate::program::{LogicProgram, PredicateDef};

/// One violation detected by the guardrail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailIssue {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Guardrail outcome; `ok` iff no issues were found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub ok: bool,
    pub issues: Vec<GuardrailIssue>,
}

impl GuardrailResult {
    pub fn passing() -> Self {
        GuardrailResult { ok: true, issues: Vec::new() }
    }
}

fn issue(code: &str, message: String, details: serde_json::Value) -> GuardrailIssue {
    GuardrailIssue {
        code: code.to_string(),
        message,
        details: Some(details),
    }
}

/// Run every static check against `program`.
pub fn run_guardrail(program: &LogicProgram, registry: &Ontology) -> GuardrailResult {
    let mut issues = Vec::new();

    if program.dsl_version != DSL_VERSION {
        issues.push(issue(
            "DSL_VERSION_MISMATCH",
            format!(
                "dsl_version '{}' is not supported. Expected '{}'.",
                program.dsl_version, DSL_VERSION
            ),
            json!({ "actual": program.dsl_version, "expected": DSL_VERSION }),
        ));
    }

    for sort_name in program.sorts.keys() {
        let canonical = registry.resolve_sort(sort_name);
        if !registry.has_sort(&canonical) {
            issues.push(issue(
                "UNKNOWN_SORT_DECLARATION",
                format!("Sort '{sort_name}' is not part of the canonical DSL."),
                json!({ "sort": sort_name }),
            ));
        }
    }

    for (const_name, const_def) in &program.constants {
        let canonical = registry.resolve_sort(&const_def.sort);
        if !registry.has_sort(&canonical) {
            issues.push(issue(
                "UNKNOWN_CONSTANT_SORT",
                format!(
                    "Constant '{const_name}' references unknown sort '{}'.",
                    const_def.sort
                ),
                json!({ "constant": const_name, "sort": const_def.sort }),
            ));
        }
    }

    // Validate declarations against the registry while building the
    // corrected table used for strict parsing below, so one declaration
    // mistake does not cascade into spurious rule issues.
    let mut corrected: BTreeMap<String, PredicateDef> = BTreeMap::new();
    for (pred_name, def) in &program.predicates {
        let canonical = registry.resolve_predicate(pred_name);
        let Some((expected_arity, expected_sorts)) = registry.signature(&canonical) else {
            issues.push(issue(
                "UNKNOWN_PREDICATE_DECLARATION",
                format!("Predicate '{pred_name}' is not part of the canonical DSL."),
                json!({ "predicate": pred_name }),
            ));
            corrected.insert(canonical, def.clone());
            continue;
        };

        if def.arity != expected_arity {
            issues.push(issue(
                "PREDICATE_ARITY_MISMATCH",
                format!(
                    "Predicate '{canonical}' arity mismatch (expected {expected_arity}, got {}).",
                    def.arity
                ),
                json!({
                    "predicate": canonical,
                    "expected": expected_arity,
                    "actual": def.arity,
                }),
            ));
        }

        for sort_name in &def.sorts {
            let canonical_sort = registry.resolve_sort(sort_name);
            if !registry.has_sort(&canonical_sort) {
                issues.push(issue(
                    "PREDICATE_SORT_UNKNOWN",
                    format!("Predicate '{canonical}' references unknown sort '{sort_name}'."),
                    json!({ "predicate": canonical, "sort": sort_name }),
                ));
            }
        }

        corrected.insert(
            canonical,
            PredicateDef { arity: expected_arity, sorts: expected_sorts },
        );
    }

    let parser = ExpressionParser::new(registry, ParseMode::Strict);
    for (idx, rule) in program.rules.iter().enumerate() {
        for (part, text) in [("condition", &rule.condition), ("conclusion", &rule.conclusion)] {
            if let Err(err) = parser.parse(text, &corrected, &program.constants) {
                let code = match err {
                    DslError::UnknownPredicate(_) => "RULE_UNKNOWN_PREDICATE",
                    DslError::ArityMismatch { .. } => "PREDICATE_ARITY_MISMATCH",
                    _ => "RULE_PARSE_ERROR",
                };
                issues.push(issue(
                    code,
                    err.to_string(),
                    json!({ "context": "parse_rules", "rule": idx, "part": part }),
                ));
            }
        }
    }

    if let Some(query) = &program.query {
        if let Err(err) = parser.parse(query, &corrected, &program.constants) {
            issues.push(issue(
                "QUERY_PARSE_ERROR",
                err.to_string(),
                json!({ "context": "parse_query" }),
            ));
        }
    }

    GuardrailResult { ok: issues.is_empty(), issues }
}
