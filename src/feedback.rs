//! # Feedback Engine
//!
//! Classifies the solver result for a program and computes the
//! solver-derived hints the refinement loop feeds back to the LLM:
//! missing links (premises not yet derivable) and conflicting assertions
//! (unsat core, or every assertion when the core is empty).

use serde::{Deserialize, Serialize};
use tracing::warn;
use z3::{Config, Context, SatResult};

use crate::dsl::{extract_predicate_names, normalize_atom_text, Expr, ExpressionParser, ParseMode};
use crate::ontology::Ontology;
use crate::program::LogicProgram;
use crate::solver::{SolverDriver, SolverError, SolverInstance};

/// Outcome of one solver check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    ConsistentEntails,
    ConsistentNoEntailment,
    Inconsistent,
    InvalidLogicProgram,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::ConsistentEntails => "consistent_entails",
            FeedbackStatus::ConsistentNoEntailment => "consistent_no_entailment",
            FeedbackStatus::Inconsistent => "inconsistent",
            FeedbackStatus::InvalidLogicProgram => "invalid_logic_program",
        }
    }
}

/// Structured solver feedback for one program evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicFeedback {
    pub status: FeedbackStatus,
    pub conflicting_axioms: Vec<String>,
    pub missing_links: Vec<String>,
    pub human_summary: String,
}

impl LogicFeedback {
    /// Feedback for a program the translator could not build.
    pub fn invalid(summary: impl Into<String>) -> Self {
        LogicFeedback {
            status: FeedbackStatus::InvalidLogicProgram,
            conflicting_axioms: Vec::new(),
            missing_links: Vec::new(),
            human_summary: summary.into(),
        }
    }
}

/// Build a fresh solver for `program` and classify the result.
/// Convenience wrapper owning the whole solver lifetime.
pub fn evaluate_program(
    program: &LogicProgram,
    registry: &Ontology,
) -> Result<LogicFeedback, SolverError> {
    let cfg = Config::new();
    let ctx = Context::new(&cfg);
    let driver = SolverDriver::new(registry);
    let instance = driver.build(&ctx, program)?;
    Ok(build_feedback(&instance, program, registry))
}

/// Classify the solver state:
/// - UNSAT: `inconsistent`, with the unsat core as conflicting axioms;
/// - SAT/UNKNOWN without a query: `consistent_no_entailment`;
/// - query entailed: `consistent_entails`;
/// - otherwise: `consistent_no_entailment` plus missing links.
pub fn build_feedback(
    instance: &SolverInstance<'_>,
    program: &LogicProgram,
    registry: &Ontology,
) -> LogicFeedback {
    let result = instance.solver.check();

    if result == SatResult::Unsat {
        let conflicting = instance.core_labels();
        let first = conflicting.first().cloned().unwrap_or_default();
        return LogicFeedback {
            status: FeedbackStatus::Inconsistent,
            human_summary: format!(
                "Sono presenti assiomi contraddittori (primo coinvolto: {first})."
            ),
            conflicting_axioms: conflicting,
            missing_links: Vec::new(),
        };
    }

    if result == SatResult::Unknown {
        warn!("solver returned UNKNOWN; treating as satisfiable");
    }

    let query_name = instance
        .query_text
        .as_deref()
        .map(normalize_atom_text)
        .filter(|q| !q.is_empty());

    let Some(query_name) = query_name else {
        return LogicFeedback {
            status: FeedbackStatus::ConsistentNoEntailment,
            conflicting_axioms: Vec::new(),
            missing_links: Vec::new(),
            human_summary:
                "Il sistema è coerente ma non è stata richiesta alcuna conclusione.".to_string(),
        };
    };

    let entailed = match &instance.query {
        Some(query) => instance.entails(query),
        None => instance.entails_atom_key(&query_name),
    };

    if entailed {
        return LogicFeedback {
            status: FeedbackStatus::ConsistentEntails,
            conflicting_axioms: Vec::new(),
            missing_links: Vec::new(),
            human_summary: "Il sistema è coerente e implica la conclusione.".to_string(),
        };
    }

    let missing_links = compute_missing_links(instance, program, registry, &query_name);
    let detail = missing_links
        .first()
        .map(|first| format!(" (manca: {first})"))
        .unwrap_or_default();
    LogicFeedback {
        status: FeedbackStatus::ConsistentNoEntailment,
        conflicting_axioms: Vec::new(),
        missing_links,
        human_summary: format!(
            "Il sistema è coerente ma la conclusione non è dimostrabile{detail}."
        ),
    }
}

/// Missing-link computation:
/// - no rule concludes the query predicate: the query predicate itself;
/// - otherwise, for every such rule, probe each atom of its condition and
///   collect those not entailed, deduplicated in first-seen order and
///   never including the query predicate.
fn compute_missing_links(
    instance: &SolverInstance<'_>,
    program: &LogicProgram,
    registry: &Ontology,
    query_name: &str,
) -> Vec<String> {
    let target_pred = query_name
        .split('(')
        .next()
        .unwrap_or(query_name)
        .trim()
        .to_string();

    let rules = program.rules_concluding_predicate(&target_pred);
    if rules.is_empty() {
        return vec![target_pred];
    }

    let parser = ExpressionParser::new(registry, ParseMode::Permissive);
    let mut missing = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    for rule in rules {
        let condition = rule.condition.trim();
        if condition.is_empty() || condition.eq_ignore_ascii_case("true") {
            continue;
        }
        let atoms: Vec<(String, Vec<String>)> =
            match parser.parse(condition, &program.predicates, &program.constants) {
                Ok(parsed) => parsed.expr.atoms(),
                // Unparseable condition: fall back to a syntactic harvest
                // and probe bare predicate names.
                Err(_) => extract_predicate_names(condition)
                    .into_iter()
                    .map(|name| (name, Vec::new()))
                    .collect(),
            };
        for (predicate, args) in atoms {
            if predicate == target_pred {
                continue;
            }
            let key = Expr::atom_key(&predicate, &args);
            if !instance.entails_atom_key(&key) && seen.insert(predicate.clone()) {
                missing.push(predicate);
            }
        }
    }
    missing
}
