//! # Logic Program model
//!
//! The typed form of the DSL v2.1 program exchanged between pipeline
//! stages. LLM payloads are duck-typed JSON; they are parsed exactly once
//! by [`normalize`] at the stage boundary and every downstream component
//! sees only this canonical shape.
//!
//! Ownership: the pipeline orchestrator owns each program; stage runtimes
//! receive shared references and return newly constructed programs.

pub mod canonical;
pub mod normalize;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ontology::DSL_VERSION;

/// Declared sort with its base type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDef {
    /// Base type: one of `Bool`, `Int`, `Float`, `String`, `Entity`, or a
    /// parent sort name (flattened by the solver type mapper).
    #[serde(rename = "type", default = "default_entity")]
    pub base: String,
}

fn default_entity() -> String {
    "Entity".to_string()
}

impl Default for SortDef {
    fn default() -> Self {
        SortDef {
            base: default_entity(),
        }
    }
}

/// Declared constant bound to a sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantDef {
    #[serde(default = "default_entity")]
    pub sort: String,
}

/// Declared predicate signature.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PredicateDef {
    #[serde(default)]
    pub arity: usize,
    #[serde(default)]
    pub sorts: Vec<String>,
}

/// A closed formula asserted as true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Axiom {
    pub formula: String,
}

/// An implication `condition -> conclusion`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub condition: String,
    pub conclusion: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Canonical DSL v2.1 logic program.
///
/// Invariants guaranteed after normalization/hydration:
/// - every predicate referenced in axioms/rules/query is declared;
/// - every constant's sort and every predicate argument sort is declared;
/// - `arity == sorts.len()` for every predicate;
/// - fact rows are argument tuples (0-ary facts are a single empty row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicProgram {
    #[serde(default = "default_dsl_version")]
    pub dsl_version: String,

    #[serde(default)]
    pub sorts: BTreeMap<String, SortDef>,

    #[serde(default)]
    pub constants: BTreeMap<String, ConstantDef>,

    #[serde(default)]
    pub predicates: BTreeMap<String, PredicateDef>,

    #[serde(default)]
    pub facts: BTreeMap<String, Vec<Vec<String>>>,

    #[serde(default)]
    pub axioms: Vec<Axiom>,

    #[serde(default)]
    pub rules: Vec<Rule>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

fn default_dsl_version() -> String {
    DSL_VERSION.to_string()
}

impl Default for LogicProgram {
    fn default() -> Self {
        LogicProgram {
            dsl_version: default_dsl_version(),
            sorts: BTreeMap::new(),
            constants: BTreeMap::new(),
            predicates: BTreeMap::new(),
            facts: BTreeMap::new(),
            axioms: Vec::new(),
            rules: Vec::new(),
            query: None,
        }
    }
}

impl LogicProgram {
    /// Find an existing constant of the given sort, if any.
    pub fn constant_of_sort(&self, sort: &str) -> Option<&str> {
        self.constants
            .iter()
            .find(|(_, def)| def.sort == sort)
            .map(|(name, _)| name.as_str())
    }

    /// Ensure a constant of `sort` exists, minting `"<base>_<n>"` names on
    /// demand, and return its name. Existing constants of the sort are
    /// reused so synthesized premises line up with the query arguments.
    pub fn ensure_constant_for_sort(&mut self, sort: &str, position: usize) -> String {
        if let Some(name) = self.constant_of_sort(sort) {
            return name.to_string();
        }
        let base = sort.to_lowercase();
        let mut suffix = position + 1;
        let mut candidate = format!("{base}_{suffix}");
        while self.constants.contains_key(&candidate) {
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        }
        self.constants
            .insert(candidate.clone(), ConstantDef { sort: sort.to_string() });
        candidate
    }

    /// True when some rule's conclusion (trimmed) equals `target`.
    pub fn has_rule_concluding(&self, target: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| rule.conclusion.trim() == target.trim())
    }

    /// Rules whose conclusion predicate matches the given predicate name
    /// (after peeling a leading `not`).
    pub fn rules_concluding_predicate(&self, predicate: &str) -> Vec<&Rule> {
        self.rules
            .iter()
            .filter(|rule| {
                let concl = rule.conclusion.trim();
                let concl = concl.strip_prefix("not ").unwrap_or(concl).trim();
                let name = concl.split('(').next().unwrap_or("").trim();
                name == predicate
            })
            .collect()
    }
}
