//! One-shot normalization of heterogeneous LLM output.
//!
//! Models emit structurally irregular JSON: facts as lists of names,
//! constants as `{name, sort}` arrays, rules as bare strings with `->` or
//! Prolog `:-`, unicode connectives, comparison sugar, numeric literals in
//! argument positions. Everything is coerced here, once, into the
//! canonical [`LogicProgram`] shape; downstream stages assume only that
//! shape.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::dsl::{extract_predicate_names, sanitize_expression};
use crate::ontology::{is_logical_keyword, Ontology, DSL_VERSION};

use super::{Axiom, ConstantDef, LogicProgram, PredicateDef, Rule, SortDef};

/// Counters describing what the normalizer had to fix. Surfaced in
/// responses for telemetry.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct NormalizationStats {
    #[serde(flatten)]
    counts: BTreeMap<String, u64>,
}

impl NormalizationStats {
    pub fn bump(&mut self, key: &str) {
        self.bump_by(key, 1);
    }

    pub fn bump_by(&mut self, key: &str, amount: u64) {
        *self.counts.entry(key.to_string()).or_insert(0) += amount;
    }

    pub fn merge(&mut self, other: &NormalizationStats) {
        for (key, value) in &other.counts {
            self.bump_by(key, *value);
        }
    }

    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn counts(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }
}

// ============================================================================
// Shape coercion (raw JSON -> typed program)
// ============================================================================

/// Coerce a raw JSON payload into a typed [`LogicProgram`].
///
/// Never fails: unusable fragments are dropped and counted instead.
pub fn normalize_value(raw: &Value) -> (LogicProgram, NormalizationStats) {
    let mut stats = NormalizationStats::default();
    let mut program = LogicProgram::default();

    let Some(object) = raw.as_object() else {
        if !raw.is_null() {
            stats.bump("logic_program_root_reset");
        }
        return (program, stats);
    };

    if let Some(version) = object.get("dsl_version").and_then(Value::as_str) {
        let trimmed = version.trim();
        program.dsl_version = if trimmed.is_empty() {
            DSL_VERSION.to_string()
        } else {
            trimmed.to_string()
        };
    }

    program.sorts = coerce_sorts(object.get("sorts"), &mut stats);
    program.constants = coerce_constants(object.get("constants"), &mut stats);
    program.predicates = coerce_predicates(object.get("predicates"), &mut stats);
    program.axioms = coerce_axioms(object.get("axioms"), &mut stats);
    program.rules = coerce_rules(object.get("rules"), &mut stats);
    program.facts = coerce_facts(object.get("facts"), &mut stats);
    program.query = coerce_query(object.get("query"), &mut stats);

    (program, stats)
}

fn coerce_sorts(raw: Option<&Value>, stats: &mut NormalizationStats) -> BTreeMap<String, SortDef> {
    let mut sorts = BTreeMap::new();
    match raw {
        Some(Value::Object(map)) => {
            for (name, spec) in map {
                let def = match spec {
                    Value::Object(fields) => SortDef {
                        base: fields
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("Entity")
                            .to_string(),
                    },
                    Value::String(base) => {
                        stats.bump("sort_strings_normalized");
                        SortDef { base: base.clone() }
                    }
                    _ => SortDef::default(),
                };
                sorts.insert(name.clone(), def);
            }
        }
        Some(other) if !other.is_null() => stats.bump("sorts_reset"),
        _ => {}
    }
    sorts
}

fn coerce_constants(
    raw: Option<&Value>,
    stats: &mut NormalizationStats,
) -> BTreeMap<String, ConstantDef> {
    let mut constants = BTreeMap::new();
    match raw {
        Some(Value::Object(map)) => {
            for (name, spec) in map {
                let def = match spec {
                    Value::Object(fields) => ConstantDef {
                        sort: fields
                            .get("sort")
                            .and_then(Value::as_str)
                            .unwrap_or("Entity")
                            .to_string(),
                    },
                    Value::String(sort) => {
                        stats.bump("constant_strings_normalized");
                        ConstantDef { sort: sort.clone() }
                    }
                    _ => ConstantDef { sort: "Entity".to_string() },
                };
                constants.insert(name.clone(), def);
            }
        }
        Some(Value::Array(items)) => {
            stats.bump_by("constant_list_coerced", items.len() as u64);
            for (idx, item) in items.iter().enumerate() {
                match item {
                    Value::Object(fields) => {
                        let name = fields
                            .get("name")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("c{idx}"));
                        let sort = fields
                            .get("sort")
                            .and_then(Value::as_str)
                            .unwrap_or("Entity")
                            .to_string();
                        constants.insert(name, ConstantDef { sort });
                    }
                    Value::String(sort) => {
                        stats.bump("constant_strings_normalized");
                        constants.insert(format!("c{idx}"), ConstantDef { sort: sort.clone() });
                    }
                    _ => {}
                }
            }
        }
        Some(other) if !other.is_null() => stats.bump("constant_scalar_reset"),
        _ => {}
    }
    constants
}

fn coerce_predicates(
    raw: Option<&Value>,
    stats: &mut NormalizationStats,
) -> BTreeMap<String, PredicateDef> {
    let mut predicates = BTreeMap::new();
    match raw {
        Some(Value::Object(map)) => {
            for (name, spec) in map {
                predicates.insert(name.clone(), predicate_def_from_value(spec));
            }
        }
        Some(Value::Array(items)) => {
            stats.bump("predicate_list_coerced");
            for item in items {
                if let Value::Object(fields) = item {
                    if let Some(name) = fields.get("name").and_then(Value::as_str) {
                        predicates.insert(name.to_string(), predicate_def_from_value(item));
                    }
                }
            }
        }
        Some(other) if !other.is_null() => stats.bump("predicate_scalar_reset"),
        _ => {}
    }
    predicates
}

fn predicate_def_from_value(value: &Value) -> PredicateDef {
    let arity = value
        .get("arity")
        .and_then(Value::as_u64)
        .map(|a| a as usize);
    let sorts: Vec<String> = value
        .get("sorts")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    PredicateDef {
        arity: arity.unwrap_or(sorts.len()),
        sorts,
    }
}

fn coerce_axioms(raw: Option<&Value>, stats: &mut NormalizationStats) -> Vec<Axiom> {
    let entries: Vec<Value> = match raw {
        Some(Value::Array(items)) => items.clone(),
        Some(v @ (Value::String(_) | Value::Object(_))) => vec![v.clone()],
        Some(other) if !other.is_null() => {
            stats.bump("axiom_entries_dropped");
            Vec::new()
        }
        _ => Vec::new(),
    };

    let mut axioms = Vec::new();
    for entry in entries {
        match entry {
            Value::String(text) => {
                let formula = sanitize_expression(&text);
                if !formula.is_empty() {
                    axioms.push(Axiom { formula });
                    stats.bump("axiom_strings_wrapped");
                }
            }
            Value::Object(fields) => {
                let formula = fields
                    .get("formula")
                    .and_then(Value::as_str)
                    .map(sanitize_expression)
                    .filter(|f| !f.is_empty());
                let formula = formula.or_else(|| {
                    let condition = fields
                        .get("condition")
                        .and_then(Value::as_str)
                        .map(sanitize_expression)
                        .unwrap_or_default();
                    let conclusion = fields
                        .get("conclusion")
                        .and_then(Value::as_str)
                        .map(sanitize_expression)
                        .unwrap_or_default();
                    if conclusion.is_empty() {
                        None
                    } else if condition.is_empty() || is_trivially_true(&condition) {
                        stats.bump("axiom_condition_wrapped");
                        Some(conclusion)
                    } else {
                        stats.bump("axiom_condition_wrapped");
                        Some(format!("{condition} -> {conclusion}"))
                    }
                });
                let formula = formula.or_else(|| {
                    fields
                        .get("pred")
                        .and_then(Value::as_str)
                        .map(|pred| {
                            stats.bump("axiom_atoms_wrapped");
                            format_atom(pred, fields.get("args"))
                        })
                });
                match formula {
                    Some(formula) => axioms.push(Axiom { formula }),
                    None => stats.bump("axiom_entries_dropped"),
                }
            }
            _ => stats.bump("axiom_entries_dropped"),
        }
    }
    axioms
}

fn coerce_rules(raw: Option<&Value>, stats: &mut NormalizationStats) -> Vec<Rule> {
    let entries: Vec<Value> = match raw {
        Some(Value::Array(items)) => items.clone(),
        Some(v @ (Value::String(_) | Value::Object(_))) => vec![v.clone()],
        Some(other) if !other.is_null() => {
            stats.bump("rule_entries_dropped");
            Vec::new()
        }
        _ => Vec::new(),
    };

    let mut rules = Vec::new();
    for entry in entries {
        match entry {
            Value::String(text) => {
                let (condition, conclusion) = split_rule_text(&text);
                let condition = sanitize_expression(&condition);
                let conclusion = sanitize_expression(&conclusion);
                if conclusion.is_empty() {
                    stats.bump("rule_entries_dropped");
                    continue;
                }
                stats.bump("rule_strings_wrapped");
                rules.push(Rule {
                    condition: if condition.is_empty() { "true".into() } else { condition },
                    conclusion,
                    id: None,
                });
            }
            Value::Object(fields) => {
                let condition = fields
                    .get("condition")
                    .and_then(Value::as_str)
                    .map(sanitize_expression)
                    .filter(|c| !c.is_empty())
                    .unwrap_or_else(|| "true".to_string());
                let mut conclusion = fields
                    .get("conclusion")
                    .and_then(Value::as_str)
                    .map(sanitize_expression)
                    .unwrap_or_default();
                if conclusion.is_empty() {
                    if let Some(pred) = fields.get("pred").and_then(Value::as_str) {
                        conclusion = format_atom(pred, fields.get("args"));
                        stats.bump("rule_atoms_wrapped");
                    }
                }
                if conclusion.is_empty() {
                    stats.bump("rule_entries_dropped");
                    continue;
                }
                let id = fields
                    .get("id")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                rules.push(Rule { condition, conclusion, id });
            }
            _ => stats.bump("rule_entries_dropped"),
        }
    }
    rules
}

fn coerce_facts(
    raw: Option<&Value>,
    stats: &mut NormalizationStats,
) -> BTreeMap<String, Vec<Vec<String>>> {
    let mut facts = BTreeMap::new();
    match raw {
        Some(Value::Object(map)) => {
            for (name, rows) in map {
                match rows {
                    Value::Bool(true) => {
                        facts.insert(name.clone(), vec![Vec::new()]);
                    }
                    Value::Bool(false) | Value::Null => {}
                    Value::Array(items) => {
                        let mut out = Vec::new();
                        for item in items {
                            match item {
                                Value::String(arg) => {
                                    stats.bump("fact_rows_normalized");
                                    out.push(vec![arg.clone()]);
                                }
                                Value::Array(tuple) => out.push(
                                    tuple
                                        .iter()
                                        .map(|v| match v {
                                            Value::String(s) => s.clone(),
                                            other => other.to_string(),
                                        })
                                        .collect(),
                                ),
                                _ => stats.bump("fact_rows_dropped"),
                            }
                        }
                        facts.insert(name.clone(), out);
                    }
                    _ => {
                        stats.bump("fact_rows_dropped");
                    }
                }
            }
        }
        Some(Value::Array(items)) => {
            stats.bump_by("fact_list_coerced", items.len() as u64);
            for item in items {
                if let Value::String(name) = item {
                    facts.insert(name.clone(), vec![Vec::new()]);
                }
            }
        }
        Some(other) if !other.is_null() => stats.bump("fact_scalar_reset"),
        _ => {}
    }
    facts
}

fn coerce_query(raw: Option<&Value>, stats: &mut NormalizationStats) -> Option<String> {
    match raw {
        Some(Value::String(text)) => {
            let sanitized = sanitize_expression(text);
            if sanitized.is_empty() {
                None
            } else {
                Some(sanitized)
            }
        }
        Some(Value::Object(fields)) => {
            stats.bump("query_object_flattened");
            let name = fields.get("pred").and_then(Value::as_str)?.trim().to_string();
            if name.is_empty() {
                return None;
            }
            let args: Vec<String> = fields
                .get("args")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| match v {
                            Value::String(s) => Some(s.trim().to_string()),
                            other => Some(other.to_string()),
                        })
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            if args.is_empty() {
                Some(name)
            } else {
                Some(format!("{}({})", name, args.join(",")))
            }
        }
        _ => None,
    }
}

fn is_trivially_true(condition: &str) -> bool {
    matches!(condition.to_lowercase().as_str(), "true" | "vero" | "1")
}

fn format_atom(predicate: &str, args: Option<&Value>) -> String {
    let name = predicate.trim();
    let args: Vec<String> = args
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.trim().to_string()),
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if args.is_empty() {
        format!("{name}()")
    } else {
        format!("{}({})", name, args.join(", "))
    }
}

/// Split a textual rule into `(condition, conclusion)`.
/// Prolog-style `head :- body` is rewritten to `body -> head`.
fn split_rule_text(text: &str) -> (String, String) {
    for sep in ["->", "\u{2192}", "=>"] {
        if let Some((left, right)) = text.split_once(sep) {
            return (left.trim().to_string(), right.trim().to_string());
        }
    }
    if let Some((head, body)) = text.split_once(":-") {
        return (body.trim().to_string(), head.trim().to_string());
    }
    ("true".to_string(), text.trim().to_string())
}

// ============================================================================
// Hydration (canonicalization + declaration closure)
// ============================================================================

fn atom_rewrite_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)(\s*\()").expect("static regex"))
}

fn atom_args_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(([^()]+)\)").expect("static regex")
    })
}

fn numeric_literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").expect("static regex"))
}

/// Bring a shape-normalized program up to the declaration invariants:
/// canonical names everywhere, every referenced sort and predicate
/// declared, numeric literal arguments replaced by typed constants.
/// Idempotent: hydrating twice yields an equal program.
pub fn hydrate(program: &mut LogicProgram, registry: &Ontology, stats: &mut NormalizationStats) {
    canonicalize_sorts(program, registry, stats);
    canonicalize_constants(program, registry, stats);
    canonicalize_predicates(program, registry, stats);
    canonicalize_formulas(program, registry, stats);
    coerce_numeric_literals(program, registry, stats);
    ensure_referenced_sorts(program, registry);
    ensure_declared_predicates(program, registry, stats);
}

fn canonicalize_sorts(
    program: &mut LogicProgram,
    registry: &Ontology,
    stats: &mut NormalizationStats,
) {
    let mut sorts = BTreeMap::new();
    for (name, mut def) in std::mem::take(&mut program.sorts) {
        let canonical = registry.resolve_sort(&name);
        if canonical != name {
            stats.bump("sort_alias_hits");
        }
        if def.base.trim().is_empty() {
            def.base = registry
                .parent_sort(&canonical)
                .unwrap_or("Entity")
                .to_string();
        }
        sorts.insert(canonical, def);
    }
    program.sorts = sorts;
}

fn canonicalize_constants(
    program: &mut LogicProgram,
    registry: &Ontology,
    stats: &mut NormalizationStats,
) {
    for def in program.constants.values_mut() {
        let canonical = registry.resolve_sort(&def.sort);
        if canonical != def.sort {
            stats.bump("sort_alias_hits");
            def.sort = canonical;
        }
    }
}

fn canonicalize_predicates(
    program: &mut LogicProgram,
    registry: &Ontology,
    stats: &mut NormalizationStats,
) {
    let mut predicates = BTreeMap::new();
    for (name, mut def) in std::mem::take(&mut program.predicates) {
        let trimmed = name.trim();
        if trimmed.is_empty() || is_logical_keyword(trimmed) {
            stats.bump("logical_predicates_removed");
            continue;
        }
        let canonical = registry.resolve_predicate(trimmed);
        if canonical != trimmed {
            stats.bump("predicate_alias_hits");
        }
        if let Some((arity, sorts)) = registry.signature(&canonical) {
            def.arity = arity;
            def.sorts = sorts.iter().map(|s| registry.resolve_sort(s)).collect();
        } else {
            if def.arity != 0 && def.sorts.len() != def.arity {
                def.sorts = vec!["Entity".to_string(); def.arity];
                stats.bump("predicate_unknown_sorts");
            } else {
                def.sorts = def.sorts.iter().map(|s| registry.resolve_sort(s)).collect();
            }
            if def.arity == 0 {
                def.arity = def.sorts.len();
            }
        }
        predicates.insert(canonical, def);
    }
    program.predicates = predicates;
}

/// Rewrite every identifier preceding `(` through the predicate resolver.
fn canonicalize_formulas(
    program: &mut LogicProgram,
    registry: &Ontology,
    stats: &mut NormalizationStats,
) {
    let mut alias_hits = 0u64;
    let mut rewrite = |text: &str| -> String {
        atom_rewrite_regex()
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let token = &caps[1];
                if is_logical_keyword(token) {
                    return format!("{}{}", token, &caps[2]);
                }
                let canonical = registry.resolve_predicate(token);
                if canonical != token {
                    alias_hits += 1;
                }
                format!("{}{}", canonical, &caps[2])
            })
            .into_owned()
    };

    for axiom in &mut program.axioms {
        axiom.formula = rewrite(&axiom.formula);
    }
    for rule in &mut program.rules {
        rule.condition = rewrite(&rule.condition);
        rule.conclusion = rewrite(&rule.conclusion);
    }
    if let Some(query) = program.query.clone() {
        program.query = Some(rewrite(&query));
    }

    let mut facts = BTreeMap::new();
    for (name, rows) in std::mem::take(&mut program.facts) {
        let canonical = registry.resolve_predicate(&name);
        if canonical != name {
            alias_hits += 1;
        }
        facts.insert(canonical, rows);
    }
    program.facts = facts;

    if alias_hits > 0 {
        stats.bump_by("predicate_alias_hits", alias_hits);
    }
}

/// Replace numeric literal arguments with freshly minted constants of the
/// positional sort. The logic layer is boolean; magnitudes carry no
/// information the solver can use.
fn coerce_numeric_literals(
    program: &mut LogicProgram,
    registry: &Ontology,
    stats: &mut NormalizationStats,
) {
    if program.predicates.is_empty() {
        return;
    }

    let predicates = program.predicates.clone();
    let positional_sort = |pred: &str, idx: usize| -> Option<String> {
        let canonical = registry.resolve_predicate(pred);
        let def = predicates.get(&canonical)?;
        Some(
            def.sorts
                .get(idx)
                .map(|s| registry.resolve_sort(s))
                .unwrap_or_else(|| "Entity".to_string()),
        )
    };

    // First pass: find the sorts that need a stand-in constant.
    let mut needed: Vec<(String, usize)> = Vec::new();
    {
        let mut scan = |text: &str| {
            for caps in atom_args_regex().captures_iter(text) {
                let args: Vec<&str> = caps[2]
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .collect();
                for (idx, arg) in args.iter().enumerate() {
                    if numeric_literal_regex().is_match(arg) {
                        if let Some(sort) = positional_sort(&caps[1], idx) {
                            if !needed.iter().any(|(s, _)| s == &sort) {
                                needed.push((sort, idx));
                            }
                        }
                    }
                }
            }
        };
        for axiom in &program.axioms {
            scan(&axiom.formula);
        }
        for rule in &program.rules {
            scan(&rule.condition);
            scan(&rule.conclusion);
        }
        if let Some(query) = &program.query {
            scan(query);
        }
    }
    if needed.is_empty() {
        return;
    }

    // Mint (or reuse) one constant per sort, then rewrite.
    let mut stand_ins: BTreeMap<String, String> = BTreeMap::new();
    for (sort, position) in needed {
        let name = program.ensure_constant_for_sort(&sort, position);
        stand_ins.insert(sort, name);
    }

    let mut replacements = 0u64;
    let mut rewrite_atoms = |text: &str| -> String {
        atom_args_regex()
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let args: Vec<&str> = caps[2]
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .collect();
                let mut changed = false;
                let mut new_args = Vec::with_capacity(args.len());
                for (idx, arg) in args.iter().enumerate() {
                    let stand_in = if numeric_literal_regex().is_match(arg) {
                        positional_sort(&caps[1], idx)
                            .and_then(|sort| stand_ins.get(&sort).cloned())
                    } else {
                        None
                    };
                    match stand_in {
                        Some(name) => {
                            new_args.push(name);
                            changed = true;
                        }
                        None => new_args.push((*arg).to_string()),
                    }
                }
                if changed {
                    replacements += 1;
                    format!("{}({})", &caps[1], new_args.join(", "))
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned()
    };

    for axiom in &mut program.axioms {
        axiom.formula = rewrite_atoms(&axiom.formula);
    }
    for rule in &mut program.rules {
        rule.condition = rewrite_atoms(&rule.condition);
        rule.conclusion = rewrite_atoms(&rule.conclusion);
    }
    if let Some(query) = program.query.clone() {
        program.query = Some(rewrite_atoms(&query));
    }
    if replacements > 0 {
        stats.bump_by("numeric_literals_coerced", replacements);
    }
}

/// Ensure every sort referenced by a predicate or constant is declared.
fn ensure_referenced_sorts(program: &mut LogicProgram, registry: &Ontology) {
    let mut referenced: Vec<String> = Vec::new();
    for def in program.predicates.values() {
        referenced.extend(def.sorts.iter().cloned());
    }
    for def in program.constants.values() {
        referenced.push(def.sort.clone());
    }
    for sort in referenced {
        if !program.sorts.contains_key(&sort) {
            let base = registry
                .parent_sort(&sort)
                .unwrap_or("Entity")
                .to_string();
            program.sorts.insert(sort, SortDef { base });
        }
    }
}

/// Ensure every predicate used in axioms/rules/query/facts is declared,
/// taking the registry signature when one exists.
fn ensure_declared_predicates(
    program: &mut LogicProgram,
    registry: &Ontology,
    stats: &mut NormalizationStats,
) {
    let mut candidates: Vec<String> = Vec::new();
    for axiom in &program.axioms {
        candidates.extend(extract_predicate_names(&axiom.formula));
    }
    for rule in &program.rules {
        candidates.extend(extract_predicate_names(&rule.condition));
        candidates.extend(extract_predicate_names(&rule.conclusion));
    }
    if let Some(query) = &program.query {
        candidates.extend(extract_predicate_names(query));
    }
    candidates.extend(program.facts.keys().cloned());

    for raw in candidates {
        let canonical = registry.resolve_predicate(&raw);
        if canonical.is_empty() || is_logical_keyword(&canonical) {
            continue;
        }
        if program.predicates.contains_key(&canonical) {
            continue;
        }
        let def = match registry.signature(&canonical) {
            Some((arity, sorts)) => {
                stats.bump("auto_declared_predicates");
                PredicateDef {
                    arity,
                    sorts: sorts.iter().map(|s| registry.resolve_sort(s)).collect(),
                }
            }
            None => PredicateDef::default(),
        };
        program.predicates.insert(canonical, def);
    }

    // Newly declared predicates may reference sorts not yet present.
    ensure_referenced_sorts(program, registry);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> Ontology {
        Ontology::load_default().expect("embedded catalogue")
    }

    #[test]
    fn test_facts_list_coerced_to_truth_rows() {
        let raw = json!({ "facts": ["ContrattoValido", "Inadempimento"] });
        let (program, stats) = normalize_value(&raw);
        assert_eq!(program.facts["ContrattoValido"], vec![Vec::<String>::new()]);
        assert_eq!(stats.get("fact_list_coerced"), 2);
    }

    #[test]
    fn test_fact_string_rows_become_tuples() {
        let raw = json!({ "facts": { "BuonaFede": ["tizio"] } });
        let (program, _) = normalize_value(&raw);
        assert_eq!(program.facts["BuonaFede"], vec![vec!["tizio".to_string()]]);
    }

    #[test]
    fn test_constants_list_coerced() {
        let raw = json!({ "constants": [ {"name": "deb", "sort": "Debitore"}, "Contratto" ] });
        let (program, stats) = normalize_value(&raw);
        assert_eq!(program.constants["deb"].sort, "Debitore");
        assert_eq!(program.constants["c1"].sort, "Contratto");
        assert_eq!(stats.get("constant_list_coerced"), 2);
    }

    #[test]
    fn test_axiom_strings_wrapped_and_sanitized() {
        let raw = json!({ "axioms": ["A \u{2227} B", {"condition": "true", "conclusion": "C"}] });
        let (program, stats) = normalize_value(&raw);
        assert_eq!(program.axioms[0].formula, "A and B");
        assert_eq!(program.axioms[1].formula, "C");
        assert_eq!(stats.get("axiom_strings_wrapped"), 1);
    }

    #[test]
    fn test_axiom_condition_folded_into_implication() {
        let raw = json!({ "axioms": [{"condition": "A", "conclusion": "B"}] });
        let (program, _) = normalize_value(&raw);
        assert_eq!(program.axioms[0].formula, "A -> B");
    }

    #[test]
    fn test_rule_string_splitting() {
        let raw = json!({ "rules": ["A -> B", "C :- D", "SoloConclusione"] });
        let (program, _) = normalize_value(&raw);
        assert_eq!(program.rules[0].condition, "A");
        assert_eq!(program.rules[0].conclusion, "B");
        // Prolog style: head :- body.
        assert_eq!(program.rules[1].condition, "D");
        assert_eq!(program.rules[1].conclusion, "C");
        assert_eq!(program.rules[2].condition, "true");
        assert_eq!(program.rules[2].conclusion, "SoloConclusione");
    }

    #[test]
    fn test_query_object_flattened() {
        let raw = json!({ "query": {"pred": "ContrattoValido", "args": ["x", "c"]} });
        let (program, _) = normalize_value(&raw);
        assert_eq!(program.query.as_deref(), Some("ContrattoValido(x,c)"));
    }

    #[test]
    fn test_garbage_root_resets() {
        let (program, stats) = normalize_value(&json!("not an object"));
        assert_eq!(program, LogicProgram::default());
        assert_eq!(stats.get("logic_program_root_reset"), 1);
    }

    #[test]
    fn test_hydrate_declares_used_predicates() {
        let registry = registry();
        let raw = json!({
            "rules": [{"condition": "BuonaFede(tizio)", "conclusion": "UsucapioneOrdinaria(tizio, fondo)"}],
            "query": "UsucapioneOrdinaria(tizio, fondo)"
        });
        let (mut program, mut stats) = normalize_value(&raw);
        hydrate(&mut program, &registry, &mut stats);
        assert!(program.predicates.contains_key("BuonaFede"));
        assert!(program.predicates.contains_key("UsucapioneOrdinaria"));
        assert!(program.sorts.contains_key("Soggetto"));
        assert!(stats.get("auto_declared_predicates") >= 2);
    }

    #[test]
    fn test_hydrate_canonicalizes_aliases_in_formulas() {
        let registry = registry();
        let raw = json!({
            "axioms": ["possessopacifico(tizio, fondo)"],
            "predicates": {"possessopacifico": {"arity": 2, "sorts": ["Soggetto", "Bene"]}}
        });
        let (mut program, mut stats) = normalize_value(&raw);
        hydrate(&mut program, &registry, &mut stats);
        assert_eq!(program.axioms[0].formula, "PossessoPubblico(tizio, fondo)");
        assert!(program.predicates.contains_key("PossessoPubblico"));
        assert!(!program.predicates.contains_key("possessopacifico"));
    }

    #[test]
    fn test_numeric_literals_replaced_by_constants() {
        let registry = registry();
        let raw = json!({
            "predicates": {"DurataPossesso": {"arity": 2, "sorts": ["Soggetto", "Bene"]}},
            "axioms": ["DurataPossesso(tizio, 20)"]
        });
        let (mut program, mut stats) = normalize_value(&raw);
        hydrate(&mut program, &registry, &mut stats);
        assert!(!program.axioms[0].formula.contains("20"));
        assert!(program.constants.values().any(|c| c.sort == "Bene"));
        assert_eq!(stats.get("numeric_literals_coerced"), 1);
    }

    #[test]
    fn test_hydrate_is_idempotent() {
        let registry = registry();
        let raw = json!({
            "predicates": {"DurataPossesso": {"arity": 2, "sorts": ["Soggetto", "Bene"]}},
            "axioms": ["DurataPossesso(tizio, 20)", "possessopacifico(tizio, fondo)"],
            "query": "UsucapioneOrdinaria(tizio, fondo)"
        });
        let (mut program, mut stats) = normalize_value(&raw);
        hydrate(&mut program, &registry, &mut stats);
        let first = program.clone();
        hydrate(&mut program, &registry, &mut stats);
        assert_eq!(program, first);
    }

    #[test]
    fn test_logical_keyword_predicates_removed() {
        let registry = registry();
        let raw = json!({ "predicates": {"and": {"arity": 0}, "Mora": {"arity": 1, "sorts": ["Debitore"]}} });
        let (mut program, mut stats) = normalize_value(&raw);
        hydrate(&mut program, &registry, &mut stats);
        assert!(!program.predicates.contains_key("and"));
        assert!(program.predicates.contains_key("Mora"));
        assert_eq!(stats.get("logical_predicates_removed"), 1);
    }
}
