//! Canonical rule injection.
//!
//! LLMs routinely state every premise of a textbook derivation and then
//! omit the final rule that produces the query predicate. For a known
//! family of query predicates we synthesize that rule from the civil-code
//! requisites so the query is derivable whenever the premises hold.

use tracing::info;

use crate::dsl::extract_predicate_names;
use crate::ontology::Ontology;

use super::{LogicProgram, PredicateDef, Rule, SortDef};

/// Guarantee the query predicate has at least one derivation rule.
/// Injection is idempotent: an existing rule concluding the query atom
/// suppresses it. No-op for unknown query predicates or absent queries.
pub fn ensure_canonical_query_rule(program: &mut LogicProgram, registry: &Ontology) {
    let Some((raw_query, predicate, args)) = extract_query_atom(program.query.as_deref()) else {
        return;
    };
    if program.has_rule_concluding(&raw_query) {
        return;
    }

    let rule = match predicate.as_str() {
        "ContrattoValido" => build_contratto_valido(&args),
        "ResponsabilitaContrattuale" => build_responsabilita_contrattuale(&args),
        "ContrattoAdesione" => build_contratto_adesione(program, registry, &args),
        "UsucapioneOrdinaria" => build_usucapione_ordinaria(&args),
        "UsucapioneAbbreviata" => build_usucapione_abbreviata(program, registry, &args),
        _ => None,
    };
    let Some(mut rule) = rule else {
        return;
    };
    rule.conclusion = raw_query.clone();

    declare_rule_predicates(program, registry, &rule);
    program.rules.push(rule);
    info!(query = %raw_query, "injected canonical rule for query");
}

/// Declare the premises an injected rule introduces, so injection leaves
/// the program closed under its declaration invariants.
fn declare_rule_predicates(program: &mut LogicProgram, registry: &Ontology, rule: &Rule) {
    let mut names = extract_predicate_names(&rule.condition);
    names.extend(extract_predicate_names(&rule.conclusion));
    for name in names {
        if program.predicates.contains_key(&name) {
            continue;
        }
        let Some((arity, sorts)) = registry.signature(&name) else {
            continue;
        };
        for sort in &sorts {
            if !program.sorts.contains_key(sort) {
                let base = registry.parent_sort(sort).unwrap_or("Entity").to_string();
                program.sorts.insert(sort.clone(), SortDef { base });
            }
        }
        program
            .predicates
            .insert(name, PredicateDef { arity, sorts });
    }
}

// ----------------------------------------------------------------------------
// Builders (one per canonical derivation)
// ----------------------------------------------------------------------------

/// `ContrattoValido(x, c)` requires the essential elements of the contract
/// (artt. 1325 ss. c.c.).
fn build_contratto_valido(args: &[String]) -> Option<Rule> {
    if args.len() != 2 {
        return None;
    }
    let (x, c) = (&args[0], &args[1]);
    Some(Rule {
        condition: format!(
            "(and Consenso({x}, {c}) CapacitaContrattuale({x}) CausaLegittima({c}) \
             OggettoDeterminato({c}) FormaPrescritta({c}))"
        ),
        conclusion: atom_text("ContrattoValido", args),
        id: None,
    })
}

/// `ResponsabilitaContrattuale(d, cr, c)` per artt. 1218 ss. c.c.
fn build_responsabilita_contrattuale(args: &[String]) -> Option<Rule> {
    if args.len() != 3 {
        return None;
    }
    let (d, cr, c) = (&args[0], &args[1], &args[2]);
    Some(Rule {
        condition: format!(
            "(and HaObbligo({d}, {cr}, {c}) Inadempimento({d}, {c}) \
             DannoPatrimoniale({cr}) Imputabilita({d}, {c}))"
        ),
        conclusion: atom_text("ResponsabilitaContrattuale", args),
        id: None,
    })
}

/// `ContrattoAdesione(c)` per art. 1341 c.c.; the professional and the
/// consumer parties are materialized as constants when missing.
fn build_contratto_adesione(
    program: &mut LogicProgram,
    registry: &Ontology,
    args: &[String],
) -> Option<Rule> {
    if args.len() != 1 {
        return None;
    }
    let contratto = args[0].clone();
    let professionista = ensure_named_constant(
        program,
        registry,
        &format!("{contratto}_professionista"),
        "Professionista",
    );
    let consumatore = ensure_named_constant(
        program,
        registry,
        &format!("{contratto}_consumatore"),
        "Consumatore",
    );
    Some(Rule {
        condition: format!(
            "(and PredeterminatoDa({contratto}, {professionista}) \
             NonNegoziabileDa({contratto}, {consumatore}) \
             PuoSoloAccettareOppureRifiutare({consumatore}, {contratto}))"
        ),
        conclusion: atom_text("ContrattoAdesione", args),
        id: None,
    })
}

/// `UsucapioneOrdinaria(s, b)` per art. 1158 c.c.
fn build_usucapione_ordinaria(args: &[String]) -> Option<Rule> {
    if args.len() != 2 {
        return None;
    }
    let (s, b) = (&args[0], &args[1]);
    Some(Rule {
        condition: format!(
            "(and PossessoContinuato({s}, {b}) PossessoPubblico({s}, {b}) BuonaFede({s}))"
        ),
        conclusion: atom_text("UsucapioneOrdinaria", args),
        id: None,
    })
}

/// `UsucapioneAbbreviata(s, b)`: the ordinary conditions plus a suitable
/// title (art. 1153 c.c.).
fn build_usucapione_abbreviata(
    program: &mut LogicProgram,
    registry: &Ontology,
    args: &[String],
) -> Option<Rule> {
    if args.len() != 2 {
        return None;
    }
    let (s, b) = (args[0].clone(), args[1].clone());
    let titolo = ensure_named_constant(program, registry, &format!("titolo_{b}"), "Titolo");
    Some(Rule {
        condition: format!(
            "(and PossessoContinuato({s}, {b}) PossessoPubblico({s}, {b}) \
             BuonaFede({s}) TitoloIdoneo({titolo}, {b}))"
        ),
        conclusion: atom_text("UsucapioneAbbreviata", args),
        id: None,
    })
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

fn extract_query_atom(query: Option<&str>) -> Option<(String, String, Vec<String>)> {
    let text = query?.trim();
    if text.is_empty() {
        return None;
    }
    if !text.contains('(') || !text.ends_with(')') {
        return Some((text.to_string(), text.to_string(), Vec::new()));
    }
    let (name, rest) = text.split_once('(')?;
    let name = name.trim().to_string();
    let args: Vec<String> = rest[..rest.len() - 1]
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    Some((text.to_string(), name, args))
}

fn atom_text(predicate: &str, args: &[String]) -> String {
    if args.is_empty() {
        format!("{predicate}()")
    } else {
        format!("{}({})", predicate, args.join(", "))
    }
}

/// Reuse a constant of the sort when present; otherwise declare one under
/// `base_name` (suffixing on collision) along with its sort definition.
fn ensure_named_constant(
    program: &mut LogicProgram,
    registry: &Ontology,
    base_name: &str,
    sort: &str,
) -> String {
    if let Some(existing) = program.constant_of_sort(sort) {
        return existing.to_string();
    }
    let mut candidate = base_name.to_string();
    let mut idx = 1;
    while program.constants.contains_key(&candidate) {
        idx += 1;
        candidate = format!("{base_name}_{idx}");
    }
    program.constants.insert(
        candidate.clone(),
        super::ConstantDef { sort: sort.to_string() },
    );
    if !program.sorts.contains_key(sort) {
        let base = registry.parent_sort(sort).unwrap_or("Entity").to_string();
        program.sorts.insert(sort.to_string(), SortDef { base });
    }
    candidate
}
