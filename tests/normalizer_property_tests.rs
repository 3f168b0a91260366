//! Property tests for the normalizer and the program model.
//!
//! Two invariants matter to every downstream stage:
//! - normalization + hydration + canonical-rule injection is idempotent;
//! - normalized programs survive a serialize/deserialize round trip.

use proptest::prelude::*;
use serde_json::json;

use civilex::program::canonical::ensure_canonical_query_rule;
use civilex::program::normalize::{hydrate, normalize_value, NormalizationStats};
use civilex::{LogicProgram, Ontology};

fn registry() -> Ontology {
    Ontology::load_default().expect("embedded catalogue must load")
}

/// Canonical predicate pool used by the generators (all registry-known).
const PREDICATES: &[&str] = &[
    "ContrattoValido",
    "Inadempimento",
    "DannoPatrimoniale",
    "BuonaFede",
    "PossessoContinuato",
    "Mora",
];

const CONSTANTS: &[(&str, &str)] = &[
    ("deb", "Debitore"),
    ("cred", "Creditore"),
    ("contratto", "Contratto"),
    ("tizio", "Soggetto"),
    ("fondo", "Bene"),
];

fn arb_atom() -> impl Strategy<Value = String> {
    let pred = prop::sample::select(PREDICATES.to_vec());
    let args = prop::collection::vec(
        prop::sample::select(CONSTANTS.iter().map(|(n, _)| *n).collect::<Vec<_>>()),
        0..3,
    );
    (pred, args).prop_map(|(pred, args)| {
        if args.is_empty() {
            pred.to_string()
        } else {
            format!("{}({})", pred, args.join(", "))
        }
    })
}

fn arb_rule_string() -> impl Strategy<Value = String> {
    (arb_atom(), arb_atom()).prop_map(|(cond, concl)| format!("{cond} -> {concl}"))
}

/// Heterogeneous raw payloads the way LLMs actually emit them: facts as
/// name lists, axioms as bare strings, rules as arrow strings.
fn arb_raw_program() -> impl Strategy<Value = serde_json::Value> {
    let facts = prop::collection::vec(prop::sample::select(PREDICATES.to_vec()), 0..4);
    let axioms = prop::collection::vec(arb_atom(), 0..4);
    let rules = prop::collection::vec(arb_rule_string(), 0..3);
    let query = prop::option::of(arb_atom());
    (facts, axioms, rules, query).prop_map(|(facts, axioms, rules, query)| {
        json!({
            "dsl_version": "2.1",
            "facts": facts,
            "axioms": axioms,
            "rules": rules,
            "query": query,
        })
    })
}

fn normalized(raw: &serde_json::Value, registry: &Ontology) -> LogicProgram {
    let (mut program, mut stats) = normalize_value(raw);
    hydrate(&mut program, registry, &mut stats);
    ensure_canonical_query_rule(&mut program, registry);
    program
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_normalization_is_idempotent(raw in arb_raw_program()) {
        let registry = registry();
        let mut once = normalized(&raw, &registry);

        let mut stats = NormalizationStats::default();
        hydrate(&mut once, &registry, &mut stats);
        ensure_canonical_query_rule(&mut once, &registry);

        let baseline = normalized(&raw, &registry);
        prop_assert_eq!(once, baseline);
    }

    #[test]
    fn prop_normalized_programs_round_trip(raw in arb_raw_program()) {
        let registry = registry();
        let program = normalized(&raw, &registry);
        let json = serde_json::to_string(&program).expect("serialize");
        let back: LogicProgram = serde_json::from_str(&json).expect("deserialize");
        prop_assert_eq!(back, program);
    }

    #[test]
    fn prop_every_used_predicate_is_declared(raw in arb_raw_program()) {
        let registry = registry();
        let program = normalized(&raw, &registry);
        for name in program.facts.keys() {
            prop_assert!(program.predicates.contains_key(name));
        }
        for def in program.predicates.values() {
            prop_assert_eq!(def.arity, def.sorts.len());
            for sort in &def.sorts {
                prop_assert!(program.sorts.contains_key(sort));
            }
        }
        for constant in program.constants.values() {
            prop_assert!(program.sorts.contains_key(&constant.sort));
        }
        prop_assert_eq!(program.dsl_version.as_str(), "2.1");
    }
}
