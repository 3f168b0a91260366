//! Golden legal reasoning cases.
//!
//! Higher-level patterns built on the DSL v2.1 and the symbolic layer:
//! contractual liability (entailed and premise-missing), conflicting
//! penalty clauses, and canonical-rule injection for contract validity.

use std::collections::BTreeMap;

use civilex::program::canonical::ensure_canonical_query_rule;
use civilex::{
    evaluate_program, FeedbackStatus, LogicProgram, Ontology, PredicateDef, Rule,
};

// ============================================================================
// Test Helpers
// ============================================================================

fn registry() -> Ontology {
    Ontology::load_default().expect("embedded catalogue must load")
}

fn zero_ary(names: &[&str]) -> BTreeMap<String, PredicateDef> {
    names
        .iter()
        .map(|n| ((*n).to_string(), PredicateDef::default()))
        .collect()
}

fn liability_program() -> LogicProgram {
    let mut program = LogicProgram {
        predicates: zero_ary(&[
            "ContrattoValido",
            "Inadempimento",
            "NessoCausale",
            "DannoPatrimoniale",
            "ResponsabilitaContrattuale",
        ]),
        query: Some("ResponsabilitaContrattuale".to_string()),
        ..Default::default()
    };
    program.rules.push(Rule {
        condition: "ContrattoValido and Inadempimento and NessoCausale and DannoPatrimoniale"
            .to_string(),
        conclusion: "ResponsabilitaContrattuale".to_string(),
        id: None,
    });
    program
}

fn assert_fact(program: &mut LogicProgram, name: &str) {
    program.facts.insert(name.to_string(), vec![Vec::new()]);
}

// ============================================================================
// Case 1: contractual liability, entailed
// ============================================================================

#[test]
fn test_contractual_liability_entails() {
    let registry = registry();
    let mut program = liability_program();
    for fact in [
        "ContrattoValido",
        "Inadempimento",
        "NessoCausale",
        "DannoPatrimoniale",
    ] {
        assert_fact(&mut program, fact);
    }

    let feedback = evaluate_program(&program, &registry).expect("solver builds");

    assert_eq!(feedback.status, FeedbackStatus::ConsistentEntails);
    assert!(feedback.human_summary.contains("coerente"));
    assert!(feedback.human_summary.contains("implica"));
    assert!(feedback.conflicting_axioms.is_empty());
    assert!(feedback.missing_links.is_empty());
}

// ============================================================================
// Case 2: contractual liability, premise missing
// ============================================================================

#[test]
fn test_contractual_liability_not_entailed() {
    let registry = registry();
    let mut program = liability_program();
    for fact in ["ContrattoValido", "Inadempimento", "DannoPatrimoniale"] {
        assert_fact(&mut program, fact);
    }

    let feedback = evaluate_program(&program, &registry).expect("solver builds");

    assert_eq!(feedback.status, FeedbackStatus::ConsistentNoEntailment);
    assert!(feedback
        .human_summary
        .contains("coerente ma la conclusione non è dimostrabile"));
    assert!(feedback.conflicting_axioms.is_empty());
    assert!(feedback.missing_links.contains(&"NessoCausale".to_string()));
    assert!(!feedback
        .missing_links
        .contains(&"ResponsabilitaContrattuale".to_string()));
}

// ============================================================================
// Case 3: conflicting penalty-clause rules
// ============================================================================

#[test]
fn test_conflicting_rules_inconsistent() {
    let registry = registry();
    let mut program = LogicProgram {
        predicates: zero_ary(&[
            "ContrattoValido",
            "RitardoOltreSoglia",
            "ClausolaPenaleApplicabile",
        ]),
        ..Default::default()
    };
    program.rules.push(Rule {
        condition: "ContrattoValido and RitardoOltreSoglia".to_string(),
        conclusion: "ClausolaPenaleApplicabile".to_string(),
        id: None,
    });
    program.rules.push(Rule {
        condition: "ContrattoValido and RitardoOltreSoglia".to_string(),
        conclusion: "not ClausolaPenaleApplicabile".to_string(),
        id: None,
    });
    assert_fact(&mut program, "ContrattoValido");
    assert_fact(&mut program, "RitardoOltreSoglia");

    let feedback = evaluate_program(&program, &registry).expect("solver builds");

    assert_eq!(feedback.status, FeedbackStatus::Inconsistent);
    assert!(feedback.human_summary.contains("contraddittori"));
    assert!(!feedback.conflicting_axioms.is_empty());
}

// ============================================================================
// Case 4: canonical-rule injection for contract validity
// ============================================================================

#[test]
fn test_canonical_rule_injection_enables_entailment() {
    let registry = registry();
    let mut program = LogicProgram {
        query: Some("ContrattoValido(x, c)".to_string()),
        ..Default::default()
    };
    for name in [
        "Consenso",
        "CapacitaContrattuale",
        "CausaLegittima",
        "OggettoDeterminato",
        "FormaPrescritta",
        "ContrattoValido",
    ] {
        let (arity, sorts) = registry.signature(name).expect("registry predicate");
        program
            .predicates
            .insert(name.to_string(), PredicateDef { arity, sorts });
    }
    program
        .facts
        .insert("Consenso".into(), vec![vec!["x".into(), "c".into()]]);
    program
        .facts
        .insert("CapacitaContrattuale".into(), vec![vec!["x".into()]]);
    program
        .facts
        .insert("CausaLegittima".into(), vec![vec!["c".into()]]);
    program
        .facts
        .insert("OggettoDeterminato".into(), vec![vec!["c".into()]]);
    program
        .facts
        .insert("FormaPrescritta".into(), vec![vec!["c".into()]]);

    ensure_canonical_query_rule(&mut program, &registry);

    // Injected exactly once, and idempotent.
    assert_eq!(program.rules.len(), 1);
    ensure_canonical_query_rule(&mut program, &registry);
    assert_eq!(program.rules.len(), 1);

    let feedback = evaluate_program(&program, &registry).expect("solver builds");
    assert_eq!(feedback.status, FeedbackStatus::ConsistentEntails);
}

// ============================================================================
// Usucapione: abbreviated acquisition needs the suitable title
// ============================================================================

#[test]
fn test_usucapione_abbreviata_requires_titolo() {
    let registry = registry();
    let mut program = LogicProgram {
        query: Some("UsucapioneAbbreviata(tizio, auto)".to_string()),
        ..Default::default()
    };
    ensure_canonical_query_rule(&mut program, &registry);
    assert_eq!(program.rules.len(), 1);
    assert!(program.rules[0].condition.contains("TitoloIdoneo"));
    // The title party was materialized as a constant.
    assert!(program.constants.values().any(|c| c.sort == "Titolo"));

    let feedback = evaluate_program(&program, &registry).expect("solver builds");
    assert_eq!(feedback.status, FeedbackStatus::ConsistentNoEntailment);
    assert!(feedback.missing_links.contains(&"TitoloIdoneo".to_string()));
}
