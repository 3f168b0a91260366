//! Deterministic dummy artifacts.
//!
//! Every stage has a schema-valid offline counterpart so the pipeline is
//! functional end-to-end without a model: tests, CI and degraded
//! production paths all run through these.

use crate::ontology::Ontology;
use crate::program::canonical::ensure_canonical_query_rule;
use crate::program::{ConstantDef, LogicProgram, PredicateDef, SortDef};

use super::outputs::{CanonicalizerOutput, JudgeVerdict, RefinementOutput, StructuredAnswer};

pub fn dummy_freeform_answer(extra: Option<&str>) -> String {
    let base = "Sono il client LLM in modalità dummy. \
                In un contesto reale qui ci sarebbe la risposta del modello.";
    match extra {
        Some(extra) => format!("{base} {extra}"),
        None => base.to_string(),
    }
}

/// Minimal but coherent DSL v2.1 program for the contractual-liability
/// derivation. Fallback and throttled paths still carry canonical
/// declarations and the final query rule, so missing links stay
/// informative.
pub fn dummy_logic_program(registry: &Ontology) -> LogicProgram {
    let mut program = LogicProgram::default();

    for (name, base) in [
        ("Soggetto", "Entity"),
        ("Debitore", "Soggetto"),
        ("Creditore", "Soggetto"),
        ("Contratto", "Entity"),
        ("Danno", "Entity"),
        ("Evento", "Entity"),
    ] {
        program
            .sorts
            .insert(name.to_string(), SortDef { base: base.to_string() });
    }

    for (name, sort) in [
        ("deb_dummy", "Debitore"),
        ("cred_dummy", "Creditore"),
        ("contratto_dummy", "Contratto"),
        ("danno_dummy", "Danno"),
        ("evento_dummy", "Evento"),
    ] {
        program
            .constants
            .insert(name.to_string(), ConstantDef { sort: sort.to_string() });
    }

    for name in [
        "HaObbligo",
        "Inadempimento",
        "DannoPatrimoniale",
        "Imputabilita",
        "ResponsabilitaContrattuale",
        "Consenso",
        "CapacitaContrattuale",
        "CausaLegittima",
        "OggettoDeterminato",
        "FormaPrescritta",
        "ContrattoValido",
    ] {
        let (arity, sorts) = registry
            .signature(name)
            .unwrap_or((0, Vec::new()));
        program
            .predicates
            .insert(name.to_string(), PredicateDef { arity, sorts });
    }

    program.query =
        Some("ResponsabilitaContrattuale(deb_dummy, cred_dummy, contratto_dummy)".to_string());
    ensure_canonical_query_rule(&mut program, registry);
    program
}

pub fn dummy_structured_answer(question: &str, registry: &Ontology) -> StructuredAnswer {
    let program = dummy_logic_program(registry);
    StructuredAnswer {
        final_answer: format!("Risposta generica (modalità dummy) alla domanda: '{question}'."),
        premises: vec![
            "Esiste almeno un contratto valido.".to_string(),
            "Le parti sono identificate in modo astratto.".to_string(),
        ],
        conclusion: "Contratto valido a fini dimostrativi.".to_string(),
        logic_program: serde_json::to_value(&program).unwrap_or_default(),
    }
}

pub fn dummy_canonicalizer_output(question: &str) -> CanonicalizerOutput {
    CanonicalizerOutput::minimal(question)
}

pub fn dummy_refinement_output(
    question: &str,
    previous_answer: Option<&str>,
    registry: &Ontology,
) -> RefinementOutput {
    let program = dummy_logic_program(registry);
    RefinementOutput {
        final_answer: previous_answer
            .map(str::to_string)
            .unwrap_or_else(|| format!("Risposta dummy per: {question}")),
        logic_program: serde_json::to_value(&program).unwrap_or_default(),
        notes: Some("Dummy response".to_string()),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn dummy_judge_verdict(
    question: &str,
    reference_answer: Option<&str>,
    answer_a: &str,
    answer_b: &str,
    label_a: &str,
    label_b: &str,
    rationale: &str,
) -> JudgeVerdict {
    JudgeVerdict {
        question: question.to_string(),
        reference_answer: reference_answer.map(str::to_string),
        answer_a: answer_a.to_string(),
        answer_b: answer_b.to_string(),
        label_a: label_a.to_string(),
        label_b: label_b.to_string(),
        vote: "tie".to_string(),
        confidence: 0.0,
        rationale: Some(rationale.to_string()),
    }
}
