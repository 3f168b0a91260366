//! Prompt builders for the real backend.
//!
//! On-disk prompt resources live with the deployment, not with the core;
//! these helpers assemble the minimal instruction text each stage needs,
//! embedding the ontology signature list where the stage relies on it.

use crate::feedback::LogicFeedback;
use crate::ontology::Ontology;
use crate::program::LogicProgram;

use super::outputs::CanonicalizerOutput;

/// Compact one-line-per-predicate ontology listing.
fn ontology_listing(registry: &Ontology) -> String {
    let mut lines = Vec::new();
    for (name, spec) in registry.predicates() {
        lines.push(format!("- {}({})", name, spec.sorts.join(", ")));
    }
    lines.join("\n")
}

pub fn freeform_prompt(question: &str) -> String {
    format!(
        "You are a helpful Italian legal assistant. \
         Answer the following question in clear Italian.\n\n\
         Domanda: {question}\n\nRisposta:"
    )
}

pub fn structured_prompt(question: &str) -> String {
    format!(
        "Rispondi SOLO con un oggetto JSON, senza testo extra, con lo schema:\n\
         {{\n  \"final_answer\": \"spiegazione in italiano\",\n  \
         \"premises\": [\"...\"],\n  \"conclusion\": \"...\",\n  \
         \"logic_program\": {{ \"dsl_version\": \"2.1\", \"sorts\": {{}}, \
         \"constants\": {{}}, \"predicates\": {{}}, \"facts\": {{}}, \
         \"axioms\": [], \"rules\": [], \"query\": null }}\n}}\n\n\
         Domanda: {question}\n"
    )
}

pub fn canonicalizer_prompt(question: &str, registry: &Ontology) -> String {
    format!(
        "Sei il canonicalizzatore di un sistema neuro-simbolico per il \
         diritto civile italiano. Mappa i concetti della domanda sui \
         predicati canonici elencati sotto. Rispondi SOLO con JSON con i \
         campi: question, language (\"it\"), domain \
         (\"civil_law_contractual_liability\"), concepts (lista di \
         {{text, canonical_predicate, confidence, notes}}), unmapped_terms \
         (lista di {{text, reason}} con reason in [\"unknown\", \
         \"out_of_scope\"]).\n\nPredicati canonici:\n{}\n\nDomanda: {}\n",
        ontology_listing(registry),
        question
    )
}

pub fn extractor_prompt(
    question: &str,
    canonicalization: &CanonicalizerOutput,
    registry: &Ontology,
) -> String {
    let canonicalization_json =
        serde_json::to_string_pretty(canonicalization).unwrap_or_default();
    format!(
        "Estrai un programma logico DSL v2.1 dalla domanda. Usa SOLO i \
         predicati canonici elencati. Rispondi SOLO con JSON: \
         {{ \"logic_program\": {{ \"dsl_version\": \"2.1\", \"sorts\": {{}}, \
         \"constants\": {{}}, \"predicates\": {{}}, \"facts\": {{}}, \
         \"axioms\": [], \"rules\": [{{\"condition\": \"...\", \
         \"conclusion\": \"...\"}}], \"query\": \"Predicato(arg, ...)\" }} }}\n\n\
         Predicati canonici:\n{}\n\nCanonicalizzazione:\n{}\n\nDomanda: {}\n",
        ontology_listing(registry),
        canonicalization_json,
        question
    )
}

pub fn refinement_prompt(
    question: &str,
    program: &LogicProgram,
    feedback: &LogicFeedback,
    previous_answer: Option<&str>,
    history_summary: Option<&str>,
) -> String {
    let program_json = serde_json::to_string_pretty(program).unwrap_or_default();
    let missing = serde_json::to_string(&feedback.missing_links).unwrap_or_default();
    let conflicts = serde_json::to_string(&feedback.conflicting_axioms).unwrap_or_default();
    format!(
        "Raffina il programma logico DSL v2.1 usando il feedback del \
         solver. Aggiungi i fatti o gli assiomi necessari a rendere \
         dimostrabile la query, senza introdurre contraddizioni. Rispondi \
         SOLO con JSON: {{ \"final_answer\": \"...\", \"logic_program\": \
         {{...}}, \"notes\": \"...\" }}\n\n\
         Domanda: {question}\n\n\
         Risposta precedente: {previous}\n\n\
         Programma corrente:\n{program_json}\n\n\
         Stato solver: {status}\n\
         Missing links: {missing}\n\
         Assiomi in conflitto: {conflicts}\n\
         Sintesi: {summary}\n\n\
         Contesto iterazioni:\n{history}\n",
        question = question,
        previous = previous_answer.unwrap_or("(nessuna)"),
        program_json = program_json,
        status = feedback.status.as_str(),
        missing = missing,
        conflicts = conflicts,
        summary = feedback.human_summary,
        history = history_summary.unwrap_or("Nessuna iterazione precedente: primo refinement."),
    )
}

#[allow(clippy::too_many_arguments)]
pub fn judge_prompt(
    question: &str,
    reference_answer: &str,
    answer_a: &str,
    answer_b: &str,
    label_a: &str,
    label_b: &str,
) -> String {
    format!(
        "Sei un giudice imparziale. Confronta le due risposte con la \
         risposta di riferimento e vota quella migliore. Rispondi SOLO \
         con JSON: {{ \"vote\": \"{label_a}\" | \"{label_b}\" | \"tie\", \
         \"confidence\": 0.0-1.0, \"rationale\": \"...\" }}\n\n\
         Domanda: {question}\n\n\
         Riferimento: {reference_answer}\n\n\
         Risposta {label_a}:\n{answer_a}\n\n\
         Risposta {label_b}:\n{answer_b}\n"
    )
}
