//! Refinement runtime: solver-guided program refinement with a bounded
//! retry when the model ignores the missing links it was told about.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::feedback::LogicFeedback;
use crate::llm::{LlmClient, RefinementOutput};
use crate::program::LogicProgram;

/// Refinement attempts per iteration before falling back.
const MAX_REFINEMENT_ATTEMPTS: usize = 2;

/// Execute the refinement prompt and validate the output.
pub struct RefinementRuntime {
    llm: Arc<LlmClient>,
}

impl RefinementRuntime {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        RefinementRuntime { llm }
    }

    /// Run the refinement LLM over the current program and feedback.
    ///
    /// When the returned program still omits every predicate listed in
    /// `missing_links`, a machine-formatted hint is prepended to the
    /// history context and the call retried once; after that the previous
    /// state wins.
    pub fn run(
        &self,
        question: &str,
        current_program: &LogicProgram,
        current_feedback: &LogicFeedback,
        previous_answer: Option<&str>,
        history_summary: Option<&str>,
    ) -> RefinementOutput {
        let mut retry_hint = String::new();
        let mut last_result: Option<RefinementOutput> = None;

        for attempt in 0..MAX_REFINEMENT_ATTEMPTS {
            let runtime_history = if retry_hint.is_empty() {
                history_summary.map(str::to_string)
            } else {
                let base = history_summary
                    .unwrap_or("Nessuna iterazione precedente: primo refinement.");
                Some(format!("{base}\n\n{retry_hint}"))
            };

            let result = self.llm.call_refinement(
                question,
                current_program,
                current_feedback,
                previous_answer,
                runtime_history.as_deref(),
            );

            match result {
                Ok(output) => {
                    let covered = covers_missing_links(
                        &output.logic_program,
                        &current_feedback.missing_links,
                    );
                    last_result = Some(output);
                    if covered {
                        info!(
                            status = current_feedback.status.as_str(),
                            "refinement runtime completed"
                        );
                        return last_result.expect("just stored");
                    }
                    retry_hint = build_retry_hint(&current_feedback.missing_links);
                    warn!(
                        attempt = attempt + 1,
                        missing = ?current_feedback.missing_links,
                        "refinement output missing predicates, retrying"
                    );
                }
                Err(err) => {
                    error!(error = %err, "refinement runtime failed, returning fallback");
                    return self.fallback_output(question, previous_answer, current_program);
                }
            }
        }

        last_result.unwrap_or_else(|| {
            self.fallback_output(question, previous_answer, current_program)
        })
    }

    fn fallback_output(
        &self,
        _question: &str,
        previous_answer: Option<&str>,
        current_program: &LogicProgram,
    ) -> RefinementOutput {
        let answer = previous_answer
            .map(str::to_string)
            .unwrap_or_else(|| {
                "Risposta generica (fallback) in attesa di un refinement valido.".to_string()
            });
        RefinementOutput {
            final_answer: answer,
            logic_program: serde_json::to_value(current_program).unwrap_or_default(),
            notes: Some("Fallback refinement output".to_string()),
        }
    }
}

/// True when every missing predicate appears applied (`Name(`) somewhere
/// in the program's axioms, rules or query.
fn covers_missing_links(logic_program: &Value, missing_links: &[String]) -> bool {
    if missing_links.is_empty() {
        return true;
    }

    let mut corpus: Vec<String> = Vec::new();
    if let Some(axioms) = logic_program.get("axioms").and_then(Value::as_array) {
        for axiom in axioms {
            match axiom {
                Value::Object(fields) => {
                    if let Some(formula) = fields.get("formula").and_then(Value::as_str) {
                        corpus.push(formula.to_string());
                    }
                }
                other => corpus.push(other.to_string()),
            }
        }
    }
    if let Some(rules) = logic_program.get("rules").and_then(Value::as_array) {
        for rule in rules {
            match rule {
                Value::Object(fields) => {
                    for key in ["condition", "conclusion"] {
                        if let Some(text) = fields.get(key).and_then(Value::as_str) {
                            corpus.push(text.to_string());
                        }
                    }
                }
                other => corpus.push(other.to_string()),
            }
        }
    }
    if let Some(query) = logic_program.get("query").and_then(Value::as_str) {
        corpus.push(query.to_string());
    }

    let haystack = corpus.join("\n").to_lowercase();
    missing_links
        .iter()
        .map(|link| link.trim().to_lowercase())
        .filter(|token| !token.is_empty())
        .all(|token| haystack.contains(&format!("{token}(")))
}

fn build_retry_hint(missing_links: &[String]) -> String {
    let joined: Vec<String> = missing_links
        .iter()
        .filter(|l| !l.is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    format!(
        "ATTENZIONE: aggiungi fatti o assiomi per ciascun predicato in \
         missing_links ({}) prima di restituire l'output.",
        joined.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::Ontology;
    use serde_json::json;

    #[test]
    fn test_covers_when_no_missing_links() {
        assert!(covers_missing_links(&json!({}), &[]));
    }

    #[test]
    fn test_covers_detects_predicate_in_rules() {
        let program = json!({
            "rules": [{"condition": "NessoCausale(e, d)", "conclusion": "X"}],
        });
        assert!(covers_missing_links(&program, &["NessoCausale".to_string()]));
        assert!(!covers_missing_links(&program, &["BuonaFede".to_string()]));
    }

    #[test]
    fn test_retry_hint_sorts_and_dedupes() {
        let hint = build_retry_hint(&["B".into(), "A".into(), "B".into()]);
        assert!(hint.contains("ATTENZIONE"));
        assert!(hint.contains("(A, B)"));
    }

    #[test]
    fn test_dummy_run_returns_schema_valid_output() {
        let registry = std::sync::Arc::new(Ontology::load_default().expect("catalogue"));
        let rt = RefinementRuntime::new(Arc::new(LlmClient::dummy(registry)));
        let program = LogicProgram::default();
        let feedback = LogicFeedback {
            status: crate::feedback::FeedbackStatus::ConsistentNoEntailment,
            conflicting_axioms: vec![],
            missing_links: vec![],
            human_summary: "x".into(),
        };
        let out = rt.run("domanda", &program, &feedback, Some("precedente"), None);
        assert_eq!(out.final_answer, "precedente");
        assert!(out.logic_program.is_object());
    }
}
