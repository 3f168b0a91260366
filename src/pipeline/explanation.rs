//! Explanation synthesis.
//!
//! Deterministic: the explanation is anchored to the symbolic artifacts
//! (solver feedback and guardrail outcome) rather than to another LLM
//! call, so it stays truthful even on full-fallback runs.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::feedback::{FeedbackStatus, LogicFeedback};
use crate::guardrail::GuardrailResult;

/// Structured explanation attached to every pipeline response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationOutput {
    pub summary: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Build a short explanation referencing the solver feedback and the
/// guardrail outcome.
pub fn synthesize_explanation(
    question: &str,
    final_answer: &str,
    feedback: &LogicFeedback,
    guardrail: &GuardrailResult,
) -> ExplanationOutput {
    if !guardrail.ok {
        let issues: Vec<&str> = guardrail
            .issues
            .iter()
            .map(|issue| issue.message.as_str())
            .collect();
        return ExplanationOutput {
            summary: "Il programma logico generato non ha superato i controlli di sicurezza. \
                      È stata mantenuta la risposta precedente oppure è richiesto un nuovo \
                      refinement."
                .to_string(),
            status: "guardrail_failed".to_string(),
            details: Some(json!({
                "question": question,
                "final_answer": final_answer,
                "guardrail_issues": issues,
            })),
        };
    }

    let summary = match feedback.status {
        FeedbackStatus::ConsistentEntails => format!(
            "Il sistema simbolico è coerente e la conclusione proposta è dimostrata \
             dalle regole modellate. Risposta finale: {final_answer}"
        ),
        FeedbackStatus::ConsistentNoEntailment => format!(
            "Il programma logico è coerente ma non implica ancora la conclusione. \
             Mancano collegamenti o premesse aggiuntive. Feedback sintetico: {}",
            feedback.human_summary
        ),
        _ => format!(
            "Il solver ha rilevato un conflitto logico nelle regole generate. \
             È necessario correggere le premesse: {}",
            feedback.human_summary
        ),
    };

    ExplanationOutput {
        summary,
        status: feedback.status.as_str().to_string(),
        details: Some(json!({
            "question": question,
            "final_answer": final_answer,
            "missing_links": feedback.missing_links,
            "conflicting_axioms": feedback.conflicting_axioms,
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guardrail::GuardrailIssue;

    fn feedback(status: FeedbackStatus) -> LogicFeedback {
        LogicFeedback {
            status,
            conflicting_axioms: vec![],
            missing_links: vec![],
            human_summary: "sintesi".into(),
        }
    }

    #[test]
    fn test_entailed_explanation() {
        let out = synthesize_explanation(
            "domanda",
            "risposta",
            &feedback(FeedbackStatus::ConsistentEntails),
            &GuardrailResult::passing(),
        );
        assert_eq!(out.status, "consistent_entails");
        assert!(out.summary.contains("dimostrata"));
        assert!(out.summary.contains("risposta"));
    }

    #[test]
    fn test_guardrail_failure_takes_precedence() {
        let guardrail = GuardrailResult {
            ok: false,
            issues: vec![GuardrailIssue {
                code: "DSL_VERSION_MISMATCH".into(),
                message: "versione errata".into(),
                details: None,
            }],
        };
        let out = synthesize_explanation(
            "domanda",
            "risposta",
            &feedback(FeedbackStatus::ConsistentEntails),
            &guardrail,
        );
        assert_eq!(out.status, "guardrail_failed");
        assert!(out.summary.contains("controlli di sicurezza"));
        let details = out.details.expect("details");
        assert_eq!(details["guardrail_issues"][0], "versione errata");
    }

    #[test]
    fn test_inconsistent_explanation_mentions_conflict() {
        let out = synthesize_explanation(
            "domanda",
            "risposta",
            &feedback(FeedbackStatus::Inconsistent),
            &GuardrailResult::passing(),
        );
        assert!(out.summary.contains("conflitto logico"));
    }
}
