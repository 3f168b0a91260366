//! Judge runtime: compare two answers against a reference.

use std::sync::Arc;

use tracing::warn;

use crate::llm::{dummy::dummy_judge_verdict, JudgeVerdict, LlmClient};

/// Judge-LLM metric runtime with graceful fallbacks when the judge is
/// disabled or unavailable.
pub struct JudgeRuntime {
    llm: Arc<LlmClient>,
    enabled: bool,
}

impl JudgeRuntime {
    pub fn new(llm: Arc<LlmClient>, enabled: bool) -> Self {
        JudgeRuntime { llm, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Execute the judge metric. Disabled or failing judges vote
    /// `tie / 0.0` with an explanatory rationale.
    pub fn evaluate(
        &self,
        question: &str,
        reference_answer: Option<&str>,
        answer_a: &str,
        answer_b: &str,
        label_a: &str,
        label_b: &str,
    ) -> JudgeVerdict {
        if !self.enabled {
            return dummy_judge_verdict(
                question,
                reference_answer,
                answer_a,
                answer_b,
                label_a,
                label_b,
                "Judge metric disabled.",
            );
        }

        match self.llm.call_judge(
            question,
            reference_answer,
            answer_a,
            answer_b,
            label_a,
            label_b,
        ) {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(error = %err, "judge runtime failed");
                dummy_judge_verdict(
                    question,
                    reference_answer,
                    answer_a,
                    answer_b,
                    label_a,
                    label_b,
                    &format!("Judge runtime error: {err}"),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::Ontology;

    #[test]
    fn test_disabled_judge_votes_tie() {
        let registry = Arc::new(Ontology::load_default().expect("catalogue"));
        let judge = JudgeRuntime::new(Arc::new(LlmClient::dummy(registry)), false);
        let verdict = judge.evaluate("q", Some("rif"), "a", "b", "baseline_v1", "nsla_v2");
        assert_eq!(verdict.vote, "tie");
        assert_eq!(verdict.confidence, 0.0);
        assert_eq!(verdict.rationale.as_deref(), Some("Judge metric disabled."));
    }
}
