//! Typed schemas for every LLM stage output.
//!
//! Raw model responses are parsed into these exactly once, at the client
//! boundary; the rest of the pipeline never touches untyped JSON except
//! for the logic program payload, which has its own dedicated normalizer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One span of the question mapped onto a canonical ontology predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalizerConcept {
    pub text: String,
    #[serde(default)]
    pub canonical_predicate: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Why a question segment could not be mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedReason {
    Unknown,
    OutOfScope,
}

/// A segment the canonicalizer could not map to the ontology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalizerUnmappedTerm {
    pub text: String,
    pub reason: UnmappedReason,
}

/// Output of the canonicalizer stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalizerOutput {
    pub question: String,
    pub language: String,
    pub domain: String,
    #[serde(default)]
    pub concepts: Vec<CanonicalizerConcept>,
    #[serde(default)]
    pub unmapped_terms: Vec<CanonicalizerUnmappedTerm>,
}

impl CanonicalizerOutput {
    /// Minimal schema-valid output carrying only the question.
    pub fn minimal(question: impl Into<String>) -> Self {
        CanonicalizerOutput {
            question: question.into(),
            language: "it".to_string(),
            domain: "civil_law_contractual_liability".to_string(),
            concepts: Vec::new(),
            unmapped_terms: Vec::new(),
        }
    }
}

/// Baseline structured answer (v1): free-text answer plus the first
/// logic-program draft. The program stays raw JSON here; the normalizer
/// is its typed boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub final_answer: String,
    #[serde(default)]
    pub premises: Vec<String>,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub logic_program: Value,
}

/// Output of the refinement stage: refreshed answer plus the refined
/// logic program (raw JSON, normalized by the caller).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementOutput {
    pub final_answer: String,
    pub logic_program: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Verdict of the judge metric comparing two answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub question: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_answer: Option<String>,
    pub answer_a: String,
    pub answer_b: String,
    pub label_a: String,
    pub label_b: String,
    pub vote: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl JudgeVerdict {
    /// Normalize free-text votes onto `label_a`, `label_b` or `tie`,
    /// accepting the legacy spellings older prompts produced.
    pub fn normalized_vote(&self) -> String {
        let vote = self.vote.trim();
        if vote.eq_ignore_ascii_case("tie") || vote.is_empty() {
            return "tie".to_string();
        }
        let upper = vote.to_uppercase();
        if upper == self.label_a.to_uppercase() || upper == "LLM" || upper == "BASELINE" {
            return self.label_a.clone();
        }
        if upper == self.label_b.to_uppercase() || upper == "NSLA" || upper == "NSLA_V2" {
            return self.label_b.clone();
        }
        "tie".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(vote: &str) -> JudgeVerdict {
        JudgeVerdict {
            question: "q".into(),
            reference_answer: None,
            answer_a: "a".into(),
            answer_b: "b".into(),
            label_a: "baseline_v1".into(),
            label_b: "nsla_v2".into(),
            vote: vote.into(),
            confidence: 0.5,
            rationale: None,
        }
    }

    #[test]
    fn test_vote_normalization() {
        assert_eq!(verdict("tie").normalized_vote(), "tie");
        assert_eq!(verdict("BASELINE_V1").normalized_vote(), "baseline_v1");
        assert_eq!(verdict("LLM").normalized_vote(), "baseline_v1");
        assert_eq!(verdict("NSLA").normalized_vote(), "nsla_v2");
        assert_eq!(verdict("qualcosa").normalized_vote(), "tie");
    }

    #[test]
    fn test_unmapped_reason_serialization() {
        let term = CanonicalizerUnmappedTerm {
            text: "x".into(),
            reason: UnmappedReason::OutOfScope,
        };
        let json = serde_json::to_string(&term).expect("serialize");
        assert!(json.contains("out_of_scope"));
    }
}
