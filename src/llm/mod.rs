//! # LLM Runtime
//!
//! Synchronous client over the configured backend with the contracts the
//! pipeline relies on: bounded retries with exponential backoff and
//! jitter, classified failure reasons, robust JSON extraction, a
//! deterministic dummy backend, and a per-operation status map that is
//! latched on call completion and drained by the orchestrator.

pub mod backend;
pub mod dummy;
pub mod json_extract;
pub mod outputs;
pub mod prompts;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::LlmConfig;
use crate::feedback::LogicFeedback;
use crate::ontology::Ontology;
use crate::program::LogicProgram;

pub use backend::{Backend, ErrorReason, LlmError, OllamaTransport};
pub use json_extract::extract_json;
pub use outputs::{
    CanonicalizerConcept, CanonicalizerOutput, CanonicalizerUnmappedTerm, JudgeVerdict,
    RefinementOutput, StructuredAnswer, UnmappedReason,
};

/// Synchronous LLM client shared by every stage runtime.
pub struct LlmClient {
    registry: Arc<Ontology>,
    backend: Backend,
    max_retries: u32,
    retry_delay: Duration,
    call_timeout: Duration,
    status: Mutex<BTreeMap<String, String>>,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig, registry: Arc<Ontology>) -> Self {
        let backend = match config.backend.trim() {
            "ollama" => Backend::Ollama(OllamaTransport::new(
                config.base_url.clone(),
                config.model.clone(),
            )),
            _ => Backend::Dummy,
        };
        let client = LlmClient {
            registry,
            backend,
            max_retries: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            call_timeout: Duration::from_secs(config.timeout_secs),
            status: Mutex::new(BTreeMap::new()),
        };
        info!(
            backend = if client.backend.is_dummy() { "dummy" } else { "ollama" },
            max_retries = client.max_retries,
            "LLM client initialized"
        );
        client
    }

    /// Offline client with the deterministic backend.
    pub fn dummy(registry: Arc<Ontology>) -> Self {
        LlmClient::from_config(&LlmConfig::default(), registry)
    }

    pub fn is_dummy(&self) -> bool {
        self.backend.is_dummy()
    }

    pub fn registry(&self) -> &Arc<Ontology> {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Status tracking
    // ------------------------------------------------------------------

    fn record_status(&self, operation: &str, status: &str) {
        self.status
            .lock()
            .insert(operation.to_string(), status.to_string());
    }

    /// Drain the per-operation status map (monotone within one request).
    pub fn pop_statuses(&self) -> BTreeMap<String, String> {
        std::mem::take(&mut *self.status.lock())
    }

    // ------------------------------------------------------------------
    // Retry core
    // ------------------------------------------------------------------

    /// One synchronous completion with retries: up to `max_retries`
    /// attempts, exponential backoff with uniform jitter between them.
    fn call_with_retry(&self, prompt: &str, operation: &str) -> Result<String, LlmError> {
        let transport = match &self.backend {
            Backend::Dummy => {
                return Err(LlmError::Call {
                    operation: operation.to_string(),
                    reason: ErrorReason::Error,
                    message: "dummy backend cannot make real LLM calls".to_string(),
                })
            }
            Backend::Ollama(transport) => transport,
        };

        let mut last: Option<(ErrorReason, String)> = None;
        for attempt in 1..=self.max_retries {
            debug!(operation, attempt, max = self.max_retries, "LLM attempt");
            match transport.complete(prompt, self.call_timeout) {
                Ok(text) => {
                    self.record_status(operation, "ok");
                    return Ok(text);
                }
                Err((reason, message)) => {
                    warn!(
                        operation,
                        attempt,
                        reason = reason.as_str(),
                        %message,
                        "LLM attempt failed"
                    );
                    last = Some((reason, message));
                    if attempt < self.max_retries {
                        let backoff = self.retry_delay * 2u32.saturating_pow(attempt - 1);
                        let jitter = rand::thread_rng()
                            .gen_range(0.0..=self.retry_delay.as_secs_f64().max(0.001));
                        std::thread::sleep(backoff + Duration::from_secs_f64(jitter));
                    }
                }
            }
        }

        let (reason, message) = last.unwrap_or((ErrorReason::Error, "no attempts made".into()));
        error!(operation, reason = reason.as_str(), "LLM call exhausted retries");
        self.record_status(operation, reason.as_str());
        Err(LlmError::Call {
            operation: operation.to_string(),
            reason,
            message,
        })
    }

    fn call_json(&self, prompt: &str, operation: &str) -> Result<Value, LlmError> {
        let raw = self.call_with_retry(prompt, operation)?;
        extract_json(&raw).ok_or_else(|| LlmError::Schema {
            operation: operation.to_string(),
            message: format!(
                "no JSON object found in response (preview: {})",
                raw.chars().take(200).collect::<String>()
            ),
        })
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Freeform passthrough; degrades to the dummy answer on failure.
    pub fn ask_freeform(&self, question: &str) -> String {
        if self.is_dummy() {
            return dummy::dummy_freeform_answer(None);
        }
        match self.call_with_retry(&prompts::freeform_prompt(question), "Freeform") {
            Ok(text) => text,
            Err(err) => {
                error!(error = %err, "freeform call failed");
                self.record_status("Freeform", err.reason().as_str());
                dummy::dummy_freeform_answer(Some(
                    "(risposta di fallback per indisponibilità del modello)",
                ))
            }
        }
    }

    /// Baseline structured answer. Transport and schema failures are
    /// absorbed: the dummy artifact is returned and the reason latched.
    pub fn ask_structured(&self, question: &str) -> StructuredAnswer {
        if self.is_dummy() {
            return dummy::dummy_structured_answer(question, &self.registry);
        }
        let operation = "Structured Extractor";
        match self
            .call_json(&prompts::structured_prompt(question), operation)
            .and_then(|data| {
                serde_json::from_value::<StructuredAnswer>(data).map_err(|err| LlmError::Schema {
                    operation: operation.to_string(),
                    message: err.to_string(),
                })
            }) {
            Ok(answer) => answer,
            Err(err) => {
                error!(error = %err, "structured ask failed");
                self.record_status(operation, err.reason().as_str());
                dummy::dummy_structured_answer(question, &self.registry)
            }
        }
    }

    /// Canonicalizer call. Errors propagate; the stage runtime owns the
    /// fallback policy.
    pub fn call_canonicalizer(&self, question: &str) -> Result<CanonicalizerOutput, LlmError> {
        if self.is_dummy() {
            debug!("dummy backend: returning dummy canonicalizer output");
            return Ok(dummy::dummy_canonicalizer_output(question));
        }
        let operation = "Canonicalizer";
        let data = self.call_json(
            &prompts::canonicalizer_prompt(question, &self.registry),
            operation,
        )?;
        let output: CanonicalizerOutput =
            serde_json::from_value(data).map_err(|err| LlmError::Schema {
                operation: operation.to_string(),
                message: err.to_string(),
            })?;
        info!(
            concepts = output.concepts.len(),
            unmapped = output.unmapped_terms.len(),
            "canonicalization completed"
        );
        Ok(output)
    }

    /// Structured extractor call; returns the raw logic-program JSON
    /// (unwrapping the `logic_program`/`logic_program_v1` envelope).
    pub fn call_structured_extractor(
        &self,
        question: &str,
        canonicalization: &CanonicalizerOutput,
    ) -> Result<Value, LlmError> {
        if self.is_dummy() {
            let program = dummy::dummy_logic_program(&self.registry);
            return Ok(serde_json::to_value(&program).unwrap_or_default());
        }
        let operation = "Structured Extractor";
        let data = self.call_json(
            &prompts::extractor_prompt(question, canonicalization, &self.registry),
            operation,
        )?;
        let program = data
            .get("logic_program_v1")
            .or_else(|| data.get("logic_program"))
            .cloned()
            .unwrap_or(data);
        Ok(program)
    }

    /// Refinement call; validates the response envelope.
    pub fn call_refinement(
        &self,
        question: &str,
        program: &LogicProgram,
        feedback: &LogicFeedback,
        previous_answer: Option<&str>,
        history_summary: Option<&str>,
    ) -> Result<RefinementOutput, LlmError> {
        if self.is_dummy() {
            debug!("dummy backend: returning dummy refinement output");
            return Ok(dummy::dummy_refinement_output(
                question,
                previous_answer,
                &self.registry,
            ));
        }
        let operation = "Refinement LLM";
        let data = self.call_json(
            &prompts::refinement_prompt(
                question,
                program,
                feedback,
                previous_answer,
                history_summary,
            ),
            operation,
        )?;
        if data.get("final_answer").is_none() || data.get("logic_program").is_none() {
            return Err(LlmError::Schema {
                operation: operation.to_string(),
                message: "response missing 'final_answer' or 'logic_program'".to_string(),
            });
        }
        serde_json::from_value(data).map_err(|err| LlmError::Schema {
            operation: operation.to_string(),
            message: err.to_string(),
        })
    }

    /// Judge metric call.
    #[allow(clippy::too_many_arguments)]
    pub fn call_judge(
        &self,
        question: &str,
        reference_answer: Option<&str>,
        answer_a: &str,
        answer_b: &str,
        label_a: &str,
        label_b: &str,
    ) -> Result<JudgeVerdict, LlmError> {
        if self.is_dummy() {
            return Ok(dummy::dummy_judge_verdict(
                question,
                reference_answer,
                answer_a,
                answer_b,
                label_a,
                label_b,
                "Dummy backend: judge metric inactive.",
            ));
        }
        let operation = "Judge LLM";
        let data = self.call_json(
            &prompts::judge_prompt(
                question,
                reference_answer.unwrap_or(""),
                answer_a,
                answer_b,
                label_a,
                label_b,
            ),
            operation,
        )?;

        let vote = data
            .get("vote")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("tie")
            .to_string();
        let confidence = data
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let rationale = data
            .get("rationale")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(JudgeVerdict {
            question: question.to_string(),
            reference_answer: reference_answer.map(str::to_string),
            answer_a: answer_a.to_string(),
            answer_b: answer_b.to_string(),
            label_a: label_a.to_string(),
            label_b: label_b.to_string(),
            vote,
            confidence,
            rationale,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> LlmClient {
        let registry = Arc::new(Ontology::load_default().expect("embedded catalogue"));
        LlmClient::dummy(registry)
    }

    #[test]
    fn test_dummy_is_default_backend() {
        assert!(client().is_dummy());
    }

    #[test]
    fn test_dummy_canonicalizer_is_schema_valid() {
        let output = client().call_canonicalizer("Chi risponde del danno?").expect("dummy");
        assert_eq!(output.language, "it");
        assert_eq!(output.domain, "civil_law_contractual_liability");
    }

    #[test]
    fn test_dummy_refinement_keeps_previous_answer() {
        let c = client();
        let program = LogicProgram::default();
        let feedback = LogicFeedback::invalid("x");
        let out = c
            .call_refinement("domanda", &program, &feedback, Some("risposta v1"), None)
            .expect("dummy");
        assert_eq!(out.final_answer, "risposta v1");
    }

    #[test]
    fn test_status_map_latches_and_drains() {
        let c = client();
        c.record_status("Canonicalizer", "timeout");
        c.record_status("Canonicalizer", "ok");
        let statuses = c.pop_statuses();
        assert_eq!(statuses.get("Canonicalizer").map(String::as_str), Some("ok"));
        assert!(c.pop_statuses().is_empty());
    }

    #[test]
    fn test_dummy_judge_votes_tie() {
        let verdict = client()
            .call_judge("q", Some("rif"), "a", "b", "baseline_v1", "nsla_v2")
            .expect("dummy");
        assert_eq!(verdict.vote, "tie");
        assert_eq!(verdict.confidence, 0.0);
    }
}
