//! Structured extractor runtime: question + canonicalization → typed
//! logic program, normalized and hydrated before anyone else sees it.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::llm::{CanonicalizerOutput, LlmClient};
use crate::ontology::DSL_VERSION;
use crate::program::canonical::ensure_canonical_query_rule;
use crate::program::normalize::{hydrate, normalize_value, NormalizationStats};
use crate::program::LogicProgram;

/// Execute the ontology-guided structured extractor.
pub struct StructuredExtractorRuntime {
    llm: Arc<LlmClient>,
    last_stats: Mutex<NormalizationStats>,
}

impl StructuredExtractorRuntime {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        StructuredExtractorRuntime {
            llm,
            last_stats: Mutex::new(NormalizationStats::default()),
        }
    }

    /// Run the extractor and return a program ready for the solver.
    ///
    /// On failure the `fallback_program` (typically the baseline v1 draft)
    /// is reused; without one the dummy program keeps the pipeline alive.
    pub fn run(
        &self,
        question: &str,
        canonicalization: &CanonicalizerOutput,
        fallback_program: Option<&LogicProgram>,
    ) -> LogicProgram {
        let mut stats = NormalizationStats::default();

        let mut program = match self.llm.call_structured_extractor(question, canonicalization) {
            Ok(raw) => {
                let (program, norm_stats) = normalize_value(&raw);
                stats.merge(&norm_stats);
                program
            }
            Err(err) => {
                warn!(error = %err, "structured extractor failed, using fallback program");
                stats.bump("fallback_used");
                match fallback_program {
                    Some(program) => program.clone(),
                    None => crate::llm::dummy::dummy_logic_program(self.llm.registry()),
                }
            }
        };

        program.dsl_version = DSL_VERSION.to_string();
        let registry = self.llm.registry().clone();
        hydrate(&mut program, &registry, &mut stats);
        ensure_canonical_query_rule(&mut program, &registry);

        stats.bump_by("predicates_total", program.predicates.len() as u64);
        stats.bump_by("rules_total", program.rules.len() as u64);
        info!(
            dsl = %program.dsl_version,
            predicates = program.predicates.len(),
            rules = program.rules.len(),
            "structured extractor completed"
        );
        *self.last_stats.lock() = stats;
        program
    }

    /// Stats of the most recent run.
    pub fn last_stats(&self) -> NormalizationStats {
        self.last_stats.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::Ontology;

    fn runtime() -> StructuredExtractorRuntime {
        let registry = Arc::new(Ontology::load_default().expect("embedded catalogue"));
        StructuredExtractorRuntime::new(Arc::new(LlmClient::dummy(registry)))
    }

    #[test]
    fn test_dummy_extraction_is_normalized_and_injected() {
        let rt = runtime();
        let canonicalization = CanonicalizerOutput::minimal("domanda");
        let program = rt.run("domanda", &canonicalization, None);
        assert_eq!(program.dsl_version, "2.1");
        assert!(!program.predicates.is_empty());
        // The dummy query gets its canonical derivation rule.
        assert_eq!(program.rules.len(), 1);
        let stats = rt.last_stats();
        assert!(stats.get("predicates_total") > 0);
        assert!(stats.get("rules_total") > 0);
    }
}
