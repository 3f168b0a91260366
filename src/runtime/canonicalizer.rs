//! Canonicalizer runtime: ontology mapping with caching and fallback.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::llm::{CanonicalizerOutput, LlmClient};

/// Execute the legal canonicalizer with optional caching/fallback.
///
/// The cache is keyed by the whitespace-normalized question. Entries
/// expire after the configured TTL; expired reads re-invoke the backend.
pub struct CanonicalizerRuntime {
    llm: Arc<LlmClient>,
    enable_cache: bool,
    cache_ttl: Option<Duration>,
    cache: Mutex<HashMap<String, (Instant, CanonicalizerOutput)>>,
}

impl CanonicalizerRuntime {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self::with_cache(llm, true, Some(Duration::from_secs(600)))
    }

    pub fn with_cache(
        llm: Arc<LlmClient>,
        enable_cache: bool,
        cache_ttl: Option<Duration>,
    ) -> Self {
        CanonicalizerRuntime {
            llm,
            enable_cache,
            cache_ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Run the canonicalizer over a legal question.
    pub fn run(&self, question: &str) -> CanonicalizerOutput {
        let normalized = question.trim().to_string();
        if normalized.is_empty() {
            return CanonicalizerOutput::minimal("");
        }

        if let Some(cached) = self.get_cached(&normalized) {
            debug!(len = normalized.len(), "canonicalizer cache hit");
            return cached;
        }

        let output = match self.llm.call_canonicalizer(&normalized) {
            Ok(output) => {
                info!(
                    concepts = output.concepts.len(),
                    unmapped = output.unmapped_terms.len(),
                    "canonicalizer completed"
                );
                output
            }
            Err(err) => {
                warn!(error = %err, "canonicalizer failed, using deterministic fallback");
                CanonicalizerOutput::minimal(normalized.clone())
            }
        };

        self.store(&normalized, output.clone());
        output
    }

    /// Drop every cached entry.
    pub fn clear_cache(&self) {
        self.cache.lock().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn get_cached(&self, key: &str) -> Option<CanonicalizerOutput> {
        if !self.enable_cache {
            return None;
        }
        let mut cache = self.cache.lock();
        let (stored_at, value) = cache.get(key)?;
        if let Some(ttl) = self.cache_ttl {
            if stored_at.elapsed() > ttl {
                cache.remove(key);
                return None;
            }
        }
        Some(value.clone())
    }

    fn store(&self, key: &str, value: CanonicalizerOutput) {
        if !self.enable_cache {
            return;
        }
        self.cache.lock().insert(key.to_string(), (Instant::now(), value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::Ontology;

    fn runtime(ttl: Option<Duration>) -> CanonicalizerRuntime {
        let registry = Arc::new(Ontology::load_default().expect("embedded catalogue"));
        CanonicalizerRuntime::with_cache(Arc::new(LlmClient::dummy(registry)), true, ttl)
    }

    #[test]
    fn test_read_after_write_returns_stored_value() {
        let rt = runtime(Some(Duration::from_secs(600)));
        let first = rt.run("Il debitore risponde del danno?");
        let second = rt.run("  Il debitore risponde del danno?  ");
        assert_eq!(first, second);
        assert_eq!(rt.cache_len(), 1);
    }

    #[test]
    fn test_ttl_expiry_reinvokes_backend() {
        let rt = runtime(Some(Duration::from_millis(10)));
        rt.run("Domanda con scadenza");
        assert_eq!(rt.cache_len(), 1);
        std::thread::sleep(Duration::from_millis(30));
        // Expired entry is evicted and repopulated.
        rt.run("Domanda con scadenza");
        assert_eq!(rt.cache_len(), 1);
    }

    #[test]
    fn test_empty_question_is_minimal_output() {
        let rt = runtime(None);
        let output = rt.run("   ");
        assert!(output.question.is_empty());
        assert_eq!(rt.cache_len(), 0);
    }

    #[test]
    fn test_clear_cache() {
        let rt = runtime(None);
        rt.run("qualcosa");
        rt.clear_cache();
        assert_eq!(rt.cache_len(), 0);
    }
}
