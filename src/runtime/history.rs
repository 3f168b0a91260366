//! Deterministic summaries of iteration histories for prompts/logging.

use crate::pipeline::iteration::IterationState;

/// Build compact textual summaries of iteration histories.
///
/// The summary is deterministic so prompts are reproducible across runs,
/// which matters for tests and offline benchmarking.
pub struct HistorySummarizer {
    max_entries: usize,
}

impl Default for HistorySummarizer {
    fn default() -> Self {
        HistorySummarizer { max_entries: 3 }
    }
}

impl HistorySummarizer {
    pub fn new(max_entries: usize) -> Self {
        HistorySummarizer {
            max_entries: max_entries.max(1),
        }
    }

    /// Summarize the last `max_entries` iterations, most recent last.
    pub fn summarize(&self, history: &[IterationState]) -> String {
        if history.is_empty() {
            return "Nessuna iterazione precedente: questa è la prima proposta.".to_string();
        }

        let start = history.len().saturating_sub(self.max_entries);
        let mut lines = vec!["Contesto iterativo (più recente alla fine):".to_string()];
        for state in &history[start..] {
            let missing = if state.feedback.missing_links.is_empty() {
                "nessuno".to_string()
            } else {
                state.feedback.missing_links.join(", ")
            };
            let conflicts = if state.feedback.conflicting_axioms.is_empty() {
                "nessuno".to_string()
            } else {
                state.feedback.conflicting_axioms.join(", ")
            };
            lines.push(format!(
                "- iter {}: status={}; missing={}; conflicts={}; summary={}",
                state.iteration,
                state.feedback.status.as_str(),
                missing,
                conflicts,
                state.feedback.human_summary
            ));
        }
        lines.join("\n")
    }
}
