//! Bounded LLM ↔ solver refinement loop.
//!
//! Iteration 0 refines the structured-extractor baseline; every later
//! iteration refines the previous iteration's program using its solver
//! feedback and a compact history summary. The loop stops on an
//! entailment/inconsistency verdict, on the iteration cap, or when two
//! consecutive iterations are logically identical (fixpoint).

use serde::Serialize;
use tracing::warn;

use crate::feedback::{FeedbackStatus, LogicFeedback};
use crate::guardrail::run_guardrail;
use crate::llm::RefinementOutput;
use crate::ontology::Ontology;
use crate::program::canonical::ensure_canonical_query_rule;
use crate::program::normalize::{hydrate, normalize_value, NormalizationStats};
use crate::program::LogicProgram;
use crate::runtime::{HistorySummarizer, RefinementRuntime};

/// Statuses that stop the loop as soon as they appear.
const STOP_STATUSES: &[FeedbackStatus] =
    &[FeedbackStatus::ConsistentEntails, FeedbackStatus::Inconsistent];

/// Per-iteration bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct IterationMetrics {
    pub iteration: usize,
    pub is_best: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_status: Option<FeedbackStatus>,
}

/// Full snapshot of one refinement iteration.
#[derive(Debug, Clone, Serialize)]
pub struct IterationState {
    pub iteration: usize,
    pub final_answer: String,
    /// Normalized program this iteration evaluated.
    pub program: LogicProgram,
    /// Raw refinement output (kept for response assembly).
    pub output: RefinementOutput,
    pub feedback: LogicFeedback,
    pub metrics: IterationMetrics,
}

/// Hook applied after each solver evaluation (fact synthesis lives here).
pub type FeedbackPostprocessor<'a> =
    dyn Fn(&mut LogicProgram, LogicFeedback) -> LogicFeedback + 'a;

/// Source of refined programs; implemented by [`RefinementRuntime`] and
/// by scripted stand-ins in tests.
pub trait Refiner {
    fn refine(
        &self,
        question: &str,
        program: &LogicProgram,
        feedback: &LogicFeedback,
        previous_answer: Option<&str>,
        history_summary: Option<&str>,
    ) -> RefinementOutput;
}

impl Refiner for RefinementRuntime {
    fn refine(
        &self,
        question: &str,
        program: &LogicProgram,
        feedback: &LogicFeedback,
        previous_answer: Option<&str>,
        history_summary: Option<&str>,
    ) -> RefinementOutput {
        self.run(question, program, feedback, previous_answer, history_summary)
    }
}

/// Execute the bounded iterative refinement loop.
pub struct IterationManager<'a, R: Refiner + ?Sized> {
    refinement: &'a R,
    registry: &'a Ontology,
    max_iters: usize,
    summarizer: HistorySummarizer,
}

impl<'a, R: Refiner + ?Sized> IterationManager<'a, R> {
    pub fn new(
        refinement: &'a R,
        registry: &'a Ontology,
        max_iters: usize,
        history_window: usize,
    ) -> Self {
        IterationManager {
            refinement,
            registry,
            max_iters: max_iters.max(1),
            summarizer: HistorySummarizer::new(history_window),
        }
    }

    /// Run the loop and return `(best, history)`.
    pub fn run(
        &self,
        question: &str,
        initial_program: &LogicProgram,
        initial_feedback: &LogicFeedback,
        initial_answer: Option<&str>,
        postprocessor: &FeedbackPostprocessor<'_>,
    ) -> (IterationState, Vec<IterationState>) {
        let mut history: Vec<IterationState> = Vec::new();

        self.append_iteration(
            &mut history,
            question,
            initial_program,
            initial_feedback,
            initial_answer,
            None,
            postprocessor,
        );

        while !self.should_stop(&history) {
            let summary = self.summarizer.summarize(&history);
            let prev = history.last().expect("seeded above").clone();
            let mut base_program = prev.program.clone();
            ensure_canonical_query_rule(&mut base_program, self.registry);

            self.append_iteration(
                &mut history,
                question,
                &base_program,
                &prev.feedback,
                Some(&prev.final_answer),
                Some(&summary),
                postprocessor,
            );

            if history.len() >= self.max_iters {
                break;
            }
        }

        let best = self.select_best(&history).clone();
        (best, history)
    }

    #[allow(clippy::too_many_arguments)]
    fn append_iteration(
        &self,
        history: &mut Vec<IterationState>,
        question: &str,
        base_program: &LogicProgram,
        feedback: &LogicFeedback,
        previous_answer: Option<&str>,
        history_summary: Option<&str>,
        postprocessor: &FeedbackPostprocessor<'_>,
    ) {
        let iteration = history.len();
        let output = self.refinement.refine(
            question,
            base_program,
            feedback,
            previous_answer,
            history_summary,
        );

        let mut stats = NormalizationStats::default();
        let (mut program, norm_stats) = normalize_value(&output.logic_program);
        stats.merge(&norm_stats);
        hydrate(&mut program, self.registry, &mut stats);
        ensure_canonical_query_rule(&mut program, self.registry);

        // Guardrail or solver failures are non-fatal iteration outcomes:
        // the state is recorded as invalid and the loop carries on from it.
        let guardrail = run_guardrail(&program, self.registry);
        let next_feedback = if guardrail.ok {
            match crate::feedback::evaluate_program(&program, self.registry) {
                Ok(feedback) => postprocessor(&mut program, feedback),
                Err(err) => {
                    warn!(iteration, error = %err, "solver build failed during iteration");
                    LogicFeedback::invalid(format!(
                        "Impossibile costruire il solver per il programma raffinato: {err}"
                    ))
                }
            }
        } else {
            warn!(iteration, issues = guardrail.issues.len(), "refined program failed guardrail");
            LogicFeedback::invalid(
                "Il programma raffinato non ha superato i controlli del guardrail.",
            )
        };

        let metrics = IterationMetrics {
            iteration,
            is_best: next_feedback.status == FeedbackStatus::ConsistentEntails,
            solver_status: Some(next_feedback.status),
        };

        history.push(IterationState {
            iteration,
            final_answer: output.final_answer.clone(),
            program,
            output,
            feedback: next_feedback,
            metrics,
        });
    }

    fn should_stop(&self, history: &[IterationState]) -> bool {
        let Some(last) = history.last() else {
            return false;
        };
        if STOP_STATUSES.contains(&last.feedback.status) {
            return true;
        }
        if history.len() >= self.max_iters {
            return true;
        }
        if history.len() >= 2 {
            let prev = &history[history.len() - 2];
            let mut prev_missing = prev.feedback.missing_links.clone();
            let mut last_missing = last.feedback.missing_links.clone();
            prev_missing.sort();
            last_missing.sort();
            let mut prev_conflicts = prev.feedback.conflicting_axioms.clone();
            let mut last_conflicts = last.feedback.conflicting_axioms.clone();
            prev_conflicts.sort();
            last_conflicts.sort();
            if prev.feedback.status == last.feedback.status
                && prev_missing == last_missing
                && prev_conflicts == last_conflicts
            {
                // Fixpoint: no logical change between consecutive iterations.
                return true;
            }
        }
        false
    }

    /// Best-state priority: explicit `is_best` flag, then the first
    /// `consistent_entails`, otherwise the last iteration.
    fn select_best<'h>(&self, history: &'h [IterationState]) -> &'h IterationState {
        if let Some(state) = history.iter().find(|s| s.metrics.is_best) {
            return state;
        }
        if let Some(state) = history
            .iter()
            .find(|s| s.feedback.status == FeedbackStatus::ConsistentEntails)
        {
            return state;
        }
        history.last().expect("history is never empty")
    }
}
