//! # Pipeline Orchestrator
//!
//! Composes the stages end-to-end:
//! `question → canonicalize → extract → normalize → solve → refine →
//! guardrail → solve (+ fact synthesis) → explanation (+ judge)`.
//!
//! The orchestrator exclusively owns every [`LogicProgram`]; stage
//! runtimes receive shared views and return newly constructed programs.
//! One orchestrator invocation serves one request and runs single
//! threaded; concurrent requests share only the read-only registry, the
//! canonicalizer cache and the LLM status map.

pub mod explanation;
pub mod iteration;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::dsl::extract_predicate_names;
use crate::feedback::{evaluate_program, FeedbackStatus, LogicFeedback};
use crate::guardrail::{run_guardrail, GuardrailResult};
use crate::llm::{CanonicalizerOutput, JudgeVerdict, LlmClient, StructuredAnswer};
use crate::ontology::{is_logical_keyword, Ontology};
use crate::program::canonical::ensure_canonical_query_rule;
use crate::program::normalize::{hydrate, normalize_value, NormalizationStats};
use crate::program::{Axiom, LogicProgram};
use crate::runtime::{
    CanonicalizerRuntime, JudgeRuntime, RefinementRuntime, StructuredExtractorRuntime,
};
use crate::solver::SolverError;

pub use explanation::{synthesize_explanation, ExplanationOutput};
pub use iteration::{IterationManager, IterationMetrics, IterationState, Refiner};

/// Upper bound on fact-synthesis rounds per evaluation.
const FACT_SYNTHESIS_MAX_ROUNDS: usize = 3;

/// Aggregated one-shot result.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    pub final_answer: String,
    pub logic_program: LogicProgram,
    pub feedback: LogicFeedback,
    pub guardrail: GuardrailResult,
    pub explanation: ExplanationOutput,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_feedback: Option<LogicFeedback>,
    pub canonicalization: CanonicalizerOutput,
    pub logic_program_v1: LogicProgram,
    pub feedback_v1: LogicFeedback,
    pub answer_v1: String,
    pub structured_stats: NormalizationStats,
    pub llm_status: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeVerdict>,
}

/// Aggregated iterative result.
#[derive(Debug, Clone, Serialize)]
pub struct IterativeResult {
    pub best: IterationState,
    pub history: Vec<IterationState>,
    pub canonicalization: CanonicalizerOutput,
    pub structured_stats: NormalizationStats,
    pub llm_status: BTreeMap<String, String>,
}

/// v1 pipeline result (baseline structured ask + single solve).
#[derive(Debug, Clone, Serialize)]
pub struct V1Result {
    pub answer: String,
    pub verified: bool,
    pub solver_status: String,
    pub checks: Vec<String>,
    pub logic_program: LogicProgram,
    pub facts: BTreeMap<String, serde_json::Value>,
}

struct PhaseContext {
    canonicalization: CanonicalizerOutput,
    logic_program_v1: LogicProgram,
    feedback_v1: LogicFeedback,
    answer_v1: String,
    structured_stats: NormalizationStats,
    v1_solver_ready: bool,
    llm_status: BTreeMap<String, String>,
}

/// The neuro-symbolic legal reasoning pipeline.
pub struct LegalPipeline {
    registry: Arc<Ontology>,
    llm: Arc<LlmClient>,
    config: PipelineConfig,
    canonicalizer: CanonicalizerRuntime,
    extractor: StructuredExtractorRuntime,
    refinement: Box<dyn Refiner + Send + Sync>,
    judge: JudgeRuntime,
}

impl LegalPipeline {
    pub fn new(registry: Arc<Ontology>, llm: Arc<LlmClient>, config: PipelineConfig) -> Self {
        let refinement = Box::new(RefinementRuntime::new(llm.clone()));
        Self::with_refiner(registry, llm, config, refinement)
    }

    /// Build the pipeline with an injected refinement stage. Tests use
    /// scripted refiners to drive specific solver/guardrail outcomes.
    pub fn with_refiner(
        registry: Arc<Ontology>,
        llm: Arc<LlmClient>,
        config: PipelineConfig,
        refinement: Box<dyn Refiner + Send + Sync>,
    ) -> Self {
        let cache_ttl = if config.canonicalizer_cache_ttl_secs == 0 {
            None
        } else {
            Some(std::time::Duration::from_secs(
                config.canonicalizer_cache_ttl_secs,
            ))
        };
        LegalPipeline {
            canonicalizer: CanonicalizerRuntime::with_cache(
                llm.clone(),
                config.enable_canonicalizer_cache,
                cache_ttl,
            ),
            extractor: StructuredExtractorRuntime::new(llm.clone()),
            refinement,
            judge: JudgeRuntime::new(llm.clone(), config.enable_judge),
            registry,
            llm,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<Ontology> {
        &self.registry
    }

    pub fn llm(&self) -> &Arc<LlmClient> {
        &self.llm
    }

    pub fn judge_runtime(&self) -> &JudgeRuntime {
        &self.judge
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// v1 pipeline: structured ask, one solve, no refinement.
    pub fn run_v1(&self, question: &str) -> V1Result {
        let normalized = question.split_whitespace().collect::<Vec<_>>().join(" ");
        let baseline = self.llm.ask_structured(&normalized);
        let (mut program, _) = self.normalized_program(&baseline);

        let (solver_status, verified) = match evaluate_program(&program, &self.registry) {
            Ok(feedback) => {
                let status = match feedback.status {
                    FeedbackStatus::Inconsistent => "unsat",
                    FeedbackStatus::InvalidLogicProgram => "unknown",
                    _ => "sat",
                };
                (status.to_string(), status != "unknown")
            }
            Err(err) => {
                warn!(error = %err, "v1 solver build failed");
                program = LogicProgram::default();
                ("unknown".to_string(), false)
            }
        };

        let mut facts = BTreeMap::new();
        facts.insert(
            "has_question_mark".to_string(),
            serde_json::Value::Bool(normalized.trim_end().ends_with('?')),
        );

        V1Result {
            answer: baseline.final_answer,
            verified,
            solver_status,
            checks: Vec::new(),
            logic_program: program,
            facts,
        }
    }

    /// One-shot v2 pipeline.
    pub fn run_once(&self, question: &str, reference_answer: Option<&str>) -> PipelineResult {
        let mut context = self.prepare_context(question);

        // Refinement over the v1 program.
        let refinement_output = self.refinement.refine(
            question,
            &context.logic_program_v1,
            &context.feedback_v1,
            Some(&context.answer_v1),
            None,
        );
        context.llm_status.extend(self.llm.pop_statuses());

        let mut stats = NormalizationStats::default();
        let (mut program_v2, norm_stats) = normalize_value(&refinement_output.logic_program);
        stats.merge(&norm_stats);
        hydrate(&mut program_v2, &self.registry, &mut stats);
        ensure_canonical_query_rule(&mut program_v2, &self.registry);

        let guardrail = run_guardrail(&program_v2, &self.registry);
        if !guardrail.ok {
            return self.guardrail_failure_result(
                question,
                reference_answer,
                refinement_output.final_answer,
                program_v2,
                guardrail,
                context,
            );
        }

        let feedback_v2 = match self.evaluate_with_fact_synthesis(&mut program_v2) {
            Ok(feedback) => feedback,
            Err(err) => {
                warn!(error = %err, "v2 solver build failed after guardrail pass");
                return self.guardrail_failure_result(
                    question,
                    reference_answer,
                    refinement_output.final_answer,
                    program_v2,
                    GuardrailResult::passing(),
                    context,
                );
            }
        };

        // Fact synthesis mutates the program; re-check it before trusting it.
        let guardrail = run_guardrail(&program_v2, &self.registry);
        if !guardrail.ok {
            return self.guardrail_failure_result(
                question,
                reference_answer,
                refinement_output.final_answer,
                program_v2,
                guardrail,
                context,
            );
        }

        let highlight = collect_fact_predicates(&program_v2, &self.registry);
        let final_answer = augment_final_answer(&refinement_output.final_answer, &highlight);

        let explanation =
            synthesize_explanation(question, &final_answer, &feedback_v2, &guardrail);
        let judge = self.maybe_run_judge(
            question,
            reference_answer,
            &context.answer_v1,
            &final_answer,
            true,
        );

        PipelineResult {
            final_answer,
            logic_program: program_v2,
            feedback: feedback_v2,
            guardrail,
            explanation,
            fallback_used: false,
            fallback_feedback: None,
            canonicalization: context.canonicalization,
            logic_program_v1: context.logic_program_v1,
            feedback_v1: context.feedback_v1,
            answer_v1: context.answer_v1,
            structured_stats: context.structured_stats,
            llm_status: context.llm_status,
            judge,
        }
    }

    /// Iterative v2 pipeline with an optional `max_iters` override.
    pub fn run_iterative(&self, question: &str, max_iters: Option<usize>) -> IterativeResult {
        let context = self.prepare_context(question);
        let max_iters = max_iters.unwrap_or(self.config.max_iters);

        if !context.v1_solver_ready {
            warn!("skipping iterative pipeline: invalid v1 program");
            let state = IterationState {
                iteration: 0,
                final_answer: context.answer_v1.clone(),
                program: context.logic_program_v1.clone(),
                output: crate::llm::RefinementOutput {
                    final_answer: context.answer_v1.clone(),
                    logic_program: serde_json::to_value(&context.logic_program_v1)
                        .unwrap_or_default(),
                    notes: None,
                },
                feedback: context.feedback_v1.clone(),
                metrics: IterationMetrics {
                    iteration: 0,
                    is_best: true,
                    solver_status: Some(FeedbackStatus::InvalidLogicProgram),
                },
            };
            return IterativeResult {
                best: state.clone(),
                history: vec![state],
                canonicalization: context.canonicalization,
                structured_stats: context.structured_stats,
                llm_status: context.llm_status,
            };
        }

        let manager = IterationManager::new(
            self.refinement.as_ref(),
            &self.registry,
            max_iters,
            self.config.history_window,
        );
        let postprocessor = |program: &mut LogicProgram, feedback: LogicFeedback| {
            if feedback.status != FeedbackStatus::ConsistentNoEntailment
                || feedback.missing_links.is_empty()
            {
                return feedback;
            }
            match self.evaluate_with_fact_synthesis(program) {
                Ok(updated) => updated,
                Err(err) => {
                    warn!(error = %err, "iteration fact synthesis failed");
                    feedback
                }
            }
        };
        let (best, history) = manager.run(
            question,
            &context.logic_program_v1,
            &context.feedback_v1,
            Some(&context.answer_v1),
            &postprocessor,
        );

        let mut llm_status = context.llm_status;
        llm_status.extend(self.llm.pop_statuses());

        IterativeResult {
            best,
            history,
            canonicalization: context.canonicalization,
            structured_stats: context.structured_stats,
            llm_status,
        }
    }

    // ------------------------------------------------------------------
    // Shared preparation
    // ------------------------------------------------------------------

    fn prepare_context(&self, question: &str) -> PhaseContext {
        let canonicalization = self.canonicalizer.run(question);
        let baseline = self.llm.ask_structured(question);
        let (fallback_program, _) = self.normalized_program(&baseline);

        let mut logic_program_v1 =
            self.extractor
                .run(question, &canonicalization, Some(&fallback_program));
        let structured_stats = self.extractor.last_stats();
        let mut llm_status = self.llm.pop_statuses();

        let (feedback_v1, v1_solver_ready) =
            match self.evaluate_with_fact_synthesis(&mut logic_program_v1) {
                Ok(feedback) => (feedback, true),
                Err(err) => {
                    warn!(error = %err, "unable to build solver for v1 program");
                    llm_status.insert(
                        "translator_v1".to_string(),
                        format!("error:{}", error_kind(&err)),
                    );
                    (
                        LogicFeedback::invalid(format!(
                            "Impossibile costruire il solver per il programma v1: {err}"
                        )),
                        false,
                    )
                }
            };

        PhaseContext {
            canonicalization,
            logic_program_v1,
            feedback_v1,
            answer_v1: baseline.final_answer,
            structured_stats,
            v1_solver_ready,
            llm_status,
        }
    }

    /// Normalize + hydrate + inject the canonical rule for a baseline
    /// structured answer's program payload.
    fn normalized_program(&self, baseline: &StructuredAnswer) -> (LogicProgram, NormalizationStats) {
        let (mut program, mut stats) = normalize_value(&baseline.logic_program);
        hydrate(&mut program, &self.registry, &mut stats);
        ensure_canonical_query_rule(&mut program, &self.registry);
        (program, stats)
    }

    // ------------------------------------------------------------------
    // Fact synthesis
    // ------------------------------------------------------------------

    /// Solve, and while the verdict is "consistent but not entailed" with
    /// known missing links, assert the missing premises (bounded) and
    /// re-solve.
    fn evaluate_with_fact_synthesis(
        &self,
        program: &mut LogicProgram,
    ) -> Result<LogicFeedback, SolverError> {
        let mut attempts = 0;
        loop {
            let feedback = evaluate_program(program, &self.registry)?;
            if feedback.missing_links.is_empty()
                || feedback.status != FeedbackStatus::ConsistentNoEntailment
                || attempts >= FACT_SYNTHESIS_MAX_ROUNDS
            {
                return Ok(feedback);
            }
            if !self.synthesize_missing_facts(program, &feedback.missing_links) {
                return Ok(feedback);
            }
            attempts += 1;
        }
    }

    /// Assert one atom per missing predicate, reusing constants of the
    /// declared argument sorts and minting fresh ones on demand.
    /// Returns false when nothing new could be added.
    fn synthesize_missing_facts(&self, program: &mut LogicProgram, missing: &[String]) -> bool {
        let existing: std::collections::BTreeSet<String> = program
            .axioms
            .iter()
            .map(|axiom| axiom.formula.trim().to_string())
            .collect();

        let mut added = false;
        for raw_name in missing {
            let canonical = self.registry.resolve_predicate(raw_name);
            let Some(def) = program.predicates.get(&canonical).cloned() else {
                continue;
            };
            let mut args = Vec::with_capacity(def.sorts.len());
            for (idx, sort) in def.sorts.iter().enumerate() {
                let sort = if sort.trim().is_empty() { "Entity" } else { sort.as_str() };
                args.push(self.constant_compatible_with_sort(program, sort, idx));
            }
            let formula = if args.is_empty() {
                canonical.clone()
            } else {
                format!("{}({})", canonical, args.join(", "))
            };
            if existing.contains(&formula) {
                continue;
            }
            info!(%formula, "fact synthesis: injected premise");
            program.axioms.push(Axiom { formula });
            added = true;
        }
        added
    }

    /// Constant lookup for fact synthesis: an exact-sort constant wins,
    /// then one whose sort is a descendant of the required sort in the
    /// ontology tree, then a freshly minted constant of the sort.
    fn constant_compatible_with_sort(
        &self,
        program: &mut LogicProgram,
        sort: &str,
        position: usize,
    ) -> String {
        if let Some(name) = program.constant_of_sort(sort) {
            return name.to_string();
        }
        for (name, def) in &program.constants {
            let mut current = def.sort.clone();
            for _ in 0..32 {
                match self.registry.parent_sort(&current) {
                    Some(parent) if parent == sort => return name.clone(),
                    Some(parent) => current = parent.to_string(),
                    None => break,
                }
            }
        }
        program.ensure_constant_for_sort(sort, position)
    }

    // ------------------------------------------------------------------
    // Result assembly
    // ------------------------------------------------------------------

    fn guardrail_failure_result(
        &self,
        question: &str,
        reference_answer: Option<&str>,
        final_answer: String,
        program_v2: LogicProgram,
        guardrail: GuardrailResult,
        context: PhaseContext,
    ) -> PipelineResult {
        // The refined program cannot be trusted; report the v1 program's
        // feedback instead, freshly computed.
        let fallback_feedback = evaluate_program(&context.logic_program_v1, &self.registry)
            .unwrap_or_else(|_| context.feedback_v1.clone());
        let explanation =
            synthesize_explanation(question, &final_answer, &fallback_feedback, &guardrail);
        let judge = self.maybe_run_judge(
            question,
            reference_answer,
            &context.answer_v1,
            &final_answer,
            false,
        );

        PipelineResult {
            final_answer,
            logic_program: program_v2,
            feedback: fallback_feedback.clone(),
            guardrail,
            explanation,
            fallback_used: true,
            fallback_feedback: Some(fallback_feedback),
            canonicalization: context.canonicalization,
            logic_program_v1: context.logic_program_v1,
            feedback_v1: context.feedback_v1,
            answer_v1: context.answer_v1,
            structured_stats: context.structured_stats,
            llm_status: context.llm_status,
            judge,
        }
    }

    /// Judge only runs with a reference answer, an enabled runtime and a
    /// passing guardrail.
    fn maybe_run_judge(
        &self,
        question: &str,
        reference_answer: Option<&str>,
        baseline_answer: &str,
        candidate_answer: &str,
        guardrail_ok: bool,
    ) -> Option<JudgeVerdict> {
        let reference = reference_answer?;
        if !guardrail_ok || !self.judge.is_enabled() {
            return None;
        }
        Some(self.judge.evaluate(
            question,
            Some(reference),
            baseline_answer,
            candidate_answer,
            "baseline_v1",
            "nsla_v2",
        ))
    }
}

/// Ordered, deduplicated predicate names applied anywhere in the program.
fn collect_fact_predicates(program: &LogicProgram, registry: &Ontology) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = std::collections::BTreeSet::new();
    let mut harvest = |text: &str| {
        for raw in extract_predicate_names(text) {
            let canonical = registry.resolve_predicate(&raw);
            if canonical.is_empty() || is_logical_keyword(&canonical) {
                continue;
            }
            if seen.insert(canonical.clone()) {
                names.push(canonical);
            }
        }
    };
    for axiom in &program.axioms {
        harvest(&axiom.formula);
    }
    for rule in &program.rules {
        harvest(&rule.condition);
        harvest(&rule.conclusion);
    }
    if let Some(query) = &program.query {
        harvest(query);
    }
    names
}

/// Append the localized symbolic-requisites line unless already present.
fn augment_final_answer(answer: &str, predicates: &[String]) -> String {
    let unique: Vec<&String> = {
        let mut seen = std::collections::BTreeSet::new();
        predicates
            .iter()
            .filter(|p| !p.is_empty() && seen.insert(p.as_str()))
            .collect()
    };
    if unique.is_empty() {
        return answer.to_string();
    }
    let summary = format!(
        "Requisiti simbolici soddisfatti: {}.",
        unique
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if answer.to_lowercase().contains(&summary.to_lowercase()) {
        return answer.to_string();
    }
    let separator = if answer.trim().is_empty() { "" } else { "\n\n" };
    format!("{answer}{separator}{summary}")
}

fn error_kind(err: &SolverError) -> &'static str {
    match err {
        SolverError::Dsl(inner) => match inner {
            crate::dsl::DslError::Parse(_) => "ParseError",
            crate::dsl::DslError::UnknownPredicate(_) => "UnknownPredicate",
            crate::dsl::DslError::ArityMismatch { .. } => "ArityMismatch",
            crate::dsl::DslError::TypeMismatch { .. } => "TypeMismatch",
        },
        SolverError::Backend(_) => "SolverError",
    }
}
