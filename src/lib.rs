//! # Civilex Neuro-Symbolic Legal Reasoning Engine
//!
//! Answers Italian civil-law questions by coupling an LLM with a Z3-backed
//! logic layer: the model proposes a typed logic program (DSL v2.1), the
//! solver evaluates it, and a bounded refinement loop closes the gap
//! between the two before an explanation is emitted.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Question
//!     ↓
//! [Canonicalizer]        → ontology-mapped concepts
//!     ↓
//! [Structured Extractor] → logic program draft (v1)
//!     ↓
//! [Normalizer]           → canonical typed program
//!     ↓
//! [Solver + Feedback]    → status, missing links, conflicts
//!     ↓
//! [Refinement]*          → refined program (v2), bounded loop
//!     ↓
//! [Guardrail]            → static validation (fallback on failure)
//!     ↓
//! [Solver + Feedback]    → final verdict (+ fact synthesis)
//!     ↓
//! Explanation (+ optional Judge)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use civilex::{Config, LegalPipeline, LlmClient, Ontology};
//!
//! let config = Config::load()?;
//! let registry = Arc::new(Ontology::load_default()?);
//! let llm = Arc::new(LlmClient::from_config(&config.llm, registry.clone()));
//! let pipeline = LegalPipeline::new(registry, llm, config.pipeline);
//!
//! let result = pipeline.run_once("Il debitore risponde del danno?", None);
//! println!("{}", result.final_answer);
//! ```
//!
//! The default backend is `dummy`: deterministic, offline, and sufficient
//! to drive the whole pipeline end-to-end (that is what the tests do).
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `ontology` | Canonical sorts/predicates registry + alias resolution |
//! | `dsl` | Expression grammar: parser, sanitizer, AST |
//! | `program` | Logic program model, normalizer, canonical rules |
//! | `solver` | Z3 driver and type mapper |
//! | `feedback` | Solver result classification, missing links |
//! | `guardrail` | Strict static validation |
//! | `llm` | Backends, retry policy, JSON extraction, dummy artifacts |
//! | `runtime` | Stage runtimes (canonicalizer/extractor/refinement/judge) |
//! | `pipeline` | Orchestrator and iteration manager |
//! | `rest` | Axum HTTP facade |

pub mod config;
pub mod dsl;
pub mod feedback;
pub mod guardrail;
pub mod llm;
pub mod ontology;
pub mod pipeline;
pub mod program;
pub mod rest;
pub mod runtime;
pub mod solver;

// Re-export the types most callers need.
pub use config::Config;
pub use feedback::{build_feedback, evaluate_program, FeedbackStatus, LogicFeedback};
pub use guardrail::{run_guardrail, GuardrailIssue, GuardrailResult};
pub use llm::{CanonicalizerOutput, JudgeVerdict, LlmClient, RefinementOutput, StructuredAnswer};
pub use ontology::{Ontology, DSL_VERSION};
pub use pipeline::{
    synthesize_explanation, ExplanationOutput, IterationState, IterativeResult, LegalPipeline,
    PipelineResult,
};
pub use program::normalize::{hydrate, normalize_value, NormalizationStats};
pub use program::{Axiom, ConstantDef, LogicProgram, PredicateDef, Rule, SortDef};
pub use solver::{SolverDriver, SolverError};
