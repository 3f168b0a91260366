//! Endpoint handlers.
//!
//! The core pipeline is synchronous; handlers hop onto the blocking pool
//! and serialize the outcome. Every endpoint answers 200 with the
//! symbolic result in the body; 500 is reserved for an engine that could
//! not run at all.

use std::sync::Arc;

use axum::extract::Query;
use axum::{Extension, Json};
use serde_json::{json, Value};

use crate::guardrail::run_guardrail;
use crate::pipeline::{synthesize_explanation, LegalPipeline};
use crate::program::normalize::normalize_value;

use super::dto::{
    FreeformResponse, HealthResponse, IterativeParams, JudgeRequest, QuestionRequest,
};
use super::error::RestError;

type Handler = Extension<Arc<LegalPipeline>>;

async fn run_blocking<T, F>(task: F) -> Result<T, RestError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| RestError::EngineUnavailable(err.to_string()))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// POST /llm_only — freeform LLM passthrough, no symbolic layer.
pub async fn llm_only(
    Extension(pipeline): Handler,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<FreeformResponse>, RestError> {
    let answer =
        run_blocking(move || pipeline.llm().ask_freeform(&request.question)).await?;
    Ok(Json(FreeformResponse { answer }))
}

/// POST /llm_structured — validated structured output.
pub async fn llm_structured(
    Extension(pipeline): Handler,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<Value>, RestError> {
    let body = run_blocking(move || {
        let answer = pipeline.llm().ask_structured(&request.question);
        let (program, _) = normalize_value(&answer.logic_program);
        json!({
            "final_answer": answer.final_answer,
            "premises": answer.premises,
            "conclusion": answer.conclusion,
            "logic_program": program,
        })
    })
    .await?;
    Ok(Json(body))
}

/// POST /legal_query — v1 pipeline.
pub async fn legal_query(
    Extension(pipeline): Handler,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<Value>, RestError> {
    let result = run_blocking(move || pipeline.run_v1(&request.question)).await?;
    Ok(Json(json!({
        "answer": result.answer,
        "verified": result.verified,
        "z3_status": result.solver_status,
        "checks": result.checks,
        "logic_program": result.logic_program,
        "facts": result.facts,
    })))
}

/// POST /legal_query_v2 — one-shot v2 pipeline.
pub async fn legal_query_v2(
    Extension(pipeline): Handler,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<Value>, RestError> {
    let result = run_blocking(move || {
        pipeline.run_once(&request.question, request.reference_answer.as_deref())
    })
    .await?;

    Ok(Json(json!({
        "mode": "v2_single",
        "final_answer": result.final_answer,
        "logic_program": result.logic_program,
        "feedback": result.feedback,
        "phase2": {
            "canonicalization": result.canonicalization,
            "logic_program_v1": result.logic_program_v1,
            "feedback_v1": result.feedback_v1,
            "answer_v1": result.answer_v1,
        },
        "guardrail": result.guardrail,
        "explanation": result.explanation,
        "structured_stats": result.structured_stats,
        "llm_status": result.llm_status,
        "judge": result.judge,
        "fallback_used": result.fallback_used,
        "fallback_feedback": result.fallback_feedback,
    })))
}

/// POST /legal_query_v2_iterative?max_iters=N — iterative v2 pipeline.
pub async fn legal_query_v2_iterative(
    Extension(pipeline): Handler,
    Query(params): Query<IterativeParams>,
    Json(request): Json<QuestionRequest>,
) -> Result<Json<Value>, RestError> {
    let body = run_blocking(move || {
        let result = pipeline.run_iterative(&request.question, params.max_iters);

        let guardrail = run_guardrail(&result.best.program, pipeline.registry());
        let explanation = synthesize_explanation(
            &request.question,
            &result.best.final_answer,
            &result.best.feedback,
            &guardrail,
        );

        let history: Vec<Value> = result
            .history
            .iter()
            .map(|state| {
                json!({
                    "iteration": state.iteration,
                    "status": state.feedback.status,
                    "missing_links": state.feedback.missing_links,
                    "conflicting_axioms": state.feedback.conflicting_axioms,
                })
            })
            .collect();

        json!({
            "mode": "v2_iterative",
            "best": {
                "iteration": result.best.iteration,
                "final_answer": result.best.final_answer,
                "logic_program": result.best.program,
                "feedback": result.best.feedback,
                "guardrail": guardrail,
                "explanation": explanation,
            },
            "history": history,
            "structured_stats": result.structured_stats,
            "llm_status": result.llm_status,
        })
    })
    .await?;
    Ok(Json(body))
}

/// POST /judge_compare — judge metric over two answers.
pub async fn judge_compare(
    Extension(pipeline): Handler,
    Json(request): Json<JudgeRequest>,
) -> Result<Json<Value>, RestError> {
    let body = run_blocking(move || {
        let verdict = pipeline.judge_runtime().evaluate(
            &request.question,
            request.reference_answer.as_deref(),
            &request.answer_a,
            &request.answer_b,
            &request.label_a,
            &request.label_b,
        );
        let normalized = verdict.normalized_vote();
        let mut body = serde_json::to_value(&verdict).unwrap_or_default();
        if let Some(map) = body.as_object_mut() {
            map.insert("normalized_vote".to_string(), Value::String(normalized));
        }
        body
    })
    .await?;
    Ok(Json(body))
}
