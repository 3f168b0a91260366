//! HTTP API Module
//!
//! REST facade over the pipeline. The core stays synchronous; only this
//! edge is async. Routes mirror the public surface: freeform and
//! structured passthrough, the v1 pipeline, the one-shot and iterative v2
//! pipelines, the judge comparison and a health probe.

pub mod dto;
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Extension, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::pipeline::LegalPipeline;

/// Build the application router with the shared pipeline handle.
pub fn router(pipeline: Arc<LegalPipeline>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/llm_only", post(handlers::llm_only))
        .route("/llm_structured", post(handlers::llm_structured))
        .route("/legal_query", post(handlers::legal_query))
        .route("/legal_query_v2", post(handlers::legal_query_v2))
        .route(
            "/legal_query_v2_iterative",
            post(handlers::legal_query_v2_iterative),
        )
        .route("/judge_compare", post(handlers::judge_compare))
        .layer(Extension(pipeline))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
