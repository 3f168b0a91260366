//! Request/response DTOs for the REST facade.

use serde::{Deserialize, Serialize};

/// Body of every question-driven endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
    #[serde(default)]
    pub reference_answer: Option<String>,
}

/// Body of `/judge_compare`.
#[derive(Debug, Clone, Deserialize)]
pub struct JudgeRequest {
    pub question: String,
    pub answer_a: String,
    pub answer_b: String,
    #[serde(default)]
    pub reference_answer: Option<String>,
    #[serde(default = "default_label_a")]
    pub label_a: String,
    #[serde(default = "default_label_b")]
    pub label_b: String,
}

fn default_label_a() -> String {
    "LLM".to_string()
}

fn default_label_b() -> String {
    "NSLA".to_string()
}

/// Query parameters of the iterative endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct IterativeParams {
    #[serde(default)]
    pub max_iters: Option<usize>,
}

/// Body of `/llm_only`.
#[derive(Debug, Clone, Serialize)]
pub struct FreeformResponse {
    pub answer: String,
}

/// Body of `/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
