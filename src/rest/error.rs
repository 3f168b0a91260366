//! REST error mapping.
//!
//! Every pipeline outcome is a successful response whose body carries the
//! symbolic result; the only hard failure is an engine that could not
//! serve the request at all.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestError {
    #[error("engine unavailable: {0}")]
    EngineUnavailable(String),
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "detail": self.to_string() }));
        (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
    }
}
