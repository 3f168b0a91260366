//! LLM transport backends.
//!
//! Two backends are supported: a deterministic `dummy` that never leaves
//! the process (default, used by tests and offline runs) and an
//! Ollama-compatible HTTP backend. The transport is the only
//! long-latency boundary in the pipeline; every call carries a
//! caller-supplied timeout and is wrapped by the client's retry policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

/// Classified failure reason for a transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorReason {
    Timeout,
    Throttled,
    Connection,
    Empty,
    Error,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::Timeout => "timeout",
            ErrorReason::Throttled => "throttled",
            ErrorReason::Connection => "connection",
            ErrorReason::Empty => "empty",
            ErrorReason::Error => "error",
        }
    }
}

/// Errors surfaced by the LLM runtime.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("{operation} failed due to {}: {message}", reason.as_str())]
    Call {
        operation: String,
        reason: ErrorReason,
        message: String,
    },

    #[error("{operation} returned a response that does not match the schema: {message}")]
    Schema { operation: String, message: String },
}

impl LlmError {
    pub fn reason(&self) -> ErrorReason {
        match self {
            LlmError::Call { reason, .. } => *reason,
            LlmError::Schema { .. } => ErrorReason::Error,
        }
    }
}

/// The configured transport.
pub enum Backend {
    /// Deterministic stub; every stage produces a schema-valid artifact
    /// without leaving the process.
    Dummy,
    /// Ollama-compatible HTTP API (`POST /api/generate`).
    Ollama(OllamaTransport),
}

impl Backend {
    pub fn is_dummy(&self) -> bool {
        matches!(self, Backend::Dummy)
    }
}

/// Blocking HTTP transport against an Ollama-compatible server.
pub struct OllamaTransport {
    base_url: String,
    model: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaTransport {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        OllamaTransport {
            base_url: base_url.into(),
            model: model.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One synchronous completion with the given timeout.
    pub fn complete(&self, prompt: &str, timeout: Duration) -> Result<String, (ErrorReason, String)> {
        debug!(model = %self.model, "calling ollama backend");
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&json!({
                "model": self.model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .map_err(|err| (classify_transport_error(&err), err.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err((ErrorReason::Throttled, format!("HTTP {status}")));
        }
        if !status.is_success() {
            return Err((ErrorReason::Error, format!("HTTP {status}")));
        }

        let body: GenerateResponse = response
            .json()
            .map_err(|err| (ErrorReason::Error, err.to_string()))?;
        let text = body.response.trim().to_string();
        if text.is_empty() {
            return Err((ErrorReason::Empty, "backend returned empty response".to_string()));
        }
        Ok(text)
    }
}

/// Map a transport error to a classified reason.
fn classify_transport_error(err: &reqwest::Error) -> ErrorReason {
    if err.is_timeout() {
        return ErrorReason::Timeout;
    }
    if err.is_connect() {
        return ErrorReason::Connection;
    }
    let text = err.to_string().to_lowercase();
    if text.contains("429") || text.contains("rate limit") {
        return ErrorReason::Throttled;
    }
    if text.contains("connection") {
        return ErrorReason::Connection;
    }
    ErrorReason::Error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_strings() {
        assert_eq!(ErrorReason::Timeout.as_str(), "timeout");
        assert_eq!(ErrorReason::Throttled.as_str(), "throttled");
        assert_eq!(ErrorReason::Empty.as_str(), "empty");
    }

    #[test]
    fn test_connection_error_classification() {
        // A request against a port nothing listens on classifies as a
        // connection failure (or timeout on slower environments).
        let transport = OllamaTransport::new("http://127.0.0.1:1", "test-model");
        let err = transport
            .complete("ciao", Duration::from_millis(500))
            .expect_err("nothing listens on port 1");
        assert!(matches!(
            err.0,
            ErrorReason::Connection | ErrorReason::Timeout | ErrorReason::Error
        ));
    }
}
