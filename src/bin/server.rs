//! Civilex HTTP Server Binary
//!
//! Starts the REST facade over the neuro-symbolic pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (dummy backend, 127.0.0.1:8080)
//! cargo run --bin civilex-server
//!
//! # Point at a real Ollama server
//! CIVILEX_LLM__BACKEND=ollama CIVILEX_LLM__MODEL=llama3 cargo run --bin civilex-server
//! ```

use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

use civilex::{Config, LegalPipeline, LlmClient, Ontology};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_else(|err| {
        eprintln!("config load failed ({err}), using defaults");
        Config::default()
    });

    init_tracing(&config);

    let registry = Arc::new(Ontology::load_default().context("loading ontology catalogue")?);
    let llm = Arc::new(LlmClient::from_config(&config.llm, registry.clone()));
    let pipeline = Arc::new(LegalPipeline::new(
        registry,
        llm,
        config.pipeline.clone(),
    ));

    let app = civilex::rest::router(pipeline);
    let listener = tokio::net::TcpListener::bind(&config.http.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.http.bind_addr))?;
    info!(addr = %config.http.bind_addr, "civilex server listening");

    axum::serve(listener, app).await.context("serving HTTP")?;
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
