mod config;
mod gemini;
mod index;
mod knowledge;
mod pipeline;
mod security;
mod server;
mod translate;

pub const USER_AGENT: &str = concat!("zelig/", env!("CARGO_PKG_VERSION"));

use std::time::Duration;

use clap::Parser;
use reqwest::Client;
use tracing::{info, warn};

use config::Config;
use gemini::client::GeminiClient;
use index::SemanticIndex;
use pipeline::{AnswerPipeline, RagBackend};
use security::SecurityAgent;
use server::AppState;
use translate::TranslationService;

/// TCP connection establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Global HTTP client timeout covering DNS + connect + response body.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zelig=info".parse()?),
        )
        .init();

    let config = Config::parse();

    let http = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()?;

    let records = knowledge::load(&config.knowledge_path);

    let gemini = match GeminiClient::new(
        http.clone(),
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.embed_model.clone(),
    ) {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(error = %e, "Gemini unavailable: guide falls back to keyword mode, security scans report Error");
            None
        }
    };

    let rag = match &gemini {
        Some(client) if !records.is_empty() => {
            match SemanticIndex::open_or_build(&config.index_dir, &records, client).await {
                Ok(index) => Some(RagBackend::new(index, client.clone(), client.clone())),
                Err(e) => {
                    warn!(error = %e, "semantic index unavailable, guide falls back to keyword mode");
                    None
                }
            }
        }
        _ => None,
    };

    let pipeline = AnswerPipeline::new(records, rag);
    info!(retrieval = pipeline.retrieval_enabled(), "answer pipeline ready");

    let translator = TranslationService::new(
        http.clone(),
        config.hf_token.clone(),
        config.translate_model.clone(),
    );
    let security = gemini.map(|client| SecurityAgent::new(client.clone(), client));

    let app = server::router(AppState::new(pipeline, translator, security));

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!(addr = %config.bind, "zelig API listening");
    axum::serve(listener, app).await?;
    Ok(())
}
