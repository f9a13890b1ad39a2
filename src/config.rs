use std::path::PathBuf;

use clap::Parser;

/// Runtime configuration. Credentials are optional on purpose: missing
/// keys degrade the affected service instead of failing startup.
#[derive(Parser)]
#[command(name = "zelig", about = "Tourism backend: guide chat, translation, and city security signals")]
pub struct Config {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "ZELIG_BIND", default_value = "127.0.0.1:8001")]
    pub bind: String,

    /// JSON array of place records forming the knowledge base.
    #[arg(
        long,
        env = "ZELIG_KNOWLEDGE_PATH",
        default_value = "data/knowledge_base.json"
    )]
    pub knowledge_path: PathBuf,

    /// Directory for the persisted semantic index. Built lazily on first
    /// start, then trusted forever; delete it to force a rebuild.
    #[arg(long, env = "ZELIG_INDEX_DIR", default_value = "data/index")]
    pub index_dir: PathBuf,

    /// Gemini API key. Without it the guide answers from keyword fallback
    /// only and security scans report Error.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini generation model.
    #[arg(long, env = "GEMINI_MODEL", default_value = "gemini-2.5-flash")]
    pub gemini_model: String,

    /// Gemini embedding model.
    #[arg(
        long,
        env = "GEMINI_EMBED_MODEL",
        default_value = "gemini-embedding-001"
    )]
    pub embed_model: String,

    /// Hugging Face API token for the hosted translation model.
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub hf_token: Option<String>,

    /// Hosted translation model identifier.
    #[arg(
        long,
        env = "ZELIG_TRANSLATE_MODEL",
        default_value = "atlasia/Terjman-Nano-v2.0"
    )]
    pub translate_model: String,
}
