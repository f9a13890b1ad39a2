//! Gemini API client: text generation, embeddings, and grounded web search.

pub mod client;
pub mod grounding;
pub mod types;
