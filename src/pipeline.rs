//! Three-tier answer pipeline: retrieval-augmented generation, keyword
//! fallback over the raw records, then a fixed apology. Tiers are strictly
//! ordered and a tier failure is downgraded, never retried or propagated.

use tracing::{debug, warn};

use crate::gemini::client::{EmbeddingClient, GeminiError, GenerationClient};
use crate::index::SemanticIndex;
use crate::knowledge::PlaceRecord;

const TOP_K: usize = 5;
const OFFLINE_PREFIX: &str = "Quick Info (Offline): ";
const APOLOGY: &str = "Désolé, je n'ai pas l'information pour le moment.";

/// Which tier produced the answer. The HTTP layer only ships the text;
/// the tier is for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Retrieval,
    Keyword,
    Terminal,
}

#[derive(Debug)]
pub struct Answer {
    pub text: String,
    pub tier: Tier,
}

/// Everything tier 1 needs. Absent when credentials are missing, the index
/// could not be built, or the knowledge base is empty.
pub struct RagBackend<E, G> {
    index: SemanticIndex,
    embedder: E,
    generator: G,
}

impl<E: EmbeddingClient, G: GenerationClient> RagBackend<E, G> {
    pub fn new(index: SemanticIndex, embedder: E, generator: G) -> Self {
        Self {
            index,
            embedder,
            generator,
        }
    }
}

pub struct AnswerPipeline<E, G> {
    records: Vec<PlaceRecord>,
    rag: Option<RagBackend<E, G>>,
}

impl<E: EmbeddingClient, G: GenerationClient> AnswerPipeline<E, G> {
    /// Once constructed, tier availability is fixed for the process
    /// lifetime: a disabled tier 1 never comes back, an enabled one is
    /// attempted on every query regardless of earlier failures.
    pub fn new(records: Vec<PlaceRecord>, rag: Option<RagBackend<E, G>>) -> Self {
        let rag = match rag {
            Some(_) if records.is_empty() => {
                warn!("knowledge base is empty, retrieval tier disabled");
                None
            }
            Some(rag) if rag.index.is_empty() => {
                warn!("semantic index is empty, retrieval tier disabled");
                None
            }
            other => other,
        };
        Self { records, rag }
    }

    pub fn retrieval_enabled(&self) -> bool {
        self.rag.is_some()
    }

    /// Always produces an answer; the terminal apology is the floor.
    pub async fn answer(&self, query: &str) -> Answer {
        if let Some(rag) = &self.rag {
            match self.retrieve_and_generate(rag, query).await {
                Ok(text) => {
                    debug!(tier = ?Tier::Retrieval, "query answered");
                    return Answer {
                        text,
                        tier: Tier::Retrieval,
                    };
                }
                Err(e) => {
                    warn!(error = %e, "retrieval tier failed, falling back to keyword scan");
                }
            }
        }

        if let Some(text) = self.keyword_lookup(query) {
            debug!(tier = ?Tier::Keyword, "query answered");
            return Answer {
                text,
                tier: Tier::Keyword,
            };
        }

        debug!(tier = ?Tier::Terminal, "query answered");
        Answer {
            text: APOLOGY.to_string(),
            tier: Tier::Terminal,
        }
    }

    async fn retrieve_and_generate(
        &self,
        rag: &RagBackend<E, G>,
        query: &str,
    ) -> Result<String, GeminiError> {
        let embeddings = rag.embedder.embed(&[query.to_string()]).await?;
        let query_embedding = embeddings.into_iter().next().unwrap_or_default();
        let hits = rag.index.search(&query_embedding, TOP_K);
        let context = hits
            .iter()
            .map(|entry| entry.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        rag.generator.generate(&guide_prompt(&context, query)).await
    }

    /// Case-insensitive substring scan over the raw records; the first
    /// match in load order wins, no ranking.
    fn keyword_lookup(&self, query: &str) -> Option<String> {
        let needle = query.to_lowercase();
        self.records
            .iter()
            .find(|record| record.haystack().contains(&needle))
            .map(|record| format!("{OFFLINE_PREFIX}{}", record.description))
    }
}

fn guide_prompt(context: &str, query: &str) -> String {
    format!(
        "You are Zelig, an expert guide for Morocco. Answer the question using the context below.\n\
         If the answer is not in the context, use your general knowledge.\n\n\
         <context>\n{context}\n</context>\n\n\
         Question: {query}"
    )
}
