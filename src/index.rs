//! Persistent semantic index over the knowledge base.
//!
//! Vectors live in a JSON snapshot on disk. An existing snapshot is loaded
//! as-is: there is no staleness check against the source records, so the
//! snapshot must be deleted by hand after editing the knowledge base.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::gemini::client::{EmbeddingClient, GeminiError};
use crate::knowledge::PlaceRecord;

const SNAPSHOT_FILE: &str = "index.json";

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("index I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("index snapshot corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[from] GeminiError),
}

/// One indexed document, 1:1 with a `PlaceRecord`.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexEntry {
    pub source: String,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SemanticIndex {
    entries: Vec<IndexEntry>,
}

impl SemanticIndex {
    /// Loads the snapshot under `dir` if present, otherwise embeds every
    /// record and persists the result. Build-once: the embedder is never
    /// called when a snapshot exists.
    pub async fn open_or_build(
        dir: &Path,
        records: &[PlaceRecord],
        embedder: &impl EmbeddingClient,
    ) -> Result<Self, IndexError> {
        let snapshot = dir.join(SNAPSHOT_FILE);
        if snapshot.exists() {
            let raw = fs::read_to_string(&snapshot)?;
            let index: SemanticIndex = serde_json::from_str(&raw)?;
            info!(path = %snapshot.display(), entries = index.entries.len(), "loaded existing index");
            return Ok(index);
        }

        let texts: Vec<String> = records.iter().map(PlaceRecord::document_text).collect();
        let embeddings = embedder.embed(&texts).await?;
        let entries = records
            .iter()
            .zip(embeddings)
            .map(|(record, embedding)| IndexEntry {
                source: record.name.clone(),
                text: record.document_text(),
                embedding,
            })
            .collect();

        let index = SemanticIndex { entries };
        fs::create_dir_all(dir)?;
        fs::write(&snapshot, serde_json::to_string(&index)?)?;
        info!(path = %snapshot.display(), entries = index.entries.len(), "built and persisted index");
        Ok(index)
    }

    #[cfg(test)]
    pub(crate) fn from_entries(entries: Vec<IndexEntry>) -> Self {
        Self { entries }
    }

    /// Top-k entries by cosine similarity to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<&IndexEntry> {
        let mut scored: Vec<(f32, &IndexEntry)> = self
            .entries
            .iter()
            .map(|entry| (cosine(query, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, entry)| entry).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
