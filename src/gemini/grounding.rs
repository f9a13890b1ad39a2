use tracing::warn;

use super::types::{GenerateContentResponse, SearchHit};

/// Turns a grounded generation response into discrete search hits.
///
/// Each `groundingChunks` entry becomes one hit; the snippet is the
/// concatenation of every `groundingSupports` segment attributed to that
/// chunk. Chunks without a usable URI are skipped.
pub fn extract_search_hits(response: &GenerateContentResponse) -> Vec<SearchHit> {
    let metadata = response
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.grounding_metadata.as_ref());

    let Some(metadata) = metadata else {
        warn!("grounded response carried no grounding metadata");
        return Vec::new();
    };

    let chunks = metadata.grounding_chunks.as_deref().unwrap_or_default();
    let mut snippets: Vec<String> = vec![String::new(); chunks.len()];

    for support in metadata.grounding_supports.as_deref().unwrap_or_default() {
        let Some(text) = support.segment.as_ref().and_then(|s| s.text.as_deref()) else {
            continue;
        };
        for &idx in support.grounding_chunk_indices.as_deref().unwrap_or_default() {
            if let Some(snippet) = snippets.get_mut(idx) {
                if !snippet.is_empty() {
                    snippet.push(' ');
                }
                snippet.push_str(text);
            }
        }
    }

    chunks
        .iter()
        .zip(snippets)
        .filter_map(|(chunk, snippet)| {
            let web = chunk.web.as_ref()?;
            let url = web.uri.as_ref().filter(|u| !u.is_empty())?.clone();
            Some(SearchHit {
                title: web.title.clone().unwrap_or_default(),
                snippet,
                url,
            })
        })
        .collect()
}

/// Extracts the text of the first candidate, if any.
pub fn extract_text(response: &GenerateContentResponse) -> Option<String> {
    response
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.content.as_ref())
        .and_then(|content| content.parts.first())
        .map(|part| part.text.clone())
        .filter(|text| !text.is_empty())
}
