//! Fixed tourism knowledge base: place records loaded from a JSON file.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// One place from the knowledge base. Identity is `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub safety_tips: String,
    #[serde(default)]
    pub budget: String,
}

impl PlaceRecord {
    /// Text blob submitted to the embedding model, one per record.
    pub fn document_text(&self) -> String {
        format!(
            "Name: {}\nCategory: {}\nLocation: {}\nDescription: {}\nSafety Tips: {}\nBudget: {}",
            self.name, self.category, self.location, self.description, self.safety_tips, self.budget
        )
    }

    /// Lowercased serialized form scanned by the keyword fallback.
    pub fn haystack(&self) -> String {
        self.document_text().to_lowercase()
    }
}

/// Loads place records from `path`. Missing file or parse failure degrades
/// to an empty knowledge base so startup never fails here.
pub fn load(path: &Path) -> Vec<PlaceRecord> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "knowledge base unreadable, starting empty");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<PlaceRecord>>(&raw) {
        Ok(records) => {
            info!(path = %path.display(), count = records.len(), "knowledge base loaded");
            records
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "knowledge base malformed, starting empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample() -> PlaceRecord {
        PlaceRecord {
            name: "Jemaa el-Fna".into(),
            category: "Square".into(),
            location: "Marrakech".into(),
            description: "The main square of the medina.".into(),
            safety_tips: "Watch for pickpockets.".into(),
            budget: "Free".into(),
        }
    }

    #[test]
    fn document_text_carries_every_field() {
        let text = sample().document_text();
        for needle in [
            "Jemaa el-Fna",
            "Square",
            "Marrakech",
            "main square",
            "pickpockets",
            "Free",
        ] {
            assert!(text.contains(needle), "missing {needle} in: {text}");
        }
    }

    #[test]
    fn haystack_is_lowercase() {
        let haystack = sample().haystack();
        assert!(haystack.contains("jemaa el-fna"));
        assert!(!haystack.contains("Jemaa"));
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let records = load(Path::new("/nonexistent/knowledge_base.json"));
        assert!(records.is_empty());
    }

    #[test]
    fn load_malformed_json_returns_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json at all").unwrap();
        assert!(load(file.path()).is_empty());
    }

    #[test]
    fn load_preserves_order_and_tolerates_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "Majorelle Garden", "description": "Botanical garden."}},
                {{"name": "Bahia Palace", "category": "Palace", "extra": "ignored"}}
            ]"#
        )
        .unwrap();

        let records = load(file.path());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "Majorelle Garden");
        assert_eq!(records[1].name, "Bahia Palace");
        assert_eq!(records[0].category, "");
    }
}
