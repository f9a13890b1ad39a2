//! Coarse city risk signal from recent web text.
//!
//! The city name is translated into Arabic, one grounded search query is
//! issued against Moroccan news terms, and the returned snippets are
//! scored against a fixed Arabic keyword table.

use serde::Serialize;
use tracing::{info, warn};

use crate::gemini::client::{GeminiError, GenerationClient, SearchClient};
use crate::gemini::types::SearchHit;

const MAX_RESULTS: usize = 8;

const DANGER_KEYWORDS: &[&str] = &["خطر", "تحذير", "إرهاب", "مسلح", "قتل"];
const CRIME_KEYWORDS: &[&str] = &["سرقة", "جريمة", "نشل", "اعتداء", "لصوص", "كريساج"];
const ACCIDENT_KEYWORDS: &[&str] = &["حادث", "اصطدام", "غرق", "حريق", "وفاة"];
const PROTEST_KEYWORDS: &[&str] = &["مظاهرة", "احتجاج", "إضراب"];

/// Full keyword taxonomy. `protest` is tracked here but deliberately not
/// counted toward the risk total (upstream scoring behavior, kept as-is).
const KEYWORD_TABLE: [(&str, &[&str]); 4] = [
    ("danger", DANGER_KEYWORDS),
    ("crime", CRIME_KEYWORDS),
    ("accident", ACCIDENT_KEYWORDS),
    ("protest", PROTEST_KEYWORDS),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
    Unknown,
    Error,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct HitCounts {
    pub crime: u32,
    pub accident: u32,
    pub danger: u32,
}

impl HitCounts {
    fn total(&self) -> u32 {
        self.crime + self.accident + self.danger
    }
}

#[derive(Debug, Serialize)]
pub struct RiskAssessment {
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city_ar: Option<String>,
    pub risk_level: RiskLevel,
    pub risk_color: &'static str,
    pub recommendation: String,
    pub hits: HitCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources_count: Option<usize>,
}

/// Terminal degraded result, also used when the agent itself could not be
/// constructed (no API credentials at startup).
pub fn unavailable(city: &str) -> RiskAssessment {
    RiskAssessment {
        city: city.to_string(),
        city_ar: None,
        risk_level: RiskLevel::Error,
        risk_color: "gray",
        recommendation: "Service unavailable.".to_string(),
        hits: HitCounts::default(),
        sources_count: None,
    }
}

pub struct SecurityAgent<G, S> {
    generator: G,
    search: S,
}

impl<G: GenerationClient, S: SearchClient> SecurityAgent<G, S> {
    pub fn new(generator: G, search: S) -> Self {
        Self { generator, search }
    }

    /// Never fails: any error anywhere in the flow collapses into an
    /// `Error`-level assessment.
    pub async fn analyze(&self, city: &str) -> RiskAssessment {
        match self.run(city).await {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(city, error = %e, "security scan failed");
                unavailable(city)
            }
        }
    }

    async fn run(&self, city: &str) -> Result<RiskAssessment, GeminiError> {
        let city_ar = self.translate_city(city).await?;
        info!(city, city_ar, "scanning security reports");

        let query = format!("\"{city_ar}\" أخبار أمن حوادث المغرب");
        let mut results = self.search.search(&query).await?;
        results.truncate(MAX_RESULTS);

        if results.is_empty() {
            return Ok(RiskAssessment {
                city: city.to_string(),
                city_ar: None,
                risk_level: RiskLevel::Unknown,
                risk_color: "gray",
                recommendation: "No recent data available.".to_string(),
                hits: HitCounts::default(),
                sources_count: None,
            });
        }

        let hits = count_hits(&results);
        let (risk_level, risk_color, recommendation) = classify(hits.total());

        Ok(RiskAssessment {
            city: capitalize(city),
            city_ar: Some(city_ar),
            risk_level,
            risk_color,
            recommendation,
            hits,
            sources_count: Some(results.len()),
        })
    }

    async fn translate_city(&self, city: &str) -> Result<String, GeminiError> {
        let prompt = format!(
            "Translate this city name into Arabic. Reply with only the Arabic name, nothing else.\n\n{city}"
        );
        Ok(self.generator.generate(&prompt).await?.trim().to_string())
    }
}

/// Each result contributes at most one hit per category: the first
/// matching keyword wins and scanning of that category stops.
fn count_hits(results: &[SearchHit]) -> HitCounts {
    let mut counts = HitCounts::default();
    for result in results {
        let content = format!("{} {}", result.title, result.snippet).to_lowercase();
        for (category, keywords) in KEYWORD_TABLE {
            let slot = match category {
                "crime" => &mut counts.crime,
                "accident" => &mut counts.accident,
                "danger" => &mut counts.danger,
                _ => continue,
            };
            if keywords.iter().any(|word| content.contains(word)) {
                *slot += 1;
            }
        }
    }
    counts
}

fn classify(total: u32) -> (RiskLevel, &'static str, String) {
    match total {
        0 => (
            RiskLevel::Low,
            "green",
            "No recent incidents reported.".to_string(),
        ),
        1..=2 => (
            RiskLevel::Moderate,
            "orange",
            "Some isolated incidents reported.".to_string(),
        ),
        _ => (
            RiskLevel::High,
            "red",
            format!("Multiple incidents ({total}) reported recently."),
        ),
    }
}

fn capitalize(input: &str) -> String {
    let mut chars = input.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}
