//! Core evidence data model shared by every retrieval source.

use serde::{Deserialize, Serialize};

use crate::config::defaults;

/// Provenance category of an evidence unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    News,
    Policy,
    Dataset,
}

impl SourceType {
    /// Lenient parse used at ingest boundaries: unknown labels degrade to `News`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "policy" => Self::Policy,
            "dataset" => Self::Dataset,
            _ => Self::News,
        }
    }
}

/// One discrete sourced fact used to support or refute a funding-fit claim.
///
/// `title` is the de-duplication key across the final evidence set; two units
/// with the same title are the same fact regardless of source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceUnit {
    pub id: String,
    pub source_type: SourceType,
    pub title: String,
    pub source_name: String,
    pub published_year: i32,
    pub url: Option<String>,
    pub sector: String,
    pub geography: String,
    pub investors: Vec<String>,
    pub content: String,
    pub usage_tags: Vec<String>,
}

/// Transient retrieval input; lives only for one aggregation call.
#[derive(Debug, Clone)]
pub struct RetrievalQuery {
    pub sector: String,
    pub geography: String,
    pub funding_stage: String,
    pub startup_description: Option<String>,
}

impl RetrievalQuery {
    /// Free-text form used by the similarity store.
    pub fn query_text(&self) -> String {
        let mut q = format!(
            "{} {} in {}",
            self.sector, self.funding_stage, self.geography
        );
        if let Some(desc) = &self.startup_description {
            if !desc.is_empty() {
                q.push(' ');
                q.push_str(desc);
            }
        }
        q
    }
}

/// Normalize free-text evidence content: decode HTML entities, strip tags,
/// collapse whitespace, and cap the length in characters.
pub fn normalize_content(s: &str, cap: usize) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > cap {
        out = out.chars().take(cap).collect();
    }
    out
}

/// Stable short digest of a title, used to build source-stable evidence ids.
pub fn title_digest(title: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(title.as_bytes());
    // 8 bytes of hex is plenty for id disambiguation.
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Ensure `usage_tags` is never empty after normalization.
pub fn normalize_tags(tags: Vec<String>, fallback: &str) -> Vec<String> {
    let tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() {
        vec![fallback.to_string()]
    } else {
        tags
    }
}

/// Convenience for parse sites that only have an optional year.
pub fn year_or_default(year: Option<i64>) -> i32 {
    year.and_then(|y| i32::try_from(y).ok())
        .unwrap_or(defaults::PUBLISHED_YEAR)
}
