//! Generative search client: one structured Gemini request per aggregation
//! call, parsed from a strict JSON-list contract.
//!
//! This source depends on an external, rate-limited, non-deterministic
//! service, so the contract is deliberately forgiving on the way back in:
//! stray formatting fences are stripped, a non-list payload means zero
//! results, and a malformed item degrades to per-item defaults instead of
//! aborting the rest.

use std::time::Duration;

use anyhow::Context;
use chrono::Datelike;
use serde::Deserialize;
use serde_json::Value;

use crate::config::defaults;
use crate::evidence::{
    normalize_content, normalize_tags, title_digest, EvidenceUnit, RetrievalQuery, SourceType,
};

const GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

pub struct GenerativeSearchClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    content_cap: usize,
}

impl GenerativeSearchClient {
    pub fn new(api_key: Option<String>, content_cap: usize) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("funding-fit-analyzer/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            content_cap,
        }
    }

    /// Issue the single search request. A missing API key yields zero
    /// results without touching the network; transport and top-level parse
    /// failures surface as errors for the aggregator to absorb.
    pub async fn search(&self, query: &RetrievalQuery) -> anyhow::Result<Vec<EvidenceUnit>> {
        let Some(api_key) = &self.api_key else {
            tracing::debug!("generative search disabled: no API key");
            return Ok(Vec::new());
        };

        let prompt = render_prompt(query);

        #[derive(serde::Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(serde::Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(serde::Serialize)]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: CandidateContent,
        }
        #[derive(Deserialize)]
        struct CandidateContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            #[serde(default)]
            text: String,
        }

        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: &prompt }],
            }],
        };

        let resp = self
            .http
            .post(format!(
                "{GENERATE_URL}/{}:generateContent?key={api_key}",
                self.model
            ))
            .json(&req)
            .send()
            .await
            .context("generative search request failed")?
            .error_for_status()
            .context("generative search request rejected")?;

        let body: Resp = resp.json().await.context("bad generative response")?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .unwrap_or("");

        Ok(parse_evidence_payload(text, query, self.content_cap))
    }
}

fn render_prompt(q: &RetrievalQuery) -> String {
    let description = q.startup_description.as_deref().unwrap_or("");
    format!(
        "You are a LIVE WEB SEARCH RAG engine. Find 4-6 REAL and CURRENT evidence units \
         for a {stage} startup in {sector} targeting the {geography} market.\n\n\
         STARTUP DESCRIPTION: {description}\n\n\
         TASK:\n\
         1. Search for the latest news on this specific sub-sector and geography.\n\
         2. Find real names of active VCs who have invested in SIMILAR models in the last 12 months.\n\
         3. Find actual policy changes or government grants relevant to this model.\n\n\
         FORMATTING CONSTRAINTS:\n\
         1. Output MUST be ONLY a raw JSON list of objects.\n\
         2. Each object must match this structure:\n\
         {{ \"source_type\": \"news\"|\"policy\"|\"dataset\", \"title\": string, \"source_name\": string, \
         \"published_year\": int, \"url\": string, \"investors\": [string], \"content\": string, \
         \"usage_tags\": [string] }}\n\
         3. Usage tags must include one of: \"market-sizing\", \"funding-trends\", \
         \"investor-sentiment\", \"regulation\", \"policy-impact\", \"valuation\", \"exit-metrics\".\n\
         4. ABSOLUTELY NO markdown (no ```json). NO introductory text.",
        stage = q.funding_stage,
        sector = q.sector,
        geography = q.geography,
    )
}

/// Parse the model's reply into evidence units. A non-list payload is zero
/// results; a malformed item gets per-item defaults rather than aborting
/// the others.
pub fn parse_evidence_payload(raw: &str, query: &RetrievalQuery, cap: usize) -> Vec<EvidenceUnit> {
    let cleaned = strip_fences(raw);
    let parsed: Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "generative payload is not valid JSON");
            return Vec::new();
        }
    };
    let Some(items) = parsed.as_array() else {
        tracing::warn!("generative payload is not a JSON list, treating as zero results");
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| item_to_unit(i, item, query, cap))
        .collect()
}

fn item_to_unit(i: usize, item: &Value, query: &RetrievalQuery, cap: usize) -> EvidenceUnit {
    let title = item
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or("Untitled evidence")
        .to_string();

    let investors = item
        .get("investors")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let usage_tags = item
        .get("usage_tags")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    EvidenceUnit {
        id: format!("ev_gen_{i}_{}", title_digest(&title)),
        source_type: SourceType::parse_lenient(
            item.get("source_type").and_then(Value::as_str).unwrap_or(""),
        ),
        source_name: item
            .get("source_name")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("Unknown source")
            .to_string(),
        published_year: item
            .get("published_year")
            .and_then(Value::as_i64)
            .and_then(|y| i32::try_from(y).ok())
            .unwrap_or_else(|| chrono::Utc::now().year()),
        url: item
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(str::to_string),
        sector: query.sector.clone(),
        geography: query.geography.clone(),
        investors,
        content: normalize_content(
            item.get("content").and_then(Value::as_str).unwrap_or(""),
            cap,
        ),
        usage_tags: normalize_tags(usage_tags, defaults::GENERATIVE_USAGE_TAG),
        title,
    }
}

/// Strip stray markdown fences (```json ... ``` or plain ``` ... ```).
fn strip_fences(raw: &str) -> &str {
    let s = raw.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query() -> RetrievalQuery {
        RetrievalQuery {
            sector: "Fintech".into(),
            geography: "India".into(),
            funding_stage: "Seed".into(),
            startup_description: None,
        }
    }

    #[test]
    fn strips_json_fences_before_parsing() {
        let raw = "```json\n[{\"title\": \"A\", \"source_name\": \"X\", \"published_year\": 2025, \"content\": \"c\"}]\n```";
        let units = parse_evidence_payload(raw, &query(), 2000);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].title, "A");
        assert_eq!(units[0].published_year, 2025);
    }

    #[test]
    fn strips_bare_fences_too() {
        let raw = "```\n[]\n```";
        assert!(parse_evidence_payload(raw, &query(), 2000).is_empty());
    }

    #[test]
    fn non_list_payload_is_zero_results() {
        assert!(parse_evidence_payload("{\"oops\": 1}", &query(), 2000).is_empty());
        assert!(parse_evidence_payload("not json", &query(), 2000).is_empty());
    }

    #[test]
    fn malformed_item_degrades_to_defaults() {
        let raw = r#"[
            {"title": "Good", "source_name": "S", "published_year": 2025,
             "source_type": "policy", "investors": ["Accel"], "content": "c",
             "usage_tags": ["regulation"], "url": "https://x"},
            {"published_year": "not a number", "investors": "not a list"}
        ]"#;
        let units = parse_evidence_payload(raw, &query(), 2000);
        assert_eq!(units.len(), 2);

        assert_eq!(units[0].source_type, SourceType::Policy);
        assert_eq!(units[0].investors, vec!["Accel"]);
        assert_eq!(units[0].url.as_deref(), Some("https://x"));

        let bad = &units[1];
        assert_eq!(bad.title, "Untitled evidence");
        assert_eq!(bad.source_name, "Unknown source");
        assert_eq!(bad.published_year, chrono::Utc::now().year());
        assert!(bad.investors.is_empty());
        assert_eq!(bad.usage_tags, vec![defaults::GENERATIVE_USAGE_TAG]);
        assert_eq!(bad.sector, "Fintech");
        assert_eq!(bad.geography, "India");
    }

    #[test]
    fn ids_are_stable_per_title_and_position() {
        let raw = r#"[{"title": "A"}, {"title": "B"}]"#;
        let first = parse_evidence_payload(raw, &query(), 2000);
        let second = parse_evidence_payload(raw, &query(), 2000);
        assert_eq!(first[0].id, second[0].id);
        assert_ne!(first[0].id, first[1].id);
    }

    #[tokio::test]
    async fn missing_api_key_yields_empty_without_network() {
        let client = GenerativeSearchClient::new(None, 2000);
        let units = client.search(&query()).await.expect("search");
        assert!(units.is_empty());
    }
}
