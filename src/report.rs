//! Report generation: turns validated claims and evidence into narrative
//! prose plus raw investor candidates via an external Gemini call.
//!
//! The external call is allowed to be unavailable; a deterministic templated
//! fallback keyed by language code always produces the full key set so
//! downstream blending never sees missing fields.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::evidence::EvidenceUnit;
use crate::validate::ValidationOutcome;

const GENERATE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Raw investor candidate as returned by the generation collaborator.
/// Scores are untrusted here; clamping happens in the score blender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorCandidate {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_fit_score")]
    pub fit_score: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

fn default_fit_score() -> f64 {
    75.0
}

/// Structured report content. Every field is always populated, including by
/// the fallback path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportContent {
    pub executive_summary: String,
    pub why_this_fits: Vec<String>,
    pub why_this_does_not_fit: Vec<String>,
    pub recommended_investors: Vec<InvestorCandidate>,
    pub confidence_explanation: String,
}

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    async fn generate(
        &self,
        validation: &ValidationOutcome,
        evidence: &[EvidenceUnit],
        language: &str,
    ) -> Result<ReportContent>;
}

pub struct GeminiReportGenerator {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiReportGenerator {
    pub fn new(api_key: Option<String>) -> Self {
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
        }
    }

    async fn call_remote(
        &self,
        api_key: &str,
        validation: &ValidationOutcome,
        evidence: &[EvidenceUnit],
        language: &str,
    ) -> Result<ReportContent> {
        let system_prompt = format!(
            "You are a Senior Venture Capital Analyst. Explain a funding analysis based ONLY on \
             the validated claims and evidence provided.\n\
             CRITICAL CONSTRAINTS:\n\
             1. Your why_this_fits / why_this_does_not_fit bullets MUST cite specific data from \
             the evidence (investor names, policy names, amounts, dates).\n\
             2. Recommend the BEST 3-5 investors that fit this startup.\n\
             3. For each investor provide name, fit_score (int 0-100), reasons, focus_areas.\n\
             4. The output must be in {language}.\n\
             5. Respond with a single valid JSON object with keys: executive_summary, \
             why_this_fits, why_this_does_not_fit, recommended_investors, confidence_explanation."
        );

        let input = serde_json::json!({
            "supported_claims": validation.supported_claims,
            "rejected_claims": validation.rejected_claims,
            "confidence_level": validation.confidence_level,
            "evidence": evidence,
        });

        let req = serde_json::json!({
            "contents": [{ "parts": [{ "text": format!("{system_prompt}\n\nData to analyze: {input}") }] }],
            "generationConfig": { "responseMimeType": "application/json" },
        });

        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Content,
        }
        #[derive(Deserialize)]
        struct Content {
            #[serde(default)]
            parts: Vec<Part>,
        }
        #[derive(Deserialize)]
        struct Part {
            #[serde(default)]
            text: String,
        }

        let resp = self
            .http
            .post(format!(
                "{GENERATE_URL}/{}:generateContent?key={api_key}",
                self.model
            ))
            .json(&req)
            .send()
            .await?
            .error_for_status()?;

        let body: Resp = resp.json().await?;
        let text = body
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .unwrap_or("");

        Ok(serde_json::from_str(text)?)
    }
}

#[async_trait]
impl ReportGenerator for GeminiReportGenerator {
    async fn generate(
        &self,
        validation: &ValidationOutcome,
        evidence: &[EvidenceUnit],
        language: &str,
    ) -> Result<ReportContent> {
        let Some(api_key) = &self.api_key else {
            return Ok(fallback_report(validation, language));
        };
        match self.call_remote(api_key, validation, evidence, language).await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::warn!(error = ?e, "report generation failed, using templated fallback");
                Ok(fallback_report(validation, language))
            }
        }
    }
}

/// Deterministic templated fallback. Keyed by language code with `en` as the
/// base language; always yields every key and exactly one placeholder
/// investor when no reasoning-derived investors exist.
pub fn fallback_report(validation: &ValidationOutcome, language: &str) -> ReportContent {
    let (summary, gap_prefix, explanation_prefix, reason, focus) = match language {
        "hi" => (
            "बाजार, नियामक और वित्तीय मापदंडों में प्रारंभिक विश्लेषण किया गया।",
            "इसके लिए अपर्याप्त साक्ष्य",
            "प्रत्यक्ष साक्ष्य मिलान के आधार पर रिपोर्ट तैयार की गई।",
            "रणनीतिक मिलान",
            "Technology",
        ),
        _ => (
            "Initial analysis performed across market, regulatory, and financial parameters.",
            "Insufficient evidence for",
            "Report generated based on direct evidence matches.",
            "Strategic match",
            "Technology",
        ),
    };

    let why_this_does_not_fit = if validation.rejected_claims.is_empty() {
        vec![format!("{gap_prefix}: broader market benchmarks.")]
    } else {
        validation
            .rejected_claims
            .iter()
            .map(|c| format!("{gap_prefix}: {c}"))
            .collect()
    };

    let why_this_fits = if validation.supported_claims.is_empty() {
        vec![summary.to_string()]
    } else {
        validation.supported_claims.clone()
    };

    ReportContent {
        executive_summary: summary.to_string(),
        why_this_fits,
        why_this_does_not_fit,
        recommended_investors: vec![InvestorCandidate {
            name: "General VC Fund".to_string(),
            fit_score: 70.0,
            reasons: vec![reason.to_string()],
            focus_areas: vec![focus.to_string()],
        }],
        confidence_explanation: format!(
            "{explanation_prefix} (Confidence: {})",
            validation.confidence_level
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validation() -> ValidationOutcome {
        ValidationOutcome {
            support_ratio: 0.8,
            confidence_level: "High".into(),
            supported_claims: vec!["Market is active.".into()],
            rejected_claims: vec!["Policy tailwind exists.".into()],
        }
    }

    #[test]
    fn fallback_produces_all_fields_and_placeholder_investor() {
        for lang in ["en", "hi", "xx"] {
            let r = fallback_report(&validation(), lang);
            assert!(!r.executive_summary.is_empty(), "lang {lang}");
            assert!(!r.why_this_fits.is_empty());
            assert!(!r.why_this_does_not_fit.is_empty());
            assert!(!r.confidence_explanation.is_empty());
            assert_eq!(r.recommended_investors.len(), 1);
            assert_eq!(r.recommended_investors[0].fit_score, 70.0);
        }
    }

    #[test]
    fn unknown_language_falls_back_to_base_language() {
        let base = fallback_report(&validation(), "en");
        let unknown = fallback_report(&validation(), "fr");
        assert_eq!(base.executive_summary, unknown.executive_summary);
    }

    #[test]
    fn fallback_is_non_empty_even_with_empty_claim_lists() {
        let v = ValidationOutcome {
            support_ratio: 0.0,
            confidence_level: "Low".into(),
            supported_claims: vec![],
            rejected_claims: vec![],
        };
        let r = fallback_report(&v, "en");
        assert!(!r.why_this_fits.is_empty());
        assert!(!r.why_this_does_not_fit.is_empty());
    }

    #[tokio::test]
    async fn generator_without_key_uses_fallback() {
        let gen = GeminiReportGenerator::new(None);
        let r = gen
            .generate(&validation(), &[], "en")
            .await
            .expect("generate");
        assert_eq!(r.recommended_investors[0].name, "General VC Fund");
        assert!(r.confidence_explanation.contains("High"));
    }

    #[test]
    fn candidate_deserialization_fills_defaults() {
        let c: InvestorCandidate = serde_json::from_str(r#"{"name": "Accel"}"#).expect("parse");
        assert_eq!(c.fit_score, 75.0);
        assert!(c.reasons.is_empty());
    }
}
