//! Analysis orchestrator: Aggregator → Validation → Report generation →
//! Score blend → response assembly.
//!
//! This is the one place where failure is NOT absorbed: an error anywhere in
//! the sequence propagates as a single analysis failure and nothing partial
//! is persisted, because an incomplete analysis would be misleading to
//! present as a result.

use std::sync::Arc;

use anyhow::Result;
use metrics::counter;
use serde::Deserialize;

use crate::evidence::{EvidenceUnit, RetrievalQuery};
use crate::report::ReportGenerator;
use crate::retrieve::{similarity::SimilarityStore, EvidenceAggregator, StageOutcome};
use crate::score;
use crate::store::{AnalysisMetadata, AnalysisRecord, EvidenceSummary};
use crate::validate::ClaimValidator;

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisRequest {
    pub sector: String,
    pub geography: String,
    pub funding_stage: String,
    #[serde(default)]
    pub startup_description: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

pub struct Orchestrator {
    aggregator: EvidenceAggregator,
    validator: Arc<dyn ClaimValidator>,
    generator: Arc<dyn ReportGenerator>,
    /// Cache-warm target; `None` when the store failed to construct.
    similarity: Option<Arc<SimilarityStore>>,
}

impl Orchestrator {
    pub fn new(
        aggregator: EvidenceAggregator,
        validator: Arc<dyn ClaimValidator>,
        generator: Arc<dyn ReportGenerator>,
        similarity: Option<Arc<SimilarityStore>>,
    ) -> Self {
        Self {
            aggregator,
            validator,
            generator,
            similarity,
        }
    }

    pub async fn run(&self, request: AnalysisRequest) -> Result<AnalysisRecord> {
        let query = RetrievalQuery {
            sector: request.sector.clone(),
            geography: request.geography.clone(),
            funding_stage: request.funding_stage.clone(),
            startup_description: request.startup_description.clone(),
        };

        // 1. Retrieval (internally degradation-tolerant, never fails).
        let aggregation = self.aggregator.aggregate(&query).await;
        tracing::info!(
            evidence_count = aggregation.units.len(),
            stages = ?aggregation.stages.iter().map(|s| (s.source, format!("{:?}", s.outcome))).collect::<Vec<_>>(),
            "retrieval complete"
        );

        // Best-effort cache warm with fresh generative evidence.
        self.warm_similarity_cache(&aggregation.units, &aggregation.stages)
            .await;

        // 2. Validation (failure propagates).
        let validation = self.validator.validate(&aggregation.units, &query).await?;

        // 3. Report generation (degrades internally; errors propagate).
        let report = self
            .generator
            .generate(&validation, &aggregation.units, &request.language)
            .await?;

        // 4. Score blend + response assembly.
        let investors = score::build_matches(&report.recommended_investors, &request.sector);
        let investor_scores: Vec<i32> = investors.iter().map(|m| m.fit_score).collect();
        let overall_score = score::blend_overall_score(
            aggregation.units.len(),
            validation.support_ratio,
            &investor_scores,
        );

        counter!("analyses_total").increment(1);

        Ok(AnalysisRecord {
            analysis_id: uuid::Uuid::new_v4().to_string(),
            user_id: request.user_id,
            startup_summary: report.executive_summary,
            confidence_indicator: validation.confidence_level,
            overall_score,
            recommended_investors: investors,
            why_fits: report.why_this_fits,
            why_does_not_fit: report.why_this_does_not_fit,
            evidence_used: summarize_evidence(&aggregation.units),
            created_at: chrono::Utc::now().to_rfc3339(),
            metadata: AnalysisMetadata {
                language: request.language,
                engine_version: env!("CARGO_PKG_VERSION").to_string(),
                evidence_count: aggregation.units.len(),
                sector: request.sector,
                stage: request.funding_stage,
                geography: request.geography,
                raw_support_ratio: validation.support_ratio,
            },
        })
    }

    /// Write freshly fetched generative evidence back into the similarity
    /// index. Best-effort only: failures are logged, never fatal.
    async fn warm_similarity_cache(
        &self,
        units: &[EvidenceUnit],
        stages: &[crate::retrieve::StageReport],
    ) {
        let Some(store) = &self.similarity else { return };
        let generative_fetched = stages
            .iter()
            .any(|s| s.source == "generative" && matches!(s.outcome, StageOutcome::Fetched(n) if n > 0));
        if !generative_fetched {
            return;
        }

        let fresh: Vec<EvidenceUnit> = units
            .iter()
            .filter(|u| u.id.starts_with("ev_gen_"))
            .cloned()
            .collect();
        if fresh.is_empty() {
            return;
        }
        match store.remember(&fresh).await {
            Ok(added) if added > 0 => {
                tracing::info!(added, "similarity cache warmed with generative evidence");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = ?e, "similarity cache warm failed");
            }
        }
    }
}

/// Dedup by title (first occurrence wins) and project to the UI summary.
/// This is deliberately the only place titles are deduplicated; the
/// aggregator's raw output may contain duplicates across sources.
pub fn summarize_evidence(units: &[EvidenceUnit]) -> Vec<EvidenceSummary> {
    let mut seen = std::collections::HashSet::new();
    units
        .iter()
        .filter(|u| seen.insert(u.title.clone()))
        .map(|u| EvidenceSummary {
            source_type: u.source_type,
            title: u.title.clone(),
            source_name: u.source_name.clone(),
            year: u.published_year.to_string(),
            url: u.url.clone(),
            usage_reason: u
                .usage_tags
                .first()
                .cloned()
                .unwrap_or_else(|| "General context".to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::SourceType;

    fn unit(id: &str, title: &str) -> EvidenceUnit {
        EvidenceUnit {
            id: id.to_string(),
            source_type: SourceType::News,
            title: title.to_string(),
            source_name: "S".into(),
            published_year: 2025,
            url: Some("https://x".into()),
            sector: "Fintech".into(),
            geography: "India".into(),
            investors: vec![],
            content: "c".into(),
            usage_tags: vec!["funding-trends".into()],
        }
    }

    #[test]
    fn summaries_dedup_by_title_first_wins() {
        let units = vec![
            unit("a", "Same fact"),
            unit("b", "Same fact"),
            unit("c", "Other fact"),
        ];
        let summaries = summarize_evidence(&units);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].title, "Same fact");
        assert_eq!(summaries[0].usage_reason, "funding-trends");
        assert_eq!(summaries[1].title, "Other fact");
    }

    #[test]
    fn summary_year_is_stringified_and_reason_defaults() {
        let mut u = unit("a", "T");
        u.usage_tags.clear();
        let s = &summarize_evidence(&[u])[0];
        assert_eq!(s.year, "2025");
        assert_eq!(s.usage_reason, "General context");
    }

    #[test]
    fn request_language_defaults_to_en() {
        let req: AnalysisRequest = serde_json::from_str(
            r#"{"sector": "Fintech", "geography": "India", "funding_stage": "Seed"}"#,
        )
        .expect("parse");
        assert_eq!(req.language, "en");
        assert!(req.user_id.is_none());
    }
}
