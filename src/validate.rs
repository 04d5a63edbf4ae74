//! Claim validation: decides which funding-fit claims the gathered evidence
//! supports. Consumed downstream only through its support ratio and
//! confidence label, so the heuristic here stays deliberately simple and
//! fully deterministic.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::evidence::{EvidenceUnit, RetrievalQuery, SourceType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// Fraction of analyzed claims judged supported, in [0,1].
    pub support_ratio: f64,
    /// Categorical label summarizing how much evidence backed the analysis.
    pub confidence_level: String,
    pub supported_claims: Vec<String>,
    pub rejected_claims: Vec<String>,
}

#[async_trait]
pub trait ClaimValidator: Send + Sync {
    async fn validate(
        &self,
        evidence: &[EvidenceUnit],
        query: &RetrievalQuery,
    ) -> Result<ValidationOutcome>;
}

/// Deterministic evidence-driven validator: derives four candidate claims
/// from the query and checks each against the evidence set.
pub struct HeuristicValidator;

#[async_trait]
impl ClaimValidator for HeuristicValidator {
    async fn validate(
        &self,
        evidence: &[EvidenceUnit],
        query: &RetrievalQuery,
    ) -> Result<ValidationOutcome> {
        let claims: [(String, bool); 4] = [
            (
                format!(
                    "There is recent market activity in {} relevant to the {} market.",
                    query.sector, query.geography
                ),
                evidence
                    .iter()
                    .any(|e| e.source_type == SourceType::News || has_tag(e, "market-sizing")),
            ),
            (
                format!(
                    "Active investors are deploying capital into {} models.",
                    query.sector
                ),
                evidence
                    .iter()
                    .any(|e| !e.investors.is_empty() || has_tag(e, "investor-sentiment")),
            ),
            (
                format!(
                    "Policy or regulatory conditions in {} favor this model.",
                    query.geography
                ),
                evidence.iter().any(|e| {
                    e.source_type == SourceType::Policy
                        || has_tag(e, "regulation")
                        || has_tag(e, "policy-impact")
                }),
            ),
            (
                format!(
                    "Funding activity matches the {} stage.",
                    query.funding_stage
                ),
                evidence
                    .iter()
                    .any(|e| has_tag(e, "funding-trends") || has_tag(e, "valuation")),
            ),
        ];

        let mut supported = Vec::new();
        let mut rejected = Vec::new();
        for (claim, holds) in claims {
            if holds {
                supported.push(claim);
            } else {
                rejected.push(claim);
            }
        }

        let total = supported.len() + rejected.len();
        let support_ratio = supported.len() as f64 / total as f64;
        let confidence_level = confidence_label(support_ratio, evidence.len());

        tracing::info!(
            support_ratio,
            confidence = %confidence_level,
            evidence_count = evidence.len(),
            "claim validation complete"
        );

        Ok(ValidationOutcome {
            support_ratio,
            confidence_level,
            supported_claims: supported,
            rejected_claims: rejected,
        })
    }
}

fn has_tag(e: &EvidenceUnit, tag: &str) -> bool {
    e.usage_tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

fn confidence_label(support_ratio: f64, evidence_count: usize) -> String {
    if support_ratio >= 0.75 && evidence_count >= 5 {
        "High".to_string()
    } else if support_ratio >= 0.4 {
        "Medium".to_string()
    } else {
        "Low".to_string()
    }
}
