//! # Score Blender
//! Pure, testable logic that turns heterogeneous partial results (evidence
//! volume, claim-support ratio, per-investor fit scores) into one stable
//! overall score. No I/O.
//!
//! Clamping order matters: per-investor clamp, then average, then blend,
//! then final clamp, so a single extreme outlier can never push the blended
//! score outside the sanctioned range even transiently.

use serde::{Deserialize, Serialize};

use crate::report::InvestorCandidate;

pub const INVESTOR_SCORE_MIN: i32 = 5;
pub const INVESTOR_SCORE_MAX: i32 = 98;
pub const OVERALL_SCORE_MIN: i32 = 5;
pub const OVERALL_SCORE_MAX: i32 = 99;

/// Neutral fit score used when no investor signal exists at all.
pub const NEUTRAL_INVESTOR_SCORE: i32 = 50;

/// Baseline credibility floor when the evidence set is empty.
const NO_EVIDENCE_FLOOR: f64 = 30.0;
/// Evidence count at which the evidence score saturates at 100.
const EVIDENCE_SATURATION: f64 = 7.0;

const WEIGHT_INVESTORS: f64 = 0.45;
const WEIGHT_REASONING: f64 = 0.45;
const WEIGHT_EVIDENCE: f64 = 0.10;

/// One ranked investor match in the final response. Created once per report,
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorMatch {
    pub name: String,
    pub fit_score: i32,
    pub logo_initials: String,
    pub focus_areas: Vec<String>,
    pub reasons: Vec<String>,
}

/// Evidence availability score in [0,100]. Zero evidence still yields a
/// fixed floor rather than zero.
pub fn evidence_score(evidence_count: usize) -> f64 {
    if evidence_count == 0 {
        NO_EVIDENCE_FLOOR
    } else {
        (evidence_count as f64 / EVIDENCE_SATURATION * 100.0).min(100.0)
    }
}

/// Clamp a raw (externally supplied) fit score into [5, 98].
/// Non-finite values degrade to the neutral score first.
pub fn clamp_investor_score(raw: f64) -> i32 {
    let raw = if raw.is_finite() {
        raw
    } else {
        NEUTRAL_INVESTOR_SCORE as f64
    };
    (raw.round() as i64)
        .clamp(INVESTOR_SCORE_MIN as i64, INVESTOR_SCORE_MAX as i64) as i32
}

/// Blend the three component scores into the final overall score, clamped
/// to [5, 99]. `support_ratio` is expected in [0,1] and is sanitized here.
pub fn blend_overall_score(
    evidence_count: usize,
    support_ratio: f64,
    investor_scores: &[i32],
) -> i32 {
    let avg_investor = if investor_scores.is_empty() {
        NEUTRAL_INVESTOR_SCORE as f64
    } else {
        investor_scores.iter().map(|&s| s as f64).sum::<f64>() / investor_scores.len() as f64
    };

    let ratio = if support_ratio.is_finite() {
        support_ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let reasoning = ratio * 100.0;
    let evidence = evidence_score(evidence_count);

    let blended =
        avg_investor * WEIGHT_INVESTORS + reasoning * WEIGHT_REASONING + evidence * WEIGHT_EVIDENCE;

    (blended.round() as i64).clamp(OVERALL_SCORE_MIN as i64, OVERALL_SCORE_MAX as i64) as i32
}

/// Derive uppercase logo initials from an investor name (at most 3 chars).
pub fn logo_initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|w| w.chars().next())
        .take(3)
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Sanitize raw report candidates into final matches, clamping each score
/// before it can contribute to any average. When no candidates exist, a
/// single generic placeholder keeps the investor list non-empty.
pub fn build_matches(candidates: &[InvestorCandidate], sector: &str) -> Vec<InvestorMatch> {
    if candidates.is_empty() {
        return vec![placeholder_match(sector)];
    }

    candidates
        .iter()
        .map(|c| {
            let name = if c.name.trim().is_empty() {
                "Unknown Investor".to_string()
            } else {
                c.name.trim().to_string()
            };
            let focus_areas = if c.focus_areas.is_empty() {
                vec![sector.to_string()]
            } else {
                c.focus_areas.clone()
            };
            let reasons = if c.reasons.is_empty() {
                vec![format!(
                    "Strong alignment with startup's mission in {sector}."
                )]
            } else {
                c.reasons.clone()
            };
            InvestorMatch {
                logo_initials: logo_initials(&name),
                fit_score: clamp_investor_score(c.fit_score),
                name,
                focus_areas,
                reasons,
            }
        })
        .collect()
}

fn placeholder_match(sector: &str) -> InvestorMatch {
    InvestorMatch {
        name: "General VC".to_string(),
        fit_score: NEUTRAL_INVESTOR_SCORE,
        logo_initials: "GV".to_string(),
        focus_areas: vec![sector.to_string()],
        reasons: vec!["No specific investor matches found in current evidence.".to_string()],
    }
}
