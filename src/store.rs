//! Append-only analysis record store.
//!
//! The whole collection lives in one JSON file: fully loaded at startup,
//! fully rewritten on each append through an atomic temp-file rename. A
//! single writer lock serializes load-append-persist so concurrent requests
//! cannot lose updates. Records are never mutated or deleted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::evidence::SourceType;
use crate::score::InvestorMatch;

/// UI projection of one evidence unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSummary {
    pub source_type: SourceType,
    pub title: String,
    pub source_name: String,
    pub year: String,
    pub url: Option<String>,
    pub usage_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub language: String,
    pub engine_version: String,
    pub evidence_count: usize,
    pub sector: String,
    pub stage: String,
    pub geography: String,
    pub raw_support_ratio: f64,
}

/// The persisted unit: one complete analysis response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub analysis_id: String,
    pub user_id: Option<String>,
    pub startup_summary: String,
    pub confidence_indicator: String,
    pub overall_score: i32,
    pub recommended_investors: Vec<InvestorMatch>,
    pub why_fits: Vec<String>,
    pub why_does_not_fit: Vec<String>,
    pub evidence_used: Vec<EvidenceSummary>,
    pub created_at: String,
    pub metadata: AnalysisMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_analyses: usize,
    pub total_investors: usize,
    pub total_evidence: usize,
    pub avg_score: String,
}

pub struct AnalysisStore {
    path: PathBuf,
    records: Mutex<Vec<AnalysisRecord>>,
}

impl AnalysisStore {
    /// Open the store, loading the full collection. A missing file is an
    /// empty store; an unreadable one fails loudly rather than silently
    /// shadowing persisted history.
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("corrupt analysis store {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).context(format!("cannot read analysis store {}", path.display()))
            }
        };
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Append one record and persist the full collection atomically.
    pub fn append(&self, record: AnalysisRecord) -> anyhow::Result<()> {
        let mut records = self.records.lock().expect("store mutex poisoned");
        records.push(record);
        persist(&self.path, &records)
    }

    pub fn all(&self, user_id: Option<&str>) -> Vec<AnalysisRecord> {
        let records = self.records.lock().expect("store mutex poisoned");
        match user_id {
            None => records.clone(),
            Some(uid) => records
                .iter()
                .filter(|r| r.user_id.as_deref() == Some(uid))
                .cloned()
                .collect(),
        }
    }

    pub fn by_id(&self, analysis_id: &str, user_id: Option<&str>) -> Option<AnalysisRecord> {
        let records = self.records.lock().expect("store mutex poisoned");
        let found = records.iter().find(|r| r.analysis_id == analysis_id)?;
        if let Some(uid) = user_id {
            if found.user_id.as_deref() != Some(uid) {
                return None;
            }
        }
        Some(found.clone())
    }

    pub fn stats(&self, user_id: Option<&str>) -> StoreStats {
        let records = self.all(user_id);
        let total = records.len();
        if total == 0 {
            return StoreStats {
                total_analyses: 0,
                total_investors: 0,
                total_evidence: 0,
                avg_score: "0%".to_string(),
            };
        }

        let total_investors = records.iter().map(|r| r.recommended_investors.len()).sum();
        let total_evidence = records.iter().map(|r| r.evidence_used.len()).sum();
        let avg = records.iter().map(|r| r.overall_score as f64).sum::<f64>() / total as f64;

        StoreStats {
            total_analyses: total,
            total_investors,
            total_evidence,
            avg_score: format!("{}%", avg as i64),
        }
    }

    /// Union of all persisted evidence summaries, deduplicated by title
    /// (first occurrence wins).
    pub fn evidence(&self, user_id: Option<&str>) -> Vec<EvidenceSummary> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for record in self.all(user_id) {
            for ev in record.evidence_used {
                if seen.insert(ev.title.clone()) {
                    out.push(ev);
                }
            }
        }
        out
    }
}

fn persist(path: &Path, records: &[AnalysisRecord]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(records)?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, user: Option<&str>, score: i32) -> AnalysisRecord {
        AnalysisRecord {
            analysis_id: id.to_string(),
            user_id: user.map(str::to_string),
            startup_summary: "summary".into(),
            confidence_indicator: "High".into(),
            overall_score: score,
            recommended_investors: vec![InvestorMatch {
                name: "Accel".into(),
                fit_score: 80,
                logo_initials: "A".into(),
                focus_areas: vec!["Fintech".into()],
                reasons: vec!["r".into()],
            }],
            why_fits: vec!["fits".into()],
            why_does_not_fit: vec!["risk".into()],
            evidence_used: vec![EvidenceSummary {
                source_type: SourceType::News,
                title: format!("title {id}"),
                source_name: "S".into(),
                year: "2025".into(),
                url: None,
                usage_reason: "funding-trends".into(),
            }],
            created_at: "2025-01-01T00:00:00Z".into(),
            metadata: AnalysisMetadata {
                language: "en".into(),
                engine_version: "0.1.0".into(),
                evidence_count: 1,
                sector: "Fintech".into(),
                stage: "Seed".into(),
                geography: "India".into(),
                raw_support_ratio: 0.75,
            },
        }
    }

    #[test]
    fn append_then_reload_round_trips_exactly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("analyses.json");

        let a = record("a", Some("u1"), 60);
        let b = record("b", Some("u2"), 80);
        {
            let store = AnalysisStore::open(&path).expect("open");
            store.append(a.clone()).expect("append a");
            store.append(b.clone()).expect("append b");
        }

        let reloaded = AnalysisStore::open(&path).expect("reopen");
        // Byte-identical structured fields: same records, same order.
        assert_eq!(reloaded.all(None), vec![a, b]);
    }

    #[test]
    fn user_filter_applies_to_reads() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AnalysisStore::open(dir.path().join("s.json")).expect("open");
        store.append(record("a", Some("u1"), 60)).expect("append");
        store.append(record("b", Some("u2"), 80)).expect("append");

        assert_eq!(store.all(Some("u1")).len(), 1);
        assert_eq!(store.all(None).len(), 2);
        assert!(store.by_id("a", Some("u1")).is_some());
        assert!(store.by_id("a", Some("u2")).is_none());
        assert!(store.by_id("a", None).is_some());
        assert!(store.by_id("nope", None).is_none());
    }

    #[test]
    fn stats_aggregate_scores_and_counts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AnalysisStore::open(dir.path().join("s.json")).expect("open");
        assert_eq!(store.stats(None).avg_score, "0%");

        store.append(record("a", None, 60)).expect("append");
        store.append(record("b", None, 81)).expect("append");

        let stats = store.stats(None);
        assert_eq!(stats.total_analyses, 2);
        assert_eq!(stats.total_investors, 2);
        assert_eq!(stats.total_evidence, 2);
        assert_eq!(stats.avg_score, "70%");
    }

    #[test]
    fn evidence_union_dedups_by_title() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = AnalysisStore::open(dir.path().join("s.json")).expect("open");

        let mut a = record("a", None, 60);
        let mut b = record("b", None, 70);
        b.evidence_used = a.evidence_used.clone();
        a.evidence_used.push(EvidenceSummary {
            source_type: SourceType::Policy,
            title: "unique".into(),
            source_name: "S".into(),
            year: "2024".into(),
            url: None,
            usage_reason: "regulation".into(),
        });
        store.append(a).expect("append");
        store.append(b).expect("append");

        let evidence = store.evidence(None);
        assert_eq!(evidence.len(), 2);
    }

    #[test]
    fn corrupt_store_fails_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("s.json");
        std::fs::write(&path, "[{broken").expect("write");
        assert!(AnalysisStore::open(&path).is_err());
    }
}
