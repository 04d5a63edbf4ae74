//! Evidence aggregation: a cascading, partial-failure-tolerant pipeline
//! blending three sources into one capped evidence set.
//!
//! Stages run strictly in order, each gated by a running-count threshold on
//! the evidence accumulated so far: the generative search always runs, the
//! similarity store only while fewer than 5 units exist, the local scan only
//! while fewer than 3. The thresholds are deliberately asymmetric so one
//! strong generative result set short-circuits both fallbacks while a weak
//! or failed primary source triggers them all. A failing stage yields zero
//! units; the remaining stages still run.

pub mod generative;
pub mod local_scan;
pub mod similarity;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;

use crate::config::AppConfig;
use crate::evidence::{EvidenceUnit, RetrievalQuery};
use generative::GenerativeSearchClient;
use local_scan::DocumentScanner;
use similarity::SimilarityStore;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "retrieval_units_total",
            "Evidence units fetched, labeled by stage."
        );
        describe_counter!(
            "retrieval_stage_failures_total",
            "Stages that failed and yielded zero units."
        );
        describe_counter!(
            "retrieval_stage_skipped_total",
            "Stages skipped because their entry threshold was already met."
        );
        describe_gauge!(
            "retrieval_last_run_ts",
            "Unix ts of the last aggregation run."
        );
    });
}

/// One retrieval source behind the aggregator. All three built-in sources
/// (generative, similarity, local scan) implement this.
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn fetch(&self, query: &RetrievalQuery) -> Result<Vec<EvidenceUnit>>;
    fn name(&self) -> &'static str;
}

#[async_trait]
impl EvidenceSource for GenerativeSearchClient {
    async fn fetch(&self, query: &RetrievalQuery) -> Result<Vec<EvidenceUnit>> {
        self.search(query).await
    }
    fn name(&self) -> &'static str {
        "generative"
    }
}

/// Similarity store viewed as an evidence source for a fixed result count.
pub struct SimilaritySource {
    pub store: Arc<SimilarityStore>,
    pub n_results: usize,
}

#[async_trait]
impl EvidenceSource for SimilaritySource {
    async fn fetch(&self, query: &RetrievalQuery) -> Result<Vec<EvidenceUnit>> {
        self.store
            .query_evidence(&query.query_text(), self.n_results)
            .await
    }
    fn name(&self) -> &'static str {
        "similarity"
    }
}

#[async_trait]
impl EvidenceSource for DocumentScanner {
    async fn fetch(&self, query: &RetrievalQuery) -> Result<Vec<EvidenceUnit>> {
        Ok(self.scan(&query.sector, &query.geography))
    }
    fn name(&self) -> &'static str {
        "local-scan"
    }
}

/// Ordered stage descriptor: run `source` only while the accumulated
/// evidence count is below `threshold` (`None` = always run).
struct StageSpec {
    threshold: Option<usize>,
    source: Arc<dyn EvidenceSource>,
}

/// Per-stage result, kept for observability. Expected degradation is data,
/// not control flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Fetched(usize),
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct StageReport {
    pub source: &'static str,
    pub outcome: StageOutcome,
}

/// Aggregation output: ordered evidence (source-priority then insertion
/// order), capped, possibly empty, possibly containing title near-duplicates
/// across sources. Title dedup happens downstream in response assembly.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub units: Vec<EvidenceUnit>,
    pub stages: Vec<StageReport>,
}

pub struct EvidenceAggregator {
    stages: Vec<StageSpec>,
    max_evidence: usize,
}

impl EvidenceAggregator {
    /// Wire the standard three-stage cascade. A disabled similarity store
    /// (construction failed) simply leaves that stage out.
    pub fn new(
        config: &AppConfig,
        generative: Arc<dyn EvidenceSource>,
        similarity: Option<Arc<dyn EvidenceSource>>,
        local: Arc<dyn EvidenceSource>,
    ) -> Self {
        let mut stages = vec![StageSpec {
            threshold: None,
            source: generative,
        }];
        match similarity {
            Some(source) => stages.push(StageSpec {
                threshold: Some(config.similarity_threshold),
                source,
            }),
            None => {
                tracing::warn!("similarity store disabled for this process");
            }
        }
        stages.push(StageSpec {
            threshold: Some(config.local_scan_threshold),
            source: local,
        });

        Self {
            stages,
            max_evidence: config.max_evidence,
        }
    }

    pub async fn aggregate(&self, query: &RetrievalQuery) -> Aggregation {
        ensure_metrics_described();

        let mut units: Vec<EvidenceUnit> = Vec::new();
        let mut reports = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let name = stage.source.name();

            if let Some(threshold) = stage.threshold {
                if units.len() >= threshold {
                    counter!("retrieval_stage_skipped_total", "stage" => name).increment(1);
                    reports.push(StageReport {
                        source: name,
                        outcome: StageOutcome::Skipped,
                    });
                    continue;
                }
            }

            match stage.source.fetch(query).await {
                Ok(mut fetched) => {
                    let n = fetched.len();
                    tracing::info!(stage = name, fetched = n, "retrieval stage complete");
                    counter!("retrieval_units_total", "stage" => name).increment(n as u64);
                    units.append(&mut fetched);
                    reports.push(StageReport {
                        source: name,
                        outcome: StageOutcome::Fetched(n),
                    });
                }
                Err(e) => {
                    tracing::warn!(stage = name, error = ?e, "retrieval stage failed, continuing");
                    counter!("retrieval_stage_failures_total", "stage" => name).increment(1);
                    reports.push(StageReport {
                        source: name,
                        outcome: StageOutcome::Failed(e.to_string()),
                    });
                }
            }
        }

        units.truncate(self.max_evidence);
        gauge!("retrieval_last_run_ts").set(chrono::Utc::now().timestamp().max(0) as f64);

        Aggregation {
            units,
            stages: reports,
        }
    }
}
