//! Funding-Fit Analyzer — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the retrieval cascade, collaborators,
//! record store, and metrics exporter.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use funding_fit_analyzer::api::{self, AppState};
use funding_fit_analyzer::config::AppConfig;
use funding_fit_analyzer::metrics::Metrics;
use funding_fit_analyzer::orchestrator::Orchestrator;
use funding_fit_analyzer::report::GeminiReportGenerator;
use funding_fit_analyzer::retrieve::generative::GenerativeSearchClient;
use funding_fit_analyzer::retrieve::local_scan::DocumentScanner;
use funding_fit_analyzer::retrieve::similarity::SimilarityStore;
use funding_fit_analyzer::retrieve::{EvidenceAggregator, EvidenceSource, SimilaritySource};
use funding_fit_analyzer::store::AnalysisStore;
use funding_fit_analyzer::validate::HeuristicValidator;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - ANALYZER_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("ANALYZER_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("funding_fit_analyzer=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    enable_dev_tracing();

    let config = AppConfig::load();
    let metrics = Metrics::init(config.max_evidence);
    let api_key = AppConfig::api_key();

    // A failed index construction disables the similarity stage for the
    // remainder of the process instead of retrying per call.
    let similarity = match SimilarityStore::open(&config.index_path, api_key.clone()) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(error = ?e, "similarity store unavailable, running without it");
            None
        }
    };

    let generative: Arc<dyn EvidenceSource> = Arc::new(GenerativeSearchClient::new(
        api_key.clone(),
        config.content_cap,
    ));
    let scanner: Arc<dyn EvidenceSource> =
        Arc::new(DocumentScanner::new(&config.corpus_root, config.content_cap));
    let similarity_source: Option<Arc<dyn EvidenceSource>> = similarity.clone().map(|store| {
        Arc::new(SimilaritySource {
            store,
            n_results: config.similarity_results,
        }) as Arc<dyn EvidenceSource>
    });

    let aggregator = EvidenceAggregator::new(&config, generative, similarity_source, scanner);

    let store = Arc::new(
        AnalysisStore::open(&config.store_path).expect("Failed to open analysis record store"),
    );
    let orchestrator = Arc::new(Orchestrator::new(
        aggregator,
        Arc::new(HeuristicValidator),
        Arc::new(GeminiReportGenerator::new(api_key)),
        similarity,
    ));

    let router = api::router(AppState {
        orchestrator,
        store,
    })
    .merge(metrics.router());

    Ok(router.into())
}
