// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod evidence;
pub mod metrics;
pub mod orchestrator;
pub mod report;
pub mod retrieve;
pub mod score;
pub mod store;
pub mod validate;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::evidence::{EvidenceUnit, RetrievalQuery, SourceType};
pub use crate::orchestrator::{AnalysisRequest, Orchestrator};
pub use crate::store::{AnalysisRecord, AnalysisStore};
