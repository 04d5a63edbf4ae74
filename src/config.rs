//! Application configuration.
//!
//! Loaded once at startup from `config/app.toml`. Every field is optional;
//! a missing or malformed file falls back to full defaults so the service
//! always boots. The defaults below are the single source of truth for the
//! fallback values used by every parse site (local scan, similarity store,
//! generative search) — do not re-declare them elsewhere.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable carrying the Gemini API key. When absent, the
/// generative search and report generation degrade to their offline paths.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Fallback values shared by all evidence normalization paths.
pub mod defaults {
    pub const PUBLISHED_YEAR: i32 = 2024;
    pub const GEOGRAPHY: &str = "Global";
    pub const SOURCE_NAME: &str = "Proprietary Funding Dataset";
    pub const TITLE: &str = "Market Intelligence Report";
    pub const USAGE_TAG: &str = "proprietary-analysis";
    pub const GENERATIVE_USAGE_TAG: &str = "generative-retrieval";
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the on-disk document corpus (last-resort fallback source).
    pub corpus_root: PathBuf,
    /// Append-only analysis record store.
    pub store_path: PathBuf,
    /// Persistent similarity index.
    pub index_path: PathBuf,
    /// Hard cap on the aggregated evidence set.
    pub max_evidence: usize,
    /// Invoke the similarity store only while accumulated evidence is below this.
    pub similarity_threshold: usize,
    /// Invoke the local scan only while accumulated evidence is below this.
    pub local_scan_threshold: usize,
    /// Nearest-neighbor count requested from the similarity store.
    pub similarity_results: usize,
    /// Evidence content length cap, in characters.
    pub content_cap: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            corpus_root: PathBuf::from("data/raw"),
            store_path: PathBuf::from("data/analyses.json"),
            index_path: PathBuf::from("data/evidence_index.json"),
            max_evidence: 10,
            similarity_threshold: 5,
            local_scan_threshold: 3,
            similarity_results: 5,
            content_cap: 2000,
        }
    }
}

impl AppConfig {
    /// Load from `config/app.toml`, falling back to defaults on any error.
    pub fn load() -> Self {
        Self::load_from(Path::new("config/app.toml"))
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => toml::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %path.display(), "bad config file, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Gemini API key from the environment, if configured.
    pub fn api_key() -> Option<String> {
        std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_when_file_missing() {
        let cfg = AppConfig::load_from(Path::new("definitely/not/here.toml"));
        assert_eq!(cfg.max_evidence, 10);
        assert_eq!(cfg.similarity_threshold, 5);
        assert_eq!(cfg.local_scan_threshold, 3);
        assert_eq!(cfg.content_cap, 2000);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.toml");
        let mut f = fs::File::create(&path).expect("create");
        writeln!(f, "max_evidence = 4").expect("write");

        let cfg = AppConfig::load_from(&path);
        assert_eq!(cfg.max_evidence, 4);
        assert_eq!(cfg.similarity_threshold, 5);
    }

    #[test]
    fn malformed_file_falls_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("app.toml");
        fs::write(&path, "max_evidence = \"ten\"").expect("write");

        let cfg = AppConfig::load_from(&path);
        assert_eq!(cfg.max_evidence, 10);
    }
}
