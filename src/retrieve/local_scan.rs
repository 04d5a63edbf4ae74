//! Local document scanner: last-resort evidence source backed by an
//! on-disk corpus of plain-text documents with TOML front matter.
//!
//! Corpus format: a `+++` marker line, a TOML metadata block, another `+++`
//! line, then the body text. `investors` and `usage_tags` accept either a
//! TOML list or a single comma/semicolon-joined string.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::config::defaults;
use crate::evidence::{
    normalize_content, normalize_tags, year_or_default, EvidenceUnit, SourceType,
};

const FRONT_MATTER_MARKER: &str = "+++";

/// A metadata field that may arrive as one delimited string or as a list;
/// both normalize to a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(s) => s
                .split([',', ';'])
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DocHeader {
    sector: String,
    geography: String,
    source_type: Option<String>,
    title: Option<String>,
    source_name: Option<String>,
    published_year: Option<i64>,
    source_url: Option<String>,
    investors: Option<OneOrMany>,
    usage_tags: Option<OneOrMany>,
}

pub struct DocumentScanner {
    root: PathBuf,
    content_cap: usize,
}

impl DocumentScanner {
    pub fn new(root: impl Into<PathBuf>, content_cap: usize) -> Self {
        Self {
            root: root.into(),
            content_cap,
        }
    }

    /// Scan the corpus for documents matching the sector/geography query.
    ///
    /// Matching is a recall-maximizing OR: any sector token appearing as a
    /// substring of the declared sector, or any geography token appearing as
    /// a substring of the declared geography, keeps the document. One bad
    /// document never aborts the scan; it is logged and skipped.
    pub fn scan(&self, sector: &str, geography: &str) -> Vec<EvidenceUnit> {
        if !self.root.exists() {
            tracing::debug!(root = %self.root.display(), "corpus root missing, local scan yields nothing");
            return Vec::new();
        }

        let sector_tokens = tokenize(sector);
        let geo_tokens = tokenize(geography);

        let mut results = Vec::new();
        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            match self.parse_document(path, &sector_tokens, &geo_tokens, results.len()) {
                Ok(Some(unit)) => results.push(unit),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, path = %path.display(), "skipping malformed corpus document");
                }
            }
        }
        results
    }

    fn parse_document(
        &self,
        path: &Path,
        sector_tokens: &[String],
        geo_tokens: &[String],
        running_count: usize,
    ) -> anyhow::Result<Option<EvidenceUnit>> {
        let raw = std::fs::read_to_string(path)?;
        let Some((meta_raw, body)) = split_front_matter(&raw) else {
            anyhow::bail!("missing front matter block");
        };
        let header: DocHeader = toml::from_str(meta_raw)?;

        if !matches_query(&header.sector, sector_tokens)
            && !matches_query(&header.geography, geo_tokens)
        {
            return Ok(None);
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");

        Ok(Some(EvidenceUnit {
            // Filenames are not unique across directories; the running
            // result count keeps ids unique within one scan.
            id: format!("ev_local_{stem}_{running_count}"),
            source_type: SourceType::parse_lenient(header.source_type.as_deref().unwrap_or("")),
            title: header
                .title
                .unwrap_or_else(|| defaults::TITLE.to_string()),
            source_name: header
                .source_name
                .unwrap_or_else(|| defaults::SOURCE_NAME.to_string()),
            published_year: year_or_default(header.published_year),
            url: header.source_url,
            sector: header.sector,
            geography: header.geography,
            investors: header.investors.map(OneOrMany::into_vec).unwrap_or_default(),
            content: normalize_content(body, self.content_cap),
            usage_tags: normalize_tags(
                header
                    .usage_tags
                    .map(OneOrMany::into_vec)
                    .unwrap_or_default(),
                defaults::USAGE_TAG,
            ),
        }))
    }
}

/// Lowercase word set, splitting on whitespace, `&` and `-`.
fn tokenize(field: &str) -> Vec<String> {
    field
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '&' || c == '-')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Any query token appearing as a substring of the declared field matches.
fn matches_query(declared: &str, tokens: &[String]) -> bool {
    let declared = declared.to_lowercase();
    tokens.iter().any(|t| declared.contains(t.as_str()))
}

fn split_front_matter(raw: &str) -> Option<(&str, &str)> {
    let rest = raw.strip_prefix(FRONT_MATTER_MARKER)?;
    let end = rest.find(FRONT_MATTER_MARKER)?;
    let meta = &rest[..end];
    let body = rest[end + FRONT_MATTER_MARKER.len()..].trim_start();
    Some((meta, body))
}
