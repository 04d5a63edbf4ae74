//! Similarity store adapter: a persistent JSON-backed vector index treated
//! as a best-effort cache, not a source of truth.
//!
//! The embedder is pluggable: a remote Gemini embedding call when an API key
//! is configured, otherwise a deterministic feature-hashing embedding so the
//! store keeps working without credentials. If the index itself cannot be
//! read, construction fails and the caller disables the adapter for the
//! remainder of the process.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::evidence::{EvidenceUnit, SourceType};

const HASHED_EMBEDDING_DIM: usize = 256;
const EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/embedding-001:embedContent";

fn default_year() -> i32 {
    defaults::PUBLISHED_YEAR
}
fn default_geography() -> String {
    defaults::GEOGRAPHY.to_string()
}
fn default_source_name() -> String {
    defaults::SOURCE_NAME.to_string()
}
fn default_source_type() -> SourceType {
    SourceType::Dataset
}

/// One persisted index entry. Missing metadata deserializes to the central
/// defaults rather than failing the whole index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvidence {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default = "default_source_type")]
    pub source_type: SourceType,
    #[serde(default = "default_source_name")]
    pub source_name: String,
    #[serde(default = "default_year")]
    pub published_year: i32,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sector: String,
    #[serde(default = "default_geography")]
    pub geography: String,
    #[serde(default)]
    pub investors: Vec<String>,
    #[serde(default)]
    pub usage_tags: Vec<String>,
    pub embedding: Vec<f32>,
}

enum Embedder {
    Remote { http: reqwest::Client, api_key: String },
    Hashed,
}

impl Embedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        match self {
            Embedder::Hashed => Ok(hashed_embedding(text)),
            Embedder::Remote { http, api_key } => {
                #[derive(Serialize)]
                struct Part<'a> {
                    text: &'a str,
                }
                #[derive(Serialize)]
                struct Content<'a> {
                    parts: Vec<Part<'a>>,
                }
                #[derive(Serialize)]
                struct Req<'a> {
                    model: &'a str,
                    content: Content<'a>,
                }
                #[derive(Deserialize)]
                struct Resp {
                    embedding: RespEmbedding,
                }
                #[derive(Deserialize)]
                struct RespEmbedding {
                    values: Vec<f32>,
                }

                let req = Req {
                    model: "models/embedding-001",
                    content: Content {
                        parts: vec![Part { text }],
                    },
                };
                let resp = http
                    .post(format!("{EMBED_URL}?key={api_key}"))
                    .json(&req)
                    .send()
                    .await
                    .context("embedding request failed")?
                    .error_for_status()
                    .context("embedding request rejected")?;
                let body: Resp = resp.json().await.context("bad embedding response")?;
                Ok(body.embedding.values)
            }
        }
    }
}

/// Deterministic non-semantic fallback: a hashed bag-of-words, L2-normalized.
fn hashed_embedding(text: &str) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut v = vec![0.0f32; HASHED_EMBEDDING_DIM];
    for word in text.to_lowercase().split_whitespace() {
        let mut h = DefaultHasher::new();
        word.hash(&mut h);
        v[(h.finish() as usize) % HASHED_EMBEDDING_DIM] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    // Entries embedded under a different embedder have a different
    // dimension; they simply never rank.
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

pub struct SimilarityStore {
    index_path: PathBuf,
    entries: Mutex<Vec<StoredEvidence>>,
    embedder: Embedder,
}

impl SimilarityStore {
    /// Open the persistent index. A missing file is an empty store; an
    /// unreadable file is a construction error and the adapter should be
    /// disabled for the process.
    pub fn open(index_path: impl Into<PathBuf>, api_key: Option<String>) -> anyhow::Result<Self> {
        let index_path = index_path.into();
        let entries = match std::fs::read_to_string(&index_path) {
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("corrupt similarity index {}", index_path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).context(format!(
                    "cannot read similarity index {}",
                    index_path.display()
                ))
            }
        };

        let embedder = match api_key {
            Some(key) => Embedder::Remote {
                http: reqwest::Client::builder()
                    .user_agent("funding-fit-analyzer/0.1")
                    .connect_timeout(Duration::from_secs(5))
                    .timeout(Duration::from_secs(20))
                    .build()
                    .context("reqwest client")?,
                api_key: key,
            },
            None => {
                tracing::info!("no embedding credentials, using hashed fallback embedding");
                Embedder::Hashed
            }
        };

        Ok(Self {
            index_path,
            entries: Mutex::new(entries),
            embedder,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("index mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Nearest-neighbor lookup: up to `n_results` units ranked by cosine
    /// similarity to `query_text`.
    pub async fn query_evidence(
        &self,
        query_text: &str,
        n_results: usize,
    ) -> anyhow::Result<Vec<EvidenceUnit>> {
        let query = self.embedder.embed(query_text).await?;

        let mut ranked: Vec<(f32, EvidenceUnit)> = {
            let entries = self.entries.lock().expect("index mutex poisoned");
            entries
                .iter()
                .map(|e| (cosine(&query, &e.embedding), to_unit(e)))
                .collect()
        };
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked
            .into_iter()
            .take(n_results)
            .map(|(_, unit)| unit)
            .collect())
    }

    /// Write evidence units back into the index (best-effort cache warm).
    /// Units already present (by id) are left untouched. Returns how many
    /// entries were added.
    pub async fn remember(&self, units: &[EvidenceUnit]) -> anyhow::Result<usize> {
        let mut fresh = Vec::new();
        for unit in units {
            let known = {
                let entries = self.entries.lock().expect("index mutex poisoned");
                entries.iter().any(|e| e.id == unit.id)
            };
            if known {
                continue;
            }
            let embedding = self.embedder.embed(&unit.content).await?;
            fresh.push(StoredEvidence {
                id: unit.id.clone(),
                title: unit.title.clone(),
                content: unit.content.clone(),
                source_type: unit.source_type,
                source_name: unit.source_name.clone(),
                published_year: unit.published_year,
                url: unit.url.clone(),
                sector: unit.sector.clone(),
                geography: unit.geography.clone(),
                investors: unit.investors.clone(),
                usage_tags: unit.usage_tags.clone(),
                embedding,
            });
        }
        if fresh.is_empty() {
            return Ok(0);
        }

        let added = fresh.len();
        let snapshot = {
            let mut entries = self.entries.lock().expect("index mutex poisoned");
            entries.append(&mut fresh);
            entries.clone()
        };
        persist_index(&self.index_path, &snapshot)?;
        Ok(added)
    }
}

fn to_unit(e: &StoredEvidence) -> EvidenceUnit {
    EvidenceUnit {
        id: e.id.clone(),
        source_type: e.source_type,
        title: e.title.clone(),
        source_name: e.source_name.clone(),
        published_year: e.published_year,
        url: e.url.clone(),
        sector: e.sector.clone(),
        geography: e.geography.clone(),
        investors: e.investors.clone(),
        content: e.content.clone(),
        usage_tags: crate::evidence::normalize_tags(e.usage_tags.clone(), defaults::USAGE_TAG),
    }
}

fn persist_index(path: &Path, entries: &[StoredEvidence]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(entries)?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
