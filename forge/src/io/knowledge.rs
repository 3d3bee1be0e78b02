//! Knowledge store for corrective insights.
//!
//! Append-only vector index persisted as `<memory_dir>/index.json`. The index
//! is read from disk on every call, so stores opened on the same directory
//! (in this process or another) see each other's appends. A missing file is a
//! valid empty index. Appends and clears are read-modify-write cycles guarded
//! by a mutex and an exclusive lock on `<memory_dir>/index.lock`; the file
//! itself is only ever replaced by an atomic rename, so readers need no file
//! lock.
//!
//! Faults never escape `store`/`retrieve`: storing reports
//! [`StoreStatus::Failed`], retrieval degrades to "no context".

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::insight::{ContextRecord, InsightPackage};
use crate::core::similarity::{cosine_similarity, top_k};
use crate::io::config::write_atomic;
use crate::io::embedder::Embedder;

const INDEX_FILE: &str = "index.json";
const LOCK_FILE: &str = "index.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreStatus {
    Stored,
    Failed,
}

/// Result of [`KnowledgeStore::store`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOutcome {
    pub status: StoreStatus,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: String,
    session_id: String,
    body: String,
    vector: Vec<f32>,
    stored_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexFile {
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

pub struct KnowledgeStore<M: Embedder> {
    dir: PathBuf,
    embedder: M,
    guard: Mutex<()>,
}

/// Held for the duration of a read-modify-write on the index.
struct WriteLock<'a> {
    _local: MutexGuard<'a, ()>,
    // Dropping the handle releases the advisory lock.
    _file: File,
}

impl<M: Embedder> KnowledgeStore<M> {
    pub fn new(dir: impl Into<PathBuf>, embedder: M) -> Self {
        Self {
            dir: dir.into(),
            embedder,
            guard: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Append one insight. Never propagates a fault.
    #[instrument(skip_all, fields(session_id = %insight.session_id))]
    pub fn store(&self, insight: &InsightPackage) -> StoreOutcome {
        match self.try_store(insight) {
            Ok(()) => {
                info!("insight stored");
                StoreOutcome {
                    status: StoreStatus::Stored,
                    session_id: insight.session_id.clone(),
                    error: None,
                }
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "failed to store insight");
                StoreOutcome {
                    status: StoreStatus::Failed,
                    session_id: insight.session_id.clone(),
                    error: Some(format!("{err:#}")),
                }
            }
        }
    }

    fn try_store(&self, insight: &InsightPackage) -> Result<()> {
        let body = serde_json::to_string_pretty(insight).context("serialize insight")?;
        let entry = IndexEntry {
            id: Uuid::new_v4().to_string(),
            session_id: insight.session_id.clone(),
            vector: self.embedder.embed(&body),
            body,
            stored_at: chrono::Utc::now().to_rfc3339(),
        };

        let _lock = self.write_lock()?;
        let mut entries = self.load()?;
        entries.push(entry);
        self.persist(&entries)
    }

    /// Up to `k` records, most similar first. Degrades to empty on any fault.
    #[instrument(skip_all, fields(k))]
    pub fn retrieve(&self, query: &str, k: usize) -> Vec<ContextRecord> {
        match self.try_retrieve(query, k) {
            Ok(records) => {
                debug!(hits = records.len(), "retrieved context");
                records
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "retrieval degraded to no context");
                Vec::new()
            }
        }
    }

    fn try_retrieve(&self, query: &str, k: usize) -> Result<Vec<ContextRecord>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query);
        let entries = self.read_index()?;
        let scored = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(&query_vector, &entry.vector)))
            .collect();
        Ok(top_k(scored, k)
            .into_iter()
            .map(|(i, score)| ContextRecord {
                text: entries[i].body.clone(),
                similarity_score: score,
            })
            .collect())
    }

    /// Remove every stored insight. Without `confirm` nothing happens and
    /// `false` is returned.
    #[instrument(skip_all, fields(confirm))]
    pub fn clear(&self, confirm: bool) -> Result<bool> {
        if !confirm {
            info!("clear requested without confirmation; nothing removed");
            return Ok(false);
        }
        let _lock = self.write_lock()?;
        let path = self.index_path();
        if path.exists() {
            fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        }
        info!("knowledge store cleared");
        Ok(true)
    }

    /// Number of stored insights (0 when the index cannot be loaded).
    pub fn len(&self) -> usize {
        self.read_index().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_local(&self) -> Result<MutexGuard<'_, ()>> {
        self.guard
            .lock()
            .map_err(|_| anyhow!("knowledge index lock poisoned"))
    }

    fn read_index(&self) -> Result<Vec<IndexEntry>> {
        let _local = self.lock_local()?;
        self.load()
    }

    fn write_lock(&self) -> Result<WriteLock<'_>> {
        let local = self.lock_local()?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("create directory {}", self.dir.display()))?;
        let lock_path = self.dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("open {}", lock_path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("lock {}", lock_path.display()))?;
        Ok(WriteLock {
            _local: local,
            _file: file,
        })
    }

    fn load(&self) -> Result<Vec<IndexEntry>> {
        let path = self.index_path();
        if !path.exists() {
            debug!(path = %path.display(), "no index on disk; starting empty");
            return Ok(Vec::new());
        }
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let file: IndexFile =
            serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
        let expected = self.embedder.dimensions();
        if file.dimensions != expected {
            return Err(anyhow!(
                "index dimensions {} do not match embedder dimensions {}",
                file.dimensions,
                expected
            ));
        }
        debug!(entries = file.entries.len(), "loaded knowledge index");
        Ok(file.entries)
    }

    fn persist(&self, entries: &[IndexEntry]) -> Result<()> {
        let file = IndexFile {
            dimensions: self.embedder.dimensions(),
            entries: entries.to_vec(),
        };
        let mut buf = serde_json::to_string_pretty(&file).context("serialize index")?;
        buf.push('\n');
        write_atomic(&self.index_path(), buf.as_bytes())
    }
}
