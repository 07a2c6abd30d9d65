//! Durable, append-only record of decided identities. A restarted run
//! reads the store back at startup and skips everything already decided;
//! existing contents are never rewritten, only extended.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

use castnet_common::{AcceptedRecord, Candidate, CastnetError, DecisionState};

/// Sentinel stored in the followers column when no numeric signal was
/// extracted.
pub const NEEDS_REVIEW: &str = "needs review";

pub trait CheckpointStore: Send + Sync {
    fn is_decided(&self, identity: &str) -> bool;

    /// Append one accepted identity. Durable on return: the record is
    /// flushed and synced before this returns, so a crash afterwards
    /// cannot lose it. Serialized across workers.
    fn record_accepted(&self, identity: &str, record: &AcceptedRecord)
        -> Result<(), CastnetError>;

    /// Snapshot of the decided set, for seeding dedup indexes.
    fn decided(&self) -> HashSet<String>;

    fn decided_count(&self) -> usize;
}

// ---------------------------------------------------------------------------
// CSV worklist
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct WorklistRow {
    url: String,
    name: String,
    followers: String,
    note: String,
}

impl WorklistRow {
    fn from_record(record: &AcceptedRecord) -> Self {
        Self {
            url: record.url.clone(),
            name: record.name.clone(),
            followers: record
                .followers
                .map(|n| n.to_string())
                .unwrap_or_else(|| NEEDS_REVIEW.to_string()),
            note: record.note.clone(),
        }
    }
}

struct WorklistInner {
    file: File,
    decided: HashSet<String>,
}

/// The tabular worklist: `url,name,followers,note`, one row per accepted
/// identity, appendable without rewriting prior rows. An absent file is a
/// valid empty store.
pub struct CsvWorklist {
    path: PathBuf,
    inner: Mutex<WorklistInner>,
}

impl CsvWorklist {
    pub fn open(path: &Path) -> Result<Self, CastnetError> {
        let mut decided = HashSet::new();
        let existed = path.exists();

        if existed {
            let mut reader = csv::Reader::from_path(path)
                .map_err(|e| CastnetError::Checkpoint(format!("{}: {e}", path.display())))?;
            for row in reader.deserialize::<WorklistRow>() {
                let row =
                    row.map_err(|e| CastnetError::Checkpoint(format!("{}: {e}", path.display())))?;
                if let Some(identity) = AcceptedRecord::identity_from_url(&row.url) {
                    decided.insert(identity);
                }
            }
            info!(
                path = %path.display(),
                decided = decided.len(),
                "Loaded existing worklist"
            );
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if !existed {
            file.write_all(b"url,name,followers,note\n")?;
            file.sync_all()?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(WorklistInner { file, decided }),
        })
    }
}

impl CheckpointStore for CsvWorklist {
    fn is_decided(&self, identity: &str) -> bool {
        let inner = self.inner.lock().expect("worklist poisoned");
        inner.decided.contains(identity)
    }

    fn record_accepted(
        &self,
        identity: &str,
        record: &AcceptedRecord,
    ) -> Result<(), CastnetError> {
        let mut inner = self.inner.lock().expect("worklist poisoned");
        if inner.decided.contains(identity) {
            // At most one row per identity, ever.
            return Ok(());
        }

        let mut encoder = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        encoder
            .serialize(WorklistRow::from_record(record))
            .map_err(|e| CastnetError::Checkpoint(format!("{}: {e}", self.path.display())))?;
        let row = encoder
            .into_inner()
            .map_err(|e| CastnetError::Checkpoint(format!("{}: {e}", self.path.display())))?;

        inner.file.write_all(&row)?;
        inner.file.sync_all()?;
        inner.decided.insert(identity.to_string());
        Ok(())
    }

    fn decided(&self) -> HashSet<String> {
        let inner = self.inner.lock().expect("worklist poisoned");
        inner.decided.clone()
    }

    fn decided_count(&self) -> usize {
        let inner = self.inner.lock().expect("worklist poisoned");
        inner.decided.len()
    }
}

// ---------------------------------------------------------------------------
// Plain-text URL list
// ---------------------------------------------------------------------------

/// Alternate persisted form: one canonical profile URL per line,
/// append-only, read back at startup to compute the skip set.
pub struct PlainTextList {
    path: PathBuf,
    inner: Mutex<WorklistInner>,
}

impl PlainTextList {
    pub fn open(path: &Path) -> Result<Self, CastnetError> {
        let mut decided = HashSet::new();

        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if let Some(identity) = AcceptedRecord::identity_from_url(line) {
                    decided.insert(identity);
                }
            }
            info!(
                path = %path.display(),
                decided = decided.len(),
                "Loaded existing URL list"
            );
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(WorklistInner { file, decided }),
        })
    }
}

impl CheckpointStore for PlainTextList {
    fn is_decided(&self, identity: &str) -> bool {
        let inner = self.inner.lock().expect("url list poisoned");
        inner.decided.contains(identity)
    }

    fn record_accepted(
        &self,
        identity: &str,
        record: &AcceptedRecord,
    ) -> Result<(), CastnetError> {
        let mut inner = self.inner.lock().expect("url list poisoned");
        if inner.decided.contains(identity) {
            return Ok(());
        }
        let line = format!("{}\n", record.url);
        inner
            .file
            .write_all(line.as_bytes())
            .and_then(|_| inner.file.sync_all())
            .map_err(|e| CastnetError::Checkpoint(format!("{}: {e}", self.path.display())))?;
        inner.decided.insert(identity.to_string());
        Ok(())
    }

    fn decided(&self) -> HashSet<String> {
        let inner = self.inner.lock().expect("url list poisoned");
        inner.decided.clone()
    }

    fn decided_count(&self) -> usize {
        let inner = self.inner.lock().expect("url list poisoned");
        inner.decided.len()
    }
}

// ---------------------------------------------------------------------------
// Candidates CSV interchange (harvest output → verify input)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct CandidateRow {
    query: String,
    identity: String,
    url: String,
    name: String,
    followers: String,
    evidence: String,
}

/// Write the harvested candidate set for a later verify pass.
pub fn write_candidates(path: &Path, candidates: &[Candidate]) -> Result<(), CastnetError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| CastnetError::Checkpoint(format!("{}: {e}", path.display())))?;
    for candidate in candidates {
        writer
            .serialize(CandidateRow {
                query: candidate.origin_query.clone(),
                identity: candidate.identity.clone(),
                url: candidate.url.clone(),
                name: candidate.display_name.clone(),
                followers: candidate
                    .followers
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| NEEDS_REVIEW.to_string()),
                evidence: candidate.evidence.clone(),
            })
            .map_err(|e| CastnetError::Checkpoint(format!("{}: {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| CastnetError::Checkpoint(format!("{}: {e}", path.display())))?;
    info!(path = %path.display(), count = candidates.len(), "Candidates written");
    Ok(())
}

/// Read a candidates file back. Rows with an unparseable followers column
/// fall back to the unknown sentinel rather than failing the load.
pub fn read_candidates(path: &Path) -> Result<Vec<Candidate>, CastnetError> {
    let mut reader = csv::Reader::from_path(path)
        .map_err(|e| CastnetError::Checkpoint(format!("{}: {e}", path.display())))?;
    let mut candidates = Vec::new();
    for row in reader.deserialize::<CandidateRow>() {
        let row = row.map_err(|e| CastnetError::Checkpoint(format!("{}: {e}", path.display())))?;
        candidates.push(Candidate {
            identity: row.identity,
            url: row.url,
            origin_query: row.query,
            display_name: row.name,
            evidence: row.evidence,
            followers: row.followers.parse().ok(),
            state: DecisionState::Harvested,
        });
    }
    Ok(candidates)
}
