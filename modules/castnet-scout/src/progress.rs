//! Structured progress reporting and the persisted run log.
//!
//! Workers emit typed events over a channel; a single reporter task owns
//! all formatting and the run-log timeline. Workers never print.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use castnet_common::config::data_dir;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    QueryCompleted {
        worker: usize,
        query: String,
        results: usize,
        accepted: usize,
    },
    QueryFailed {
        worker: usize,
        query: String,
        reason: String,
    },
    IdentityAccepted {
        worker: usize,
        identity: String,
        followers: Option<u64>,
    },
    IdentityRejected {
        worker: usize,
        identity: String,
        reason: String,
    },
    IdentitySkipped {
        worker: usize,
        identity: String,
        reason: String,
    },
    WorkerFinished {
        worker: usize,
        items: usize,
    },
    Interrupted,
}

/// Spawn the reporter task: logs each event and appends it to the run log.
/// Dropping all senders ends the task.
pub fn spawn_reporter(
    mut rx: mpsc::UnboundedReceiver<ProgressEvent>,
    log: Arc<Mutex<RunLog>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match &event {
                ProgressEvent::QueryCompleted {
                    worker,
                    query,
                    results,
                    accepted,
                } => info!(worker, query, results, accepted, "Query completed"),
                ProgressEvent::QueryFailed {
                    worker,
                    query,
                    reason,
                } => warn!(worker, query, reason, "Query failed, continuing"),
                ProgressEvent::IdentityAccepted {
                    worker,
                    identity,
                    followers,
                } => info!(worker, identity, ?followers, "Identity accepted"),
                ProgressEvent::IdentityRejected {
                    worker,
                    identity,
                    reason,
                } => info!(worker, identity, reason, "Identity rejected"),
                ProgressEvent::IdentitySkipped {
                    worker,
                    identity,
                    reason,
                } => info!(worker, identity, reason, "Identity skipped"),
                ProgressEvent::WorkerFinished { worker, items } => {
                    info!(worker, items, "Worker finished")
                }
                ProgressEvent::Interrupted => warn!("Stop requested, draining at item boundary"),
            }
            log.lock().expect("run log poisoned").push(event);
        }
    })
}

/// Shared stop flag. Set on ctrl-c; consulted by workers only at item
/// boundaries: the in-flight item finishes or fails, then no further
/// items are dispatched. Durable state needs no rollback.
pub fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current items before stopping");
            handle.store(true, Ordering::SeqCst);
        }
    });
    flag
}

pub fn is_stopped(flag: &AtomicBool) -> bool {
    flag.load(Ordering::SeqCst)
}

// ---------------------------------------------------------------------------
// RunLog: persisted JSON timeline of a pipeline invocation
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct RunEvent {
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    event: ProgressEvent,
}

pub struct RunLog {
    pub run_id: String,
    pub command: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

impl RunLog {
    pub fn new(command: &str) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            command: command.to_string(),
            started_at: Utc::now(),
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn push(&mut self, event: ProgressEvent) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            event,
        });
        self.seq += 1;
    }

    /// Serialize the timeline plus a final summary line and write it under
    /// `{DATA_DIR}/runs/`. Returns the file path.
    pub fn save(&self, summary: &str) -> anyhow::Result<PathBuf> {
        let dir = data_dir().join("runs");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}.json", self.run_id));

        #[derive(Serialize)]
        struct Serialized<'a> {
            run_id: &'a str,
            command: &'a str,
            started_at: DateTime<Utc>,
            finished_at: DateTime<Utc>,
            summary: &'a str,
            events: &'a [RunEvent],
        }

        let output = Serialized {
            run_id: &self.run_id,
            command: &self.command,
            started_at: self.started_at,
            finished_at: Utc::now(),
            summary,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Run log saved");
        Ok(path)
    }
}
