//! Phase 2, verification: re-query each harvested identity with a scoped
//! search, re-classify on the stricter second-pass evidence, and record
//! accepted identities durably. Consults the checkpoint store first so a
//! resumed run never re-verifies or re-emits decided identities.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use tokio::sync::mpsc;
use tracing::{error, info};

use castnet_common::{
    AcceptedRecord, Candidate, Classification, DecisionState, KeywordPolicy, ThresholdCheck,
};

use crate::checkpoint::CheckpointStore;
use crate::extract::{display_name, follower_estimate, UNKNOWN_NAME};
use crate::harvest::partition;
use crate::progress::{is_stopped, ProgressEvent};
use crate::queries::scoped_query;
use crate::search::{SearchFactory, SearchProvider};

/// Evidence gathered about one identity: free text plus the best title
/// found, used for the display name.
#[derive(Debug, Clone, Default)]
pub struct Evidence {
    pub text: String,
    pub title: String,
}

/// One evidence-gathering session, owned by a single verify worker.
#[async_trait]
pub trait EvidenceSource: Send {
    /// Fetch evidence about one identity. `Ok(None)` means the lookup
    /// worked but produced nothing usable.
    async fn evidence_for(&mut self, identity: &str, url: &str) -> Result<Option<Evidence>>;
}

pub trait EvidenceFactory: Send + Sync {
    fn open_source(&self) -> Box<dyn EvidenceSource>;
}

// ---------------------------------------------------------------------------
// Search-backed evidence (primary path, with optional fallback backend)
// ---------------------------------------------------------------------------

/// Scoped search against the primary backend; when it yields nothing
/// usable, the same lookup runs against the fallback backend and whichever
/// evidence is found first is classified.
pub struct SearchEvidence {
    primary: Box<dyn SearchProvider>,
    fallback: Option<Box<dyn SearchProvider>>,
    platform_host: String,
    region: String,
    max_results: usize,
}

impl SearchEvidence {
    async fn lookup(
        provider: &dyn SearchProvider,
        query: &str,
        region: &str,
        max_results: usize,
    ) -> Result<Option<Evidence>> {
        let hits = provider
            .search(query, region, max_results)
            .await
            .with_context(|| format!("{} lookup failed", provider.name()))?;
        if hits.is_empty() {
            return Ok(None);
        }
        let title = hits[0].title.clone();
        let text = hits
            .iter()
            .map(|h| h.evidence())
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(Evidence { text, title }))
    }
}

#[async_trait]
impl EvidenceSource for SearchEvidence {
    async fn evidence_for(&mut self, identity: &str, _url: &str) -> Result<Option<Evidence>> {
        let query = scoped_query(&self.platform_host, identity);

        if let Some(evidence) =
            Self::lookup(&*self.primary, &query, &self.region, self.max_results).await?
        {
            return Ok(Some(evidence));
        }

        let Some(ref fallback) = self.fallback else {
            return Ok(None);
        };
        Self::lookup(&**fallback, &query, &self.region, self.max_results).await
    }
}

pub struct SearchEvidenceFactory {
    pub primary: Arc<dyn SearchFactory>,
    pub fallback: Option<Arc<dyn SearchFactory>>,
    pub platform_host: String,
    pub region: String,
    pub max_results: usize,
}

impl EvidenceFactory for SearchEvidenceFactory {
    fn open_source(&self) -> Box<dyn EvidenceSource> {
        Box::new(SearchEvidence {
            primary: self.primary.open_session(),
            fallback: self.fallback.as_ref().map(|f| f.open_session()),
            platform_host: self.platform_host.clone(),
            region: self.region.clone(),
            max_results: self.max_results,
        })
    }
}

// ---------------------------------------------------------------------------
// Rendered-page evidence (bio-check variant)
// ---------------------------------------------------------------------------

/// Renders the profile page itself and classifies its visible text.
pub struct PageEvidence {
    session: browserless_client::PageSession,
}

#[async_trait]
impl EvidenceSource for PageEvidence {
    async fn evidence_for(&mut self, _identity: &str, url: &str) -> Result<Option<Evidence>> {
        self.session
            .navigate(url)
            .await
            .with_context(|| format!("navigation failed for {url}"))?;
        let text = self.session.visible_text()?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        let title = self.session.page_title()?;
        Ok(Some(Evidence { text, title }))
    }
}

pub struct PageEvidenceFactory {
    client: browserless_client::BrowserlessClient,
}

impl PageEvidenceFactory {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            client: browserless_client::BrowserlessClient::new(base_url, token),
        }
    }
}

impl EvidenceFactory for PageEvidenceFactory {
    fn open_source(&self) -> Box<dyn EvidenceSource> {
        Box::new(PageEvidence {
            session: self.client.session(),
        })
    }
}

// ---------------------------------------------------------------------------
// VerifyPool
// ---------------------------------------------------------------------------

/// Stats from a verification run.
#[derive(Debug, Default, Clone)]
pub struct VerifyStats {
    pub checked: u32,
    pub skipped_decided: u32,
    pub accepted: u32,
    pub accepted_needs_review: u32,
    pub rejected_disallowed: u32,
    pub rejected_off_topic: u32,
    pub rejected_threshold: u32,
    pub no_evidence: u32,
    pub failed: u32,
}

impl VerifyStats {
    fn merge(&mut self, other: &VerifyStats) {
        self.checked += other.checked;
        self.skipped_decided += other.skipped_decided;
        self.accepted += other.accepted;
        self.accepted_needs_review += other.accepted_needs_review;
        self.rejected_disallowed += other.rejected_disallowed;
        self.rejected_off_topic += other.rejected_off_topic;
        self.rejected_threshold += other.rejected_threshold;
        self.no_evidence += other.no_evidence;
        self.failed += other.failed;
    }
}

impl std::fmt::Display for VerifyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Verification Complete ===")?;
        writeln!(f, "Checked:            {}", self.checked)?;
        writeln!(f, "Skipped (decided):  {}", self.skipped_decided)?;
        writeln!(f, "Accepted:           {}", self.accepted)?;
        writeln!(f, "Accepted (review):  {}", self.accepted_needs_review)?;
        writeln!(f, "Disallowed hits:    {}", self.rejected_disallowed)?;
        writeln!(f, "Off-topic:          {}", self.rejected_off_topic)?;
        writeln!(f, "Below threshold:    {}", self.rejected_threshold)?;
        writeln!(f, "No evidence:        {}", self.no_evidence)?;
        write!(f, "Failed lookups:     {}", self.failed)
    }
}

#[derive(Debug, Clone)]
pub struct VerifySettings {
    pub workers: usize,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
}

struct VerifyContext {
    policy: KeywordPolicy,
    settings: VerifySettings,
    store: Arc<dyn CheckpointStore>,
    stop: Arc<AtomicBool>,
}

pub struct VerifyPool {
    factory: Arc<dyn EvidenceFactory>,
    context: Arc<VerifyContext>,
}

impl VerifyPool {
    pub fn new(
        factory: Arc<dyn EvidenceFactory>,
        policy: KeywordPolicy,
        settings: VerifySettings,
        store: Arc<dyn CheckpointStore>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            factory,
            context: Arc::new(VerifyContext {
                policy,
                settings,
                store,
                stop,
            }),
        }
    }

    /// Verify the candidate list. Partitioned across the pool; strictly
    /// sequential within each worker; every accepted identity is durable
    /// before the worker moves to its next item.
    pub async fn run(
        &self,
        candidates: Vec<Candidate>,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> (Vec<AcceptedRecord>, VerifyStats) {
        let partitions = partition(candidates, self.context.settings.workers);
        info!(workers = partitions.len(), "Verification starting");

        let (tx, mut rx) = mpsc::unbounded_channel::<AcceptedRecord>();
        let mut handles = Vec::new();

        for (worker_id, chunk) in partitions.into_iter().enumerate() {
            let mut source = self.factory.open_source();
            let context = self.context.clone();
            let tx = tx.clone();
            let events = events.clone();

            handles.push(tokio::spawn(async move {
                let mut stats = VerifyStats::default();
                let total = chunk.len();

                for candidate in chunk {
                    if is_stopped(&context.stop) {
                        let _ = events.send(ProgressEvent::Interrupted);
                        break;
                    }

                    verify_one(&mut *source, &context, candidate, worker_id, &tx, &events, &mut stats)
                        .await;

                    jittered_delay(&context.settings).await;
                }

                let _ = events.send(ProgressEvent::WorkerFinished {
                    worker: worker_id,
                    items: total,
                });
                stats
            }));
        }
        drop(tx);

        let mut stats = VerifyStats::default();
        for handle in handles {
            if let Ok(worker_stats) = handle.await {
                stats.merge(&worker_stats);
            }
        }

        let mut accepted = Vec::new();
        while let Ok(record) = rx.try_recv() {
            accepted.push(record);
        }

        (accepted, stats)
    }
}

async fn verify_one(
    source: &mut dyn EvidenceSource,
    context: &VerifyContext,
    mut candidate: Candidate,
    worker_id: usize,
    tx: &mpsc::UnboundedSender<AcceptedRecord>,
    events: &mpsc::UnboundedSender<ProgressEvent>,
    stats: &mut VerifyStats,
) {
    let identity = candidate.identity.clone();

    // Resumability contract: decided identities are never re-verified.
    if context.store.is_decided(&identity) {
        stats.skipped_decided += 1;
        let _ = events.send(ProgressEvent::IdentitySkipped {
            worker: worker_id,
            identity,
            reason: "already decided".to_string(),
        });
        return;
    }

    stats.checked += 1;

    let evidence = match source.evidence_for(&identity, &candidate.url).await {
        Ok(Some(evidence)) => evidence,
        Ok(None) => {
            stats.no_evidence += 1;
            let _ = events.send(ProgressEvent::IdentitySkipped {
                worker: worker_id,
                identity,
                reason: "no usable evidence".to_string(),
            });
            return;
        }
        Err(e) => {
            stats.failed += 1;
            let _ = events.send(ProgressEvent::IdentitySkipped {
                worker: worker_id,
                identity,
                reason: format!("lookup failed: {e:#}"),
            });
            return;
        }
    };

    // A disallowed hit in any evidence this identity has ever produced,
    // harvest snippets included, bars acceptance.
    let combined = format!("{}\n{}", candidate.evidence, evidence.text);

    if let Classification::Disallowed(keyword) = context.policy.classify(&combined) {
        candidate.state = DecisionState::VerifiedRejected;
        stats.rejected_disallowed += 1;
        let _ = events.send(ProgressEvent::IdentityRejected {
            worker: worker_id,
            identity,
            reason: format!("disallowed keyword: {keyword}"),
        });
        return;
    }

    if !context.policy.meets_topic(&combined) {
        candidate.state = DecisionState::VerifiedRejected;
        stats.rejected_off_topic += 1;
        let _ = events.send(ProgressEvent::IdentityRejected {
            worker: worker_id,
            identity,
            reason: "no required-topic keyword".to_string(),
        });
        return;
    }

    // Fresh estimate preferred; the harvest-stage estimate still counts as
    // evidence when the scoped lookup shows no number.
    let estimate = follower_estimate(&evidence.text)
        .estimate
        .or(candidate.followers);

    let note = match context.policy.meets_threshold(estimate) {
        ThresholdCheck::Fail => {
            candidate.state = DecisionState::VerifiedRejected;
            stats.rejected_threshold += 1;
            let _ = events.send(ProgressEvent::IdentityRejected {
                worker: worker_id,
                identity,
                reason: format!("follower estimate {estimate:?} outside window"),
            });
            return;
        }
        ThresholdCheck::Pass => "auto-accepted",
        ThresholdCheck::PassNeedsReview => "needs manual verification",
    };

    candidate.state = DecisionState::VerifiedAccepted;

    let fresh_name = display_name(&evidence.title);
    let name = if fresh_name != UNKNOWN_NAME {
        fresh_name
    } else {
        candidate.display_name.clone()
    };

    let record = AcceptedRecord {
        url: candidate.url.clone(),
        name,
        followers: estimate,
        note: note.to_string(),
    };

    // Durable before the next item; a crash after this point cannot lose
    // the decision. Store failure is fatal to this item only.
    if let Err(e) = context.store.record_accepted(&identity, &record) {
        stats.failed += 1;
        error!(identity, error = %e, "Checkpoint append failed, identity left undecided");
        return;
    }

    match context.policy.meets_threshold(estimate) {
        ThresholdCheck::PassNeedsReview => stats.accepted_needs_review += 1,
        _ => stats.accepted += 1,
    }

    let _ = events.send(ProgressEvent::IdentityAccepted {
        worker: worker_id,
        identity,
        followers: estimate,
    });
    let _ = tx.send(record);
}

async fn jittered_delay(settings: &VerifySettings) {
    if settings.delay_max_ms == 0 {
        return;
    }
    let wait = rand::rng().random_range(settings.delay_min_ms..=settings.delay_max_ms);
    tokio::time::sleep(Duration::from_millis(wait)).await;
}
