//! Phase 1, harvest: fan the query plan out over a fixed pool of
//! workers, each owning its own search session, and accumulate deduplicated
//! profile candidates that survive the first-pass policy checks.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::info;

use castnet_common::{Candidate, Classification, DecisionState, KeywordPolicy, ThresholdCheck};

use crate::extract::{display_name, follower_estimate};
use crate::progress::{is_stopped, ProgressEvent};
use crate::queries::SearchQuery;
use crate::search::SearchFactory;
use crate::urls::{canonical_identity, canonical_url, DedupIndex};

/// Stats from a harvest run.
#[derive(Debug, Default, Clone)]
pub struct HarvestStats {
    pub queries_run: u32,
    pub queries_failed: u32,
    pub results_seen: u32,
    pub non_profile_skipped: u32,
    pub duplicates_skipped: u32,
    pub disallowed_skipped: u32,
    pub below_threshold_skipped: u32,
    pub candidates_found: u32,
}

impl HarvestStats {
    fn merge(&mut self, other: &HarvestStats) {
        self.queries_run += other.queries_run;
        self.queries_failed += other.queries_failed;
        self.results_seen += other.results_seen;
        self.non_profile_skipped += other.non_profile_skipped;
        self.duplicates_skipped += other.duplicates_skipped;
        self.disallowed_skipped += other.disallowed_skipped;
        self.below_threshold_skipped += other.below_threshold_skipped;
        self.candidates_found += other.candidates_found;
    }
}

impl std::fmt::Display for HarvestStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Harvest Complete ===")?;
        writeln!(f, "Queries run:        {}", self.queries_run)?;
        writeln!(f, "Queries failed:     {}", self.queries_failed)?;
        writeln!(f, "Results seen:       {}", self.results_seen)?;
        writeln!(f, "Non-profile URLs:   {}", self.non_profile_skipped)?;
        writeln!(f, "Duplicates:         {}", self.duplicates_skipped)?;
        writeln!(f, "Disallowed hits:    {}", self.disallowed_skipped)?;
        writeln!(f, "Below threshold:    {}", self.below_threshold_skipped)?;
        write!(f, "Candidates found:   {}", self.candidates_found)
    }
}

/// Per-query state machine result: a query either completes with however
/// many results the backend gave us, or fails and the worker moves on.
#[derive(Debug)]
enum QueryOutcome {
    Completed { results: usize, accepted: usize },
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub workers: usize,
    pub region: String,
    pub max_results_per_query: usize,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
}

struct HarvestContext {
    policy: KeywordPolicy,
    platform_host: String,
    settings: HarvestSettings,
    dedup: Arc<DedupIndex>,
    stop: Arc<AtomicBool>,
}

pub struct HarvestPool {
    factory: Arc<dyn SearchFactory>,
    context: Arc<HarvestContext>,
}

impl HarvestPool {
    pub fn new(
        factory: Arc<dyn SearchFactory>,
        policy: KeywordPolicy,
        platform_host: &str,
        settings: HarvestSettings,
        dedup: Arc<DedupIndex>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            factory,
            context: Arc::new(HarvestContext {
                policy,
                platform_host: platform_host.to_string(),
                settings,
                dedup,
                stop,
            }),
        }
    }

    /// Run the full query plan. Queries are partitioned across the pool;
    /// each worker walks its partition strictly sequentially on its own
    /// session. Returns the accumulated candidates and merged stats.
    pub async fn run(
        &self,
        queries: Vec<SearchQuery>,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> (Vec<Candidate>, HarvestStats) {
        let partitions = partition(queries, self.context.settings.workers);
        info!(
            workers = partitions.len(),
            "Harvest starting"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<Candidate>();
        let mut handles = Vec::new();

        for (worker_id, chunk) in partitions.into_iter().enumerate() {
            // Session acquired at worker start, dropped on worker exit.
            let session = self.factory.open_session();
            let context = self.context.clone();
            let tx = tx.clone();
            let events = events.clone();

            handles.push(tokio::spawn(async move {
                let mut stats = HarvestStats::default();
                let total = chunk.len();

                for query in chunk {
                    if is_stopped(&context.stop) {
                        let _ = events.send(ProgressEvent::Interrupted);
                        break;
                    }

                    let outcome =
                        run_query(&*session, &context, &query, &tx, worker_id, &events, &mut stats)
                            .await;

                    match outcome {
                        QueryOutcome::Completed { results, accepted } => {
                            stats.queries_run += 1;
                            let _ = events.send(ProgressEvent::QueryCompleted {
                                worker: worker_id,
                                query: query.keywords.clone(),
                                results,
                                accepted,
                            });
                        }
                        QueryOutcome::Failed { reason } => {
                            stats.queries_failed += 1;
                            let _ = events.send(ProgressEvent::QueryFailed {
                                worker: worker_id,
                                query: query.keywords.clone(),
                                reason,
                            });
                        }
                    }

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

        let mut stats = HarvestStats::default();
        for handle in handles {
            if let Ok(worker_stats) = handle.await {
                stats.merge(&worker_stats);
            }
        }

        let mut candidates = Vec::new();
        while let Ok(candidate) = rx.try_recv() {
            candidates.push(candidate);
        }
        stats.candidates_found = candidates.len() as u32;

        (candidates, stats)
    }
}

/// Execute one query and sieve its results into the candidate channel.
/// Every failure is local to the query: logged upstream, never fatal.
#[allow(clippy::too_many_arguments)]
async fn run_query(
    session: &dyn crate::search::SearchProvider,
    context: &HarvestContext,
    query: &SearchQuery,
    tx: &mpsc::UnboundedSender<Candidate>,
    worker_id: usize,
    events: &mpsc::UnboundedSender<ProgressEvent>,
    stats: &mut HarvestStats,
) -> QueryOutcome {
    let settings = &context.settings;
    let hits = match session
        .search(&query.text, &settings.region, settings.max_results_per_query)
        .await
    {
        Ok(hits) => hits,
        Err(e) => {
            return QueryOutcome::Failed {
                reason: e.to_string(),
            }
        }
    };

    let results = hits.len();
    let mut accepted = 0usize;

    for hit in hits {
        stats.results_seen += 1;

        let Some(identity) = canonical_identity(&hit.url, &context.platform_host) else {
            stats.non_profile_skipped += 1;
            continue;
        };

        // First sighting wins; later rediscoveries by other queries (or
        // other workers, concurrently) collapse here.
        if !context.dedup.insert(&identity) {
            stats.duplicates_skipped += 1;
            continue;
        }

        let evidence = hit.evidence();

        if let Classification::Disallowed(keyword) = context.policy.classify(&evidence) {
            stats.disallowed_skipped += 1;
            let _ = events.send(ProgressEvent::IdentityRejected {
                worker: worker_id,
                identity,
                reason: format!("disallowed keyword: {keyword}"),
            });
            continue;
        }

        let signal = follower_estimate(&evidence);
        if context.policy.meets_threshold(signal.estimate) == ThresholdCheck::Fail {
            stats.below_threshold_skipped += 1;
            continue;
        }

        let candidate = Candidate {
            url: canonical_url(&context.platform_host, &identity),
            identity,
            origin_query: query.keywords.clone(),
            display_name: display_name(&hit.title),
            evidence,
            followers: signal.estimate,
            state: DecisionState::Harvested,
        };
        let _ = tx.send(candidate);
        accepted += 1;
    }

    QueryOutcome::Completed { results, accepted }
}

/// Randomized pause between items. Informal rate-limit respect, not a
/// correctness contract.
async fn jittered_delay(settings: &HarvestSettings) {
    if settings.delay_max_ms == 0 {
        return;
    }
    let wait = rand::rng().random_range(settings.delay_min_ms..=settings.delay_max_ms);
    tokio::time::sleep(Duration::from_millis(wait)).await;
}

/// Split items into up to `parts` contiguous chunks of near-equal size.
pub fn partition<T: Clone>(items: Vec<T>, parts: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let parts = parts.max(1);
    let chunk = items.len().div_ceil(parts);
    items.chunks(chunk).map(|c| c.to_vec()).collect()
}
