use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use castnet_common::config::data_dir;
use castnet_common::{target_profile, AcceptedRecord, Candidate, Config, KeywordPolicy, TargetProfile};
use castnet_scout::checkpoint::{self, CheckpointStore, CsvWorklist, PlainTextList};
use castnet_scout::harvest::{HarvestPool, HarvestSettings, HarvestStats};
use castnet_scout::progress::{interrupt_flag, spawn_reporter, ProgressEvent, RunLog};
use castnet_scout::queries;
use castnet_scout::search::{BingFactory, DdgFactory};
use castnet_scout::urls::DedupIndex;
use castnet_scout::verify::{
    PageEvidenceFactory, SearchEvidenceFactory, VerifyPool, VerifySettings, VerifyStats,
};

#[derive(Parser)]
#[command(name = "castnet", about = "Profile candidate discovery and filtering pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest candidates from the search backend into a candidates CSV.
    Harvest {
        /// Output path, relative paths resolve under DATA_DIR.
        #[arg(long, default_value = "candidates.csv")]
        out: PathBuf,
    },
    /// Verify a previously harvested candidates CSV against the worklist.
    Verify {
        #[arg(long = "in", default_value = "candidates.csv")]
        input: PathBuf,
        #[arg(long, default_value = "worklist.csv")]
        worklist: PathBuf,
        /// Use the rendered profile page as evidence instead of scoped
        /// search (requires BROWSERLESS_URL).
        #[arg(long)]
        bio: bool,
        /// Use the plain-text URL list store instead of the CSV worklist.
        #[arg(long)]
        plain: bool,
    },
    /// Full pipeline: harvest, then verify, resumable via the worklist.
    Run {
        #[arg(long, default_value = "worklist.csv")]
        worklist: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("castnet=info".parse()?))
        .init();

    info!("Castnet starting...");

    let config = Config::from_env();
    let profile = target_profile(&config.profile);
    let mut policy = profile.policy();
    if let Some(min) = config.min_followers {
        policy.min_followers = min;
    }
    if let Some(max) = config.max_followers {
        policy.max_followers = Some(max);
    }
    info!(
        profile = profile.name,
        min_followers = policy.min_followers,
        "Target profile loaded"
    );

    let cli = Cli::parse();
    let command_name = match &cli.command {
        Commands::Harvest { .. } => "harvest",
        Commands::Verify { .. } => "verify",
        Commands::Run { .. } => "run",
    };

    let stop = interrupt_flag();
    let log = Arc::new(Mutex::new(RunLog::new(command_name)));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let reporter = spawn_reporter(events_rx, log.clone());

    let summary = match cli.command {
        Commands::Harvest { out } => {
            let out = resolve(out);
            let dedup = Arc::new(DedupIndex::new());
            let (candidates, stats) =
                run_harvest(&config, &profile, &policy, dedup, stop, events_tx.clone()).await;
            checkpoint::write_candidates(&out, &candidates)?;
            info!("{stats}");
            info!(path = %out.display(), "Candidates saved");
            format!("{} candidates harvested", candidates.len())
        }
        Commands::Verify {
            input,
            worklist,
            bio,
            plain,
        } => {
            let input = resolve(input);
            let candidates = checkpoint::read_candidates(&input)
                .with_context(|| format!("failed to read candidates from {}", input.display()))?;
            info!(count = candidates.len(), path = %input.display(), "Candidates loaded");

            let store = open_store(&resolve(worklist), plain)?;
            let (accepted, stats) =
                run_verify(&config, &profile, &policy, candidates, store, bio, stop, events_tx.clone())
                    .await?;
            info!("{stats}");
            summarize_accepted(&accepted);
            format!("{} identities accepted", accepted.len())
        }
        Commands::Run { worklist } => {
            let store = open_store(&resolve(worklist), false)?;

            // Seed the dedup index with already-decided identities so the
            // harvest pass does not re-surface them.
            let dedup = Arc::new(DedupIndex::new());
            dedup.seed(store.decided());

            let (candidates, harvest_stats) = run_harvest(
                &config,
                &profile,
                &policy,
                dedup,
                stop.clone(),
                events_tx.clone(),
            )
            .await;
            info!("{harvest_stats}");

            if candidates.is_empty() {
                info!("No candidates found, nothing to verify");
                "0 candidates, 0 accepted".to_string()
            } else {
                let (accepted, verify_stats) = run_verify(
                    &config,
                    &profile,
                    &policy,
                    candidates.clone(),
                    store,
                    false,
                    stop,
                    events_tx.clone(),
                )
                .await?;
                info!("{verify_stats}");
                summarize_accepted(&accepted);
                format!(
                    "{} candidates harvested, {} accepted",
                    candidates.len(),
                    accepted.len()
                )
            }
        }
    };

    drop(events_tx);
    let _ = reporter.await;

    let log = log.lock().expect("run log poisoned");
    log.save(&summary)?;
    info!(summary = summary.as_str(), "Done");
    Ok(())
}

async fn run_harvest(
    config: &Config,
    profile: &TargetProfile,
    policy: &KeywordPolicy,
    dedup: Arc<DedupIndex>,
    stop: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ProgressEvent>,
) -> (Vec<Candidate>, HarvestStats) {
    let queries = queries::plan(profile);
    info!(queries = queries.len(), "Query plan ready");

    let settings = HarvestSettings {
        workers: config.harvest_workers,
        region: config.search_region.clone(),
        max_results_per_query: config.max_results_per_query,
        delay_min_ms: config.delay_min_ms,
        delay_max_ms: config.delay_max_ms,
    };

    let pool = HarvestPool::new(
        Arc::new(DdgFactory),
        policy.clone(),
        profile.platform_host,
        settings,
        dedup,
        stop,
    );
    pool.run(queries, events).await
}

#[allow(clippy::too_many_arguments)]
async fn run_verify(
    config: &Config,
    profile: &TargetProfile,
    policy: &KeywordPolicy,
    candidates: Vec<Candidate>,
    store: Arc<dyn CheckpointStore>,
    bio: bool,
    stop: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ProgressEvent>,
) -> Result<(Vec<AcceptedRecord>, VerifyStats)> {
    let factory: Arc<dyn castnet_scout::verify::EvidenceFactory> = if bio {
        let base_url = config
            .browserless_url
            .as_deref()
            .context("BROWSERLESS_URL is required for --bio verification")?;
        Arc::new(PageEvidenceFactory::new(
            base_url,
            config.browserless_token.as_deref(),
        ))
    } else {
        let primary: Arc<dyn castnet_scout::search::SearchFactory> = Arc::new(DdgFactory);
        let fallback: Arc<dyn castnet_scout::search::SearchFactory> = Arc::new(BingFactory);
        Arc::new(SearchEvidenceFactory {
            primary,
            fallback: Some(fallback),
            platform_host: profile.platform_host.to_string(),
            region: config.search_region.clone(),
            max_results: 10,
        })
    };

    let settings = VerifySettings {
        workers: config.verify_workers,
        delay_min_ms: config.delay_min_ms,
        delay_max_ms: config.delay_max_ms,
    };

    let pool = VerifyPool::new(factory, policy.clone(), settings, store, stop);
    Ok(pool.run(candidates, events).await)
}

fn open_store(path: &std::path::Path, plain: bool) -> Result<Arc<dyn CheckpointStore>> {
    let store: Arc<dyn CheckpointStore> = if plain {
        Arc::new(PlainTextList::open(path)?)
    } else {
        Arc::new(CsvWorklist::open(path)?)
    };
    info!(path = %path.display(), decided = store.decided_count(), "Checkpoint store open");
    Ok(store)
}

/// Relative paths live under the data directory.
fn resolve(path: PathBuf) -> PathBuf {
    if path.is_absolute() {
        path
    } else {
        data_dir().join(path)
    }
}

/// Log the accepted set, largest audience first. Display only; the
/// durable worklist itself stays in append order.
fn summarize_accepted(accepted: &[AcceptedRecord]) {
    if accepted.is_empty() {
        return;
    }
    let mut sorted: Vec<&AcceptedRecord> = accepted.iter().collect();
    sorted.sort_by(|a, b| b.followers.cmp(&a.followers));
    info!("Accepted this run:");
    for record in sorted {
        let followers = record
            .followers
            .map(|n| n.to_string())
            .unwrap_or_else(|| "needs review".to_string());
        info!(
            url = record.url.as_str(),
            name = record.name.as_str(),
            followers = followers.as_str(),
            note = record.note.as_str(),
            "  accepted"
        );
    }
}
