//! End-to-end pipeline properties driven through the trait seams:
//! stub search sessions and evidence sources, real policy/extraction/dedup
//! logic, and a real checkpoint store on a temp directory.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use castnet_common::{Candidate, DecisionState, KeywordPolicy, SearchHit};
use castnet_scout::checkpoint::{CheckpointStore, CsvWorklist};
use castnet_scout::harvest::{HarvestPool, HarvestSettings};
use castnet_scout::queries::SearchQuery;
use castnet_scout::search::{SearchFactory, SearchProvider};
use castnet_scout::urls::DedupIndex;
use castnet_scout::verify::{Evidence, EvidenceFactory, EvidenceSource, VerifyPool, VerifySettings};

const HOST: &str = "x.test";

fn test_policy() -> KeywordPolicy {
    KeywordPolicy {
        required_topics: vec!["資産".into(), "投資".into()],
        disallowed: vec!["FX".into(), "ギャンブル".into()],
        min_followers: 5000,
        max_followers: Some(500_000),
    }
}

fn harvest_settings(workers: usize) -> HarvestSettings {
    HarvestSettings {
        workers,
        region: "jp-jp".into(),
        max_results_per_query: 50,
        delay_min_ms: 0,
        delay_max_ms: 0,
    }
}

fn verify_settings(workers: usize) -> VerifySettings {
    VerifySettings {
        workers,
        delay_min_ms: 0,
        delay_max_ms: 0,
    }
}

fn no_stop() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

fn hit(url: &str, title: &str, snippet: &str) -> SearchHit {
    SearchHit {
        url: url.to_string(),
        title: title.to_string(),
        snippet: snippet.to_string(),
    }
}

fn candidate(identity: &str, evidence: &str, followers: Option<u64>) -> Candidate {
    Candidate {
        identity: identity.to_string(),
        url: format!("https://{HOST}/{identity}/"),
        origin_query: "資産形成".to_string(),
        display_name: identity.to_string(),
        evidence: evidence.to_string(),
        followers,
        state: DecisionState::Harvested,
    }
}

// ---------------------------------------------------------------------------
// StubSearch: HashMap-based search sessions, shared call recorder
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StubSearchData {
    responses: HashMap<String, Vec<SearchHit>>,
    calls: Mutex<Vec<String>>,
}

struct StubSearchFactory {
    data: Arc<StubSearchData>,
}

impl StubSearchFactory {
    fn new(responses: HashMap<String, Vec<SearchHit>>) -> Self {
        Self {
            data: Arc::new(StubSearchData {
                responses,
                calls: Mutex::new(Vec::new()),
            }),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.data.calls.lock().unwrap().clone()
    }
}

struct StubSearchSession {
    data: Arc<StubSearchData>,
}

#[async_trait]
impl SearchProvider for StubSearchSession {
    async fn search(
        &self,
        query: &str,
        _region: &str,
        _max_results: usize,
    ) -> Result<Vec<SearchHit>> {
        self.data.calls.lock().unwrap().push(query.to_string());
        if query.starts_with("fail:") {
            anyhow::bail!("simulated backend timeout");
        }
        Ok(self.data.responses.get(query).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "stub"
    }
}

impl SearchFactory for StubSearchFactory {
    fn open_session(&self) -> Box<dyn SearchProvider> {
        Box::new(StubSearchSession {
            data: self.data.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// StubEvidence: per-identity evidence text, shared lookup recorder
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StubEvidenceData {
    evidence: HashMap<String, Evidence>,
    lookups: Mutex<Vec<String>>,
}

struct StubEvidenceFactory {
    data: Arc<StubEvidenceData>,
}

impl StubEvidenceFactory {
    fn new(evidence: HashMap<String, Evidence>) -> Self {
        Self {
            data: Arc::new(StubEvidenceData {
                evidence,
                lookups: Mutex::new(Vec::new()),
            }),
        }
    }

    fn with_texts(entries: &[(&str, &str)]) -> Self {
        let evidence = entries
            .iter()
            .map(|(identity, text)| {
                (
                    identity.to_string(),
                    Evidence {
                        text: text.to_string(),
                        title: format!("{identity} (@{identity})"),
                    },
                )
            })
            .collect();
        Self::new(evidence)
    }

    fn lookups(&self) -> Vec<String> {
        self.data.lookups.lock().unwrap().clone()
    }
}

struct StubEvidenceSource {
    data: Arc<StubEvidenceData>,
}

#[async_trait]
impl EvidenceSource for StubEvidenceSource {
    async fn evidence_for(&mut self, identity: &str, _url: &str) -> Result<Option<Evidence>> {
        self.data.lookups.lock().unwrap().push(identity.to_string());
        Ok(self.data.evidence.get(identity).cloned())
    }
}

impl EvidenceFactory for StubEvidenceFactory {
    fn open_source(&self) -> Box<dyn EvidenceSource> {
        Box::new(StubEvidenceSource {
            data: self.data.clone(),
        })
    }
}

fn events() -> mpsc::UnboundedSender<castnet_scout::progress::ProgressEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    tx
}

fn query(text: &str) -> SearchQuery {
    SearchQuery {
        text: text.to_string(),
        keywords: text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Harvest properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn harvest_collapses_url_variants_across_workers() {
    // Two workers, two queries, both surfacing alice under different raw
    // URL forms; exactly one candidate must survive.
    let mut responses = HashMap::new();
    responses.insert(
        "q1".to_string(),
        vec![hit(
            "https://x.test/alice?hl=en",
            "Alice (@alice)",
            "資産 8,400 Followers",
        )],
    );
    responses.insert(
        "q2".to_string(),
        vec![hit(
            "https://x.test/alice/",
            "Alice (@alice)",
            "資産 8,400 Followers",
        )],
    );

    let factory = Arc::new(StubSearchFactory::new(responses));
    let pool = HarvestPool::new(
        factory,
        test_policy(),
        HOST,
        harvest_settings(2),
        Arc::new(DedupIndex::new()),
        no_stop(),
    );

    let (candidates, stats) = pool.run(vec![query("q1"), query("q2")], events()).await;

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].identity, "alice");
    assert_eq!(candidates[0].url, "https://x.test/alice/");
    assert_eq!(stats.duplicates_skipped, 1);
}

#[tokio::test]
async fn harvest_rejects_non_profile_urls_and_disallowed_evidence() {
    let mut responses = HashMap::new();
    responses.insert(
        "q1".to_string(),
        vec![
            hit("https://x.test/alice/p/123/", "post", "資産 9,000 Followers"),
            hit("https://x.test/explore/tags/money/", "tag page", ""),
            hit(
                "https://x.test/shady/",
                "Shady (@shady)",
                "資産とFX自動売買 20,000 Followers",
            ),
            hit(
                "https://x.test/alice/",
                "Alice (@alice)",
                "資産 8,400 Followers",
            ),
        ],
    );

    let factory = Arc::new(StubSearchFactory::new(responses));
    let pool = HarvestPool::new(
        factory,
        test_policy(),
        HOST,
        harvest_settings(1),
        Arc::new(DedupIndex::new()),
        no_stop(),
    );

    let (candidates, stats) = pool.run(vec![query("q1")], events()).await;

    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].identity, "alice");
    assert_eq!(stats.non_profile_skipped, 2);
    assert_eq!(stats.disallowed_skipped, 1);
}

#[tokio::test]
async fn harvest_passes_unknown_counts_through_flagged() {
    let mut responses = HashMap::new();
    responses.insert(
        "q1".to_string(),
        vec![
            hit("https://x.test/alice/", "Alice (@alice)", "資産の話"),
            hit("https://x.test/tiny/", "Tiny (@tiny)", "資産 1,200 Followers"),
        ],
    );

    let factory = Arc::new(StubSearchFactory::new(responses));
    let pool = HarvestPool::new(
        factory,
        test_policy(),
        HOST,
        harvest_settings(1),
        Arc::new(DedupIndex::new()),
        no_stop(),
    );

    let (candidates, stats) = pool.run(vec![query("q1")], events()).await;

    // alice has no numeric signal and passes through as unknown; tiny has
    // an evidenced count below the window and is rejected.
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].identity, "alice");
    assert_eq!(candidates[0].followers, None);
    assert_eq!(stats.below_threshold_skipped, 1);
}

#[tokio::test]
async fn harvest_transient_failures_are_not_fatal() {
    // The first query times out; the worker logs it and keeps going.
    let mut responses = HashMap::new();
    responses.insert(
        "q2".to_string(),
        vec![hit(
            "https://x.test/alice/",
            "Alice (@alice)",
            "資産 8,400 Followers",
        )],
    );

    let factory = Arc::new(StubSearchFactory::new(responses));
    let pool = HarvestPool::new(
        factory.clone(),
        test_policy(),
        HOST,
        harvest_settings(1),
        Arc::new(DedupIndex::new()),
        no_stop(),
    );

    let (candidates, stats) = pool
        .run(vec![query("fail:q1"), query("q2")], events())
        .await;

    assert_eq!(candidates.len(), 1);
    assert_eq!(stats.queries_run, 1);
    assert_eq!(stats.queries_failed, 1);
    assert_eq!(factory.calls().len(), 2);
}

#[tokio::test]
async fn concurrent_discovery_of_one_identity_yields_one_candidate() {
    let index = Arc::new(DedupIndex::new());
    let mut handles = Vec::new();
    for _ in 0..16 {
        let index = index.clone();
        handles.push(tokio::spawn(async move { index.insert("alice") }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(index.len(), 1);
}

// ---------------------------------------------------------------------------
// Verification properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn verify_accepts_on_topic_candidates_durably() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn CheckpointStore> =
        Arc::new(CsvWorklist::open(&dir.path().join("worklist.csv")).unwrap());

    let factory = Arc::new(StubEvidenceFactory::with_texts(&[
        ("alice", "資産形成の記録 フォロワー 1.2万人"),
        ("bob", "投資ブログ 12.5K Followers"),
    ]));

    let pool = VerifyPool::new(
        factory,
        test_policy(),
        verify_settings(2),
        store.clone(),
        no_stop(),
    );

    let (accepted, stats) = pool
        .run(
            vec![candidate("alice", "", None), candidate("bob", "", None)],
            events(),
        )
        .await;

    assert_eq!(accepted.len(), 2);
    assert_eq!(stats.accepted, 2);
    assert!(store.is_decided("alice"));
    assert!(store.is_decided("bob"));

    let alice = accepted.iter().find(|r| r.url.contains("alice")).unwrap();
    assert_eq!(alice.followers, Some(12_000));
}

#[tokio::test]
async fn disallowed_keyword_wins_over_topic_and_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn CheckpointStore> =
        Arc::new(CsvWorklist::open(&dir.path().join("worklist.csv")).unwrap());

    // Topic keyword present, follower count comfortably in the window;
    // the single disallowed hit must still kill it.
    let factory = Arc::new(StubEvidenceFactory::with_texts(&[(
        "shady",
        "資産運用とFXシグナル配信 フォロワー 3万人",
    )]));

    let pool = VerifyPool::new(
        factory,
        test_policy(),
        verify_settings(1),
        store.clone(),
        no_stop(),
    );

    let (accepted, stats) = pool.run(vec![candidate("shady", "", None)], events()).await;

    assert!(accepted.is_empty());
    assert_eq!(stats.rejected_disallowed, 1);
    assert!(!store.is_decided("shady"));
}

#[tokio::test]
async fn disallowed_hit_in_harvest_evidence_bars_acceptance() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn CheckpointStore> =
        Arc::new(CsvWorklist::open(&dir.path().join("worklist.csv")).unwrap());

    // Fresh evidence is clean; the hit lives in the harvest-stage snippet.
    let factory = Arc::new(StubEvidenceFactory::with_texts(&[(
        "shady",
        "資産運用の記録 フォロワー 3万人",
    )]));

    let pool = VerifyPool::new(
        factory,
        test_policy(),
        verify_settings(1),
        store.clone(),
        no_stop(),
    );

    let (accepted, stats) = pool
        .run(
            vec![candidate("shady", "ギャンブル徹底攻略", Some(30_000))],
            events(),
        )
        .await;

    assert!(accepted.is_empty());
    assert_eq!(stats.rejected_disallowed, 1);
}

#[tokio::test]
async fn verify_rejects_off_topic_and_out_of_window() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn CheckpointStore> =
        Arc::new(CsvWorklist::open(&dir.path().join("worklist.csv")).unwrap());

    let factory = Arc::new(StubEvidenceFactory::with_texts(&[
        ("offtopic", "毎日のごはん日記 フォロワー 2万人"),
        ("small", "投資はじめました 4,999 Followers"),
        ("boundary", "投資はじめました 5,000 Followers"),
    ]));

    let pool = VerifyPool::new(
        factory,
        test_policy(),
        verify_settings(1),
        store.clone(),
        no_stop(),
    );

    let (accepted, stats) = pool
        .run(
            vec![
                candidate("offtopic", "", None),
                candidate("small", "", None),
                candidate("boundary", "", None),
            ],
            events(),
        )
        .await;

    // Inclusive lower bound: exactly 5,000 is in; 4,999 is out.
    assert_eq!(accepted.len(), 1);
    assert!(accepted[0].url.contains("boundary"));
    assert_eq!(stats.rejected_off_topic, 1);
    assert_eq!(stats.rejected_threshold, 1);
}

#[tokio::test]
async fn verify_flags_unknown_counts_for_manual_review() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("worklist.csv");
    let store: Arc<dyn CheckpointStore> = Arc::new(CsvWorklist::open(&path).unwrap());

    let factory = Arc::new(StubEvidenceFactory::with_texts(&[(
        "alice",
        "資産形成を発信中（数字の記載なし）",
    )]));

    let pool = VerifyPool::new(
        factory,
        test_policy(),
        verify_settings(1),
        store.clone(),
        no_stop(),
    );

    let (accepted, stats) = pool.run(vec![candidate("alice", "", None)], events()).await;

    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].followers, None);
    assert_eq!(accepted[0].note, "needs manual verification");
    assert_eq!(stats.accepted_needs_review, 1);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("needs review"));
}

#[tokio::test]
async fn resume_is_idempotent_and_issues_no_queries_for_decided_identities() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("worklist.csv");

    let candidates = vec![
        candidate("alice", "", None),
        candidate("bob", "", None),
    ];

    // First run to completion.
    {
        let store: Arc<dyn CheckpointStore> = Arc::new(CsvWorklist::open(&path).unwrap());
        let factory = Arc::new(StubEvidenceFactory::with_texts(&[
            ("alice", "資産形成 フォロワー 1.2万人"),
            ("bob", "投資ブログ 12.5K Followers"),
        ]));
        let pool = VerifyPool::new(
            factory,
            test_policy(),
            verify_settings(1),
            store,
            no_stop(),
        );
        let (accepted, _) = pool.run(candidates.clone(), events()).await;
        assert_eq!(accepted.len(), 2);
    }
    let first_run = std::fs::read_to_string(&path).unwrap();

    // Second run with the durable store from the first: zero new records,
    // zero evidence lookups.
    let store: Arc<dyn CheckpointStore> = Arc::new(CsvWorklist::open(&path).unwrap());
    assert_eq!(store.decided_count(), 2);

    let factory = Arc::new(StubEvidenceFactory::with_texts(&[
        ("alice", "資産形成 フォロワー 1.2万人"),
        ("bob", "投資ブログ 12.5K Followers"),
    ]));
    let pool = VerifyPool::new(
        factory.clone(),
        test_policy(),
        verify_settings(1),
        store,
        no_stop(),
    );
    let (accepted, stats) = pool.run(candidates, events()).await;

    assert!(accepted.is_empty());
    assert_eq!(stats.skipped_decided, 2);
    assert!(factory.lookups().is_empty());

    let second_run = std::fs::read_to_string(&path).unwrap();
    assert_eq!(first_run, second_run);
}
