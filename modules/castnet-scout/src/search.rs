use anyhow::Result;
use async_trait::async_trait;

use castnet_common::SearchHit;

// --- SearchProvider trait ---

/// One search session against an external backend. The backend returns a
/// non-deterministic, possibly empty, possibly truncated result sequence
/// and may throttle sustained request rates.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, region: &str, max_results: usize)
        -> Result<Vec<SearchHit>>;
    fn name(&self) -> &str;
}

// --- SearchFactory trait ---

/// Opens one dedicated session per worker. Sessions are never shared
/// across workers; a worker owns its session from start to exit.
pub trait SearchFactory: Send + Sync {
    fn open_session(&self) -> Box<dyn SearchProvider>;
}

// --- DuckDuckGo ---

pub struct DdgSearcher {
    client: ddg_client::DdgClient,
}

impl DdgSearcher {
    pub fn new() -> Self {
        Self {
            client: ddg_client::DdgClient::new(),
        }
    }
}

impl Default for DdgSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for DdgSearcher {
    async fn search(
        &self,
        query: &str,
        region: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>> {
        let results = self.client.search(query, region, max_results).await?;
        Ok(results
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.snippet,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "duckduckgo"
    }
}

pub struct DdgFactory;

impl SearchFactory for DdgFactory {
    fn open_session(&self) -> Box<dyn SearchProvider> {
        Box::new(DdgSearcher::new())
    }
}

// --- Bing ---

pub struct BingSearcher {
    client: bing_client::BingClient,
}

impl BingSearcher {
    pub fn new() -> Self {
        Self {
            client: bing_client::BingClient::new(),
        }
    }
}

impl Default for BingSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SearchProvider for BingSearcher {
    async fn search(
        &self,
        query: &str,
        region: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>> {
        // Bing takes a bare country code ("jp-jp" → "jp").
        let market = region.split('-').next().unwrap_or(region);
        let results = self.client.search(query, market, max_results).await?;
        Ok(results
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.snippet,
            })
            .collect())
    }

    fn name(&self) -> &str {
        "bing"
    }
}

pub struct BingFactory;

impl SearchFactory for BingFactory {
    fn open_session(&self) -> Box<dyn SearchProvider> {
        Box::new(BingSearcher::new())
    }
}
