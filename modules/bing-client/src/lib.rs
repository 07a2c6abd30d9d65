pub mod error;

pub use error::{BingError, Result};

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::info;

const ENDPOINT: &str = "https://www.bing.com/search";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One organic result block. Snippets are not guaranteed.
#[derive(Debug, Clone)]
pub struct BingResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

// Organic results render as <li class="b_algo"> blocks with an <h2><a>
// title link and a <p> snippet.
static ALGO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<li class="b_algo".*?</li>"#).unwrap()
});
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<h2[^>]*><a[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap()
});
static SNIPPET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<p[^>]*>(.*?)</p>").unwrap());
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

pub struct BingClient {
    client: reqwest::Client,
}

impl BingClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }

    /// Run one search against the result page. `market` is the `cc`
    /// country hint, e.g. "jp".
    pub async fn search(
        &self,
        query: &str,
        market: &str,
        max_results: usize,
    ) -> Result<Vec<BingResult>> {
        let count = max_results.to_string();
        let resp = self
            .client
            .get(ENDPOINT)
            .query(&[("q", query), ("cc", market), ("count", count.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BingError::Blocked {
                status: status.as_u16(),
            });
        }

        let html = resp.text().await?;
        let results = parse_results(&html, max_results);
        info!(query, count = results.len(), "Bing search complete");
        Ok(results)
    }
}

impl Default for BingClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_results(html: &str, max_results: usize) -> Vec<BingResult> {
    let mut results = Vec::new();
    for block in ALGO_RE.find_iter(html).take(max_results) {
        let block = block.as_str();
        let Some(title_cap) = TITLE_RE.captures(block) else {
            continue;
        };
        let url = title_cap.get(1).map_or("", |m| m.as_str()).to_string();
        let title = strip_tags(title_cap.get(2).map_or("", |m| m.as_str()));
        let snippet = SNIPPET_RE
            .captures(block)
            .map(|c| strip_tags(c.get(1).map_or("", |m| m.as_str())))
            .unwrap_or_default();
        if url.is_empty() {
            continue;
        }
        results.push(BingResult { url, title, snippet });
    }
    results
}

fn strip_tags(fragment: &str) -> String {
    let text = TAG_RE.replace_all(fragment, "");
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}
