pub mod error;

pub use error::{DdgError, Result};

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::info;

const ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// One organic result from the HTML endpoint. Snippets are not guaranteed.
#[derive(Debug, Clone)]
pub struct DdgResult {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

static RESULT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap()
});
static SNIPPET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#).unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());

pub struct DdgClient {
    client: reqwest::Client,
}

impl DdgClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build HTTP client");
        Self { client }
    }

    /// Run one search against the HTML endpoint. `region` is the `kl`
    /// locale hint, e.g. "jp-jp". Results are truncated to `max_results`;
    /// the endpoint may return fewer, or none, on any given call.
    pub async fn search(
        &self,
        query: &str,
        region: &str,
        max_results: usize,
    ) -> Result<Vec<DdgResult>> {
        let resp = self
            .client
            .get(ENDPOINT)
            .query(&[("q", query), ("kl", region)])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            // 403/429 here means the endpoint is throttling us.
            return Err(DdgError::Blocked {
                status: status.as_u16(),
            });
        }

        let html = resp.text().await?;
        let results = parse_results(&html, max_results);
        info!(query, count = results.len(), "DuckDuckGo search complete");
        Ok(results)
    }
}

impl Default for DdgClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Pair each result link with the snippet that follows it in document
/// order. A result with no snippet before the next link keeps an empty one.
fn parse_results(html: &str, max_results: usize) -> Vec<DdgResult> {
    let links: Vec<_> = RESULT_LINK_RE.captures_iter(html).collect();
    let mut snippets = SNIPPET_RE.captures_iter(html).peekable();

    let mut results = Vec::new();
    for (i, link) in links.iter().enumerate() {
        if results.len() >= max_results {
            break;
        }
        let href = link.get(1).map_or("", |m| m.as_str());
        let title = strip_tags(link.get(2).map_or("", |m| m.as_str()));

        let link_end = link.get(0).map_or(0, |m| m.end());
        let next_start = links
            .get(i + 1)
            .and_then(|l| l.get(0))
            .map_or(usize::MAX, |m| m.start());

        let mut snippet = String::new();
        while let Some(cap) = snippets.peek() {
            let start = cap.get(0).map_or(0, |m| m.start());
            if start < link_end {
                snippets.next();
                continue;
            }
            if start < next_start {
                snippet = strip_tags(cap.get(1).map_or("", |m| m.as_str()));
                snippets.next();
            }
            break;
        }

        let url = unwrap_redirect(href);
        if url.is_empty() {
            continue;
        }
        results.push(DdgResult { url, title, snippet });
    }
    results
}

/// The endpoint wraps outbound links in `//duckduckgo.com/l/?uddg=<url>`.
/// Unwrap to the real destination; pass direct links through.
fn unwrap_redirect(href: &str) -> String {
    if !href.contains("/l/?") && !href.contains("/l/%3F") {
        return href.to_string();
    }
    let absolute = if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };
    match url::Url::parse(&absolute) {
        Ok(parsed) => parsed
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

fn strip_tags(fragment: &str) -> String {
    let text = TAG_RE.replace_all(fragment, "");
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ")
        .trim()
        .to_string()
}
