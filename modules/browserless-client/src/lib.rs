pub mod error;

pub use error::{BrowserlessError, Result};

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::info;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static SCRIPT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<noscript[^>]*>.*?</noscript>",
    )
    .unwrap()
});
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Fetch fully-rendered HTML for a URL via the /content endpoint.
    pub async fn content(&self, url: &str) -> Result<String> {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({ "url": url });

        let resp = self
            .client
            .post(&endpoint)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }

    /// Open a page session bound to this client. Each session holds at
    /// most one rendered page and is owned by a single worker.
    pub fn session(&self) -> PageSession {
        PageSession {
            client: BrowserlessClient {
                client: self.client.clone(),
                base_url: self.base_url.clone(),
                token: self.token.clone(),
            },
            page: None,
        }
    }
}

struct RenderedPage {
    url: String,
    html: String,
}

/// Blocking-style page session: navigate, then read text or title from the
/// rendered document. Reads before the first navigation are errors, not
/// panics.
pub struct PageSession {
    client: BrowserlessClient,
    page: Option<RenderedPage>,
}

impl PageSession {
    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        let html = self.client.content(url).await?;
        info!(url, bytes = html.len(), "Page rendered");
        self.page = Some(RenderedPage {
            url: url.to_string(),
            html,
        });
        Ok(())
    }

    pub fn current_url(&self) -> Option<&str> {
        self.page.as_ref().map(|p| p.url.as_str())
    }

    /// Visible text of the current page: scripts/styles removed, tags
    /// stripped, whitespace collapsed.
    pub fn visible_text(&self) -> Result<String> {
        let page = self.page.as_ref().ok_or(BrowserlessError::NoPage)?;
        let without_scripts = SCRIPT_RE.replace_all(&page.html, " ");
        let without_tags = TAG_RE.replace_all(&without_scripts, " ");
        let decoded = decode_entities(&without_tags);
        Ok(SPACE_RE.replace_all(&decoded, " ").trim().to_string())
    }

    pub fn page_title(&self) -> Result<String> {
        let page = self.page.as_ref().ok_or(BrowserlessError::NoPage)?;
        let title = TITLE_RE
            .captures(&page.html)
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str()).trim().to_string())
            .unwrap_or_default();
        Ok(title)
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}
