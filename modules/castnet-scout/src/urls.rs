//! Profile-URL canonicalization and the shared dedup index.
//!
//! Search results mix profile pages with post, reel, and listing URLs.
//! Only profile pages survive; everything else is rejected before it can
//! reach the candidate set.

use std::collections::HashSet;
use std::sync::Mutex;

/// Path segments that mark a non-profile page anywhere in the path.
const EXCLUDED_SEGMENTS: &[&str] = &[
    "p", "reel", "reels", "stories", "explore", "tags", "tv", "tagged", "popular", "accounts",
];

/// Extract the canonical identity (profile handle) from a raw result URL,
/// or `None` when the URL is not a profile page on the target platform.
///
/// The query string is dropped during canonicalization so tracking and
/// locale variants (`?hl=en`) collapse onto the same identity.
pub fn canonical_identity(raw: &str, platform_host: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;

    let host = parsed.host_str()?;
    if !host_matches(host, platform_host) {
        return None;
    }

    let segments: Vec<&str> = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if segments
        .iter()
        .any(|s| EXCLUDED_SEGMENTS.contains(&s.to_lowercase().as_str()))
    {
        return None;
    }

    let identity = *segments.first()?;
    if !is_valid_handle(identity) {
        return None;
    }
    Some(identity.to_string())
}

/// Rebuild the canonical profile URL for an identity.
pub fn canonical_url(platform_host: &str, identity: &str) -> String {
    format!("https://{platform_host}/{identity}/")
}

fn host_matches(host: &str, platform_host: &str) -> bool {
    let strip = |h: &str| h.strip_prefix("www.").map(str::to_string).unwrap_or_else(|| h.to_string());
    strip(host).eq_ignore_ascii_case(&strip(platform_host))
}

/// Platform handles: letters, digits, dot, underscore, dash.
fn is_valid_handle(identity: &str) -> bool {
    !identity.is_empty()
        && identity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

// ---------------------------------------------------------------------------
// DedupIndex
// ---------------------------------------------------------------------------

/// Set of identities already seen this run (and, when seeded, across
/// resumed runs). Check-and-insert is atomic with respect to concurrent
/// harvest workers: exactly one caller wins for any identity.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: Mutex<HashSet<String>>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with identities decided in prior runs.
    pub fn seed<I: IntoIterator<Item = String>>(&self, identities: I) {
        let mut seen = self.seen.lock().expect("dedup index poisoned");
        seen.extend(identities);
    }

    /// Returns true iff this caller inserted the identity (first sighting).
    pub fn insert(&self, identity: &str) -> bool {
        let mut seen = self.seen.lock().expect("dedup index poisoned");
        seen.insert(identity.to_string())
    }

    pub fn contains(&self, identity: &str) -> bool {
        let seen = self.seen.lock().expect("dedup index poisoned");
        seen.contains(identity)
    }

    pub fn len(&self) -> usize {
        let seen = self.seen.lock().expect("dedup index poisoned");
        seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
