use serde::{Deserialize, Serialize};

/// One entry returned by a search collaborator. Any field may be empty;
/// the backends guarantee neither snippets nor titles for a given result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

impl SearchHit {
    /// Title and snippet joined into the single evidence blob the
    /// classifiers operate on.
    pub fn evidence(&self) -> String {
        format!("{} {}", self.title, self.snippet)
    }
}

/// Lifecycle of a discovered profile identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionState {
    Unseen,
    Harvested,
    VerifiedAccepted,
    VerifiedRejected,
}

/// A discovered profile under evaluation. Created by the harvest pool on
/// first sighting; only the verification pool moves `state` past
/// `Harvested`. Keyed by `identity`, the canonical handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub identity: String,
    pub url: String,
    /// The query that first surfaced this identity (provenance).
    pub origin_query: String,
    pub display_name: String,
    /// Raw title + snippet text the identity was judged on so far.
    pub evidence: String,
    /// Best-effort follower estimate. `None` means no numeric signal was
    /// found, never coerced to zero.
    pub followers: Option<u64>,
    pub state: DecisionState,
}

/// Append-only durable record of an accepted identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedRecord {
    pub url: String,
    pub name: String,
    /// `None` serializes as "needs review" in the worklist.
    pub followers: Option<u64>,
    pub note: String,
}

impl AcceptedRecord {
    pub fn identity_from_url(url: &str) -> Option<String> {
        let trimmed = url.trim().trim_end_matches('/');
        trimmed.rsplit('/').next().filter(|s| !s.is_empty()).map(str::to_string)
    }
}
