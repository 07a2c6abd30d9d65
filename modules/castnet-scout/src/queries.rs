//! Query planning: expand the topic and modifier axes into the full
//! search-query space and randomize execution order per run.

use rand::seq::SliceRandom;

use castnet_common::TargetProfile;

/// Search backends reject overlong queries; only the highest-priority
/// disallowed keywords make it into the exclusion clause.
const MAX_EXCLUDED_TERMS: usize = 5;

/// One planned harvest query. Immutable once generated; consumed exactly
/// once per harvest pass.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Full rendered query text, site clause and exclusions included.
    pub text: String,
    /// The human-facing keyword combination, for provenance.
    pub keywords: String,
}

/// Expand a profile into the full shuffled query plan: every
/// topic × modifier pair plus each bare topic.
pub fn plan(profile: &TargetProfile) -> Vec<SearchQuery> {
    let exclusion = exclusion_clause(&profile.disallowed);
    let mut queries = Vec::new();

    for topic in &profile.topics {
        for modifier in &profile.modifiers {
            let keywords = format!("{topic} {modifier}");
            queries.push(render(profile.platform_host, &keywords, &exclusion));
        }
    }
    for topic in &profile.topics {
        queries.push(render(profile.platform_host, topic, &exclusion));
    }

    // Randomized order, a best-effort anti-throttling measure.
    queries.shuffle(&mut rand::rng());
    queries
}

/// Query scoped to a single identity, used by the verification pass.
pub fn scoped_query(platform_host: &str, identity: &str) -> String {
    format!("site:{}/{identity}", bare_host(platform_host))
}

fn render(platform_host: &str, keywords: &str, exclusion: &str) -> SearchQuery {
    let mut text = format!("site:{} {keywords}", bare_host(platform_host));
    if !exclusion.is_empty() {
        text.push(' ');
        text.push_str(exclusion);
    }
    SearchQuery {
        text,
        keywords: keywords.to_string(),
    }
}

fn exclusion_clause(disallowed: &[&'static str]) -> String {
    disallowed
        .iter()
        .take(MAX_EXCLUDED_TERMS)
        .map(|w| format!("-{w}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Site clauses use the bare domain, not the www host.
fn bare_host(platform_host: &str) -> &str {
    platform_host.strip_prefix("www.").unwrap_or(platform_host)
}
