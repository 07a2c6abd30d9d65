//! Heuristic extraction of structured signals from free-form search
//! snippet and title text. Everything here is total: malformed input
//! resolves to the unknown sentinel, never a panic.

use std::sync::LazyLock;

use regex::Regex;

/// Result of follower-count extraction. `estimate: None` means no numeric
/// signal was found, distinct from an evidenced zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowerSignal {
    pub estimate: Option<u64>,
    /// The raw phrase the estimate was parsed from, for the worklist note.
    pub phrase: Option<String>,
}

// Notation families, in priority order. Snippets mix Japanese ten-thousand
// notation ("1.2万人"), Latin K/M abbreviations, and plain grouped
// integers, in either "フォロワー 1.2万人" or "12.5K Followers" order.
static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"フォロワー[:：\s]*([\d,.]+万?)\s*人?").unwrap(),
        Regex::new(r"([\d,.]+万)\s*人?\s*フォロワー").unwrap(),
        Regex::new(r"(?i)([\d,.]+[KM]?)\s*Followers").unwrap(),
        Regex::new(r"(?i)Followers:?\s*([\d,.]+[KM]?)").unwrap(),
    ]
});

/// Parse a follower-count estimate out of evidence text. Patterns are
/// tried in priority order; the first capture that parses wins; a capture
/// that fails to parse falls through to the next pattern.
pub fn follower_estimate(text: &str) -> FollowerSignal {
    if text.is_empty() {
        return FollowerSignal::default();
    }

    for pattern in PATTERNS.iter() {
        for cap in pattern.captures_iter(text) {
            let Some(raw) = cap.get(1) else { continue };
            if let Some(estimate) = parse_count(raw.as_str()) {
                return FollowerSignal {
                    estimate: Some(estimate),
                    phrase: cap.get(0).map(|m| m.as_str().trim().to_string()),
                };
            }
        }
    }

    FollowerSignal::default()
}

/// Parse one captured count: strip thousands separators, apply the 万 /
/// K / M multiplier, round down to a whole count.
fn parse_count(raw: &str) -> Option<u64> {
    let raw = raw.replace(',', "");
    let (digits, multiplier) = if let Some(stripped) = raw.strip_suffix('万') {
        (stripped.to_string(), 10_000.0)
    } else if raw.ends_with('K') || raw.ends_with('k') {
        (raw[..raw.len() - 1].to_string(), 1_000.0)
    } else if raw.ends_with('M') || raw.ends_with('m') {
        (raw[..raw.len() - 1].to_string(), 1_000_000.0)
    } else {
        (raw, 1.0)
    };

    let value: f64 = digits.parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier) as u64)
}

// ---------------------------------------------------------------------------
// Display names
// ---------------------------------------------------------------------------

/// Boilerplate the platform appends to profile page titles.
const PLATFORM_SUFFIXES: &[&str] = &[
    "• Instagram photos and videos",
    "• Instagram photos",
    "• Instagram",
];

pub const UNKNOWN_NAME: &str = "unknown";

/// Extract a display name from a result/page title. Falls through a fixed
/// chain of heuristics and reports `"unknown"` rather than failing;
/// empty and malformed titles are fine.
pub fn display_name(title: &str) -> String {
    let mut title = title.trim().to_string();
    if title.is_empty() {
        return UNKNOWN_NAME.to_string();
    }

    for suffix in PLATFORM_SUFFIXES {
        if let Some(stripped) = title.strip_suffix(suffix) {
            title = stripped.trim().to_string();
            break;
        }
    }

    // "Name (@handle) ..." is the common profile title form.
    if let Some(idx) = title.find("(@") {
        let name = title[..idx].trim();
        if !name.is_empty() {
            return name.to_string();
        }
    }

    // Delimiter heuristics, in priority order.
    for delimiter in [" • ", " | "] {
        if let Some((head, _)) = title.split_once(delimiter) {
            let name = head.trim();
            if !name.is_empty() && !name.starts_with("http") {
                return name.to_string();
            }
        }
    }

    // Localized titles often read "<name>さん Instagram ..."; take the
    // part before the platform name.
    if let Some((head, _)) = title.split_once("Instagram") {
        let name = head.trim();
        if name.chars().count() > 1 {
            return name.to_string();
        }
    }

    if let Some((head, _)) = title.split_once(" - ") {
        let name = head.trim();
        if !name.is_empty() && !name.starts_with("http") {
            return name.to_string();
        }
    }

    let name = title.trim();
    if !name.is_empty() && !name.starts_with("http") && name.chars().count() < 100 {
        return name.to_string();
    }

    UNKNOWN_NAME.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_japanese_ten_thousand_notation() {
        let signal = follower_estimate("フォロワー 1.2万人");
        assert_eq!(signal.estimate, Some(12_000));
        assert_eq!(signal.phrase.as_deref(), Some("フォロワー 1.2万人"));
    }

    #[test]
    fn parses_reversed_japanese_order() {
        let signal = follower_estimate("1.5万人フォロワーの主婦アカウント");
        assert_eq!(signal.estimate, Some(15_000));
    }

    #[test]
    fn parses_k_abbreviation() {
        assert_eq!(follower_estimate("12.5K Followers").estimate, Some(12_500));
        assert_eq!(follower_estimate("10k followers").estimate, Some(10_000));
    }

    #[test]
    fn parses_m_abbreviation() {
        assert_eq!(follower_estimate("1.1M Followers").estimate, Some(1_100_000));
    }

    #[test]
    fn parses_plain_grouped_integer() {
        assert_eq!(follower_estimate("8,400 Followers").estimate, Some(8_400));
    }

    #[test]
    fn parses_followers_prefix_order() {
        assert_eq!(follower_estimate("Followers: 9,000").estimate, Some(9_000));
    }

    #[test]
    fn no_signal_resolves_to_unknown_not_zero() {
        let signal = follower_estimate("no follower info here");
        assert_eq!(signal.estimate, None);
        assert_eq!(signal.phrase, None);
    }

    #[test]
    fn empty_text_is_unknown() {
        assert_eq!(follower_estimate("").estimate, None);
    }

    #[test]
    fn display_name_from_handle_marker() {
        assert_eq!(
            display_name("ゆか｜ズボラ家計管理 (@yuka_kakei) • Instagram photos and videos"),
            "ゆか｜ズボラ家計管理"
        );
    }

    #[test]
    fn display_name_from_bullet_delimiter() {
        assert_eq!(display_name("Alice • budget coach"), "Alice");
    }

    #[test]
    fn display_name_from_pipe_delimiter() {
        assert_eq!(display_name("Bob | 資産形成の記録"), "Bob");
    }

    #[test]
    fn display_name_before_platform_word() {
        assert_eq!(display_name("はな Instagramの人気アカウント"), "はな");
    }

    #[test]
    fn display_name_handles_empty_and_garbage() {
        assert_eq!(display_name(""), UNKNOWN_NAME);
        assert_eq!(display_name("   "), UNKNOWN_NAME);
        assert_eq!(display_name("https://example.test/x"), UNKNOWN_NAME);
    }
}
