/// Keyword policy evaluated against evidence text at every stage.
///
/// Matching is exact, case-sensitive substring against the verbatim
/// keyword lists: no case, width, or script-variant folding. The lists
/// themselves encode any variants that matter (e.g. both "FX" and "ＦＸ").
#[derive(Debug, Clone)]
pub struct KeywordPolicy {
    /// At least one must appear in accepted evidence (verification stage).
    pub required_topics: Vec<String>,
    /// Any hit anywhere is an immediate, unconditional rejection.
    pub disallowed: Vec<String>,
    /// Inclusive lower bound on the follower estimate.
    pub min_followers: u64,
    /// Inclusive upper bound, when set. Screens out oversized accounts.
    pub max_followers: Option<u64>,
}

/// Outcome of the disallowed-keyword check. Disallowed hits take
/// precedence over topic matches and numeric thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Allowed,
    /// Which keyword fired, for the decision note.
    Disallowed(String),
}

/// Outcome of the numeric threshold check. An absent estimate is
/// "unknown", not zero: it passes through flagged for manual review,
/// uniformly at every stage, and is never silently dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdCheck {
    Pass,
    PassNeedsReview,
    Fail,
}

impl KeywordPolicy {
    /// Check evidence text against the disallowed list, short-circuiting
    /// on the first hit.
    pub fn classify(&self, text: &str) -> Classification {
        if text.is_empty() {
            // No evidence is not a violation; later stages decide.
            return Classification::Allowed;
        }
        for keyword in &self.disallowed {
            if text.contains(keyword.as_str()) {
                return Classification::Disallowed(keyword.clone());
            }
        }
        Classification::Allowed
    }

    /// True iff at least one required-topic keyword appears in the text.
    pub fn meets_topic(&self, text: &str) -> bool {
        self.required_topics
            .iter()
            .any(|keyword| text.contains(keyword.as_str()))
    }

    pub fn meets_threshold(&self, estimate: Option<u64>) -> ThresholdCheck {
        match estimate {
            None => ThresholdCheck::PassNeedsReview,
            Some(n) => {
                if n < self.min_followers {
                    return ThresholdCheck::Fail;
                }
                if let Some(max) = self.max_followers {
                    if n > max {
                        return ThresholdCheck::Fail;
                    }
                }
                ThresholdCheck::Pass
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> KeywordPolicy {
        KeywordPolicy {
            required_topics: vec!["資産".into(), "投資".into(), "NISA".into()],
            disallowed: vec!["FX".into(), "バイナリー".into(), "仮想通貨".into()],
            min_followers: 5000,
            max_followers: Some(500_000),
        }
    }

    #[test]
    fn disallowed_hit_short_circuits() {
        let p = policy();
        assert_eq!(
            p.classify("資産形成とFX自動売買"),
            Classification::Disallowed("FX".to_string())
        );
    }

    #[test]
    fn disallowed_wins_even_with_topic_present() {
        let p = policy();
        let text = "NISAで資産形成、バイナリーオプションも";
        assert!(p.meets_topic(text));
        assert!(matches!(p.classify(text), Classification::Disallowed(_)));
    }

    #[test]
    fn matching_is_case_sensitive() {
        let p = policy();
        // "fx" lowercase is not in the list; only verbatim entries match.
        assert_eq!(p.classify("fx trading"), Classification::Allowed);
    }

    #[test]
    fn empty_text_is_allowed_and_off_topic() {
        let p = policy();
        assert_eq!(p.classify(""), Classification::Allowed);
        assert!(!p.meets_topic(""));
    }

    #[test]
    fn threshold_lower_bound_is_inclusive() {
        let p = policy();
        assert_eq!(p.meets_threshold(Some(5000)), ThresholdCheck::Pass);
        assert_eq!(p.meets_threshold(Some(4999)), ThresholdCheck::Fail);
    }

    #[test]
    fn threshold_upper_bound_is_inclusive() {
        let p = policy();
        assert_eq!(p.meets_threshold(Some(500_000)), ThresholdCheck::Pass);
        assert_eq!(p.meets_threshold(Some(500_001)), ThresholdCheck::Fail);
    }

    #[test]
    fn unknown_estimate_passes_flagged() {
        let p = policy();
        assert_eq!(p.meets_threshold(None), ThresholdCheck::PassNeedsReview);
    }
}
