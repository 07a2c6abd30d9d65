use crate::policy::KeywordPolicy;

/// Per-target search configuration: which platform to mine, which keyword
/// axes span the query space, and the keyword policy applied to evidence.
pub struct TargetProfile {
    pub name: &'static str,
    /// Platform host profile URLs are canonicalized against, e.g.
    /// "www.instagram.com".
    pub platform_host: &'static str,
    /// Topic axis of the query space.
    pub topics: Vec<&'static str>,
    /// Demographic/skill-level modifier axis, crossed with every topic.
    pub modifiers: Vec<&'static str>,
    pub required_topics: Vec<&'static str>,
    pub disallowed: Vec<&'static str>,
    pub min_followers: u64,
    pub max_followers: Option<u64>,
}

impl TargetProfile {
    pub fn policy(&self) -> KeywordPolicy {
        KeywordPolicy {
            required_topics: self.required_topics.iter().map(|s| s.to_string()).collect(),
            disallowed: self.disallowed.iter().map(|s| s.to_string()).collect(),
            min_followers: self.min_followers,
            max_followers: self.max_followers,
        }
    }
}

/// Build the TargetProfile for the given profile key.
/// Panics if the profile is not recognized.
pub fn target_profile(name: &str) -> TargetProfile {
    match name {
        "jp-finance" => jp_finance_profile(),
        other => panic!("Unknown profile: {other}. Supported: jp-finance"),
    }
}

pub fn has_profile(name: &str) -> bool {
    matches!(name, "jp-finance")
}

// ---------------------------------------------------------------------------
// Japanese personal-finance / asset-building creators
// ---------------------------------------------------------------------------

fn jp_finance_profile() -> TargetProfile {
    TargetProfile {
        name: "Japanese personal finance (資産形成・不動産)",
        platform_host: "www.instagram.com",
        topics: vec!["不動産", "不動産投資", "資産形成"],
        modifiers: vec![
            "初心者", "ロードマップ", "始め方", "主婦", "ママ",
            "共働き", "20代", "30代", "40代", "低収入",
            "公務員", "看護師", "会社員", "ズボラ",
        ],
        required_topics: vec![
            "資産", "投資", "NISA", "お金", "マネー",
            "株", "貯金", "FP", "ファイナンシャル", "不動産",
            "配当", "優待", "債券", "運用", "貯蓄",
        ],
        disallowed: vec![
            "FX", "fx", "ＦＸ", "バイナリー", "暗号資産", "仮想通貨", "ビットコイン", "BTC",
            "自動売買", "EA", "ツール", "サイン", "先出し", "爆益", "日利", "月利",
            "ギャンブル", "バカラ", "競艇", "競馬", "パチンコ", "オンラインカジノ",
            "借金返済", "即日", "現金", "プレゼント", "副業紹介", "コンサル生募集",
        ],
        min_followers: 5000,
        max_followers: Some(500_000),
    }
}
