//! Keyword-based question analysis.

use super::ports::QueryAnalyzer;
use crate::state::QueryAnalysis;

const STOP_WORDS: &[&str] = &[
    "a", "all", "an", "and", "are", "average", "avg", "by", "chart", "compare", "count", "do",
    "does", "each", "find", "for", "from", "get", "give", "graph", "has", "have", "how", "in",
    "is", "list", "many", "max", "maximum", "me", "mean", "min", "minimum", "much", "number",
    "of", "on", "per", "plot", "please", "show", "sum", "than", "the", "their", "there", "to",
    "top", "total", "trend", "versus", "vs", "was", "were", "what", "which", "who", "with",
    "distribution", "highest", "lowest", "most", "least",
];

const CONNECTORS: &[&str] = &["per", "by", "each"];

const AGGREGATIONS: &[(&str, &[&str])] = &[
    ("count", &["how many", "count", "number of", "多少", "数量", "几个"]),
    ("sum", &["sum", "total", "总数", "总和", "合计"]),
    ("avg", &["average", "avg", "mean", "平均"]),
    ("max", &["max", "maximum", "highest", "most", "最大", "最高", "最多"]),
    ("min", &["min", "minimum", "lowest", "least", "最小", "最低", "最少"]),
];

const TIME_TERMS: &[&str] = &[
    "trend", "daily", "weekly", "monthly", "yearly", "year", "month", "week", "day", "date",
    "over time", "趋势", "年", "月", "日", "时间",
];

const COMPARISON_TERMS: &[&str] = &["compare", "comparison", "versus", "vs", "比较", "对比"];

const VISUALIZATION_TERMS: &[&str] = &[
    "图表", "趋势", "分布", "比较", "chart", "plot", "graph", "trend", "distribution",
    "compare", "visualize",
];

/// Extracts entities, aggregations and intent flags with word lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordQueryAnalyzer;

impl KeywordQueryAnalyzer {
    /// Creates an analyzer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Matches whole words for ASCII terms and substrings for everything else.
fn mentions(lowered: &str, tokens: &[String], term: &str) -> bool {
    if term.is_ascii() {
        if term.contains(' ') {
            format!(" {} ", tokens.join(" ")).contains(&format!(" {term} "))
        } else {
            tokens.iter().any(|t| t == term)
        }
    } else {
        lowered.contains(term)
    }
}

impl QueryAnalyzer for KeywordQueryAnalyzer {
    fn analyze(&self, query: &str) -> QueryAnalysis {
        let lowered = query.to_lowercase();
        let tokens = words(query);

        let mut entities: Vec<String> = Vec::new();
        for token in &tokens {
            let is_content = token.chars().count() > 1
                && !STOP_WORDS.contains(&token.as_str())
                && !token.chars().all(|c| c.is_ascii_digit());
            if is_content && !entities.contains(token) {
                entities.push(token.clone());
            }
        }

        let relationships = tokens
            .windows(3)
            .filter(|w| CONNECTORS.contains(&w[1].as_str()))
            .filter(|w| !STOP_WORDS.contains(&w[0].as_str()) && !STOP_WORDS.contains(&w[2].as_str()))
            .map(|w| w.join(" "))
            .collect();

        let aggregations = AGGREGATIONS
            .iter()
            .filter(|(_, terms)| terms.iter().any(|t| mentions(&lowered, &tokens, t)))
            .map(|(name, _)| (*name).to_string())
            .collect();

        let any = |terms: &[&str]| terms.iter().any(|t| mentions(&lowered, &tokens, t));

        QueryAnalysis {
            query: query.to_string(),
            entities,
            relationships,
            aggregations,
            has_time_dimension: any(TIME_TERMS),
            has_comparison: any(COMPARISON_TERMS),
            wants_visualization: any(VISUALIZATION_TERMS),
        }
    }
}
