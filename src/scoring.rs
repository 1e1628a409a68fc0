//! Scoring functions for guild search results

use crate::types::*;
use chrono::{DateTime, Utc};

const FULL_QUERY_BONUS: u32 = 10;
const WORD_MATCH_BONUS: u32 = 2;
const HOT_TIER_BONUS: u32 = 3;

/// Case-insensitive substring match of the whole query
pub fn matches_query(message: &MessageContext, query: &str) -> bool {
    message
        .searchable_text()
        .to_lowercase()
        .contains(&query.to_lowercase())
}

/// Bonus for the most recent age bucket the message falls into
pub fn recency_bonus(age_hours: i64) -> u32 {
    match age_hours {
        h if h < 24 => 5,
        h if h < 168 => 3,
        h if h < 720 => 1,
        _ => 0,
    }
}

/// Additive relevance: full-query hit, per-word hits, recency bucket, hot tier
pub fn relevance_score(message: &MessageContext, query: &str, now: DateTime<Utc>) -> u32 {
    let content = message.searchable_text().to_lowercase();
    let query = query.to_lowercase();

    let mut score = 0;
    if content.contains(&query) {
        score += FULL_QUERY_BONUS;
    }
    score += query
        .split_whitespace()
        .filter(|word| content.contains(*word))
        .count() as u32
        * WORD_MATCH_BONUS;

    score += recency_bonus((now - message.created_at).num_hours());

    if message.tier == Tier::Hot {
        score += HOT_TIER_BONUS;
    }

    score
}

/// Highest relevance first. Stable, so equal scores keep their discovery order.
pub fn rank_results(results: &mut Vec<SearchResult>, limit: usize) {
    results.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    results.truncate(limit);
}
