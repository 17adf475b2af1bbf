//! Per-step choice between vector, keyword and hybrid search

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::errors::Result;
use crate::rag::strategy::StrategyCore;
use crate::vector_store::SearchFilter;
use crate::vector_store::SearchHit;

/// Rank constant for reciprocal rank fusion
pub const RRF_K: f32 = 60.0;

const OPEN_ENDED_OPENERS: &[&str] = &["why", "how", "explain", "describe", "discuss"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Vector,
    Keyword,
    Hybrid,
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector => write!(f, "vector"),
            Self::Keyword => write!(f, "keyword"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// Search strategy picked for a sub-question, with the rule that picked it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyChoice {
    pub strategy: SearchStrategy,
    pub reason: String,
}

/// Picks and runs the search strategy for each research step
#[derive(Debug, Clone, Copy)]
pub struct RetrievalSupervisor {
    rrf_k: f32,
}

impl Default for RetrievalSupervisor {
    fn default() -> Self {
        Self { rrf_k: RRF_K }
    }
}

impl RetrievalSupervisor {
    /// Create a supervisor fusing hybrid results with the given RRF constant
    #[must_use]
    pub fn new(rrf_k: f32) -> Self {
        Self { rrf_k }
    }

    /// Identifiers favour exact matching, open-ended questions favour semantics
    #[must_use]
    pub fn choose(&self, sub_question: &str) -> StrategyChoice {
        if let Some(token) = find_identifier(sub_question) {
            return StrategyChoice {
                strategy: SearchStrategy::Keyword,
                reason: format!("contains identifier {token}"),
            };
        }

        let opener = sub_question
            .split_whitespace()
            .next()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .unwrap_or_default();
        if OPEN_ENDED_OPENERS.contains(&opener.as_str()) {
            return StrategyChoice {
                strategy: SearchStrategy::Vector,
                reason: format!("open-ended question starting with '{opener}'"),
            };
        }

        StrategyChoice {
            strategy: SearchStrategy::Hybrid,
            reason: "no strong lexical or semantic signal".to_string(),
        }
    }

    /// Run `strategy` for one sub-question; hybrid search degrades to whichever side succeeded
    pub async fn execute(
        &self,
        core: &StrategyCore,
        strategy: SearchStrategy,
        sub_question: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> Result<Vec<SearchHit>> {
        match strategy {
            SearchStrategy::Vector => core.vector_search(sub_question, filter, limit).await,
            SearchStrategy::Keyword => core.keyword_search(sub_question, filter, limit).await,
            SearchStrategy::Hybrid => {
                let (vector, keyword) = futures::join!(
                    core.vector_search(sub_question, filter, limit),
                    core.keyword_search(sub_question, filter, limit)
                );
                let sets = match (vector, keyword) {
                    (Ok(vector), Ok(keyword)) => vec![vector, keyword],
                    (Ok(only), Err(e)) | (Err(e), Ok(only)) => {
                        warn!("Hybrid search degraded to a single list: {}", e);
                        vec![only]
                    }
                    (Err(e), Err(_)) => return Err(e),
                };
                let mut fused = reciprocal_rank_fusion(sets, self.rrf_k);
                fused.truncate(limit);
                debug!("Hybrid search fused {} hits", fused.len());
                Ok(fused)
            }
        }
    }
}

/// Reciprocal Rank Fusion over several ranked lists
///
/// Each hit keeps its best raw score; the fused score is recorded as `rrf_score`
/// and determines the order.
#[must_use]
pub fn reciprocal_rank_fusion(result_sets: Vec<Vec<SearchHit>>, k: f32) -> Vec<SearchHit> {
    let mut fused: HashMap<String, (f32, SearchHit)> = HashMap::new();

    for results in result_sets {
        for (rank, hit) in results.into_iter().enumerate() {
            let rrf_score = 1.0 / (k + rank as f32 + 1.0);
            let entry = fused
                .entry(hit.id.clone())
                .or_insert_with(|| (0.0, hit.clone()));
            entry.0 += rrf_score;
            if hit.score > entry.1.score {
                entry.1.score = hit.score;
            }
        }
    }

    let mut ranked: Vec<(f32, SearchHit)> = fused.into_values().collect();
    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));
    ranked
        .into_iter()
        .map(|(rrf_score, mut hit)| {
            hit.metadata.insert("rrf_score".to_string(), json!(rrf_score));
            hit
        })
        .collect()
}

fn find_identifier(text: &str) -> Option<String> {
    if let Some(start) = text.find(|c: char| c == '"' || c == '`') {
        let quote = text[start..].chars().next()?;
        let rest = &text[start + quote.len_utf8()..];
        if let Some(end) = rest.find(quote) {
            if end > 0 {
                return Some(format!("{quote}{}{quote}", &rest[..end]));
            }
        }
    }

    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .find(|token| is_identifier(token))
        .map(str::to_string)
}

fn is_identifier(token: &str) -> bool {
    if token.is_empty() {
        return false;
    }
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    let all_caps = token.chars().filter(|c| c.is_alphabetic()).count() >= 2
        && token.chars().all(|c| !c.is_alphabetic() || c.is_uppercase());
    let snake = token.contains('_') && token.trim_matches('_').contains('_');
    let camel = token
        .chars()
        .zip(token.chars().skip(1))
        .any(|(a, b)| a.is_lowercase() && b.is_uppercase());
    has_digit || all_caps || snake || camel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metadata;

    fn hit(id: &str, score: f32) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            text: format!("text {id}"),
            score,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn test_identifiers_choose_keyword() {
        let supervisor = RetrievalSupervisor::default();
        for query in [
            "What does error E0502 mean?",
            "Where is the HTTP cache configured?",
            "What does max_reasoning_iterations control?",
            "Who calls parseConfig first?",
            "Find the phrase \"eventual consistency\" in the notes",
        ] {
            assert_eq!(
                supervisor.choose(query).strategy,
                SearchStrategy::Keyword,
                "{query}"
            );
        }
    }

    #[test]
    fn test_open_ended_chooses_vector() {
        let supervisor = RetrievalSupervisor::default();
        let choice = supervisor.choose("Why did the empire collapse?");
        assert_eq!(choice.strategy, SearchStrategy::Vector);
        assert!(choice.reason.contains("why"));
        assert_eq!(
            supervisor.choose("explain tidal locking").strategy,
            SearchStrategy::Vector
        );
    }

    #[test]
    fn test_default_is_hybrid() {
        let supervisor = RetrievalSupervisor::default();
        assert_eq!(
            supervisor.choose("the fall of the Han dynasty").strategy,
            SearchStrategy::Hybrid
        );
    }

    #[test]
    fn test_rrf_prefers_items_in_both_lists() {
        let vector = vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)];
        let keyword = vec![hit("b", 0.6), hit("c", 0.5)];
        let fused = reciprocal_rank_fusion(vec![vector, keyword], RRF_K);

        let ids: Vec<&str> = fused.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!((fused[0].score - 0.8).abs() < f32::EPSILON);
        let expected = 1.0 / 62.0 + 1.0 / 61.0;
        let recorded = fused[0].metadata["rrf_score"].as_f64().unwrap() as f32;
        assert!((recorded - expected).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_single_list_keeps_order() {
        let fused = reciprocal_rank_fusion(vec![vec![hit("x", 0.2), hit("y", 0.9)]], RRF_K);
        assert_eq!(fused[0].id, "x");
        assert_eq!(fused[1].id, "y");
    }
}
