//! Rule-based mode suggestion from surface features of the query

use tracing::debug;

use super::deep_thinking::ComplexityFeatures;
use crate::models::ModeRecommendation;
use crate::models::RagMode;

const OVERVIEW_KEYWORDS: &[&str] = &[
    "overview",
    "summary",
    "summarize",
    "summarise",
    "theme",
    "themes",
    "overall",
    "gist",
    "outline",
    "main",
];

const VERIFICATION_KEYWORDS: &[&str] = &[
    "verify",
    "verified",
    "accurate",
    "accuracy",
    "reliable",
    "correct",
    "confirm",
    "evidence",
    "source",
    "sources",
    "trustworthy",
];

const FACTUAL_OPENERS: &[&str] = &["what", "who", "when", "where", "which"];

const SHORT_QUERY_WORDS: usize = 8;
const LONG_QUERY_WORDS: usize = 20;
const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Scores every mode from keyword, length and clause signals
#[derive(Debug, Clone, Copy, Default)]
pub struct ModeRecommender;

impl ModeRecommender {
    /// Create a recommender; it holds no state
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Never fails; ambiguous or featureless queries get [`RagMode::Basic`]
    #[must_use]
    pub fn recommend(&self, query: &str) -> ModeRecommendation {
        let words: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric() && c != '-')
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let features = ComplexityFeatures::extract(query);
        let count = |list: &[&str]| words.iter().filter(|w| list.contains(&w.as_str())).count();

        let mut scored: Vec<(RagMode, f32, Vec<String>)> = Vec::with_capacity(4);

        let mut deep = (0.0, Vec::new());
        if features.comparative {
            deep.0 += 0.4;
            deep.1.push("comparison requested".to_string());
        }
        if features.causal {
            deep.0 += 0.3;
            deep.1.push("causal question".to_string());
        }
        if features.conjunctions > 0 || features.question_marks > 1 {
            deep.0 += 0.2;
            deep.1.push("multiple clauses".to_string());
        }
        if words.len() > LONG_QUERY_WORDS {
            deep.0 += 0.1;
            deep.1.push(format!("long query ({} words)", words.len()));
        }
        scored.push((RagMode::DeepThinking, deep.0, deep.1));

        let overview = count(OVERVIEW_KEYWORDS);
        scored.push((
            RagMode::Raptor,
            (overview as f32 * 0.5).min(1.0),
            if overview > 0 {
                vec!["asks for an overview or themes".to_string()]
            } else {
                Vec::new()
            },
        ));

        let verification = count(VERIFICATION_KEYWORDS);
        scored.push((
            RagMode::Crag,
            (verification as f32 * 0.5).min(1.0),
            if verification > 0 {
                vec!["asks for verified or reliable information".to_string()]
            } else {
                Vec::new()
            },
        ));

        let factual = words.len() <= SHORT_QUERY_WORDS
            && words
                .first()
                .is_some_and(|w| FACTUAL_OPENERS.contains(&w.as_str()));
        scored.push((
            RagMode::Basic,
            if factual { 0.5 } else { 0.0 },
            if factual {
                vec!["short factual question".to_string()]
            } else {
                Vec::new()
            },
        ));

        let best = scored.iter().map(|(_, score, _)| *score).fold(0.0_f32, f32::max);
        let leaders: Vec<&(RagMode, f32, Vec<String>)> = scored
            .iter()
            .filter(|(_, score, _)| (*score - best).abs() < f32::EPSILON)
            .collect();
        debug!("Mode scores for {:?}: {:?}", query, scored);

        match leaders.as_slice() {
            [(mode, score, reasons)] if best > 0.0 => ModeRecommendation {
                mode: *mode,
                confidence: (DEFAULT_CONFIDENCE + score / 2.0).min(0.95),
                reasons: reasons.clone(),
            },
            _ => ModeRecommendation {
                mode: RagMode::Basic,
                confidence: DEFAULT_CONFIDENCE,
                reasons: vec!["no decisive signal, using the default mode".to_string()],
            },
        }
    }
}
