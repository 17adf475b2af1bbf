//! CRAG: quality-gated retrieval with best-effort refinement
//!
//! Candidates are over-fetched (`2 × top_k`), scored on relevance, completeness and
//! accuracy, and filtered against a quality threshold. The gate never empties a
//! non-empty candidate set: when nothing passes it falls back to the best `top_k`.

use std::collections::HashSet;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::strategy::GenerationInput;
use super::strategy::RagStrategy;
use super::strategy::StrategyCore;
use crate::config::CragConfig;
use crate::embeddings::extract_terms;
use crate::embeddings::term_overlap;
use crate::errors::DeepRagError;
use crate::models::Capabilities;
use crate::models::Metadata;
use crate::models::QualityAssessment;
use crate::models::RagConfig;
use crate::models::RagResult;
use crate::models::RagSource;
use crate::models::Tier;
use crate::vector_store::SearchFilter;

const CITATION_MARKERS: &[&str] = &[
    "according to",
    "et al",
    "http://",
    "https://",
    "doi:",
    "source:",
    "reported by",
    "cited",
];

const DISCOURSE_MARKERS: &[&str] = &[
    "however",
    "therefore",
    "because",
    "although",
    "for example",
    "for instance",
    "in contrast",
    "moreover",
    "furthermore",
    "approximately",
    "suggests",
    "indicates",
    "likely",
];

const REFINEMENT_TERMS: usize = 3;
/// Extra hits fetched per refinement sub-query beyond the kept set
const REFINEMENT_WINDOW: usize = 5;

/// Heuristic per-candidate quality scoring
#[derive(Debug, Clone, Copy)]
pub struct QualityAssessor {
    threshold: f32,
}

impl QualityAssessor {
    /// Create an assessor flagging candidates below `threshold` for refinement
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Evidentiary markers: citations, numbered or bulleted structure, qualifying discourse
    #[must_use]
    pub fn accuracy(text: &str) -> f32 {
        let lower = text.to_lowercase();
        let mut score = 0.4;
        if has_bracket_citation(text) || CITATION_MARKERS.iter().any(|m| lower.contains(m)) {
            score += 0.2;
        }
        if has_list_structure(text) {
            score += 0.2;
        }
        if DISCOURSE_MARKERS.iter().any(|m| lower.contains(m)) {
            score += 0.2;
        }
        score
    }

    /// Score one candidate; `overall` is the mean of relevance, completeness and accuracy
    #[must_use]
    pub fn assess(&self, query: &str, text: &str, similarity: f32) -> QualityAssessment {
        let relevance = similarity.clamp(0.0, 1.0);
        let completeness = term_overlap(query, text);
        let accuracy = Self::accuracy(text);
        let overall = (relevance + completeness + accuracy) / 3.0;

        let mut suggestions = Vec::new();
        if relevance < self.threshold {
            suggestions.push("low similarity: rephrase or expand the query".to_string());
        }
        if completeness < 1.0 {
            let present: HashSet<String> = extract_terms(text).into_iter().collect();
            let missing: Vec<String> = extract_terms(query)
                .into_iter()
                .filter(|t| !present.contains(t))
                .collect();
            if !missing.is_empty() {
                suggestions.push(format!("missing query terms: {}", missing.join(", ")));
            }
        }
        if accuracy <= 0.4 {
            suggestions.push("no supporting evidence markers".to_string());
        }

        QualityAssessment {
            relevance,
            completeness,
            accuracy,
            overall,
            needs_refinement: overall < self.threshold,
            suggestions,
        }
    }
}

fn has_bracket_citation(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.windows(3).any(|w| w[0] == b'[' && w[1].is_ascii_digit() && (w[2] == b']' || w[2].is_ascii_digit()))
}

fn has_list_structure(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim_start();
        line.starts_with("- ")
            || line.starts_with("* ")
            || line.starts_with("• ")
            || line
                .split_once(|c: char| c == '.' || c == ')')
                .is_some_and(|(head, _)| {
                    !head.is_empty() && head.len() <= 3 && head.chars().all(|c| c.is_ascii_digit())
                })
    })
}

/// A candidate with its assessment
#[derive(Debug, Clone)]
pub struct Assessed {
    pub source: RagSource,
    pub assessment: QualityAssessment,
}

/// Result of filtering one candidate set
#[derive(Debug, Clone, Default)]
pub struct GateOutcome {
    pub kept: Vec<Assessed>,
    pub passed: usize,
    pub fallback_used: bool,
}

/// Threshold filter with fallback-to-best-available
#[derive(Debug, Clone, Copy)]
pub struct QualityGate {
    threshold: f32,
    top_k: usize,
}

impl QualityGate {
    /// Create a gate keeping at most `top_k` candidates (minimum 1)
    #[must_use]
    pub fn new(threshold: f32, top_k: usize) -> Self {
        Self {
            threshold,
            top_k: top_k.max(1),
        }
    }

    /// Keep candidates at or above the threshold, best first, at most `top_k`
    #[must_use]
    pub fn filter(&self, mut candidates: Vec<Assessed>) -> GateOutcome {
        sort_by_overall(&mut candidates);
        let passed = candidates
            .iter()
            .filter(|c| c.assessment.overall >= self.threshold)
            .count();

        let (mut kept, fallback_used) = if passed == 0 && !candidates.is_empty() {
            let error = DeepRagError::QualityBelowThreshold {
                best: candidates[0].assessment.overall,
                threshold: self.threshold,
            };
            warn!("{}; falling back to best {} candidate(s)", error, self.top_k);
            (candidates, true)
        } else {
            let kept = candidates
                .into_iter()
                .filter(|c| c.assessment.overall >= self.threshold)
                .collect();
            (kept, false)
        };
        kept.truncate(self.top_k);

        GateOutcome {
            kept,
            passed,
            fallback_used,
        }
    }
}

fn sort_by_overall(candidates: &mut [Assessed]) {
    candidates.sort_by(|a, b| {
        b.assessment
            .overall
            .total_cmp(&a.assessment.overall)
            .then_with(|| a.source.id().cmp(&b.source.id()))
    });
}

/// Original query plus up to three candidate terms the query lacks
#[must_use]
pub fn refinement_query(query: &str, candidate: &str) -> String {
    let query_terms: HashSet<String> = extract_terms(query).into_iter().collect();
    let salient: Vec<String> = extract_terms(candidate)
        .into_iter()
        .filter(|t| !query_terms.contains(t))
        .take(REFINEMENT_TERMS)
        .collect();
    if salient.is_empty() {
        query.to_string()
    } else {
        format!("{query} {}", salient.join(" "))
    }
}

/// Corrective RAG: over-fetch, assess, gate, then refine weak hits
pub struct CragRag {
    core: StrategyCore,
    settings: CragConfig,
}

impl CragRag {
    /// Create a CRAG strategy with its quality settings
    #[must_use]
    pub fn new(core: StrategyCore, settings: CragConfig) -> Self {
        Self { core, settings }
    }

    fn assessor(&self) -> QualityAssessor {
        QualityAssessor::new(self.settings.quality_threshold)
    }

    fn annotate(query: &str, assessor: &QualityAssessor, mut source: RagSource) -> Assessed {
        let similarity = source.score;
        let assessment = assessor.assess(query, &source.text, similarity);
        source.metadata.insert("similarity".to_string(), json!(similarity));
        source.metadata.insert("quality".to_string(), json!(assessment));
        source.score = assessment.overall;
        Assessed { source, assessment }
    }

    /// Single best-effort pass; a refined hit replaces the original only when it scores higher
    ///
    /// The sub-query window is widened past the kept set so hits already kept or
    /// rejected by the gate do not crowd out new evidence.
    async fn refine(&self, query: &str, filter: &SearchFilter, kept: &mut [Assessed]) -> usize {
        let assessor = self.assessor();
        let mut present: HashSet<String> = kept
            .iter()
            .filter_map(|c| c.source.id().map(str::to_string))
            .collect();
        let window = kept.len() + REFINEMENT_WINDOW;
        let mut refined = 0;

        for candidate in kept.iter_mut().filter(|c| c.assessment.needs_refinement) {
            let sub_query = refinement_query(query, &candidate.source.text);
            let hits = match self.core.vector_search(&sub_query, filter, window).await {
                Ok(hits) => hits,
                Err(e) => {
                    debug!("Refinement skipped for {:?}: {}", candidate.source.id(), e);
                    continue;
                }
            };
            let best = hits
                .into_iter()
                .filter(|hit| !present.contains(&hit.id))
                .map(|hit| Self::annotate(query, &assessor, hit.into_source()))
                .max_by(|a, b| a.assessment.overall.total_cmp(&b.assessment.overall));
            let Some(replacement) = best else {
                continue;
            };
            if replacement.assessment.overall > candidate.assessment.overall {
                debug!(
                    "Refined {:?} -> {:?} ({:.3} -> {:.3})",
                    candidate.source.id(),
                    replacement.source.id(),
                    candidate.assessment.overall,
                    replacement.assessment.overall
                );
                if let Some(old) = candidate.source.id() {
                    present.remove(old);
                }
                if let Some(new) = replacement.source.id() {
                    present.insert(new.to_string());
                }
                *candidate = replacement;
                candidate.source.metadata.insert("refined".to_string(), json!(true));
                refined += 1;
            }
        }
        refined
    }
}

#[async_trait]
impl RagStrategy for CragRag {
    fn config(&self) -> &RagConfig {
        &self.core.config
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "Corrective RAG".to_string(),
            mode: self.core.config.mode,
            features: vec![
                "quality_assessment".to_string(),
                "fallback_to_best_available".to_string(),
                "query_refinement".to_string(),
                "citations".to_string(),
            ],
            complexity: Tier::Medium,
            resource_usage: Tier::Medium,
        }
    }

    async fn store(&self, content: &str, user_id: &str, metadata: &Metadata) -> RagResult {
        let started = Instant::now();
        if let Err(e) = StrategyCore::validate_request(content, user_id, "content") {
            return RagResult::failure(self.mode(), e.to_string());
        }
        let outcome = self.core.store_chunks(content, user_id, metadata).await;
        self.core.store_result(outcome, started)
    }

    async fn retrieve(&self, query: &str, user_id: &str, top_k: Option<usize>, filters: &Metadata) -> RagResult {
        let started = Instant::now();
        let mode = self.mode();
        if let Err(e) = StrategyCore::validate_request(query, user_id, "query") {
            return RagResult::failure(mode, e.to_string());
        }

        let top_k = self.core.top_k(top_k);
        let filter = StrategyCore::filter(user_id, filters);
        let hits = match self.core.vector_search(query, &filter, top_k * 2).await {
            Ok(hits) => hits,
            Err(e) => return RagResult::failure(mode, e.to_string()).timed(started),
        };
        let candidates = hits.len();

        let assessor = self.assessor();
        let assessed: Vec<Assessed> = hits
            .into_iter()
            .map(|hit| Self::annotate(query, &assessor, hit.into_source()))
            .collect();

        let gate = QualityGate::new(self.settings.quality_threshold, top_k);
        let mut outcome = gate.filter(assessed);

        let refined = if self.settings.enable_refinement {
            self.refine(query, &filter, &mut outcome.kept).await
        } else {
            0
        };
        sort_by_overall(&mut outcome.kept);

        info!(
            "CRAG retrieval: {} candidates, {} passed, {} kept (fallback: {}, refined: {})",
            candidates,
            outcome.passed,
            outcome.kept.len(),
            outcome.fallback_used,
            refined
        );

        let mut result = RagResult::success(mode)
            .with_sources(outcome.kept.into_iter().map(|c| c.source).collect())
            .with_metadata("candidates", candidates)
            .with_metadata("passed", outcome.passed)
            .with_metadata("fallback_used", outcome.fallback_used)
            .with_metadata("refined", refined)
            .with_metadata("degraded", outcome.fallback_used);
        if outcome.fallback_used {
            result.record_warning(
                DeepRagError::QualityBelowThreshold {
                    best: result.sources.first().map_or(0.0, |s| s.score),
                    threshold: self.settings.quality_threshold,
                }
                .to_string(),
            );
        }
        result.timed(started)
    }

    async fn generate(&self, query: &str, _user_id: &str, input: GenerationInput<'_>) -> RagResult {
        self.core.answer(query, input).await
    }
}
