//! Query complexity scoring and research plan generation

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

const CONJUNCTIONS: &[&str] = &["and", "or", "but", "while", "whereas", "also", "plus"];

const CAUSAL_KEYWORDS: &[&str] = &[
    "why",
    "because",
    "cause",
    "caused",
    "causes",
    "effect",
    "effects",
    "impact",
    "consequence",
    "consequences",
    "lead",
    "led",
    "result",
    "due",
];

const COMPARATIVE_KEYWORDS: &[&str] = &[
    "compare",
    "compared",
    "comparison",
    "versus",
    "vs",
    "difference",
    "differences",
    "differ",
    "better",
    "worse",
    "than",
    "contrast",
    "similar",
    "relative",
];

/// Separators used to split a multi-part question into its parts
const PART_SEPARATORS: &[&str] = &[" and ", " versus ", " vs ", " compared to "];

/// Complexity above this, but not above the deep threshold, gets a two-step plan
pub const TWO_STEP_THRESHOLD: f32 = 0.35;

/// Surface features the complexity score is computed from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexityFeatures {
    pub conjunctions: usize,
    pub causal: bool,
    pub comparative: bool,
    pub question_marks: usize,
    pub words: usize,
}

impl ComplexityFeatures {
    #[must_use]
    pub fn extract(query: &str) -> Self {
        let words: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        let has_any = |list: &[&str]| words.iter().any(|w| list.contains(&w.as_str()));

        Self {
            conjunctions: words
                .iter()
                .filter(|w| CONJUNCTIONS.contains(&w.as_str()))
                .count(),
            causal: has_any(CAUSAL_KEYWORDS),
            comparative: has_any(COMPARATIVE_KEYWORDS),
            question_marks: query.matches('?').count(),
            words: words.len(),
        }
    }

    /// Weighted sum clamped to `[0, 1]`
    #[must_use]
    pub fn score(&self) -> f32 {
        let conjunctions = (self.conjunctions as f32 * 0.1).min(0.3);
        let causal = if self.causal { 0.25 } else { 0.0 };
        let comparative = if self.comparative { 0.25 } else { 0.0 };
        let questions = if self.question_marks > 1 {
            (self.question_marks as f32 - 1.0).mul_add(0.1, 0.05).min(0.2)
        } else {
            0.0
        };
        let length = (self.words as f32 / 40.0).min(0.3);
        (conjunctions + causal + comparative + questions + length).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Background,
    Evidence,
    DirectSearch,
    Synthesis,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Background => write!(f, "background"),
            Self::Evidence => write!(f, "evidence"),
            Self::DirectSearch => write!(f, "direct search"),
            Self::Synthesis => write!(f, "synthesis"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub index: usize,
    pub kind: StepKind,
    /// Text the step retrieves with
    pub sub_question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchPlan {
    pub query: String,
    pub complexity: f32,
    pub steps: Vec<PlanStep>,
}

impl ResearchPlan {
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn step(&self, index: usize) -> Option<&PlanStep> {
        self.steps.get(index)
    }

    /// One line per step, for prompts and logs
    #[must_use]
    pub fn describe(&self) -> String {
        self.steps
            .iter()
            .map(|s| format!("{}. [{}] {}", s.index + 1, s.kind, s.sub_question))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Turns a query into a one, two or three step research plan
#[derive(Debug, Clone, Copy)]
pub struct QueryPlanner {
    complexity_threshold: f32,
}

impl QueryPlanner {
    /// Create a planner; queries scoring above `complexity_threshold` get the full plan
    #[must_use]
    pub const fn new(complexity_threshold: f32) -> Self {
        Self {
            complexity_threshold,
        }
    }

    /// Score `query` and lay out its steps
    #[must_use]
    pub fn plan(&self, query: &str) -> ResearchPlan {
        let query = query.trim();
        let complexity = ComplexityFeatures::extract(query).score();

        let kinds: Vec<(StepKind, String)> = if complexity > self.complexity_threshold {
            let (background, evidence) = split_parts(query)
                .unwrap_or_else(|| (subject_of(query), query.to_string()));
            vec![
                (StepKind::Background, background),
                (StepKind::Evidence, evidence),
                (StepKind::Synthesis, query.to_string()),
            ]
        } else if complexity > TWO_STEP_THRESHOLD {
            vec![
                (StepKind::DirectSearch, query.to_string()),
                (StepKind::Synthesis, subject_of(query)),
            ]
        } else {
            vec![(StepKind::DirectSearch, query.to_string())]
        };

        ResearchPlan {
            query: query.to_string(),
            complexity,
            steps: kinds
                .into_iter()
                .enumerate()
                .map(|(index, (kind, sub_question))| PlanStep {
                    index,
                    kind,
                    sub_question,
                })
                .collect(),
        }
    }
}

/// First two non-trivial parts of a compound question
fn split_parts(query: &str) -> Option<(String, String)> {
    let lower = query.to_lowercase();
    PART_SEPARATORS.iter().find_map(|sep| {
        let at = lower.find(sep)?;
        // Separators are ASCII, so byte positions in `lower` match `query`
        if !query.is_char_boundary(at) || !query.is_char_boundary(at + sep.len()) {
            return None;
        }
        let first = clean_part(&query[..at]);
        let second = clean_part(&query[at + sep.len()..]);
        (first.split_whitespace().count() >= 2 && second.split_whitespace().count() >= 2)
            .then_some((first, second))
    })
}

fn clean_part(part: &str) -> String {
    part.trim()
        .trim_matches(|c: char| c == '?' || c == ',' || c == '.')
        .trim()
        .to_string()
}

/// The query without its causal and comparative framing words
fn subject_of(query: &str) -> String {
    let subject: Vec<&str> = query
        .split_whitespace()
        .filter(|w| {
            let word = w
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            !CAUSAL_KEYWORDS.contains(&word.as_str())
                && !COMPARATIVE_KEYWORDS.contains(&word.as_str())
        })
        .collect();
    if subject.is_empty() {
        query.to_string()
    } else {
        clean_part(&subject.join(" "))
    }
}
