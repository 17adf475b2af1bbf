//! Continue / revise / finish decisions for the research loop

use async_trait::async_trait;
use tracing::debug;
use tracing::warn;

use super::planner::PlanStep;
use super::planner::ResearchPlan;
use crate::llm::RagPrompts;
use crate::models::PolicyAction;
use crate::models::PolicyDecision;
use crate::models::ResearchStep;
use crate::providers::Providers;

const POLICY_MAX_TOKENS: usize = 200;

/// Everything a policy sees after a research step
#[derive(Debug, Clone, Copy)]
pub struct PolicyContext<'a> {
    pub query: &'a str,
    pub plan: &'a ResearchPlan,
    pub history: &'a [ResearchStep],
    pub next_step: Option<&'a PlanStep>,
}

impl PolicyContext<'_> {
    /// Mean funnel quality over the steps run so far
    #[must_use]
    pub fn mean_quality(&self) -> f32 {
        if self.history.is_empty() {
            return 0.0;
        }
        self.history.iter().map(|s| s.quality_score).sum::<f32>() / self.history.len() as f32
    }
}

/// Decides after each step whether to continue, revise or finish
#[async_trait]
pub trait PolicyAgent: Send + Sync {
    /// Never fails; implementations fall back to a rule-based decision
    async fn decide(&self, context: &PolicyContext<'_>) -> PolicyDecision;
}

/// Rule-based policy
#[derive(Debug, Clone, Copy)]
pub struct HeuristicPolicy {
    finish_confidence: f32,
}

impl HeuristicPolicy {
    /// Create a policy that finishes once mean quality reaches `finish_confidence`
    #[must_use]
    pub const fn new(finish_confidence: f32) -> Self {
        Self { finish_confidence }
    }

    /// Synchronous decision from the step history
    #[must_use]
    pub fn decide_now(&self, context: &PolicyContext<'_>) -> PolicyDecision {
        let quality = context.mean_quality();

        if context.next_step.is_none() {
            return PolicyDecision {
                action: PolicyAction::Finish,
                confidence: quality,
                justification: "all planned steps are complete".to_string(),
            };
        }

        if quality >= self.finish_confidence {
            return PolicyDecision {
                action: PolicyAction::Finish,
                confidence: quality,
                justification: format!(
                    "mean evidence quality {quality:.2} reached {:.2}",
                    self.finish_confidence
                ),
            };
        }

        if let Some((latest, earlier)) = context.history.split_last() {
            if latest.sources_count == 0 && earlier.iter().any(|s| s.sources_count > 0) {
                return PolicyDecision {
                    action: PolicyAction::Revise,
                    confidence: 0.5,
                    justification: format!(
                        "step {} found no evidence although earlier steps did",
                        latest.step_index + 1
                    ),
                };
            }
        }

        PolicyDecision {
            action: PolicyAction::Continue,
            confidence: 1.0 - quality,
            justification: format!("mean evidence quality {quality:.2} is below target"),
        }
    }
}

#[async_trait]
impl PolicyAgent for HeuristicPolicy {
    async fn decide(&self, context: &PolicyContext<'_>) -> PolicyDecision {
        self.decide_now(context)
    }
}

/// Asks the generation provider, falling back to the heuristic on any failure
pub struct LlmPolicy {
    providers: Providers,
    fallback: HeuristicPolicy,
}

impl LlmPolicy {
    /// Create an LLM-judged policy that falls back to `fallback` on any failure
    #[must_use]
    pub fn new(providers: Providers, fallback: HeuristicPolicy) -> Self {
        Self { providers, fallback }
    }

    fn prompt(context: &PolicyContext<'_>) -> crate::errors::Result<String> {
        let history = if context.history.is_empty() {
            "(none)".to_string()
        } else {
            context
                .history
                .iter()
                .map(|s| {
                    format!(
                        "Step {} ({}; quality {:.2}): {}",
                        s.step_index + 1,
                        s.sub_question,
                        s.quality_score,
                        s.summary
                    )
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        let next_step = context
            .next_step
            .map_or_else(|| "(none)".to_string(), |s| s.sub_question.clone());
        RagPrompts::policy_judge().render(&[
            ("question", context.query),
            ("plan", context.plan.describe().as_str()),
            ("history", history.as_str()),
            ("next_step", next_step.as_str()),
        ])
    }
}

#[async_trait]
impl PolicyAgent for LlmPolicy {
    async fn decide(&self, context: &PolicyContext<'_>) -> PolicyDecision {
        let reply = match Self::prompt(context) {
            Ok(prompt) => self.providers.generate(&prompt, 0.0, POLICY_MAX_TOKENS).await,
            Err(e) => Err(e),
        };
        match reply {
            Ok(reply) => match parse_policy_reply(&reply) {
                Some(decision) => {
                    debug!("Policy model decided {}", decision.action);
                    decision
                }
                None => {
                    warn!("Unparseable policy reply, using heuristic: {:?}", reply);
                    self.fallback.decide_now(context)
                }
            },
            Err(e) => {
                warn!("Policy model unavailable, using heuristic: {}", e);
                self.fallback.decide_now(context)
            }
        }
    }
}

/// Parse `ACTION:` / `CONFIDENCE:` / `REASON:` lines; the action is required
#[must_use]
pub fn parse_policy_reply(reply: &str) -> Option<PolicyDecision> {
    let mut action = None;
    let mut confidence = 0.5;
    let mut justification = String::new();

    for line in reply.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_uppercase().as_str() {
            "ACTION" => {
                let word = value.split_whitespace().next().unwrap_or_default();
                action = word
                    .trim_matches(|c: char| !c.is_alphabetic())
                    .parse::<PolicyAction>()
                    .ok();
            }
            "CONFIDENCE" => {
                if let Ok(parsed) = value.parse::<f32>() {
                    confidence = parsed.clamp(0.0, 1.0);
                }
            }
            "REASON" => justification = value.to_string(),
            _ => {}
        }
    }

    action.map(|action| PolicyDecision {
        action,
        confidence,
        justification,
    })
}
