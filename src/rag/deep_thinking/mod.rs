//! Iterative research strategy
//!
//! A query is decomposed into a short research plan. Each step picks a search
//! strategy, runs the recall / rerank / distill funnel and is recorded as a
//! [`ResearchStep`]; after every step a policy decides whether to continue, revise
//! or finish. Generation synthesises the collected findings into one answer.
//!
//! The loop always terminates: the plan is finite, `REVISE` advances the cursor,
//! and the iteration count is capped by `max_reasoning_iterations`.

pub mod funnel;
pub mod planner;
pub mod policy;
pub mod supervisor;

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub use self::funnel::FunnelOutput;
pub use self::funnel::RetrievalFunnel;
pub use self::planner::ComplexityFeatures;
pub use self::planner::PlanStep;
pub use self::planner::QueryPlanner;
pub use self::planner::ResearchPlan;
pub use self::planner::StepKind;
pub use self::policy::HeuristicPolicy;
pub use self::policy::LlmPolicy;
pub use self::policy::PolicyAgent;
pub use self::policy::PolicyContext;
pub use self::supervisor::RetrievalSupervisor;
pub use self::supervisor::SearchStrategy;
use super::strategy::GenerationInput;
use super::strategy::RagStrategy;
use super::strategy::StrategyCore;
use super::strategy::INSUFFICIENT_INFORMATION;
use crate::config::DeepThinkingConfig;
use crate::errors::DeepRagError;
use crate::llm::RagPrompts;
use crate::models::Capabilities;
use crate::models::Metadata;
use crate::models::PolicyAction;
use crate::models::RagConfig;
use crate::models::RagResult;
use crate::models::RagSource;
use crate::models::ResearchStep;
use crate::models::Tier;

/// Why the research loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The policy chose `FINISH`
    Finished,
    /// Every planned step ran without a `FINISH`
    PlanExhausted,
    /// `max_reasoning_iterations` was reached first
    IterationCap,
}

impl Termination {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Finished => "finished",
            Self::PlanExhausted => "plan_exhausted",
            Self::IterationCap => "iteration_cap",
        }
    }
}

/// Everything a finished research loop produced
struct Research {
    plan: ResearchPlan,
    history: Vec<ResearchStep>,
    sources: Vec<RagSource>,
    trace: Vec<Value>,
    warnings: Vec<String>,
    iterations: usize,
    searches_failed: usize,
    last_error: Option<String>,
    termination: Termination,
}

/// Plan, search, distill and decide, one research step at a time
pub struct DeepThinkingRag {
    core: StrategyCore,
    settings: DeepThinkingConfig,
    planner: QueryPlanner,
    supervisor: RetrievalSupervisor,
    funnel: RetrievalFunnel,
    policy: Box<dyn PolicyAgent>,
}

impl DeepThinkingRag {
    /// Create the strategy; the LLM policy is used only when `use_llm_policy` is set
    #[must_use]
    pub fn new(core: StrategyCore, settings: DeepThinkingConfig) -> Self {
        let heuristic = HeuristicPolicy::new(settings.finish_confidence);
        let policy: Box<dyn PolicyAgent> = if settings.use_llm_policy {
            Box::new(LlmPolicy::new(core.providers.clone(), heuristic))
        } else {
            Box::new(heuristic)
        };
        let funnel = RetrievalFunnel::new(
            settings.rerank_k,
            settings.enable_distillation,
            core.assembler(),
            core.generation,
        );
        Self {
            planner: QueryPlanner::new(settings.complexity_threshold),
            supervisor: RetrievalSupervisor::default(),
            funnel,
            policy,
            core,
            settings,
        }
    }

    /// Replace the continue / revise / finish policy
    #[must_use]
    pub fn with_policy(mut self, policy: Box<dyn PolicyAgent>) -> Self {
        self.policy = policy;
        self
    }

    /// The plan `retrieve` would follow for `query`
    #[must_use]
    pub fn plan(&self, query: &str) -> ResearchPlan {
        self.planner.plan(query)
    }

    async fn research(&self, query: &str, user_id: &str, filters: &Metadata) -> Research {
        let plan = self.planner.plan(query);
        info!(
            "Research plan for complexity {:.2}: {} step(s)",
            plan.complexity,
            plan.len()
        );

        let filter = StrategyCore::filter(user_id, filters);
        let max_iterations = self.settings.max_reasoning_iterations.max(1);
        let mut history: Vec<ResearchStep> = Vec::new();
        let mut best: HashMap<String, RagSource> = HashMap::new();
        let mut trace = Vec::new();
        let mut warnings = Vec::new();
        let mut searches_failed = 0;
        let mut last_error = None;
        let mut iterations = 0;
        let mut cursor = 0;

        let termination = loop {
            let Some(step) = plan.step(cursor) else {
                break Termination::PlanExhausted;
            };
            if iterations >= max_iterations {
                break Termination::IterationCap;
            }
            iterations += 1;

            let choice = self.supervisor.choose(&step.sub_question);
            debug!(
                "Step {} [{}] using {} search: {}",
                step.index + 1,
                step.kind,
                choice.strategy,
                choice.reason
            );
            let recalled = match self
                .supervisor
                .execute(
                    &self.core,
                    choice.strategy,
                    &step.sub_question,
                    &filter,
                    self.settings.recall_k.max(1),
                )
                .await
            {
                Ok(hits) => hits,
                Err(e) => {
                    warn!("Step {} search failed: {}", step.index + 1, e);
                    warnings.push(format!("step {}: {e}", step.index + 1));
                    searches_failed += 1;
                    last_error = Some(e.to_string());
                    Vec::new()
                }
            };

            let output = self
                .funnel
                .run(&self.core.providers, &step.sub_question, recalled)
                .await;
            if output.distillation_failed {
                warnings.push(format!(
                    "step {}: distillation failed, raw evidence kept",
                    step.index + 1
                ));
            }

            for source in &output.kept {
                let mut tagged = source.clone();
                tagged.metadata.insert("step_index".to_string(), json!(step.index));
                let key = tagged
                    .id()
                    .map_or_else(|| tagged.text.clone(), str::to_string);
                match best.get(&key) {
                    Some(existing) if existing.score >= tagged.score => {}
                    _ => {
                        best.insert(key, tagged);
                    }
                }
            }

            history.push(ResearchStep {
                step_index: step.index,
                sub_question: step.sub_question.clone(),
                summary: output.summary,
                sources_count: output.kept.len(),
                quality_score: output.quality,
                timestamp: Utc::now(),
            });

            let next_step = plan.step(cursor + 1);
            let decision = self
                .policy
                .decide(&PolicyContext {
                    query,
                    plan: &plan,
                    history: &history,
                    next_step,
                })
                .await;
            debug!(
                "Policy after step {}: {} ({:.2}) {}",
                step.index + 1,
                decision.action,
                decision.confidence,
                decision.justification
            );
            trace.push(json!({
                "step_index": step.index,
                "search_strategy": choice.strategy,
                "strategy_reason": choice.reason,
                "recalled": output.recalled,
                "action": decision.action,
                "confidence": decision.confidence,
                "justification": decision.justification,
            }));

            match decision.action {
                PolicyAction::Finish => break Termination::Finished,
                PolicyAction::Continue => cursor += 1,
                PolicyAction::Revise => {
                    // Plans are not rewritten; the next step runs as planned
                    warn!(
                        "Revision requested after step {}, continuing with the plan",
                        step.index + 1
                    );
                    cursor += 1;
                }
            }
        };

        if termination != Termination::Finished {
            let exhausted = DeepRagError::PlanExhausted { iterations };
            warn!("{}", exhausted);
            warnings.push(exhausted.to_string());
        }

        let mut sources: Vec<RagSource> = best.into_values().collect();
        sources.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.id().cmp(&b.id()))
        });

        Research {
            plan,
            history,
            sources,
            trace,
            warnings,
            iterations,
            searches_failed,
            last_error,
            termination,
        }
    }

    fn findings(history: &[ResearchStep]) -> Option<String> {
        let findings: Vec<String> = history
            .iter()
            .filter(|s| s.sources_count > 0 && !s.summary.trim().is_empty())
            .map(|s| format!("Step {} ({}): {}", s.step_index + 1, s.sub_question, s.summary.trim()))
            .collect();
        (!findings.is_empty()).then(|| findings.join("\n\n"))
    }
}

#[async_trait]
impl RagStrategy for DeepThinkingRag {
    fn config(&self) -> &RagConfig {
        &self.core.config
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            name: "Deep Thinking RAG".to_string(),
            mode: self.core.config.mode,
            features: vec![
                "query_planning".to_string(),
                "adaptive_search_strategy".to_string(),
                "retrieval_funnel".to_string(),
                "policy_control".to_string(),
                "multi_step_synthesis".to_string(),
            ],
            complexity: Tier::High,
            resource_usage: Tier::High,
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

        let mut research = self.research(query, user_id, filters).await;
        info!(
            "Research finished after {} iteration(s): {}",
            research.iterations,
            research.termination.as_str()
        );

        if research.searches_failed > 0 && research.searches_failed == research.history.len() {
            let error = research
                .last_error
                .take()
                .unwrap_or_else(|| "every research step failed".to_string());
            return RagResult::failure(mode, error).timed(started);
        }

        research.sources.truncate(self.core.top_k(top_k));
        let mut result = RagResult::success(mode)
            .with_sources(research.sources)
            .with_metadata("plan", json!(research.plan))
            .with_metadata("complexity", research.plan.complexity)
            .with_metadata("research_history", json!(research.history))
            .with_metadata("decisions", Value::Array(research.trace))
            .with_metadata("iterations", research.iterations)
            .with_metadata("termination", research.termination.as_str());
        for warning in research.warnings {
            result.record_warning(warning);
        }
        result.timed(started)
    }

    async fn generate(&self, query: &str, _user_id: &str, input: GenerationInput<'_>) -> RagResult {
        let started = Instant::now();
        let mode = self.mode();

        let GenerationInput::Retrieval(retrieval) = input else {
            return self.core.answer(query, input).await;
        };
        let Some(history) = retrieval.metadata.get("research_history") else {
            return self.core.answer(query, input).await;
        };
        let history: Vec<ResearchStep> = match serde_json::from_value(history.clone()) {
            Ok(history) => history,
            Err(e) => {
                return RagResult::failure(mode, DeepRagError::from(e).to_string()).timed(started)
            }
        };

        let Some(findings) = Self::findings(&history) else {
            return RagResult::success(mode)
                .with_content(INSUFFICIENT_INFORMATION)
                .with_metadata("insufficient_context", true)
                .with_metadata("steps_used", 0)
                .timed(started);
        };

        let generated = match RagPrompts::synthesis()
            .render(&[("question", query), ("findings", findings.as_str())])
        {
            Ok(prompt) => {
                self.core
                    .providers
                    .generate(
                        &prompt,
                        self.core.generation.temperature,
                        self.core.generation.max_tokens,
                    )
                    .await
            }
            Err(e) => Err(e),
        };

        let mut result = match generated {
            Ok(answer) => RagResult::success(mode).with_content(answer),
            Err(e) => {
                warn!("Synthesis failed, returning raw findings: {}", e);
                let mut degraded = RagResult::success(mode)
                    .with_content(findings)
                    .with_metadata("degraded", true);
                degraded.record_warning(format!("synthesis failed: {e}"));
                degraded
            }
        };
        result.sources = retrieval.sources.clone();
        result
            .with_metadata("steps_used", history.len())
            .timed(started)
    }
}
