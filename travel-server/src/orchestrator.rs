//! Multi-persona orchestration.
//!
//! A query is routed to a primary persona, widened to at most
//! `mode.max_agents` personas, and each persona's generation runs as its own
//! task. Every task is bounded by `min(mode.timeout, ollama.max_wait_secs)`
//! and falls back to canned text, so a run always produces an answer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use travel_core::agents::{self, AgentId, ProcessingMode, RoutingDecision};
use travel_core::config::{OllamaConfig, RoutingConfig};
use travel_core::llm::{
    FallbackPolicy, FallbackReason, FallbackResponder, GenerateRequest, LlmBackend, ResponseSource,
};
use travel_core::templates;

#[derive(Debug, Clone, Serialize)]
pub struct AgentOutput {
    pub agent: AgentId,
    pub text: String,
    pub source: ResponseSource,
    pub elapsed_ms: u64,
}

impl AgentOutput {
    pub fn used_llm(&self) -> bool {
        self.source == ResponseSource::Llm
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentRun {
    pub response: String,
    pub agents_involved: Vec<AgentId>,
    pub primary_agent: AgentId,
    pub routing: RoutingDecision,
    pub outputs: Vec<AgentOutput>,
    pub ai_used: bool,
    pub mode: ProcessingMode,
    pub elapsed_ms: u64,
}

#[derive(Clone)]
pub struct Orchestrator {
    responder: FallbackResponder,
    ollama: OllamaConfig,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn LlmBackend>, ollama: OllamaConfig, routing: &RoutingConfig) -> Self {
        let policy = FallbackPolicy {
            max_wait: Duration::from_secs(ollama.max_wait_secs),
            min_chars: routing.min_response_chars,
            check_availability: true,
        };
        Self {
            responder: FallbackResponder::new(llm, policy),
            ollama,
        }
    }

    /// Wait applied to each persona in `mode`.
    pub fn wait_for(&self, mode: ProcessingMode) -> Duration {
        mode.profile()
            .timeout
            .min(Duration::from_secs(self.ollama.max_wait_secs))
    }

    /// Personas that will answer `query`, primary first.
    pub fn select_agents(query: &str, mode: ProcessingMode) -> Vec<AgentId> {
        let max_agents = mode.profile().max_agents;
        let mut selected = agents::rank(query, max_agents);
        if selected.len() < max_agents {
            if let Some(next) = agents::follow_up(query, selected[0], selected.len()) {
                if !selected.contains(&next) {
                    selected.push(next);
                }
            }
        }
        selected
    }

    /// Run `query` through the selected personas and merge their answers.
    /// `context` holds earlier conversation lines, oldest first.
    pub async fn process(&self, query: &str, mode: ProcessingMode, context: &[String]) -> AgentRun {
        let start = Instant::now();
        let profile = mode.profile();
        let routing = agents::route(query);
        let selected = Self::select_agents(query, mode);
        let wait = self.wait_for(mode);

        tracing::info!(
            primary = %routing.agent,
            agents = selected.len(),
            mode = mode.as_str(),
            wait_ms = wait.as_millis() as u64,
            "Orchestrating query"
        );

        let handles: Vec<_> = selected
            .iter()
            .map(|&agent| {
                let responder = self.responder.clone();
                let query = query.to_string();
                let request = GenerateRequest {
                    prompt: query.clone(),
                    system: Some(agent.profile().system_prompt.to_string()),
                    context: if profile.use_memory {
                        context.to_vec()
                    } else {
                        Vec::new()
                    },
                    temperature: Some(profile.temperature),
                    max_tokens: Some(self.ollama.max_tokens),
                };
                tokio::spawn(async move { responder.respond(agent, &query, &request, wait).await })
            })
            .collect();

        let joined = futures::future::join_all(handles).await;

        let outputs: Vec<AgentOutput> = selected
            .iter()
            .zip(joined)
            .map(|(&agent, result)| match result {
                Ok(generation) => AgentOutput {
                    agent,
                    text: generation.text,
                    source: generation.source,
                    elapsed_ms: generation.elapsed_ms,
                },
                Err(e) => {
                    tracing::error!(agent = %agent, error = %e, "Agent task failed");
                    AgentOutput {
                        agent,
                        text: templates::unavailable_response(agent, query),
                        source: ResponseSource::Fallback {
                            reason: FallbackReason::Error,
                        },
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    }
                }
            })
            .collect();

        let response = synthesize(&outputs);
        let ai_used = outputs.iter().any(AgentOutput::used_llm);

        AgentRun {
            response,
            agents_involved: selected,
            primary_agent: routing.agent,
            routing,
            outputs,
            ai_used,
            mode,
            elapsed_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Merge persona outputs into one reply. Sections follow routing table order.
pub fn synthesize(outputs: &[AgentOutput]) -> String {
    match outputs {
        [] => templates::EMPTY_SYNTHESIS.to_string(),
        [only] => only.text.clone(),
        many => {
            let mut ordered: Vec<&AgentOutput> = many.iter().collect();
            ordered.sort_by_key(|o| AgentId::ALL.iter().position(|id| *id == o.agent));

            let mut parts = vec!["🧳 **Comprehensive Travel Guidance**".to_string()];
            for output in &ordered {
                let profile = output.agent.profile();
                parts.push(format!(
                    "## {} {}\n\n{}",
                    profile.emoji,
                    profile.name,
                    output.text.trim()
                ));
            }
            parts.push(format!(
                "*Coordinated response from {} travel specialists*",
                ordered.len()
            ));
            parts.join("\n\n")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use travel_core::llm::LlmError;

    struct EchoBackend {
        delay: Duration,
    }

    #[async_trait]
    impl LlmBackend for EchoBackend {
        async fn generate(&self, request: &GenerateRequest) -> Result<String, LlmError> {
            tokio::time::sleep(self.delay).await;
            Ok(format!(
                "{} answering at length about: {}",
                request.system.as_deref().unwrap_or("nobody"),
                request.prompt
            ))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn orchestrator(delay: Duration, max_wait_secs: u64) -> Orchestrator {
        let ollama = OllamaConfig {
            max_wait_secs,
            ..OllamaConfig::default()
        };
        Orchestrator::new(
            Arc::new(EchoBackend { delay }),
            ollama,
            &RoutingConfig::default(),
        )
    }

    fn output(agent: AgentId, text: &str) -> AgentOutput {
        AgentOutput {
            agent,
            text: text.to_string(),
            source: ResponseSource::Llm,
            elapsed_ms: 1,
        }
    }

    // ========================================================================
    // TEST 1: synthesize edge cases
    // ========================================================================
    #[test]
    fn test_synthesize_empty_and_single() {
        assert_eq!(synthesize(&[]), templates::EMPTY_SYNTHESIS);
        let single = output(AgentId::TripCalmPractice, "Breathe slowly.");
        assert_eq!(synthesize(&[single]), "Breathe slowly.");
    }

    // ========================================================================
    // TEST 2: several outputs become table-ordered sections
    // ========================================================================
    #[test]
    fn test_synthesize_orders_sections_by_table() {
        let merged = synthesize(&[
            output(AgentId::TripCalmPractice, "calm text"),
            output(AgentId::TextTripAnalyzer, "plan text"),
        ]);
        assert!(merged.starts_with("🧳 **Comprehensive Travel Guidance**"));
        let analyzer = merged.find("## 🗺️ Trip Analyzer").unwrap();
        let calm = merged.find("## 🧘 Calm Practice").unwrap();
        assert!(analyzer < calm);
        assert!(merged.ends_with("*Coordinated response from 2 travel specialists*"));
    }

    // ========================================================================
    // TEST 3: agent selection respects the mode's agent cap
    // ========================================================================
    #[test]
    fn test_select_agents_caps_by_mode() {
        let q = "I'm stressed about my Tokyo trip budget, what should I decide";
        let fast = Orchestrator::select_agents(q, ProcessingMode::UltraFast);
        assert_eq!(fast.len(), 1);
        let balanced = Orchestrator::select_agents(q, ProcessingMode::Balanced);
        assert!(balanced.len() <= 3);
        assert_eq!(balanced[0], agents::route(q).agent);
    }

    // ========================================================================
    // TEST 4: distress pulls in the calm persona as a follow-up
    // ========================================================================
    #[test]
    fn test_select_agents_adds_calm_follow_up() {
        let q = "planning a trip and feeling overwhelmed";
        let selected = Orchestrator::select_agents(q, ProcessingMode::Balanced);
        assert!(selected.contains(&AgentId::TripCalmPractice));
    }

    // ========================================================================
    // TEST 5: wait is the smaller of the mode timeout and max_wait_secs
    // ========================================================================
    #[test]
    fn test_wait_for_takes_minimum() {
        let orch = orchestrator(Duration::ZERO, 8);
        assert_eq!(orch.wait_for(ProcessingMode::UltraFast), Duration::from_secs(3));
        assert_eq!(orch.wait_for(ProcessingMode::Balanced), Duration::from_secs(8));
        assert_eq!(orch.wait_for(ProcessingMode::Comprehensive), Duration::from_secs(8));
    }

    // ========================================================================
    // TEST 6: a fast backend answers every selected persona
    // ========================================================================
    #[tokio::test]
    async fn test_process_uses_llm_answers() {
        let orch = orchestrator(Duration::ZERO, 8);
        let run = orch
            .process("plan a budget trip to Rome", ProcessingMode::UltraFast, &[])
            .await;
        assert!(run.ai_used);
        assert_eq!(run.primary_agent, AgentId::TextTripAnalyzer);
        assert_eq!(run.outputs.len(), 1);
        assert!(run.response.contains("You are TextTripAnalyzer"));
    }

    // ========================================================================
    // TEST 7: a stalled backend yields the persona's canned text
    // ========================================================================
    #[tokio::test]
    async fn test_process_falls_back_when_backend_stalls() {
        let orch = orchestrator(Duration::from_secs(30), 1);
        let query = "how do I ask the hotel staff for a late checkout";
        let run = orch.process(query, ProcessingMode::UltraFast, &[]).await;
        assert!(!run.ai_used);
        assert_eq!(run.primary_agent, AgentId::TripCommsCoach);
        assert_eq!(
            run.response,
            templates::fallback_response(AgentId::TripCommsCoach, query)
        );
        assert!(matches!(
            run.outputs[0].source,
            ResponseSource::Fallback {
                reason: FallbackReason::Timeout
            }
        ));
    }
}
