//! Request flows: conversational chat, recorded-trip batch analysis, and the
//! orchestrated query endpoints.

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use travel_core::agents::{AgentId, ProcessingMode};
use travel_core::config::TravelConfig;
use travel_core::models::{InteractionKind, Session, SessionMode};
use uuid::Uuid;

use super::sessions::{self, NewTurn};
use super::{memory, profiles, Stores};
use crate::orchestrator::{AgentRun, Orchestrator};

#[derive(Debug, Clone, Serialize)]
pub struct TravelResponse {
    pub user_id: i64,
    pub response: String,
    pub agents_involved: Vec<String>,
    /// Seconds.
    pub processing_time: f64,
    pub session_id: String,
    pub mode: String,
    pub ai_used: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingSummary {
    pub primary_agent: String,
    pub score: u32,
    pub scores: BTreeMap<String, u32>,
    pub mode: ProcessingMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub success: bool,
    pub response: String,
    pub agents_involved: Vec<String>,
    pub agent_responses: BTreeMap<String, String>,
    pub routing_decision: RoutingSummary,
    /// Seconds.
    pub processing_time: f64,
    pub ai_used: bool,
}

#[derive(Clone)]
pub struct TravelService {
    pub stores: Stores,
    pub config: TravelConfig,
    pub orchestrator: Orchestrator,
}

impl TravelService {
    pub fn new(stores: Stores, config: TravelConfig, orchestrator: Orchestrator) -> Self {
        Self {
            stores,
            config,
            orchestrator,
        }
    }

    /// One conversational turn in the user's active chat session.
    ///
    /// Memory failures are logged and skipped; the answer is returned either
    /// way.
    pub async fn chat(&self, user_id: i64, text: &str) -> Result<TravelResponse> {
        let start = Instant::now();
        let mem = &self.config.memory;

        let session = self.open_session(user_id, SessionMode::Chat, None, false).await;
        let context = match sessions::session_context(&self.stores, user_id, session.id, mem.context_turns)
            .await
        {
            Ok(turns) => turns,
            Err(e) => {
                tracing::warn!(user_id, session_id = %session.id, error = %e, "Session context unavailable");
                Vec::new()
            }
        };
        self.record_turn(user_id, session.id, NewTurn::user(text)).await;
        self.absorb(user_id, text, SessionMode::Chat).await;

        let run = self
            .orchestrator
            .process(
                text,
                self.config.routing.chat_mode,
                &sessions::context_lines(&context),
            )
            .await;

        let processing_ms = start.elapsed().as_millis() as u64;
        let agents = agent_names(&run.agents_involved);
        self.record_turn(
            user_id,
            session.id,
            NewTurn::assistant(&run.response, Some(run.primary_agent.as_str())).with_metadata(
                serde_json::json!({
                    "agents": agents,
                    "processing_time_ms": processing_ms,
                    "ai_used": run.ai_used,
                }),
            ),
        )
        .await;
        self.remember(user_id, text, &run).await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        if elapsed_ms > self.config.routing.chat_sla_ms {
            tracing::warn!(
                user_id,
                elapsed_ms,
                sla_ms = self.config.routing.chat_sla_ms,
                "Chat response exceeded SLA"
            );
        }

        Ok(TravelResponse {
            user_id,
            response: run.response,
            agents_involved: agents,
            processing_time: seconds(elapsed_ms),
            session_id: session.id.to_string(),
            mode: SessionMode::Chat.as_str().to_string(),
            ai_used: run.ai_used,
        })
    }

    /// Analyze a recorded planning conversation in its own session.
    pub async fn batch(&self, user_id: i64, transcript: &str) -> Result<TravelResponse> {
        let start = Instant::now();
        let mem = &self.config.memory;

        let title = format!("Trip Recording - {}", Utc::now().format("%Y-%m-%d %H:%M"));
        let session = self
            .open_session(user_id, SessionMode::Recording, Some(title), true)
            .await;
        self.record_turn(
            user_id,
            session.id,
            NewTurn::user(transcript).with_metadata(serde_json::json!({ "type": "transcript" })),
        )
        .await;
        self.absorb(user_id, transcript, SessionMode::Recording).await;

        let prompt = format!(
            "Analyze this travel planning conversation: {}...",
            preview(transcript, self.config.routing.transcript_preview_chars)
        );
        let run = self
            .orchestrator
            .process(&prompt, self.config.routing.batch_mode, &[])
            .await;

        let agents = agent_names(&run.agents_involved);
        self.record_turn(
            user_id,
            session.id,
            NewTurn::assistant(&run.response, Some(run.primary_agent.as_str())).with_metadata(
                serde_json::json!({
                    "type": "batch_synthesis",
                    "agents": agents,
                    "ai_used": run.ai_used,
                }),
            ),
        )
        .await;
        self.remember(user_id, &prompt, &run).await;
        if let Err(e) = sessions::end_session(
            &self.stores,
            mem,
            user_id,
            session.id,
            Some(preview(&run.response, 200)),
        )
        .await
        {
            tracing::warn!(user_id, session_id = %session.id, error = %e, "Recording session left open");
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        if elapsed_ms > self.config.routing.batch_sla_secs * 1000 {
            tracing::warn!(
                user_id,
                elapsed_ms,
                sla_secs = self.config.routing.batch_sla_secs,
                "Batch analysis exceeded SLA"
            );
        }

        Ok(TravelResponse {
            user_id,
            response: run.response,
            agents_involved: agents,
            processing_time: seconds(elapsed_ms),
            session_id: session.id.to_string(),
            mode: SessionMode::Recording.as_str().to_string(),
            ai_used: run.ai_used,
        })
    }

    /// Orchestrated answer for a named traveler.
    pub async fn perfect_query(&self, user: &str, user_id: i64, question: &str) -> Result<QueryOutcome> {
        let context = vec![format!("Traveler: {}", user)];
        let run = self
            .orchestrator
            .process(question, self.config.routing.chat_mode, &context)
            .await;
        self.remember(user_id, question, &run).await;
        Ok(outcome(run))
    }

    /// Orchestrated answer across the widest persona set. Numeric `user`
    /// names map to that user id, anything else is stored under user 0.
    pub async fn run_graph(&self, user: &str, question: &str) -> Result<QueryOutcome> {
        let user_id = user.trim().parse::<i64>().unwrap_or(0);
        let run = self
            .orchestrator
            .process(question, self.config.routing.batch_mode, &[])
            .await;
        self.remember(user_id, question, &run).await;
        Ok(outcome(run))
    }

    /// The user's session, or a fresh one that lives only for this request
    /// when short-term memory is failing.
    async fn open_session(
        &self,
        user_id: i64,
        mode: SessionMode,
        title: Option<String>,
        force_new: bool,
    ) -> Session {
        match sessions::start_session(
            &self.stores,
            &self.config.memory,
            user_id,
            mode,
            title.clone(),
            force_new,
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Session store unavailable, continuing unrecorded");
                Session::new(user_id, mode, title)
            }
        }
    }

    async fn record_turn(&self, user_id: i64, session_id: Uuid, turn: NewTurn<'_>) {
        if let Err(e) =
            sessions::add_turn(&self.stores, &self.config.memory, user_id, session_id, turn).await
        {
            tracing::warn!(user_id, session_id = %session_id, error = %e, "Turn not recorded");
        }
    }

    async fn absorb(&self, user_id: i64, text: &str, mode: SessionMode) {
        if let Err(e) =
            profiles::absorb_text(&self.stores, &self.config.memory, user_id, text, mode).await
        {
            tracing::warn!(user_id, error = %e, "Profile update skipped");
        }
    }

    async fn remember(&self, user_id: i64, query: &str, run: &AgentRun) {
        let kind = if run.outputs.len() > 1 {
            InteractionKind::Orchestrated
        } else {
            InteractionKind::Single
        };
        if let Err(e) = memory::store_interaction(
            &self.stores,
            &self.config.memory,
            user_id,
            run.primary_agent.as_str(),
            query,
            &run.response,
            kind,
        )
        .await
        {
            tracing::warn!(user_id, agent = run.primary_agent.as_str(), error = %e, "Interaction not remembered");
        }
    }
}

fn outcome(run: AgentRun) -> QueryOutcome {
    let agent_responses = run
        .outputs
        .iter()
        .map(|o| (o.agent.as_str().to_string(), o.text.clone()))
        .collect();
    let routing_decision = RoutingSummary {
        primary_agent: run.routing.agent.as_str().to_string(),
        score: run.routing.score,
        scores: run
            .routing
            .scores
            .iter()
            .map(|(id, s)| (id.as_str().to_string(), *s))
            .collect(),
        mode: run.mode,
    };
    QueryOutcome {
        success: true,
        agents_involved: agent_names(&run.agents_involved),
        agent_responses,
        routing_decision,
        processing_time: seconds(run.elapsed_ms),
        ai_used: run.ai_used,
        response: run.response,
    }
}

fn agent_names(agents: &[AgentId]) -> Vec<String> {
    agents.iter().map(|a| a.as_str().to_string()).collect()
}

/// First `max_chars` characters of `text`.
fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn seconds(ms: u64) -> f64 {
    ms as f64 / 1000.0
}
