//! Agent personas and the keyword router.
//!
//! Each persona is a system prompt, a keyword list and a priority. Routing is
//! a linear scan over the six personas:
//!
//!   hits(agent, query)  = |{k ∈ agent.keywords : k ⊆ lowercase(query)}|
//!   score(agent, query) = 2 × hits + priority_bonus(agent.priority)   if hits > 0
//!                       = 0                                          otherwise
//!
//! The highest score wins (strict `>`, table order breaks ties). Gating the
//! bonus on a hit keeps a query that matches no keyword with the trip
//! analyzer rather than the priority-1 personas.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    TextTripAnalyzer,
    TripMoodDetector,
    TripCommsCoach,
    TripBehaviorGuide,
    TripCalmPractice,
    TripSummarySynth,
}

impl AgentId {
    /// All personas in routing table order.
    pub const ALL: [AgentId; 6] = [
        AgentId::TextTripAnalyzer,
        AgentId::TripMoodDetector,
        AgentId::TripCommsCoach,
        AgentId::TripBehaviorGuide,
        AgentId::TripCalmPractice,
        AgentId::TripSummarySynth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::TextTripAnalyzer => "TextTripAnalyzer",
            AgentId::TripMoodDetector => "TripMoodDetector",
            AgentId::TripCommsCoach => "TripCommsCoach",
            AgentId::TripBehaviorGuide => "TripBehaviorGuide",
            AgentId::TripCalmPractice => "TripCalmPractice",
            AgentId::TripSummarySynth => "TripSummarySynth",
        }
    }

    /// Accepts the persona id or its routing key.
    pub fn parse(s: &str) -> Option<Self> {
        AgentId::ALL
            .into_iter()
            .find(|id| id.as_str() == s || id.profile().routing_key == s)
    }

    pub fn profile(&self) -> &'static AgentProfile {
        &AGENTS[self.index()]
    }

    fn index(&self) -> usize {
        match self {
            AgentId::TextTripAnalyzer => 0,
            AgentId::TripMoodDetector => 1,
            AgentId::TripCommsCoach => 2,
            AgentId::TripBehaviorGuide => 3,
            AgentId::TripCalmPractice => 4,
            AgentId::TripSummarySynth => 5,
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: &'static str,
    pub emoji: &'static str,
    pub expertise: &'static str,
    pub description: &'static str,
    pub keywords: &'static [&'static str],
    /// Lower is more urgent. Priority 1 personas get the routing bonus.
    pub priority: u8,
    pub system_prompt: &'static str,
    pub routing_key: &'static str,
}

pub static AGENTS: [AgentProfile; 6] = [
    AgentProfile {
        id: AgentId::TextTripAnalyzer,
        name: "Trip Analyzer",
        emoji: "🗺️",
        expertise: "Trip Planning & Analysis",
        description: "Analyzes travel plans, budgets, destinations and itineraries",
        keywords: &[
            "plan", "trip", "budget", "destination", "analyze", "tokyo", "vacation", "travel",
            "where",
        ],
        priority: 2,
        system_prompt: "You are TextTripAnalyzer, expert at analyzing travel plans, budgets, and destinations. Provide practical, actionable travel planning advice with specific recommendations.",
        routing_key: "trip_analysis",
    },
    AgentProfile {
        id: AgentId::TripMoodDetector,
        name: "Mood Detector",
        emoji: "😊",
        expertise: "Travel Emotions & Mood",
        description: "Reads excitement, nervousness and stress in travel planning",
        keywords: &[
            "excited", "nervous", "worried", "feeling", "mood", "emotion", "anxious", "stress",
        ],
        priority: 2,
        system_prompt: "You are TripMoodDetector, an expert in travel emotions. Detect feelings like excitement, nervousness, or stress in travel planning and respond with empathetic, practical emotional guidance.",
        routing_key: "mood_support",
    },
    AgentProfile {
        id: AgentId::TripCommsCoach,
        name: "Communication Coach",
        emoji: "💬",
        expertise: "Travel Communication",
        description: "Phrases and strategies for hotels, staff and local interactions",
        keywords: &[
            "talk", "ask", "hotel", "staff", "communicate", "phrase", "say", "language", "speak",
        ],
        priority: 2,
        system_prompt: "You are TripCommsCoach, a communication expert for travelers. Provide specific phrases and communication strategies for hotels, staff, and travel interactions. Give 2-3 concrete examples.",
        routing_key: "communication_help",
    },
    AgentProfile {
        id: AgentId::TripBehaviorGuide,
        name: "Behavior Guide",
        emoji: "🧭",
        expertise: "Decisions & Next Steps",
        description: "Breaks decision paralysis and proposes clear next actions",
        keywords: &[
            "stuck", "decide", "choose", "should", "next", "help", "what now", "action", "options",
        ],
        priority: 2,
        system_prompt: "You are TripBehaviorGuide, a decision coach for travelers. Help with stuck decisions and provide clear next steps using structured approaches that overcome analysis paralysis.",
        routing_key: "decision_support",
    },
    AgentProfile {
        id: AgentId::TripCalmPractice,
        name: "Calm Practice",
        emoji: "🧘",
        expertise: "Stress Relief & Calm",
        description: "Breathing exercises and calming techniques for travel stress",
        keywords: &[
            "overwhelmed", "stressed", "anxiety", "calm", "breathe", "panic", "relax", "nervous",
        ],
        priority: 1,
        system_prompt: "You are TripCalmPractice, a mindfulness expert for travel stress. Provide calming techniques, breathing exercises, and stress management strategies. Be soothing and practical.",
        routing_key: "stress_relief",
    },
    AgentProfile {
        id: AgentId::TripSummarySynth,
        name: "Summary Synthesizer",
        emoji: "📋",
        expertise: "Summaries & Action Plans",
        description: "Combines travel information into overviews with next steps",
        keywords: &[
            "summary", "summarize", "overview", "combine", "complete", "synthesize", "overall",
        ],
        priority: 1,
        system_prompt: "You are TripSummarySynth, a synthesis expert. Combine travel information into comprehensive overviews with clear next steps. Provide structured summaries and action plans.",
        routing_key: "summary_request",
    },
];

// ============================================================================
// Routing
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub agent: AgentId,
    pub score: u32,
    /// Score of every persona, in table order.
    pub scores: Vec<(AgentId, u32)>,
}

fn priority_bonus(priority: u8) -> u32 {
    if priority == 1 {
        1
    } else {
        0
    }
}

/// Score one persona against a query. The priority bonus only applies to
/// personas that matched at least one keyword.
pub fn score(profile: &AgentProfile, query: &str) -> u32 {
    let lowered = query.to_lowercase();
    score_lowered(profile, &lowered)
}

fn score_lowered(profile: &AgentProfile, lowered: &str) -> u32 {
    let hits = profile
        .keywords
        .iter()
        .filter(|k| lowered.contains(**k))
        .count() as u32;
    if hits == 0 {
        return 0;
    }
    2 * hits + priority_bonus(profile.priority)
}

pub fn route(query: &str) -> RoutingDecision {
    let lowered = query.to_lowercase();
    let scores: Vec<(AgentId, u32)> = AGENTS
        .iter()
        .map(|p| (p.id, score_lowered(p, &lowered)))
        .collect();

    let mut best = AgentId::TextTripAnalyzer;
    let mut best_score = 0;
    for (id, s) in &scores {
        if *s > best_score {
            best_score = *s;
            best = *id;
        }
    }

    tracing::debug!(agent = %best, score = best_score, "Routed query");

    RoutingDecision {
        agent: best,
        score: best_score,
        scores,
    }
}

/// Personas that matched the query, best first, capped at `limit`.
/// Never empty: an unmatched query yields the default persona.
pub fn rank(query: &str, limit: usize) -> Vec<AgentId> {
    let decision = route(query);
    let mut matched: Vec<(AgentId, u32)> = decision
        .scores
        .iter()
        .copied()
        .filter(|(_, s)| *s > 0)
        .collect();
    // stable: equal scores keep table order
    matched.sort_by(|a, b| b.1.cmp(&a.1));

    let mut ranked: Vec<AgentId> = vec![decision.agent];
    for (id, _) in matched {
        if !ranked.contains(&id) {
            ranked.push(id);
        }
    }
    ranked.truncate(limit.max(1));
    ranked
}

/// Which persona should run after `current`, or `None` to synthesize.
pub fn follow_up(query: &str, current: AgentId, responded: usize) -> Option<AgentId> {
    let lowered = query.to_lowercase();
    let wants_summary = ["summary", "overview", "combine"]
        .iter()
        .any(|w| lowered.contains(w));
    if wants_summary || responded >= 2 {
        return None;
    }

    let distressed = ["overwhelmed", "stressed", "anxiety"]
        .iter()
        .any(|w| lowered.contains(w));
    if current != AgentId::TripCalmPractice && distressed {
        return Some(AgentId::TripCalmPractice);
    }

    None
}

// ============================================================================
// Processing modes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    UltraFast,
    #[default]
    Balanced,
    Comprehensive,
}

#[derive(Debug, Clone, Copy)]
pub struct ModeProfile {
    pub max_agents: usize,
    pub timeout: Duration,
    pub use_memory: bool,
    pub temperature: f32,
}

impl ProcessingMode {
    pub fn profile(&self) -> ModeProfile {
        match self {
            ProcessingMode::UltraFast => ModeProfile {
                max_agents: 1,
                timeout: Duration::from_secs(3),
                use_memory: false,
                temperature: 0.3,
            },
            ProcessingMode::Balanced => ModeProfile {
                max_agents: 3,
                timeout: Duration::from_secs(10),
                use_memory: true,
                temperature: 0.7,
            },
            ProcessingMode::Comprehensive => ModeProfile {
                max_agents: 6,
                timeout: Duration::from_secs(30),
                use_memory: true,
                temperature: 0.8,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::UltraFast => "ultra_fast",
            ProcessingMode::Balanced => "balanced",
            ProcessingMode::Comprehensive => "comprehensive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ultra_fast" => Some(ProcessingMode::UltraFast),
            "balanced" => Some(ProcessingMode::Balanced),
            "comprehensive" => Some(ProcessingMode::Comprehensive),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_matches_ids() {
        for id in AgentId::ALL {
            assert_eq!(id.profile().id, id);
        }
    }

    #[test]
    fn test_route_trip_planning() {
        let d = route("Help me plan a trip to Tokyo on a budget");
        assert_eq!(d.agent, AgentId::TextTripAnalyzer);
        // plan, trip, tokyo, budget
        assert_eq!(d.score, 8);
    }

    #[test]
    fn test_route_stress_prefers_calm_practice() {
        let d = route("I'm totally overwhelmed and stressed about this");
        assert_eq!(d.agent, AgentId::TripCalmPractice);
        assert_eq!(d.score, 5);
    }

    #[test]
    fn test_route_nervous_tie_goes_to_priority_one() {
        // both Mood Detector and Calm Practice list "nervous"
        let d = route("I am nervous");
        assert_eq!(d.agent, AgentId::TripCalmPractice);
    }

    #[test]
    fn test_route_hotel_communication() {
        let d = route("How do I ask hotel staff for a late checkout?");
        assert_eq!(d.agent, AgentId::TripCommsCoach);
        assert_eq!(d.score, 6);
    }

    #[test]
    fn test_route_decisions() {
        let d = route("I'm stuck, which options should I choose?");
        assert_eq!(d.agent, AgentId::TripBehaviorGuide);
    }

    #[test]
    fn test_route_summary() {
        let d = route("Can you summarize everything?");
        assert_eq!(d.agent, AgentId::TripSummarySynth);
    }

    #[test]
    fn test_route_mood() {
        let d = route("Feeling excited!");
        assert_eq!(d.agent, AgentId::TripMoodDetector);
    }

    #[test]
    fn test_route_unmatched_defaults_to_analyzer() {
        let d = route("hello there");
        assert_eq!(d.agent, AgentId::TextTripAnalyzer);
        assert_eq!(d.score, 0);
        assert!(d.scores.iter().all(|(_, s)| *s == 0));
    }

    #[test]
    fn test_route_is_case_insensitive() {
        assert_eq!(route("TOKYO TRIP").agent, AgentId::TextTripAnalyzer);
    }

    #[test]
    fn test_rank_orders_by_score_and_caps() {
        let ranked = rank("I'm nervous about my Tokyo trip budget, should I calm down?", 3);
        assert_eq!(ranked.len(), 3);
        // tokyo, trip, budget = 6 beats calm + nervous = 5
        assert_eq!(ranked[0], AgentId::TextTripAnalyzer);
        assert_eq!(ranked[1], AgentId::TripCalmPractice);
    }

    #[test]
    fn test_rank_never_empty() {
        assert_eq!(rank("zzz", 6), vec![AgentId::TextTripAnalyzer]);
        assert_eq!(rank("zzz", 0).len(), 1);
    }

    #[test]
    fn test_follow_up_routes_distress_to_calm() {
        let next = follow_up("planning is making me stressed", AgentId::TextTripAnalyzer, 1);
        assert_eq!(next, Some(AgentId::TripCalmPractice));
        assert_eq!(
            follow_up("planning is making me stressed", AgentId::TripCalmPractice, 1),
            None
        );
    }

    #[test]
    fn test_follow_up_synthesizes_after_two_or_summary() {
        assert_eq!(follow_up("I'm stressed", AgentId::TextTripAnalyzer, 2), None);
        assert_eq!(
            follow_up("give me an overview, I'm stressed", AgentId::TextTripAnalyzer, 1),
            None
        );
    }

    #[test]
    fn test_parse_accepts_id_and_routing_key() {
        assert_eq!(AgentId::parse("TripCommsCoach"), Some(AgentId::TripCommsCoach));
        assert_eq!(AgentId::parse("stress_relief"), Some(AgentId::TripCalmPractice));
        assert_eq!(AgentId::parse("RouterAgent"), None);
    }

    #[test]
    fn test_mode_profiles() {
        assert_eq!(ProcessingMode::UltraFast.profile().max_agents, 1);
        assert_eq!(ProcessingMode::Balanced.profile().timeout, Duration::from_secs(10));
        assert!(!ProcessingMode::UltraFast.profile().use_memory);
        assert_eq!(ProcessingMode::parse("comprehensive"), Some(ProcessingMode::Comprehensive));
        assert_eq!(ProcessingMode::Comprehensive.as_str(), "comprehensive");
    }
}
