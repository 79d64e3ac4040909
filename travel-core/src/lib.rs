pub mod agents;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod profile;
pub mod stm;
pub mod templates;

pub use agents::{AgentId, AgentProfile, ModeProfile, ProcessingMode, RoutingDecision, AGENTS};
pub use config::TravelConfig;
pub use error::TravelError;
pub use llm::{
    FallbackPolicy, FallbackReason, FallbackResponder, GenerateRequest, Generation, LlmBackend,
    LlmError, OllamaClient, OllamaStatus, ResponseSource,
};
pub use profile::{extract_insights, ProfileInsights, TravelProfile};
pub use stm::{connect_store, InMemoryStore, RedisStore, ShortTermStore, StoreError};
