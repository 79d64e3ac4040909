use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Single,
    Orchestrated,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Single => "single",
            InteractionKind::Orchestrated => "orchestrated",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgentInteraction {
    pub id: Uuid,
    pub user_id: i64,
    pub agent_name: String,
    pub query: String,
    pub response: String,
    pub interaction_type: String,
    pub created_at: DateTime<Utc>,
}
