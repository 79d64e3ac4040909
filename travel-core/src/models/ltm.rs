use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LtmEntry {
    pub id: Uuid,
    pub user_id: i64,
    pub agent_name: String,
    pub memory_key: String,
    pub memory_value: String,
    pub context_metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
