use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Chat,
    Recording,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Chat => "chat",
            SessionMode::Recording => "recording",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: i64,
    pub title: String,
    pub mode: String,
    pub started_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
    pub turn_count: i32,
    pub is_active: bool,
    pub summary: Option<String>,
}

impl Session {
    pub fn new(user_id: i64, mode: SessionMode, title: Option<String>) -> Self {
        let now = Utc::now();
        let title = title.unwrap_or_else(|| match mode {
            SessionMode::Chat => "Chat Session".to_string(),
            SessionMode::Recording => "Recording Session".to_string(),
        });
        Self {
            id: Uuid::new_v4(),
            user_id,
            title,
            mode: mode.as_str().to_string(),
            started_at: now,
            last_at: now,
            turn_count: 0,
            is_active: true,
            summary: None,
        }
    }

    /// Minutes since the last turn, measured against `now`.
    pub fn idle_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_at).num_minutes()
    }
}
