//! Conversation sessions.
//!
//! The live view of a session (metadata, turn list, recent index) sits in
//! short-term memory. Every change is mirrored into `travel_sessions` and
//! `travel_turns`; those writes are best-effort.

use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use travel_core::config::MemoryConfig;
use travel_core::models::{Session, SessionMode, Turn, TurnRole};
use travel_core::stm::keys;
use uuid::Uuid;

use super::{best_effort, Stores};

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub session: Session,
    pub turns: Vec<Turn>,
}

/// Content and provenance of one turn to record.
#[derive(Debug, Clone)]
pub struct NewTurn<'a> {
    pub role: TurnRole,
    pub content: &'a str,
    pub agent_name: Option<&'a str>,
    pub metadata: serde_json::Value,
}

impl<'a> NewTurn<'a> {
    pub fn user(content: &'a str) -> Self {
        Self {
            role: TurnRole::User,
            content,
            agent_name: None,
            metadata: serde_json::json!({}),
        }
    }

    pub fn assistant(content: &'a str, agent_name: Option<&'a str>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content,
            agent_name,
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Reuse the user's active session unless it has gone idle, otherwise open a
/// new one.
pub async fn start_session(
    stores: &Stores,
    config: &MemoryConfig,
    user_id: i64,
    mode: SessionMode,
    title: Option<String>,
    force_new: bool,
) -> Result<Session> {
    if !force_new {
        if let Some(session) = active_session(stores, user_id).await? {
            let idle = session.idle_minutes(Utc::now());
            if session.is_active && idle < config.session_idle_minutes {
                tracing::debug!(user_id, session_id = %session.id, idle, "Reusing active session");
                return Ok(session);
            }
        }
    }

    let session = Session::new(user_id, mode, title);
    let ttl = Some(Duration::from_secs(config.session_ttl_secs));
    write_session(stores, config, &session).await?;
    stores
        .stm
        .set(&keys::active_session(user_id), &session.id.to_string(), ttl)
        .await?;

    best_effort(
        "insert travel_sessions",
        sqlx::query(
            "INSERT INTO travel_sessions
                (id, user_id, title, mode, started_at, last_at, turn_count, is_active, summary)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(session.id)
        .bind(session.user_id)
        .bind(&session.title)
        .bind(&session.mode)
        .bind(session.started_at)
        .bind(session.last_at)
        .bind(session.turn_count)
        .bind(session.is_active)
        .bind(&session.summary)
        .execute(&stores.pool)
        .await,
    );

    tracing::info!(user_id, session_id = %session.id, mode = mode.as_str(), "Started session");
    Ok(session)
}

/// Append a turn to the session and the user's recent index.
pub async fn add_turn(
    stores: &Stores,
    config: &MemoryConfig,
    user_id: i64,
    session_id: Uuid,
    turn: NewTurn<'_>,
) -> Result<Turn> {
    let record = Turn {
        id: Uuid::new_v4(),
        session_id,
        user_id,
        role: turn.role.as_str().to_string(),
        agent_name: turn.agent_name.map(str::to_string),
        content: turn.content.to_string(),
        metadata: turn.metadata,
        created_at: Utc::now(),
    };
    let ttl = Some(Duration::from_secs(config.session_ttl_secs));
    let encoded = serde_json::to_string(&record)?;
    let sid = session_id.to_string();

    stores
        .stm
        .push_capped(
            &keys::session_turns(user_id, &sid),
            &encoded,
            config.session_turn_cap,
            ttl,
        )
        .await?;
    stores
        .stm
        .push_capped(&keys::recent(user_id), &encoded, config.recent_index_cap, ttl)
        .await?;

    if let Some(mut session) = load_session(stores, user_id, &sid).await? {
        session.turn_count += 1;
        session.last_at = record.created_at;
        write_session(stores, config, &session).await?;
    }

    best_effort(
        "insert travel_turns",
        sqlx::query(
            "INSERT INTO travel_turns
                (id, session_id, user_id, role, agent_name, content, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.id)
        .bind(record.session_id)
        .bind(record.user_id)
        .bind(&record.role)
        .bind(&record.agent_name)
        .bind(&record.content)
        .bind(&record.metadata)
        .bind(record.created_at)
        .execute(&stores.pool)
        .await,
    );
    best_effort(
        "touch travel_sessions",
        sqlx::query(
            "UPDATE travel_sessions SET turn_count = turn_count + 1, last_at = $2 WHERE id = $1",
        )
        .bind(session_id)
        .bind(record.created_at)
        .execute(&stores.pool)
        .await,
    );

    Ok(record)
}

/// The last `limit` turns of a session, oldest first.
pub async fn session_context(
    stores: &Stores,
    user_id: i64,
    session_id: Uuid,
    limit: usize,
) -> Result<Vec<Turn>> {
    let raw = stores
        .stm
        .range(&keys::session_turns(user_id, &session_id.to_string()), limit)
        .await?;
    let mut turns = decode_turns(raw);
    turns.reverse();
    Ok(turns)
}

/// Context lines in the `role: content` form handed to the model.
pub fn context_lines(turns: &[Turn]) -> Vec<String> {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect()
}

pub async fn end_session(
    stores: &Stores,
    config: &MemoryConfig,
    user_id: i64,
    session_id: Uuid,
    summary: Option<String>,
) -> Result<()> {
    let sid = session_id.to_string();
    let active_key = keys::active_session(user_id);
    if stores.stm.get(&active_key).await?.as_deref() == Some(sid.as_str()) {
        stores.stm.delete(&active_key).await?;
    }

    if let Some(mut session) = load_session(stores, user_id, &sid).await? {
        session.is_active = false;
        session.summary = summary.clone();
        write_session(stores, config, &session).await?;
    }

    best_effort(
        "close travel_sessions",
        sqlx::query("UPDATE travel_sessions SET is_active = FALSE, summary = $2 WHERE id = $1")
            .bind(session_id)
            .bind(&summary)
            .execute(&stores.pool)
            .await,
    );

    tracing::info!(user_id, session_id = %session_id, "Ended session");
    Ok(())
}

/// Most recently used sessions first. Reads short-term metadata when the
/// database cannot be queried.
pub async fn list_sessions(stores: &Stores, user_id: i64, limit: i64) -> Result<Vec<Session>> {
    let rows: Result<Vec<Session>, sqlx::Error> = sqlx::query_as(
        "SELECT id, user_id, title, mode, started_at, last_at, turn_count, is_active, summary
         FROM travel_sessions
         WHERE user_id = $1
         ORDER BY last_at DESC
         LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(&stores.pool)
    .await;

    match rows {
        Ok(sessions) => Ok(sessions),
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Listing sessions from short-term memory");
            let mut sessions = Vec::new();
            for key in stores.stm.keys(&keys::session_prefix(user_id)).await? {
                if key.ends_with(":turns") {
                    continue;
                }
                if let Some(raw) = stores.stm.get(&key).await? {
                    if let Ok(session) = serde_json::from_str::<Session>(&raw) {
                        sessions.push(session);
                    }
                }
            }
            sessions.sort_by(|a, b| b.last_at.cmp(&a.last_at));
            sessions.truncate(limit.max(0) as usize);
            Ok(sessions)
        }
    }
}

/// Metadata and turns (oldest first), or `None` for an unknown session.
pub async fn session_detail(
    stores: &Stores,
    user_id: i64,
    session_id: Uuid,
) -> Result<Option<SessionDetail>> {
    let sid = session_id.to_string();
    if let Some(session) = load_session(stores, user_id, &sid).await? {
        let mut turns = decode_turns(
            stores
                .stm
                .range(&keys::session_turns(user_id, &sid), 0)
                .await?,
        );
        turns.reverse();
        return Ok(Some(SessionDetail { session, turns }));
    }

    let row: Option<Session> = match sqlx::query_as(
        "SELECT id, user_id, title, mode, started_at, last_at, turn_count, is_active, summary
         FROM travel_sessions WHERE id = $1 AND user_id = $2",
    )
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(&stores.pool)
    .await
    {
        Ok(row) => row,
        Err(e) => {
            tracing::warn!(error = %e, "Session lookup in long-term memory failed");
            None
        }
    };

    let Some(session) = row else {
        return Ok(None);
    };

    let turns: Vec<Turn> = sqlx::query_as(
        "SELECT id, session_id, user_id, role, agent_name, content, metadata, created_at
         FROM travel_turns WHERE session_id = $1 ORDER BY created_at ASC",
    )
    .bind(session_id)
    .fetch_all(&stores.pool)
    .await?;

    Ok(Some(SessionDetail { session, turns }))
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

async fn active_session(stores: &Stores, user_id: i64) -> Result<Option<Session>> {
    match stores.stm.get(&keys::active_session(user_id)).await? {
        Some(sid) => load_session(stores, user_id, &sid).await,
        None => Ok(None),
    }
}

async fn load_session(stores: &Stores, user_id: i64, session_id: &str) -> Result<Option<Session>> {
    match stores.stm.get(&keys::session(user_id, session_id)).await? {
        Some(raw) => Ok(serde_json::from_str(&raw).ok()),
        None => Ok(None),
    }
}

async fn write_session(stores: &Stores, config: &MemoryConfig, session: &Session) -> Result<()> {
    let ttl = Some(Duration::from_secs(config.session_ttl_secs));
    stores
        .stm
        .set(
            &keys::session(session.user_id, &session.id.to_string()),
            &serde_json::to_string(session)?,
            ttl,
        )
        .await?;
    Ok(())
}

fn decode_turns(raw: Vec<String>) -> Vec<Turn> {
    raw.iter()
        .filter_map(|s| serde_json::from_str(s).ok())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
