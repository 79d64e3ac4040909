//! Per-agent memory.
//!
//! STM holds the latest value an agent wrote for a user, under
//! `stm:agent:{user}:{agent}`. LTM keeps every interaction in
//! `agent_interactions` plus a searchable copy in `ltm_entries`.

use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use travel_core::config::MemoryConfig;
use travel_core::models::{InteractionKind, LtmEntry};
use travel_core::stm::keys;
use uuid::Uuid;

use super::{best_effort, Stores};

/// Window of long-term entries considered by [`search`].
const SEARCH_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub source: &'static str,
    pub agent_name: String,
    pub content: String,
    pub relevance: usize,
    pub created_at: Option<DateTime<Utc>>,
}

// ============================================================================
// SHORT-TERM
// ============================================================================

pub async fn set_stm(
    stores: &Stores,
    user_id: i64,
    agent: &str,
    value: &str,
    ttl: Duration,
) -> Result<()> {
    stores
        .stm
        .set(&keys::agent(user_id, agent), value, Some(ttl))
        .await?;
    Ok(())
}

pub async fn get_stm(stores: &Stores, user_id: i64, agent: &str) -> Result<Option<String>> {
    Ok(stores.stm.get(&keys::agent(user_id, agent)).await?)
}

/// Every live agent value for a user as `(agent, value)` pairs.
pub async fn all_stm(stores: &Stores, user_id: i64) -> Result<Vec<(String, String)>> {
    let prefix = keys::agent_prefix(user_id);
    let mut values = Vec::new();
    for key in stores.stm.keys(&prefix).await? {
        if let Some(value) = stores.stm.get(&key).await? {
            let agent = key.trim_start_matches(&prefix).to_string();
            values.push((agent, value));
        }
    }
    Ok(values)
}

// ============================================================================
// INTERACTIONS
// ============================================================================

/// Record one question/answer exchange in both tiers.
pub async fn store_interaction(
    stores: &Stores,
    config: &MemoryConfig,
    user_id: i64,
    agent: &str,
    query: &str,
    response: &str,
    kind: InteractionKind,
) -> Result<()> {
    set_stm(
        stores,
        user_id,
        agent,
        &format!("Q: {}\nA: {}", query, response),
        Duration::from_secs(config.interaction_ttl_secs),
    )
    .await?;

    let now = Utc::now();
    best_effort(
        "insert agent_interactions",
        sqlx::query(
            "INSERT INTO agent_interactions
                (id, user_id, agent_name, query, response, interaction_type, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(agent)
        .bind(query)
        .bind(response)
        .bind(kind.as_str())
        .bind(now)
        .execute(&stores.pool)
        .await,
    );

    best_effort(
        "insert ltm_entries",
        insert_ltm(
            &stores.pool,
            user_id,
            agent,
            "interaction",
            &format!("Query: {}\nResponse: {}", query, response),
            serde_json::json!({ "interaction_type": kind.as_str() }),
        )
        .await,
    );

    Ok(())
}

// ============================================================================
// LONG-TERM
// ============================================================================

/// Store a free-form value for an agent. Unlike the interaction path this
/// reports database failures to the caller.
pub async fn set_ltm(pool: &PgPool, user_id: i64, agent: &str, value: &str) -> Result<LtmEntry> {
    let entry = insert_ltm(
        pool,
        user_id,
        agent,
        "manual",
        value,
        serde_json::json!({ "source": "api" }),
    )
    .await?;
    Ok(entry)
}

pub async fn ltm_by_agent(
    pool: &PgPool,
    user_id: i64,
    agent: &str,
    limit: i64,
) -> Result<Vec<LtmEntry>> {
    let rows = sqlx::query_as(
        "SELECT id, user_id, agent_name, memory_key, memory_value, context_metadata,
                created_at, updated_at
         FROM ltm_entries
         WHERE user_id = $1 AND agent_name = $2
         ORDER BY created_at DESC
         LIMIT $3",
    )
    .bind(user_id)
    .bind(agent)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn recent_ltm(
    pool: &PgPool,
    user_id: i64,
    agent: Option<&str>,
    days: i64,
) -> Result<Vec<LtmEntry>> {
    let cutoff = Utc::now() - chrono::Duration::days(days);
    let rows = sqlx::query_as(
        "SELECT id, user_id, agent_name, memory_key, memory_value, context_metadata,
                created_at, updated_at
         FROM ltm_entries
         WHERE user_id = $1
           AND created_at >= $2
           AND ($3::text IS NULL OR agent_name = $3)
         ORDER BY created_at DESC",
    )
    .bind(user_id)
    .bind(cutoff)
    .bind(agent)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Case-insensitive substring search over both tiers. Relevance is the
/// number of occurrences; the top `search_limit` hits are returned.
pub async fn search(
    stores: &Stores,
    config: &MemoryConfig,
    user_id: i64,
    query: &str,
    agent: Option<&str>,
) -> Result<Vec<SearchHit>> {
    let needle = query.to_lowercase();
    let mut hits = Vec::new();

    for (agent_name, value) in all_stm(stores, user_id).await? {
        if agent.is_some_and(|a| a != agent_name) {
            continue;
        }
        let relevance = occurrences(&value, &needle);
        if relevance > 0 {
            hits.push(SearchHit {
                source: "stm",
                agent_name,
                content: value,
                relevance,
                created_at: None,
            });
        }
    }

    match recent_ltm(&stores.pool, user_id, agent, SEARCH_WINDOW_DAYS).await {
        Ok(entries) => {
            for entry in entries {
                let relevance = occurrences(&entry.memory_value, &needle);
                if relevance > 0 {
                    hits.push(SearchHit {
                        source: "ltm",
                        agent_name: entry.agent_name,
                        content: entry.memory_value,
                        relevance,
                        created_at: Some(entry.created_at),
                    });
                }
            }
        }
        Err(e) => tracing::warn!(user_id, error = %e, "Searching short-term memory only"),
    }

    hits.sort_by(|a, b| b.relevance.cmp(&a.relevance));
    hits.truncate(config.search_limit);
    Ok(hits)
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

async fn insert_ltm(
    pool: &PgPool,
    user_id: i64,
    agent: &str,
    key: &str,
    value: &str,
    metadata: serde_json::Value,
) -> Result<LtmEntry, sqlx::Error> {
    sqlx::query_as(
        "INSERT INTO ltm_entries
            (id, user_id, agent_name, memory_key, memory_value, context_metadata,
             created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
         RETURNING id, user_id, agent_name, memory_key, memory_value, context_metadata,
                   created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(agent)
    .bind(key)
    .bind(value)
    .bind(metadata)
    .fetch_one(pool)
    .await
}

fn occurrences(haystack: &str, needle_lower: &str) -> usize {
    if needle_lower.is_empty() {
        return 0;
    }
    haystack.to_lowercase().matches(needle_lower).count()
}

// ============================================================================
// TESTS
// ============================================================================
