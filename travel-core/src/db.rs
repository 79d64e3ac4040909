use crate::config::DatabaseConfig;
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Tables the long-term store reads and writes.
pub const LTM_TABLES: [&str; 5] = [
    "travel_sessions",
    "travel_turns",
    "agent_interactions",
    "ltm_entries",
    "user_travel_profiles",
];

/// Pool that connects on first use, so the API can serve while Postgres is down.
pub fn create_lazy_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(3))
        .connect_lazy(&config.url)
}

pub async fn health_check(pool: &PgPool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT version()").fetch_one(pool).await?;
    Ok(row.0)
}

/// Names from [`LTM_TABLES`] that do not exist in the connected database.
pub async fn missing_tables(pool: &PgPool) -> Result<Vec<String>, sqlx::Error> {
    let mut missing = Vec::new();
    for table in LTM_TABLES {
        let row: (Option<String>,) = sqlx::query_as("SELECT to_regclass($1)::text")
            .bind(table)
            .fetch_one(pool)
            .await?;
        if row.0.is_none() {
            missing.push(table.to_string());
        }
    }
    Ok(missing)
}
