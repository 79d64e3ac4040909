//! Retention sweeps.
//!
//! Each memory class is trimmed with a `DELETE ... WHERE <timestamp> < cutoff`.
//! Failures are recorded in the class's [`CleanupResult`] and never stop the
//! rest of the sweep.
//!
//! | class          | rule                                                   |
//! |----------------|--------------------------------------------------------|
//! | stm            | expired keys purged (Redis expires them itself)        |
//! | ltm            | `ltm_entries.created_at` older than `ltm_max_age_days` |
//! | interactions   | older than `interaction_max_age_days`                  |
//! | sessions       | inactive, `last_at` older than `session_max_age_hours` |
//!
//! When `ltm_entries` grows past `emergency_row_threshold` the LTM cutoff
//! drops to `emergency_ltm_days`. [`memory_statistics`] reports per-class
//! sizes and how many entries are past their limit.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::broadcast;
use travel_core::config::RetentionConfig;
use travel_core::stm::ShortTermStore;

// ============================================================================
// PUBLIC API
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct CleanupResult {
    pub memory_type: &'static str,
    pub entries_removed: u64,
    pub elapsed_ms: u64,
    pub errors: Vec<String>,
}

impl CleanupResult {
    fn new(memory_type: &'static str) -> Self {
        Self {
            memory_type,
            entries_removed: 0,
            elapsed_ms: 0,
            errors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    pub results: Vec<CleanupResult>,
    pub emergency: bool,
}

impl RetentionReport {
    pub fn total_removed(&self) -> u64 {
        self.results.iter().map(|r| r.entries_removed).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|r| !r.errors.is_empty())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub memory_type: &'static str,
    /// `None` when the class could not be counted.
    pub total_entries: Option<i64>,
    /// Entries the next sweep would remove.
    pub cleanup_eligible: Option<i64>,
    pub health_status: &'static str,
}

impl MemoryStats {
    fn new(memory_type: &'static str, counts: Option<(i64, i64)>) -> Self {
        Self {
            memory_type,
            total_entries: counts.map(|c| c.0),
            cleanup_eligible: counts.map(|c| c.1),
            health_status: counts.map_or("unknown", |(total, eligible)| health_status(total, eligible)),
        }
    }
}

/// Size of each memory class and how much of it is past its retention limit.
pub async fn memory_statistics(
    pool: &PgPool,
    store: &dyn ShortTermStore,
    config: &RetentionConfig,
) -> Vec<MemoryStats> {
    let stm = match store.keys("stm:").await {
        Ok(keys) => Some((keys.len() as i64, 0)),
        Err(e) => {
            tracing::debug!(error = %e, "STM key count unavailable");
            None
        }
    };

    let now = Utc::now();
    let ltm = count_eligible(
        pool,
        "SELECT COUNT(*)::bigint, (COUNT(*) FILTER (WHERE created_at < $1))::bigint
         FROM ltm_entries",
        now - chrono::Duration::days(config.ltm_max_age_days),
    )
    .await;
    let interactions = count_eligible(
        pool,
        "SELECT COUNT(*)::bigint, (COUNT(*) FILTER (WHERE created_at < $1))::bigint
         FROM agent_interactions",
        now - chrono::Duration::days(config.interaction_max_age_days),
    )
    .await;
    let sessions = count_eligible(
        pool,
        "SELECT COUNT(*)::bigint, (COUNT(*) FILTER (WHERE last_at < $1 AND NOT is_active))::bigint
         FROM travel_sessions",
        now - chrono::Duration::hours(config.session_max_age_hours),
    )
    .await;

    vec![
        MemoryStats::new("stm", stm),
        MemoryStats::new("ltm", ltm),
        MemoryStats::new("interactions", interactions),
        MemoryStats::new("sessions", sessions),
    ]
}

/// Sweep every memory class once.
pub async fn run_retention_sweep(
    pool: &PgPool,
    store: &dyn ShortTermStore,
    config: &RetentionConfig,
) -> RetentionReport {
    sweep(pool, store, config, true).await
}

/// Background loop. STM is swept every `sweep_interval_minutes`; the
/// database classes only every `ltm_sweep_interval_hours`.
pub async fn run_retention_loop(
    pool: PgPool,
    store: Arc<dyn ShortTermStore>,
    config: RetentionConfig,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = tokio::time::Duration::from_secs(config.sweep_interval_minutes.max(1) * 60);
    let ltm_every = std::time::Duration::from_secs(config.ltm_sweep_interval_hours * 3600);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_ltm_sweep: Option<Instant> = None;

    tracing::info!(
        "Retention loop started (interval: {}min, ltm every {}h)",
        config.sweep_interval_minutes,
        config.ltm_sweep_interval_hours
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let include_ltm = last_ltm_sweep.map_or(true, |at| at.elapsed() >= ltm_every);
                let report = sweep(&pool, store.as_ref(), &config, include_ltm).await;
                if include_ltm {
                    last_ltm_sweep = Some(Instant::now());
                }
                if report.has_errors() {
                    tracing::warn!("Retention sweep finished with errors: {:?}", report.results);
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Retention loop shutting down");
                break;
            }
        }
    }
}

// ============================================================================
// INTERNAL HELPERS
// ============================================================================

async fn sweep(
    pool: &PgPool,
    store: &dyn ShortTermStore,
    config: &RetentionConfig,
    include_ltm: bool,
) -> RetentionReport {
    let mut report = RetentionReport::default();

    let start = Instant::now();
    let mut stm = CleanupResult::new("stm");
    match store.purge_expired().await {
        Ok(n) => stm.entries_removed = n,
        Err(e) => stm.errors.push(e.to_string()),
    }
    stm.elapsed_ms = start.elapsed().as_millis() as u64;
    report.results.push(stm);

    if !include_ltm {
        return report;
    }

    let ltm_days = match count_ltm(pool).await {
        Ok(rows) => {
            let (days, emergency) = ltm_cutoff_days(rows, config);
            if emergency {
                tracing::warn!(
                    rows,
                    threshold = config.emergency_row_threshold,
                    "LTM over emergency threshold, cutting to {} days",
                    days
                );
            }
            report.emergency = emergency;
            days
        }
        Err(e) => {
            tracing::debug!(error = %e, "LTM row count unavailable");
            config.ltm_max_age_days
        }
    };

    let now = Utc::now();
    report.results.push(
        delete_older(
            pool,
            "ltm",
            "DELETE FROM ltm_entries WHERE created_at < $1",
            now - chrono::Duration::days(ltm_days),
        )
        .await,
    );
    report.results.push(
        delete_older(
            pool,
            "interactions",
            "DELETE FROM agent_interactions WHERE created_at < $1",
            now - chrono::Duration::days(config.interaction_max_age_days),
        )
        .await,
    );

    let session_cutoff = now - chrono::Duration::hours(config.session_max_age_hours);
    let turns = delete_older(
        pool,
        "session_turns",
        "DELETE FROM travel_turns WHERE session_id IN (
             SELECT id FROM travel_sessions WHERE last_at < $1 AND NOT is_active
         )",
        session_cutoff,
    )
    .await;
    report.results.push(turns);
    report.results.push(
        delete_older(
            pool,
            "sessions",
            "DELETE FROM travel_sessions WHERE last_at < $1 AND NOT is_active",
            session_cutoff,
        )
        .await,
    );

    tracing::info!(
        "Retention sweep complete: {} entries removed{}",
        report.total_removed(),
        if report.emergency { " (emergency)" } else { "" }
    );

    report
}

/// LTM age limit for a table holding `rows` entries, and whether the
/// emergency cut applied. The threshold itself is not an emergency.
fn ltm_cutoff_days(rows: i64, config: &RetentionConfig) -> (i64, bool) {
    if rows > config.emergency_row_threshold {
        (config.ltm_max_age_days.min(config.emergency_ltm_days), true)
    } else {
        (config.ltm_max_age_days, false)
    }
}

async fn delete_older(
    pool: &PgPool,
    memory_type: &'static str,
    sql: &str,
    cutoff: chrono::DateTime<Utc>,
) -> CleanupResult {
    let start = Instant::now();
    let mut result = CleanupResult::new(memory_type);
    match sqlx::query(sql).bind(cutoff).execute(pool).await {
        Ok(done) => result.entries_removed = done.rows_affected(),
        Err(e) => {
            tracing::warn!(memory_type, error = %e, "Retention delete failed");
            result.errors.push(e.to_string());
        }
    }
    result.elapsed_ms = start.elapsed().as_millis() as u64;
    result
}

fn health_status(total: i64, eligible: i64) -> &'static str {
    if total == 0 || eligible * 10 < total {
        "good"
    } else {
        "needs_cleanup"
    }
}

async fn count_eligible(
    pool: &PgPool,
    sql: &str,
    cutoff: chrono::DateTime<Utc>,
) -> Option<(i64, i64)> {
    match sqlx::query_as::<_, (i64, i64)>(sql).bind(cutoff).fetch_one(pool).await {
        Ok(counts) => Some(counts),
        Err(e) => {
            tracing::debug!(error = %e, "Memory class count unavailable");
            None
        }
    }
}

async fn count_ltm(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*)::bigint FROM ltm_entries")
        .fetch_one(pool)
        .await
}

// ============================================================================
// TESTS
// ============================================================================
