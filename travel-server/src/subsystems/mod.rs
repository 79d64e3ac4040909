pub mod memory;
pub mod profiles;
pub mod retention;
pub mod sessions;
pub mod travel;

use std::sync::Arc;

use sqlx::PgPool;
use travel_core::stm::ShortTermStore;

/// Handles to both memory tiers.
#[derive(Clone)]
pub struct Stores {
    pub pool: PgPool,
    pub stm: Arc<dyn ShortTermStore>,
}

impl Stores {
    pub fn new(pool: PgPool, stm: Arc<dyn ShortTermStore>) -> Self {
        Self { pool, stm }
    }
}

/// Log and swallow a failed long-term write. Request paths keep serving from
/// short-term memory while Postgres is unreachable.
pub(crate) fn best_effort<T>(what: &str, result: Result<T, sqlx::Error>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(operation = what, error = %e, "Long-term memory write skipped");
            None
        }
    }
}
