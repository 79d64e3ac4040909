use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

use crate::profile::TravelProfile;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredProfile {
    pub user_id: i64,
    pub profile: Json<TravelProfile>,
    pub profile_version: String,
    pub updated_at: DateTime<Utc>,
}
