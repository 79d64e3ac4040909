//! User travel profile storage: STM cache in front of `user_travel_profiles`.

use std::time::Duration;

use anyhow::Result;
use sqlx::types::Json;
use sqlx::PgPool;
use travel_core::config::MemoryConfig;
use travel_core::models::{SessionMode, StoredProfile};
use travel_core::profile::{extract_insights, ProfileInsights, TravelProfile, PROFILE_VERSION};
use travel_core::stm::keys;

use super::{best_effort, Stores};

/// Cached profile, else the stored row, else a fresh default. Whatever is
/// found ends up in the cache.
pub async fn get_profile(stores: &Stores, config: &MemoryConfig, user_id: i64) -> Result<TravelProfile> {
    match stores.stm.get(&keys::profile(user_id)).await {
        Ok(Some(raw)) => match serde_json::from_str(&raw) {
            Ok(profile) => return Ok(profile),
            Err(e) => tracing::warn!(user_id, error = %e, "Discarding unreadable cached profile"),
        },
        Ok(None) => {}
        Err(e) => tracing::warn!(user_id, error = %e, "Profile cache unreadable"),
    }

    let profile = match load_stored(&stores.pool, user_id).await {
        Ok(Some(stored)) => stored.profile.0,
        Ok(None) => TravelProfile::default(),
        Err(e) => {
            tracing::warn!(user_id, error = %e, "Profile lookup failed, using defaults");
            TravelProfile::default()
        }
    };

    if let Err(e) = cache(stores, config, user_id, &profile).await {
        tracing::warn!(user_id, error = %e, "Profile cache not refreshed");
    }
    Ok(profile)
}

/// Merge a JSON patch into the profile, persist it and refresh the cache.
pub async fn update_profile(
    stores: &Stores,
    config: &MemoryConfig,
    user_id: i64,
    patch: &serde_json::Value,
) -> Result<TravelProfile> {
    let current = get_profile(stores, config, user_id).await?;
    let updated = current.apply_patch(patch)?;
    best_effort("upsert user_travel_profiles", persist(&stores.pool, user_id, &updated).await);
    cache(stores, config, user_id, &updated).await?;
    tracing::info!(user_id, "Updated travel profile");
    Ok(updated)
}

/// Fold preferences found in `text` into the profile. Recording sessions
/// persist the result; chat only refreshes the cache.
pub async fn absorb_text(
    stores: &Stores,
    config: &MemoryConfig,
    user_id: i64,
    text: &str,
    mode: SessionMode,
) -> Result<ProfileInsights> {
    let insights = extract_insights(text);
    if insights.is_empty() {
        return Ok(insights);
    }

    let mut profile = get_profile(stores, config, user_id).await?;
    profile.apply(&insights);
    if mode == SessionMode::Recording {
        best_effort("upsert user_travel_profiles", persist(&stores.pool, user_id, &profile).await);
    }
    cache(stores, config, user_id, &profile).await?;

    tracing::debug!(user_id, fields = ?insights.touched_fields(), "Absorbed profile insights");
    Ok(insights)
}

async fn cache(stores: &Stores, config: &MemoryConfig, user_id: i64, profile: &TravelProfile) -> Result<()> {
    stores
        .stm
        .set(
            &keys::profile(user_id),
            &serde_json::to_string(profile)?,
            Some(Duration::from_secs(config.profile_cache_ttl_secs)),
        )
        .await?;
    Ok(())
}

async fn load_stored(pool: &PgPool, user_id: i64) -> Result<Option<StoredProfile>, sqlx::Error> {
    sqlx::query_as(
        "SELECT user_id, profile, profile_version, updated_at
         FROM user_travel_profiles WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

async fn persist(pool: &PgPool, user_id: i64, profile: &TravelProfile) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO user_travel_profiles (user_id, profile, profile_version, updated_at)
         VALUES ($1, $2, $3, NOW())
         ON CONFLICT (user_id)
         DO UPDATE SET profile = EXCLUDED.profile,
                       profile_version = EXCLUDED.profile_version,
                       updated_at = NOW()",
    )
    .bind(user_id)
    .bind(Json(profile))
    .bind(PROFILE_VERSION)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::test_support::offline_stores;

    #[tokio::test]
    async fn test_get_profile_defaults_and_caches() {
        let stores = offline_stores();
        let config = MemoryConfig::default();
        let profile = get_profile(&stores, &config, 20).await.unwrap();
        assert_eq!(profile.travel_pace, "moderate");
        assert!(stores.stm.get(&keys::profile(20)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_absorb_text_updates_cached_profile() {
        let stores = offline_stores();
        let config = MemoryConfig::default();
        let insights = absorb_text(
            &stores,
            &config,
            21,
            "Dreaming of Paris and Italian food, a slow relaxing trip",
            SessionMode::Chat,
        )
        .await
        .unwrap();
        assert_eq!(insights.destinations, vec!["Paris"]);

        let profile = get_profile(&stores, &config, 21).await.unwrap();
        assert_eq!(profile.destinations_of_interest, vec!["Paris"]);
        assert_eq!(profile.cuisine_preferences, vec!["Italian"]);
        assert_eq!(profile.travel_pace, "relaxed");
    }

    #[tokio::test]
    async fn test_absorb_text_without_signals_leaves_cache_alone() {
        let stores = offline_stores();
        let insights = absorb_text(&stores, &MemoryConfig::default(), 22, "ok", SessionMode::Chat)
            .await
            .unwrap();
        assert!(insights.is_empty());
        assert_eq!(stores.stm.get(&keys::profile(22)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_profile_applies_patch() {
        let stores = offline_stores();
        let config = MemoryConfig::default();
        let updated = update_profile(
            &stores,
            &config,
            23,
            &serde_json::json!({ "cuisine_preferences": ["Thai"], "decision_style": "independent" }),
        )
        .await
        .unwrap();
        assert_eq!(updated.cuisine_preferences, vec!["Thai"]);

        let cached = get_profile(&stores, &config, 23).await.unwrap();
        assert_eq!(cached.decision_style, "independent");
    }

    #[tokio::test]
    async fn test_update_profile_rejects_non_object() {
        let stores = offline_stores();
        let result =
            update_profile(&stores, &MemoryConfig::default(), 24, &serde_json::json!("nope")).await;
        assert!(result.is_err());
    }
}
