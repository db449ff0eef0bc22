use moka::future::Cache;
use once_cell::sync::OnceCell;
use sqlx::MySqlPool;
use std::time::Duration;

use crate::model::maintenance::MaintenanceFlag;

/// Flag name => last known state.
static MAINTENANCE_CACHE: OnceCell<Cache<String, MaintenanceFlag>> = OnceCell::new();

const FALLBACK_TTL_SECS: u64 = 30;

/// Sets the cache TTL. Only the first call has an effect.
pub fn init(ttl_secs: u64) {
    let _ = MAINTENANCE_CACHE.set(build(ttl_secs));
}

fn build(ttl_secs: u64) -> Cache<String, MaintenanceFlag> {
    Cache::builder()
        .max_capacity(64)
        .time_to_live(Duration::from_secs(ttl_secs.max(1)))
        .build()
}

fn cache() -> &'static Cache<String, MaintenanceFlag> {
    MAINTENANCE_CACHE.get_or_init(|| build(FALLBACK_TTL_SECS))
}

pub async fn get_cached(name: &str) -> Option<MaintenanceFlag> {
    cache().get(name).await
}

pub async fn store(flag: MaintenanceFlag) {
    cache().insert(flag.name.clone(), flag).await;
}

pub async fn invalidate(name: &str) {
    cache().invalidate(name).await;
}

/// Cached lookup with database fallback. A missing row reads as disabled.
pub async fn load_flag(pool: &MySqlPool, name: &str) -> Result<MaintenanceFlag, sqlx::Error> {
    if let Some(flag) = get_cached(name).await {
        return Ok(flag);
    }

    let flag = sqlx::query_as::<_, MaintenanceFlag>(
        "SELECT name, enabled, message FROM maintenance_flags WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?
    .unwrap_or_else(|| MaintenanceFlag {
        name: name.to_string(),
        ..MaintenanceFlag::default()
    });

    store(flag.clone()).await;
    Ok(flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_web::test]
    async fn stored_flags_are_served_until_invalidated() {
        let flag = MaintenanceFlag {
            name: "cache-test".into(),
            enabled: true,
            message: Some("upgrade".into()),
        };
        store(flag.clone()).await;
        assert_eq!(get_cached("cache-test").await, Some(flag));

        invalidate("cache-test").await;
        assert_eq!(get_cached("cache-test").await, None);
    }
}
