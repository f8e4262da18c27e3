use anyhow::Context;
use serde_json::Value;

use crate::alert::config::AlertChannelConfig;

pub async fn fetch_enabled(pool: &sqlx::PgPool) -> anyhow::Result<Vec<AlertChannelConfig>> {
    let rows = sqlx::query_as::<_, (uuid::Uuid, String, bool, f64, Value)>(
        "SELECT id, channel_id, enabled, threshold, config \
         FROM alert_configs WHERE enabled ORDER BY created_at",
    )
    .fetch_all(pool)
    .await
    .context("fetch alert configs failed")?;

    let configs = rows
        .into_iter()
        .map(|(id, channel_id, enabled, threshold, config)| AlertChannelConfig {
            id,
            channel_id,
            enabled,
            threshold,
            config,
        })
        .collect();

    Ok(configs)
}

pub async fn insert(
    pool: &sqlx::PgPool,
    config: &AlertChannelConfig,
) -> anyhow::Result<uuid::Uuid> {
    config.validate()?;

    let id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO alert_configs (channel_id, enabled, threshold, config) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id",
    )
    .bind(&config.channel_id)
    .bind(config.enabled)
    .bind(config.threshold)
    .bind(&config.config)
    .fetch_one(pool)
    .await
    .context("insert alert_configs failed")?;

    Ok(id)
}
