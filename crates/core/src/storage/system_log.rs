use anyhow::Context;
use serde_json::Value;

/// Append one operational event. Cycle code treats logging failures as
/// non-fatal; callers decide whether to propagate.
pub async fn log_event(
    pool: &sqlx::PgPool,
    level: &str,
    service: &str,
    message: &str,
    details: Value,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO system_logs (level, service, message, details) VALUES ($1, $2, $3, $4)",
    )
    .bind(level)
    .bind(service)
    .bind(message)
    .bind(details)
    .execute(pool)
    .await
    .context("insert system_logs failed")?;

    Ok(())
}
