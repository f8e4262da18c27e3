use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::prediction::PredictionResult;
use crate::domain::score::CompositeRiskScore;
use crate::domain::snapshot::{RawMarketSnapshot, RawSentimentSnapshot};
use crate::ml::features::PriceHistory;
use crate::ml::train::TrainingExample;

/// One persisted scoring cycle as read back from the database.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredRiskScore {
    pub id: uuid::Uuid,
    pub value: f64,
    pub level: String,
    pub final_score: f64,
    pub components: Value,
    pub market_data: Value,
    pub sentiment_data: Value,
    pub prediction: Option<Value>,
    pub recorded_at: DateTime<Utc>,
}

pub async fn insert(
    pool: &sqlx::PgPool,
    score: &CompositeRiskScore,
    final_score: f64,
    market: &RawMarketSnapshot,
    sentiment: &RawSentimentSnapshot,
    prediction: Option<&PredictionResult>,
) -> anyhow::Result<uuid::Uuid> {
    let components = serde_json::to_value(&score.components)
        .context("serializing component scores failed")?;
    let market_data =
        serde_json::to_value(market).context("serializing market snapshot failed")?;
    let sentiment_data =
        serde_json::to_value(sentiment).context("serializing sentiment snapshot failed")?;
    let prediction = prediction
        .map(serde_json::to_value)
        .transpose()
        .context("serializing prediction failed")?;

    let id: uuid::Uuid = sqlx::query_scalar(
        "INSERT INTO risk_scores (value, level, final_score, components, market_data, sentiment_data, prediction, recorded_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(score.value)
    .bind(score.level.as_str())
    .bind(final_score)
    .bind(components)
    .bind(market_data)
    .bind(sentiment_data)
    .bind(prediction)
    .bind(score.timestamp)
    .fetch_one(pool)
    .await
    .context("insert risk_scores failed")?;

    Ok(id)
}

pub async fn fetch_latest(pool: &sqlx::PgPool) -> anyhow::Result<Option<StoredRiskScore>> {
    let row = sqlx::query_as::<_, StoredRiskScore>(
        "SELECT id, value, level, final_score, components, market_data, sentiment_data, prediction, recorded_at \
         FROM risk_scores ORDER BY recorded_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await
    .context("fetch latest risk score failed")?;

    Ok(row)
}

/// SPY closes from the most recent cycles, oldest first, for the technical
/// features.
pub async fn fetch_spy_history(pool: &sqlx::PgPool, limit: i64) -> anyhow::Result<PriceHistory> {
    let mut closes: Vec<f64> = sqlx::query_scalar(
        "SELECT (market_data->>'spy')::double precision \
         FROM risk_scores \
         WHERE market_data->>'spy' IS NOT NULL \
         ORDER BY recorded_at DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch spy history failed")?;

    closes.reverse();
    Ok(PriceHistory::new(closes))
}

/// Rebuild training rows from persisted cycles. The direction label for a
/// row is the clamped forward SPY return to the next cycle, so the newest
/// row (with no forward observation yet) is excluded.
pub async fn fetch_training_examples(
    pool: &sqlx::PgPool,
    limit: i64,
) -> anyhow::Result<Vec<TrainingExample>> {
    let rows = sqlx::query_as::<_, StoredRiskScore>(
        "SELECT id, value, level, final_score, components, market_data, sentiment_data, prediction, recorded_at \
         FROM risk_scores ORDER BY recorded_at ASC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch training rows failed")?;

    let mut examples = Vec::with_capacity(rows.len().saturating_sub(1));
    for pair in rows.windows(2) {
        let (row, next) = (&pair[0], &pair[1]);

        let market: RawMarketSnapshot = serde_json::from_value(row.market_data.clone())
            .context("stored market snapshot is malformed")?;
        let sentiment: RawSentimentSnapshot = serde_json::from_value(row.sentiment_data.clone())
            .context("stored sentiment snapshot is malformed")?;

        let market_direction = forward_direction(&row.market_data, &next.market_data);

        examples.push(TrainingExample {
            market,
            sentiment,
            risk_score: row.value,
            market_direction,
            observed_at: row.recorded_at,
        });
    }

    Ok(examples)
}

/// Forward return scaled so a 2% move saturates the [-1, 1] range.
fn forward_direction(current: &Value, next: &Value) -> f64 {
    let spy_now = current.get("spy").and_then(Value::as_f64);
    let spy_next = next.get("spy").and_then(Value::as_f64);
    match (spy_now, spy_next) {
        (Some(now), Some(later)) if now != 0.0 => ((later / now - 1.0) * 50.0).clamp(-1.0, 1.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn forward_direction_scales_and_clamps() {
        let now = json!({"spy": 400.0});
        let up_1pct = json!({"spy": 404.0});
        let crash = json!({"spy": 360.0});

        assert!((forward_direction(&now, &up_1pct) - 0.5).abs() < 1e-9);
        assert_eq!(forward_direction(&now, &crash), -1.0);
        assert_eq!(forward_direction(&now, &json!({})), 0.0);
        assert_eq!(forward_direction(&json!({"spy": 0.0}), &up_1pct), 0.0);
    }
}
