use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use riskmon_core::alert::config::AlertChannelConfig;
use riskmon_core::domain::prediction::PredictionResult;
use riskmon_core::domain::score::RiskLevel;
use riskmon_core::domain::snapshot::{RawMarketSnapshot, RawSentimentSnapshot};
use riskmon_core::engine::RiskEngine;
use riskmon_core::ml::features::PriceHistory;
use riskmon_core::resilience::ResilienceManager;
use riskmon_core::risk::portfolio::{portfolio_risk, PortfolioProfile, PortfolioRisk};
use riskmon_core::storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = riskmon_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match riskmon_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let engine = Arc::new(RiskEngine::new(
        Arc::new(ResilienceManager::default()),
        settings.model_dir(),
    ));

    // Scoring endpoints work without artifacts (heuristic fallback); pick
    // up a previously trained set when one is on disk.
    match riskmon_core::ml::store::load(&settings.model_dir()) {
        Ok(Some(artifacts)) => {
            tracing::info!(models = artifacts.models.len(), "loaded model artifacts");
            engine.registry().install(artifacts);
        }
        Ok(None) => {
            tracing::warn!("no model artifacts on disk; predictions will use fallbacks");
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "loading model artifacts failed");
        }
    }

    let state = AppState { pool, engine };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/risk/latest", get(get_latest_risk))
        .route("/risk/score", post(post_score))
        .route("/risk/portfolio", post(post_portfolio))
        .route("/predict", post(post_predict))
        .route("/train", post(post_train))
        .route("/alerts/config", post(post_alert_config))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    pool: Option<PgPool>,
    engine: Arc<RiskEngine>,
}

#[derive(Debug, Serialize)]
struct ApiRiskScore {
    id: Uuid,
    value: f64,
    level: String,
    final_score: f64,
    components: Value,
    prediction: Option<Value>,
    recorded_at: DateTime<Utc>,
}

async fn get_latest_risk(State(state): State<AppState>) -> Result<Json<ApiRiskScore>, StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let stored = storage::risk_scores::fetch_latest(pool)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiRiskScore {
        id: stored.id,
        value: stored.value,
        level: stored.level,
        final_score: stored.final_score,
        components: stored.components,
        prediction: stored.prediction,
        recorded_at: stored.recorded_at,
    }))
}

#[derive(Debug, Deserialize)]
struct ScoreRequest {
    market: RawMarketSnapshot,
    sentiment: RawSentimentSnapshot,
}

#[derive(Debug, Serialize)]
struct ScoreResponse {
    composite: f64,
    level: RiskLevel,
    components: Value,
    final_score: f64,
    final_level: RiskLevel,
    prediction: PredictionResult,
}

async fn post_score(
    State(state): State<AppState>,
    Json(req): Json<ScoreRequest>,
) -> Result<Json<ScoreResponse>, StatusCode> {
    let history = spy_history(&state).await;

    let composite = state.engine.compute_composite(&req.market, &req.sentiment);
    let prediction = state.engine.predict(&req.market, &req.sentiment, &history);
    let final_score = RiskEngine::final_score(&composite, &prediction);

    let components = serde_json::to_value(&composite.components).map_err(|e| {
        let err = anyhow::Error::new(e);
        sentry_anyhow::capture_anyhow(&err);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(Json(ScoreResponse {
        composite: composite.value,
        level: composite.level,
        components,
        final_score,
        final_level: RiskLevel::from_score(final_score),
        prediction,
    }))
}

async fn post_predict(
    State(state): State<AppState>,
    Json(req): Json<ScoreRequest>,
) -> Result<Json<PredictionResult>, StatusCode> {
    let history = spy_history(&state).await;
    let prediction = state.engine.predict(&req.market, &req.sentiment, &history);
    Ok(Json(prediction))
}

#[derive(Debug, Deserialize)]
struct PortfolioRequest {
    #[serde(default)]
    profile: PortfolioProfile,
    /// Market risk score to scale; defaults to the latest persisted final
    /// score when omitted.
    market_risk_score: Option<f64>,
}

async fn post_portfolio(
    State(state): State<AppState>,
    Json(req): Json<PortfolioRequest>,
) -> Result<Json<PortfolioRisk>, StatusCode> {
    let market_risk_score = match req.market_risk_score {
        Some(score) if score.is_finite() => score,
        Some(_) => return Err(StatusCode::BAD_REQUEST),
        None => {
            let Some(pool) = &state.pool else {
                return Err(StatusCode::SERVICE_UNAVAILABLE);
            };
            storage::risk_scores::fetch_latest(pool)
                .await
                .map_err(|e| {
                    sentry_anyhow::capture_anyhow(&e);
                    StatusCode::INTERNAL_SERVER_ERROR
                })?
                .ok_or(StatusCode::NOT_FOUND)?
                .final_score
        }
    };

    Ok(Json(portfolio_risk(&req.profile, market_risk_score)))
}

#[derive(Debug, Serialize)]
struct TrainResponse {
    status: &'static str,
}

/// Kick off a retrain in the background and return immediately.
async fn post_train(State(state): State<AppState>) -> Result<Json<TrainResponse>, StatusCode> {
    let Some(pool) = state.pool.clone() else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };
    let engine = state.engine.clone();

    tokio::spawn(async move {
        let examples = match storage::risk_scores::fetch_training_examples(&pool, 5000).await {
            Ok(examples) => examples,
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "fetching training rows failed");
                return;
            }
        };

        let result = tokio::task::spawn_blocking(move || engine.train(&examples)).await;
        match result {
            Ok(Ok(summary)) => {
                tracing::info!(
                    examples = summary.examples_used,
                    synthetic = summary.synthetic,
                    "background training finished"
                );
            }
            Ok(Err(e)) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "background training failed");
            }
            Err(e) => {
                tracing::error!(error = %e, "background training panicked");
            }
        }
    });

    Ok(Json(TrainResponse {
        status: "training_started",
    }))
}

#[derive(Debug, Deserialize)]
struct AlertConfigRequest {
    channel_id: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
    threshold: f64,
    #[serde(default)]
    config: Value,
}

fn default_enabled() -> bool {
    true
}

impl AlertConfigRequest {
    fn into_config(self) -> AlertChannelConfig {
        AlertChannelConfig {
            id: Uuid::new_v4(),
            channel_id: self.channel_id,
            enabled: self.enabled,
            threshold: self.threshold,
            config: self.config,
        }
    }
}

#[derive(Debug, Serialize)]
struct AlertConfigResponse {
    id: Uuid,
}

async fn post_alert_config(
    State(state): State<AppState>,
    Json(req): Json<AlertConfigRequest>,
) -> Result<(StatusCode, Json<AlertConfigResponse>), StatusCode> {
    let Some(pool) = &state.pool else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let config = req.into_config();
    if let Err(e) = config.validate() {
        tracing::warn!(error = %e, "rejected alert config");
        return Err(StatusCode::BAD_REQUEST);
    }

    let id = storage::alert_configs::insert(pool, &config)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok((StatusCode::CREATED, Json(AlertConfigResponse { id })))
}

/// Recent SPY closes when a database is available; scoring still works with
/// an empty history, just without the technical features.
async fn spy_history(state: &AppState) -> PriceHistory {
    let Some(pool) = &state.pool else {
        return PriceHistory::default();
    };
    match storage::risk_scores::fetch_spy_history(pool, 250).await {
        Ok(history) => history,
        Err(e) => {
            tracing::warn!(error = %e, "spy history fetch failed; scoring without it");
            PriceHistory::default()
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &riskmon_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alert_config_request_defaults_to_enabled_and_validates() {
        let req: AlertConfigRequest = serde_json::from_value(json!({
            "channel_id": "webhook",
            "threshold": 70.0,
            "config": {"url": "https://hooks.example.com/risk"}
        }))
        .unwrap();

        let config = req.into_config();
        assert!(config.enabled);
        assert_eq!(config.channel_id, "webhook");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn alert_config_request_rejects_out_of_range_threshold() {
        let req: AlertConfigRequest = serde_json::from_value(json!({
            "channel_id": "webhook",
            "threshold": 140.0
        }))
        .unwrap();
        assert!(req.into_config().validate().is_err());
    }
}
