use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use riskmon_core::alert::dispatch::AlertChannel;
use riskmon_core::alert::webhook::WebhookChannel;
use riskmon_core::collect::provider::HttpJsonProvider;
use riskmon_core::engine::RiskEngine;
use riskmon_core::resilience::ResilienceManager;

mod cycle;

const TRAINING_FETCH_LIMIT: i64 = 5000;

#[derive(Debug, Parser)]
#[command(name = "riskmon_worker")]
struct Args {
    /// Seconds between monitoring cycles. Overrides MONITORING_INTERVAL_SECS.
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Run a single cycle and exit.
    #[arg(long)]
    once: bool,

    /// Do everything except writing to the database or delivering alerts.
    #[arg(long)]
    dry_run: bool,

    /// Retrain models from persisted history and exit.
    #[arg(long)]
    train: bool,
}

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

    let args = Args::parse();

    let db_url = settings.require_database_url()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    riskmon_core::storage::migrate(&pool).await?;

    let resilience = Arc::new(ResilienceManager::default());
    let engine = Arc::new(RiskEngine::new(resilience, settings.model_dir()));

    let examples =
        riskmon_core::storage::risk_scores::fetch_training_examples(&pool, TRAINING_FETCH_LIMIT)
            .await?;

    if args.train {
        let summary = run_training(engine.clone(), examples).await?;
        tracing::info!(
            examples = summary.examples_used,
            synthetic = summary.synthetic,
            skipped = summary.skipped_targets.len(),
            "retraining finished"
        );
        return Ok(());
    }

    bootstrap_models(engine.clone(), examples).await?;

    let provider = HttpJsonProvider::from_settings(&settings)?;
    let channels: Vec<Box<dyn AlertChannel>> = vec![Box::new(WebhookChannel::new()?)];

    let interval_secs = args
        .interval_secs
        .unwrap_or_else(|| settings.monitoring_interval_secs());
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tracing::info!(interval_secs, once = args.once, dry_run = args.dry_run, "monitoring loop starting");

    loop {
        ticker.tick().await;

        match cycle::run_cycle(&pool, &engine, &provider, &provider, &channels, args.dry_run).await
        {
            Ok(outcome) => {
                tracing::info!(
                    final_score = outcome.final_score,
                    level = outcome.level.as_str(),
                    alerts = outcome.alerts.len(),
                    "cycle complete"
                );
            }
            Err(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "cycle failed");
            }
        }

        if args.once {
            break;
        }
    }

    Ok(())
}

/// Training is CPU-bound; keep it off the async runtime threads.
async fn run_training(
    engine: Arc<RiskEngine>,
    examples: Vec<riskmon_core::ml::train::TrainingExample>,
) -> anyhow::Result<riskmon_core::ml::train::TrainingSummary> {
    tokio::task::spawn_blocking(move || engine.train(&examples))
        .await
        .context("training task panicked")?
}

async fn bootstrap_models(
    engine: Arc<RiskEngine>,
    examples: Vec<riskmon_core::ml::train::TrainingExample>,
) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || engine.bootstrap(&examples))
        .await
        .context("bootstrap task panicked")?
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
