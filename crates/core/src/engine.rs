//! Orchestration of one scoring pass: composite scoring, model prediction,
//! the blended final score, and artifact lifecycle.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::prediction::PredictionResult;
use crate::domain::score::CompositeRiskScore;
use crate::domain::snapshot::{RawMarketSnapshot, RawSentimentSnapshot};
use crate::ml::features::PriceHistory;
use crate::ml::predict::PredictionService;
use crate::ml::registry::ModelRegistry;
use crate::ml::store;
use crate::ml::train::{EnsembleTrainer, TrainingExample, TrainingSummary};
use crate::resilience::{self, ResilienceManager, SERVICE_ML_PREDICTION};
use crate::risk::aggregate::aggregate;
use crate::risk::component::score_components;

/// Weight of the deterministic composite in the final blended score; the
/// remainder comes from the model risk score.
const COMPOSITE_WEIGHT: f64 = 0.7;
const ML_WEIGHT: f64 = 0.3;

pub struct RiskEngine {
    resilience: Arc<ResilienceManager>,
    registry: Arc<ModelRegistry>,
    predictor: PredictionService,
    trainer: EnsembleTrainer,
    model_dir: PathBuf,
}

impl RiskEngine {
    pub fn new(resilience: Arc<ResilienceManager>, model_dir: PathBuf) -> Self {
        Self::with_trainer(resilience, model_dir, EnsembleTrainer::default())
    }

    pub fn with_trainer(
        resilience: Arc<ResilienceManager>,
        model_dir: PathBuf,
        trainer: EnsembleTrainer,
    ) -> Self {
        let registry = Arc::new(ModelRegistry::new());
        let predictor = PredictionService::new(registry.clone());
        Self {
            resilience,
            registry,
            predictor,
            trainer,
            model_dir,
        }
    }

    pub fn resilience(&self) -> &Arc<ResilienceManager> {
        &self.resilience
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Deterministic weighted composite over the eight factor scores.
    pub fn compute_composite(
        &self,
        market: &RawMarketSnapshot,
        sentiment: &RawSentimentSnapshot,
    ) -> CompositeRiskScore {
        let components = score_components(market, sentiment);
        aggregate(components, market.timestamp)
    }

    /// Model prediction under the resilience manager: an erroring pass is
    /// recorded and replaced with the canonical fallback so the cycle
    /// always has an outlook to work with.
    pub fn predict(
        &self,
        market: &RawMarketSnapshot,
        sentiment: &RawSentimentSnapshot,
        history: &PriceHistory,
    ) -> PredictionResult {
        if !self.resilience.is_service_healthy(SERVICE_ML_PREDICTION) {
            tracing::warn!(service = SERVICE_ML_PREDICTION, "service unhealthy, serving fallback prediction");
            return resilience::fallback_prediction();
        }

        match self.predictor.predict(market, sentiment, history) {
            Ok(prediction) => {
                self.resilience.reset(SERVICE_ML_PREDICTION);
                prediction
            }
            Err(err) => {
                tracing::error!(error = %err, "prediction pass failed");
                self.resilience.note_failure(SERVICE_ML_PREDICTION);
                resilience::fallback_prediction()
            }
        }
    }

    /// Blend of the deterministic composite and the model risk score.
    pub fn final_score(composite: &CompositeRiskScore, prediction: &PredictionResult) -> f64 {
        (COMPOSITE_WEIGHT * composite.value + ML_WEIGHT * prediction.ml_risk_score)
            .clamp(0.0, 100.0)
    }

    /// Train a fresh artifact set, persist it, and make it live.
    pub fn train(&self, examples: &[TrainingExample]) -> anyhow::Result<TrainingSummary> {
        let started = Utc::now();
        let (artifacts, summary) = self.trainer.train(examples)?;
        store::save(&self.model_dir, &artifacts)?;
        self.registry.install(artifacts);

        tracing::info!(
            examples = summary.examples_used,
            synthetic = summary.synthetic,
            elapsed_ms = (Utc::now() - started).num_milliseconds(),
            "training complete, artifacts installed"
        );
        Ok(summary)
    }

    /// Cold start: reuse artifacts from disk when present, otherwise train
    /// from whatever history is supplied (synthetic when too thin).
    pub fn bootstrap(&self, examples: &[TrainingExample]) -> anyhow::Result<()> {
        if let Some(artifacts) = store::load(&self.model_dir)? {
            tracing::info!(
                models = artifacts.models.len(),
                trained_at = %artifacts.trained_at,
                "loaded model artifacts from disk"
            );
            self.registry.install(artifacts);
            return Ok(());
        }

        self.train(examples)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::score::{ComponentScoreSet, RiskLevel};
    use crate::domain::snapshot::DataSource;

    fn engine(tag: &str) -> (RiskEngine, PathBuf) {
        let dir = std::env::temp_dir().join(format!("riskmon-engine-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let trainer = EnsembleTrainer {
            folds: 3,
            synthetic_batch: 120,
            ..Default::default()
        };
        (
            RiskEngine::with_trainer(Arc::new(ResilienceManager::default()), dir.clone(), trainer),
            dir,
        )
    }

    fn snapshots(vix: f64) -> (RawMarketSnapshot, RawSentimentSnapshot) {
        let now = Utc::now();
        let mut market = RawMarketSnapshot::empty(now);
        market.spy = Some(440.0);
        market.vix = Some(vix);
        market.dxy = Some(102.0);
        market.ten_year = Some(4.2);
        let mut sentiment = RawSentimentSnapshot::empty(now);
        sentiment.reddit = Some(0.0);
        sentiment.twitter = Some(0.0);
        sentiment.news = Some(0.0);
        (market, sentiment)
    }

    #[test]
    fn final_score_blends_seventy_thirty() {
        let composite = CompositeRiskScore {
            value: 60.0,
            level: RiskLevel::High,
            components: ComponentScoreSet::new(),
            timestamp: Utc::now(),
        };
        let mut prediction = crate::resilience::fallback_prediction();
        prediction.ml_risk_score = 80.0;

        let blended = RiskEngine::final_score(&composite, &prediction);
        assert!((blended - 66.0).abs() < 1e-9);
    }

    #[test]
    fn composite_reflects_market_stress() {
        let (engine, dir) = engine("composite");
        let (calm_market, sentiment) = snapshots(14.0);
        let (stressed_market, _) = snapshots(45.0);

        let calm = engine.compute_composite(&calm_market, &sentiment);
        let stressed = engine.compute_composite(&stressed_market, &sentiment);
        assert!(stressed.value > calm.value);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unhealthy_prediction_service_serves_canonical_fallback() {
        let (engine, dir) = engine("unhealthy");
        for _ in 0..engine.resilience().max_retries() {
            engine.resilience().note_failure(SERVICE_ML_PREDICTION);
        }

        let (market, sentiment) = snapshots(25.0);
        let prediction = engine.predict(&market, &sentiment, &PriceHistory::default());
        assert_eq!(prediction.source, DataSource::Fallback);
        assert_eq!(prediction.ml_risk_score, 50.0);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bootstrap_trains_then_reloads_from_disk() {
        let (engine, dir) = engine("bootstrap");
        assert!(!engine.registry().is_loaded());

        engine.bootstrap(&[]).unwrap();
        assert!(engine.registry().is_loaded());
        let trained_at = engine.registry().current().unwrap().trained_at;

        // A second engine over the same directory reuses the saved set.
        let trainer = EnsembleTrainer {
            folds: 3,
            synthetic_batch: 120,
            ..Default::default()
        };
        let second = RiskEngine::with_trainer(
            Arc::new(ResilienceManager::default()),
            dir.clone(),
            trainer,
        );
        second.bootstrap(&[]).unwrap();
        assert_eq!(second.registry().current().unwrap().trained_at, trained_at);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
