//! Prediction pass over the currently installed model artifacts.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::prediction::{Horizon, PredictionResult};
use crate::domain::snapshot::{DataSource, RawMarketSnapshot, RawSentimentSnapshot};
use crate::ml::features::{build_features, PriceHistory, FEATURE_NAMES};
use crate::ml::registry::ModelRegistry;
use crate::ml::train::Target;

const FALLBACK_CONFIDENCE_CAP: f64 = 0.3;

/// Runs the per-target models and blends their outputs. When no artifacts
/// are installed, degrades to volatility-derived heuristics instead of
/// failing the cycle.
#[derive(Debug, Clone)]
pub struct PredictionService {
    registry: Arc<ModelRegistry>,
}

impl PredictionService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn predict(
        &self,
        market: &RawMarketSnapshot,
        sentiment: &RawSentimentSnapshot,
        history: &PriceHistory,
    ) -> anyhow::Result<PredictionResult> {
        let features = build_features(market, sentiment, history);
        let confidence = features.non_zero_fraction();

        let Some(artifacts) = self.registry.current() else {
            tracing::warn!("no model artifacts installed, using heuristic predictions");
            return Ok(heuristic_predictions(market, sentiment, confidence));
        };

        let scaled = artifacts.scaler.transform(features.as_slice())?;

        let mut crash_probabilities = BTreeMap::new();
        for horizon in Horizon::ALL {
            if let Some(artifact) = artifacts.model_for(Target::Crash(horizon)) {
                let p = artifact.model.predict(&scaled).clamp(0.0, 1.0);
                crash_probabilities.insert(horizon, p);
            }
        }

        let market_direction = artifacts
            .model_for(Target::SentimentAnalyzer)
            .map(|a| a.model.predict(&scaled).clamp(-1.0, 1.0))
            .unwrap_or(0.0);

        let mut result = PredictionResult {
            crash_probabilities,
            ml_risk_score: 0.0,
            weighted_crash_probability: 0.0,
            market_direction,
            confidence,
            feature_contributions: BTreeMap::new(),
            source: DataSource::Live,
        };

        result.weighted_crash_probability = Horizon::ALL
            .iter()
            .map(|h| h.blend_weight() * result.crash_probability(*h))
            .sum::<f64>()
            .clamp(0.0, 1.0);

        result.ml_risk_score = match artifacts.model_for(Target::RiskScorer) {
            Some(artifact) => {
                let score = artifact.model.predict(&scaled).clamp(0.0, 100.0);
                if let Some(importances) = artifact.model.feature_importances() {
                    result.feature_contributions =
                        feature_contributions(&scaled, importances);
                }
                score
            }
            None => result.weighted_crash_probability * 100.0,
        };

        Ok(result)
    }
}

/// Per-feature contribution to the risk score: scaled value weighted by the
/// model's importance for that feature. Zero contributions are omitted.
fn feature_contributions(scaled: &[f64], importances: &[f64]) -> BTreeMap<String, f64> {
    FEATURE_NAMES
        .iter()
        .zip(scaled.iter().zip(importances.iter()))
        .filter(|(_, (v, imp))| **v != 0.0 && **imp != 0.0)
        .map(|(name, (v, imp))| (name.to_string(), v * imp))
        .collect()
}

/// Model-free predictions derived directly from volatility and retail
/// sentiment. Marked as fallback and reported at half the trained-path
/// confidence, capped, so an untrained result never outranks a trained one
/// for the same inputs.
fn heuristic_predictions(
    market: &RawMarketSnapshot,
    sentiment: &RawSentimentSnapshot,
    trained_confidence: f64,
) -> PredictionResult {
    let vix = market.vix.unwrap_or(20.0);
    let reddit = sentiment.reddit.unwrap_or(0.0);
    let twitter = sentiment.twitter.unwrap_or(0.0);
    let news = sentiment.news.unwrap_or(0.0);

    let ml_risk_score = (vix * 2.5 + reddit.abs() * 50.0).min(100.0);

    // Longer horizons divide by a smaller base, so the probability grows
    // with the window the way the trained models behave.
    let mut crash_probabilities = BTreeMap::new();
    for (horizon, divisor) in Horizon::ALL.iter().zip([50.0, 45.0, 40.0, 35.0, 30.0]) {
        crash_probabilities.insert(*horizon, (vix / divisor).clamp(0.05, 0.95));
    }

    let mut result = PredictionResult {
        crash_probabilities,
        ml_risk_score,
        weighted_crash_probability: 0.0,
        market_direction: ((reddit + twitter + news) / 3.0).clamp(-1.0, 1.0),
        confidence: (trained_confidence * 0.5).min(FALLBACK_CONFIDENCE_CAP),
        feature_contributions: BTreeMap::new(),
        source: DataSource::Fallback,
    };
    result.weighted_crash_probability = Horizon::ALL
        .iter()
        .map(|h| h.blend_weight() * result.crash_probability(*h))
        .sum::<f64>()
        .clamp(0.0, 1.0);
    result
}
