//! Ensemble training: per-target model selection over the candidate
//! algorithms using chronological cross-validation.
//!
//! Seven targets are trained per run: crash probability at each horizon,
//! the 0-100 risk score, and a sentiment-driven market direction. For each
//! target every candidate algorithm is scored with walk-forward folds
//! (train strictly earlier than validation) and the best mean R² wins.
//! An algorithm that fails to fit is skipped for that target only; a
//! target where every candidate fails is left without a model.

use std::collections::BTreeMap;

use anyhow::{ensure, Context};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::domain::prediction::Horizon;
use crate::domain::snapshot::{RawMarketSnapshot, RawSentimentSnapshot};
use crate::ml::features::{build_features, FeatureVector, PriceHistory, FEATURE_NAMES};
use crate::ml::model::{fit_candidate, AlgorithmId, Regressor};
use crate::ml::scaler::RobustScaler;

/// Minimum real history before training on live data; below this the
/// trainer falls back to a synthetic batch.
pub const MIN_TRAINING_EXAMPLES: usize = 100;

const SYNTHETIC_BATCH_SIZE: usize = 1000;
const SYNTHETIC_SEED: u64 = 42;
const CV_FOLDS: usize = 5;

/// One historical observation used as a training row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub market: RawMarketSnapshot,
    pub sentiment: RawSentimentSnapshot,
    /// Composite risk score recorded for this cycle.
    pub risk_score: f64,
    /// Realized forward market direction in [-1, 1].
    pub market_direction: f64,
    pub observed_at: DateTime<Utc>,
}

/// A trainable prediction target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Crash(Horizon),
    RiskScorer,
    SentimentAnalyzer,
}

impl Target {
    pub const ALL: [Target; 7] = [
        Target::Crash(Horizon::D1),
        Target::Crash(Horizon::D3),
        Target::Crash(Horizon::D7),
        Target::Crash(Horizon::D14),
        Target::Crash(Horizon::D30),
        Target::RiskScorer,
        Target::SentimentAnalyzer,
    ];

    pub fn name(&self) -> String {
        match self {
            Target::Crash(h) => format!("crash_predictor_{}d", h.days()),
            Target::RiskScorer => "risk_scorer".to_string(),
            Target::SentimentAnalyzer => "sentiment_analyzer".to_string(),
        }
    }

    pub fn from_name(name: &str) -> Option<Target> {
        Target::ALL.iter().copied().find(|t| t.name() == name)
    }

    fn label(&self, example: &TrainingExample) -> f64 {
        match self {
            Target::Crash(horizon) => crash_label(example, horizon.days()),
            Target::RiskScorer => example.risk_score,
            Target::SentimentAnalyzer => example.market_direction,
        }
    }
}

/// Crash-probability label: a volatility base adjusted for retail sentiment,
/// stretched for longer horizons, clamped to (0.05, 0.95).
fn crash_label(example: &TrainingExample, days: u32) -> f64 {
    let vix = example.market.vix.unwrap_or(20.0);
    let reddit = example.sentiment.reddit.unwrap_or(0.0);

    let base = ((vix - 10.0) / 50.0).clamp(0.1, 0.9);
    let sentiment_adjustment = (reddit * -10.0).clamp(-0.3, 0.3);
    let time_factor = (1.0 + (days as f64 - 1.0) * 0.1).min(2.0);

    ((base + sentiment_adjustment) * time_factor).clamp(0.05, 0.95)
}

/// A trained model for one target, with its validation score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub target: String,
    pub algorithm: AlgorithmId,
    pub model: Regressor,
    pub cross_val_score: f64,
    pub trained_at: DateTime<Utc>,
}

/// Everything a prediction run needs: the fitted scaler, the feature
/// layout it was fitted on, and one model per successfully trained target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub scaler: RobustScaler,
    pub feature_names: Vec<String>,
    pub models: BTreeMap<String, ModelArtifact>,
    pub trained_at: DateTime<Utc>,
}

impl ArtifactSet {
    pub fn model_for(&self, target: Target) -> Option<&ModelArtifact> {
        self.models.get(&target.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetOutcome {
    pub algorithm: AlgorithmId,
    pub cross_val_score: f64,
}

/// Report returned alongside a trained [`ArtifactSet`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub examples_used: usize,
    pub synthetic: bool,
    pub outcomes: BTreeMap<String, TargetOutcome>,
    pub skipped_targets: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct EnsembleTrainer {
    pub min_examples: usize,
    pub folds: usize,
    pub seed: u64,
    /// Rows generated when real history falls below `min_examples`.
    pub synthetic_batch: usize,
}

impl Default for EnsembleTrainer {
    fn default() -> Self {
        Self {
            min_examples: MIN_TRAINING_EXAMPLES,
            folds: CV_FOLDS,
            seed: SYNTHETIC_SEED,
            synthetic_batch: SYNTHETIC_BATCH_SIZE,
        }
    }
}

impl EnsembleTrainer {
    /// Train all targets. Falls back to a deterministic synthetic batch when
    /// fewer than `min_examples` real rows are available.
    pub fn train(
        &self,
        examples: &[TrainingExample],
    ) -> anyhow::Result<(ArtifactSet, TrainingSummary)> {
        let synthetic = examples.len() < self.min_examples;
        let owned;
        let rows: &[TrainingExample] = if synthetic {
            tracing::info!(
                available = examples.len(),
                required = self.min_examples,
                "insufficient history, training on synthetic examples"
            );
            owned = synthetic_examples(self.synthetic_batch, self.seed)?;
            &owned
        } else {
            examples
        };

        let mut sorted: Vec<&TrainingExample> = rows.iter().collect();
        sorted.sort_by_key(|e| e.observed_at);

        let features = feature_matrix(&sorted);
        let raw: Vec<Vec<f64>> = features.iter().map(|f| f.as_slice().to_vec()).collect();

        let scaler = RobustScaler::fit(&raw).context("fitting feature scaler")?;
        let xs = scaler.transform_batch(&raw)?;

        let trained_at = Utc::now();
        let mut models = BTreeMap::new();
        let mut outcomes = BTreeMap::new();
        let mut skipped_targets = Vec::new();

        for target in Target::ALL {
            let name = target.name();
            let ys: Vec<f64> = sorted.iter().map(|e| target.label(e)).collect();

            match self.select_and_fit(&xs, &ys) {
                Some((model, score)) => {
                    let algorithm = model.algorithm();
                    tracing::info!(
                        target = %name,
                        algorithm = algorithm.as_str(),
                        cross_val_score = score,
                        "target trained"
                    );
                    outcomes.insert(
                        name.clone(),
                        TargetOutcome {
                            algorithm,
                            cross_val_score: score,
                        },
                    );
                    models.insert(
                        name.clone(),
                        ModelArtifact {
                            target: name,
                            algorithm,
                            model,
                            cross_val_score: score,
                            trained_at,
                        },
                    );
                }
                None => {
                    tracing::warn!(target = %name, "every candidate algorithm failed, target skipped");
                    skipped_targets.push(name);
                }
            }
        }

        ensure!(
            !models.is_empty(),
            "training produced no usable models across all targets"
        );

        let artifacts = ArtifactSet {
            scaler,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            models,
            trained_at,
        };
        let summary = TrainingSummary {
            examples_used: sorted.len(),
            synthetic,
            outcomes,
            skipped_targets,
        };
        Ok((artifacts, summary))
    }

    /// Score every candidate with walk-forward folds, refit the winner on
    /// the full batch. Returns None when no candidate fits.
    fn select_and_fit(&self, xs: &[Vec<f64>], ys: &[f64]) -> Option<(Regressor, f64)> {
        let mut best: Option<(AlgorithmId, f64)> = None;

        for algorithm in AlgorithmId::ALL {
            match self.cross_validate(algorithm, xs, ys) {
                Ok(score) => {
                    if best.map_or(true, |(_, s)| score > s) {
                        best = Some((algorithm, score));
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        algorithm = algorithm.as_str(),
                        error = %err,
                        "candidate failed cross-validation, skipping"
                    );
                }
            }
        }

        let (algorithm, score) = best?;
        match fit_candidate(algorithm, xs, ys, self.seed) {
            Ok(model) => Some((model, score)),
            Err(err) => {
                tracing::warn!(
                    algorithm = algorithm.as_str(),
                    error = %err,
                    "final refit failed"
                );
                None
            }
        }
    }

    /// Mean R² over chronological folds; each fold validates on a later
    /// block than it trains on.
    fn cross_validate(
        &self,
        algorithm: AlgorithmId,
        xs: &[Vec<f64>],
        ys: &[f64],
    ) -> anyhow::Result<f64> {
        let n = xs.len();
        let folds = self.folds.min(n.saturating_sub(1)).max(1);
        let block = n / (folds + 1);
        ensure!(block >= 2, "not enough rows for {folds}-fold validation");

        let mut scores = Vec::with_capacity(folds);
        for fold in 1..=folds {
            let train_end = fold * block;
            let test_end = ((fold + 1) * block).min(n);

            let model = fit_candidate(algorithm, &xs[..train_end], &ys[..train_end], self.seed)?;
            let predictions: Vec<f64> =
                xs[train_end..test_end].iter().map(|x| model.predict(x)).collect();
            scores.push(r_squared(&ys[train_end..test_end], &predictions));
        }

        Ok(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

fn feature_matrix(sorted: &[&TrainingExample]) -> Vec<FeatureVector> {
    let mut closes: Vec<f64> = Vec::with_capacity(sorted.len());
    let mut out = Vec::with_capacity(sorted.len());
    for example in sorted {
        let history = PriceHistory::new(closes.clone());
        out.push(build_features(&example.market, &example.sentiment, &history));
        if let Some(spy) = example.market.spy {
            closes.push(spy);
        }
    }
    out
}

fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if ss_tot == 0.0 {
        if ss_res == 0.0 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - ss_res / ss_tot
    }
}

/// Deterministic synthetic market regimes for cold starts. Labels follow
/// the same relationships the live labels encode, so a model trained here
/// behaves sanely until real history accumulates.
pub fn synthetic_examples(count: usize, seed: u64) -> anyhow::Result<Vec<TrainingExample>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let vix_dist: Normal<f64> = Normal::new(20.0, 8.0)?;
    let spy_dist: Normal<f64> = Normal::new(440.0, 20.0)?;
    let dxy_dist: Normal<f64> = Normal::new(102.0, 4.0)?;
    let yield_dist: Normal<f64> = Normal::new(4.0, 0.8)?;
    let sentiment_dist: Normal<f64> = Normal::new(0.0, 0.15)?;
    let spread_dist: Normal<f64> = Normal::new(250.0, 80.0)?;
    let pc_dist: Normal<f64> = Normal::new(0.9, 0.25)?;

    let start = Utc::now() - chrono::Duration::days(count as i64);

    let examples = (0..count)
        .map(|i| {
            let observed_at = start + chrono::Duration::days(i as i64);
            let vix: f64 = vix_dist.sample(&mut rng).clamp(10.0, 50.0);
            let ten_year: f64 = yield_dist.sample(&mut rng).clamp(0.5, 8.0);
            let reddit: f64 = sentiment_dist.sample(&mut rng).clamp(-1.0, 1.0);
            let twitter: f64 = sentiment_dist.sample(&mut rng).clamp(-1.0, 1.0);
            let news: f64 = sentiment_dist.sample(&mut rng).clamp(-1.0, 1.0);

            let mut market = RawMarketSnapshot::empty(observed_at);
            market.spy = Some(spy_dist.sample(&mut rng).max(1.0));
            market.vix = Some(vix);
            market.dxy = Some(dxy_dist.sample(&mut rng).max(1.0));
            market.ten_year = Some(ten_year);
            market.credit_spread = Some(spread_dist.sample(&mut rng).max(0.0));
            market.put_call_ratio = Some(pc_dist.sample(&mut rng).max(0.0));

            let sentiment = RawSentimentSnapshot {
                reddit: Some(reddit),
                twitter: Some(twitter),
                news: Some(news),
                timestamp: observed_at,
                source: Default::default(),
            };

            let risk_score =
                (vix * 2.0 + reddit.abs() * 100.0 + (ten_year - 2.0) * 10.0).clamp(0.0, 100.0);
            let avg_sentiment = (reddit + twitter + news) / 3.0;
            let market_direction =
                (avg_sentiment * 2.0 - (vix - 20.0) / 40.0).clamp(-1.0, 1.0);

            TrainingExample {
                market,
                sentiment,
                risk_score,
                market_direction,
                observed_at,
            }
        })
        .collect();
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(vix: f64, reddit: f64) -> TrainingExample {
        let now = Utc::now();
        let mut market = RawMarketSnapshot::empty(now);
        market.vix = Some(vix);
        let mut sentiment = RawSentimentSnapshot::empty(now);
        sentiment.reddit = Some(reddit);
        TrainingExample {
            market,
            sentiment,
            risk_score: 50.0,
            market_direction: 0.0,
            observed_at: now,
        }
    }

    #[test]
    fn target_names_round_trip() {
        for target in Target::ALL {
            assert_eq!(Target::from_name(&target.name()), Some(target));
        }
        assert_eq!(Target::from_name("crash_predictor_2d"), None);
    }

    #[test]
    fn crash_label_rises_with_horizon() {
        let e = example(30.0, 0.0);
        let short = crash_label(&e, 1);
        let long = crash_label(&e, 30);
        assert!(long > short);
        // 30-day time factor caps at 2.0.
        assert!((long - (short * 2.0).min(0.95)).abs() < 1e-9);
    }

    #[test]
    fn crash_label_stays_in_probability_bounds() {
        for vix in [5.0, 15.0, 35.0, 80.0] {
            for reddit in [-0.9, 0.0, 0.9] {
                for days in [1, 7, 30] {
                    let p = crash_label(&example(vix, reddit), days);
                    assert!((0.05..=0.95).contains(&p), "label {p} out of bounds");
                }
            }
        }
    }

    #[test]
    fn bearish_sentiment_raises_crash_label() {
        let calm = crash_label(&example(25.0, 0.0), 7);
        let bearish = crash_label(&example(25.0, -0.05), 7);
        assert!(bearish > calm);
    }

    #[test]
    fn synthetic_batch_is_deterministic() {
        let a = synthetic_examples(50, 42).unwrap();
        let b = synthetic_examples(50, 42).unwrap();
        assert_eq!(a.len(), 50);
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.market.vix, y.market.vix);
            assert_eq!(x.risk_score, y.risk_score);
        }
    }

    #[test]
    fn synthetic_labels_follow_volatility() {
        let batch = synthetic_examples(200, 42).unwrap();
        let mut high = Vec::new();
        let mut low = Vec::new();
        for e in &batch {
            let vix = e.market.vix.unwrap();
            if vix > 30.0 {
                high.push(e.risk_score);
            } else if vix < 15.0 {
                low.push(e.risk_score);
            }
        }
        let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
        assert!(mean(&high) > mean(&low));
    }

    #[test]
    fn r_squared_of_perfect_fit_is_one() {
        let ys = [1.0, 2.0, 3.0];
        assert!((r_squared(&ys, &ys) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn r_squared_of_mean_prediction_is_zero() {
        let ys = [1.0, 2.0, 3.0];
        let mean = [2.0, 2.0, 2.0];
        assert!(r_squared(&ys, &mean).abs() < 1e-12);
    }

    #[test]
    fn training_with_sparse_history_uses_synthetic_batch() {
        let trainer = EnsembleTrainer {
            folds: 3,
            synthetic_batch: 150,
            ..Default::default()
        };
        let (artifacts, summary) = trainer.train(&[]).unwrap();
        assert!(summary.synthetic);
        assert_eq!(summary.examples_used, 150);
        assert!(!artifacts.models.is_empty());
        assert!(artifacts
            .model_for(Target::RiskScorer)
            .map(|m| m.cross_val_score.is_finite())
            .unwrap_or(false));
    }
}
