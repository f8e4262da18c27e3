//! Feature engineering for the prediction models.
//!
//! The feature name set is fixed: anything unavailable (missing indicator,
//! insufficient price history) is filled with 0.0 so scaler and model shapes
//! stay stable across cycles.

use crate::domain::snapshot::{RawMarketSnapshot, RawSentimentSnapshot};
use serde::{Deserialize, Serialize};

pub const FEATURE_NAMES: [&str; 32] = [
    "spy_price",
    "vix",
    "dxy",
    "ten_year",
    "rsi_14",
    "rsi_30",
    "sma_20",
    "sma_50",
    "sma_200",
    "price_vs_sma20",
    "price_vs_sma50",
    "price_vs_sma200",
    "volatility_20d",
    "volatility_60d",
    "momentum_1d",
    "momentum_5d",
    "momentum_20d",
    "bb_position",
    "reddit_sentiment",
    "twitter_sentiment",
    "news_sentiment",
    "avg_sentiment",
    "small_large_ratio",
    "vix_term_structure",
    "fed_funds_rate",
    "unemployment_rate",
    "cpi_yoy",
    "credit_spread",
    "put_call_ratio",
    "vix_yield_interaction",
    "sentiment_volatility_interaction",
    "dxy_vix_interaction",
];

pub const N_FEATURES: usize = FEATURE_NAMES.len();

/// Ordered numeric feature values, one per entry of [`FEATURE_NAMES`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn zeros() -> Self {
        Self {
            values: vec![0.0; N_FEATURES],
        }
    }

    pub fn set(&mut self, name: &str, value: f64) {
        if let Some(idx) = FEATURE_NAMES.iter().position(|n| *n == name) {
            self.values[idx] = if value.is_finite() { value } else { 0.0 };
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.values[idx])
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fraction of features that were actually observed rather than filled.
    pub fn non_zero_fraction(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let non_zero = self.values.iter().filter(|v| **v != 0.0).count();
        non_zero as f64 / self.values.len() as f64
    }
}

/// Rolling close-price history, oldest first.
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    closes: Vec<f64>,
}

impl PriceHistory {
    pub fn new(closes: Vec<f64>) -> Self {
        Self { closes }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    fn last(&self) -> Option<f64> {
        self.closes.last().copied()
    }

    /// Relative-strength index over the trailing `period` changes.
    pub fn rsi(&self, period: usize) -> Option<f64> {
        if self.closes.len() < period + 1 {
            return None;
        }
        let window = &self.closes[self.closes.len() - period - 1..];
        let mut gain = 0.0;
        let mut loss = 0.0;
        for pair in window.windows(2) {
            let delta = pair[1] - pair[0];
            if delta > 0.0 {
                gain += delta;
            } else {
                loss -= delta;
            }
        }
        let avg_gain = gain / period as f64;
        let avg_loss = loss / period as f64;
        if avg_loss == 0.0 {
            return Some(100.0);
        }
        let rs = avg_gain / avg_loss;
        Some(100.0 - 100.0 / (1.0 + rs))
    }

    /// Simple moving average of the last `period` closes.
    pub fn sma(&self, period: usize) -> Option<f64> {
        if self.closes.len() < period || period == 0 {
            return None;
        }
        let window = &self.closes[self.closes.len() - period..];
        Some(window.iter().sum::<f64>() / period as f64)
    }

    /// Annualized standard deviation of daily returns over `period`.
    pub fn rolling_volatility(&self, period: usize) -> Option<f64> {
        if self.closes.len() < period + 1 || period < 2 {
            return None;
        }
        let window = &self.closes[self.closes.len() - period - 1..];
        let returns: Vec<f64> = window
            .windows(2)
            .filter(|p| p[0] != 0.0)
            .map(|p| p[1] / p[0] - 1.0)
            .collect();
        if returns.len() < 2 {
            return None;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        Some(var.sqrt() * 252.0_f64.sqrt())
    }

    /// Percent change over the trailing `period` closes.
    pub fn momentum(&self, period: usize) -> Option<f64> {
        if self.closes.len() < period + 1 {
            return None;
        }
        let prev = self.closes[self.closes.len() - period - 1];
        if prev == 0.0 {
            return None;
        }
        Some(self.last()? / prev - 1.0)
    }

    /// Position within the 20-period Bollinger bands, 0 at the lower band
    /// and 1 at the upper.
    pub fn bollinger_position(&self) -> Option<f64> {
        let period = 20;
        let middle = self.sma(period)?;
        if self.closes.len() < period {
            return None;
        }
        let window = &self.closes[self.closes.len() - period..];
        let var = window.iter().map(|c| (c - middle).powi(2)).sum::<f64>() / period as f64;
        let std = var.sqrt();
        if std == 0.0 {
            return None;
        }
        let upper = middle + 2.0 * std;
        let lower = middle - 2.0 * std;
        Some((self.last()? - lower) / (upper - lower))
    }
}

/// Build the full feature vector from one cycle's snapshots and the rolling
/// price history.
pub fn build_features(
    market: &RawMarketSnapshot,
    sentiment: &RawSentimentSnapshot,
    history: &PriceHistory,
) -> FeatureVector {
    let mut features = FeatureVector::zeros();

    let spy = market.spy.unwrap_or(0.0);
    let vix = market.vix.unwrap_or(0.0);
    let dxy = market.dxy.unwrap_or(0.0);
    let ten_year = market.ten_year.unwrap_or(0.0);

    features.set("spy_price", spy);
    features.set("vix", vix);
    features.set("dxy", dxy);
    features.set("ten_year", ten_year);

    if let Some(rsi) = history.rsi(14) {
        features.set("rsi_14", rsi);
    }
    if let Some(rsi) = history.rsi(30) {
        features.set("rsi_30", rsi);
    }

    let current = history.closes().last().copied();
    for (name, ratio_name, period) in [
        ("sma_20", "price_vs_sma20", 20usize),
        ("sma_50", "price_vs_sma50", 50),
        ("sma_200", "price_vs_sma200", 200),
    ] {
        if let Some(sma) = history.sma(period) {
            features.set(name, sma);
            if let Some(price) = current {
                if sma != 0.0 {
                    features.set(ratio_name, (price - sma) / sma);
                }
            }
        }
    }

    if let Some(vol) = history.rolling_volatility(20) {
        features.set("volatility_20d", vol);
    }
    if let Some(vol) = history.rolling_volatility(60) {
        features.set("volatility_60d", vol);
    }

    for (name, period) in [("momentum_1d", 1usize), ("momentum_5d", 5), ("momentum_20d", 20)] {
        if let Some(m) = history.momentum(period) {
            features.set(name, m);
        }
    }

    if let Some(bb) = history.bollinger_position() {
        features.set("bb_position", bb);
    }

    let reddit = sentiment.reddit.unwrap_or(0.0);
    let twitter = sentiment.twitter.unwrap_or(0.0);
    let news = sentiment.news.unwrap_or(0.0);
    let avg_sentiment = (reddit + twitter + news) / 3.0;
    features.set("reddit_sentiment", reddit);
    features.set("twitter_sentiment", twitter);
    features.set("news_sentiment", news);
    features.set("avg_sentiment", avg_sentiment);

    // Breadth and term-structure proxies default to 1.0 (neutral ratio)
    // only when the inputs to derive them exist; otherwise stay 0.0.
    if market.hyg.is_some() && market.lqd.is_some() {
        let hyg = market.hyg.unwrap_or(0.0);
        let lqd = market.lqd.unwrap_or(1.0);
        if lqd != 0.0 {
            features.set("small_large_ratio", hyg / lqd);
        }
    }
    if let (Some(vix_now), Some(three_month)) = (market.vix, market.three_month) {
        if three_month != 0.0 {
            features.set("vix_term_structure", vix_now / (three_month * 10.0));
        }
    }

    features.set("fed_funds_rate", market.fed_funds_rate.unwrap_or(0.0));
    features.set("unemployment_rate", market.unemployment.unwrap_or(0.0));
    features.set("cpi_yoy", market.cpi.unwrap_or(0.0));
    features.set("credit_spread", market.credit_spread.unwrap_or(0.0));
    features.set("put_call_ratio", market.put_call_ratio.unwrap_or(0.0));

    // Cross terms materially improve separability between calm and
    // stressed regimes.
    let vol_20d = features.get("volatility_20d").unwrap_or(0.0);
    features.set("vix_yield_interaction", vix * ten_year);
    features.set("sentiment_volatility_interaction", avg_sentiment * vol_20d);
    features.set("dxy_vix_interaction", dxy * vix);

    features
}
