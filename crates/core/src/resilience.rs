//! Failure tracking and canonical fallback payloads.
//!
//! Every external acquisition (market data, sentiment, predictions) runs
//! under this manager: failures are counted per service, retries back off
//! exponentially, and when a service is exhausted the cycle continues on
//! placeholder values marked as fallback rather than aborting.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::prediction::{Horizon, PredictionResult};
use crate::domain::snapshot::{DataSource, RawMarketSnapshot, RawSentimentSnapshot};

pub const SERVICE_MARKET_DATA: &str = "market_data";
pub const SERVICE_SENTIMENT_DATA: &str = "sentiment_data";
pub const SERVICE_ML_PREDICTION: &str = "ml_prediction";

const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct ResilienceManager {
    max_retries: u32,
    base_delay: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl Default for ResilienceManager {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl ResilienceManager {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Record one failure for `service` and return the running count.
    pub fn note_failure(&self, service: &str) -> u32 {
        let mut failures = self.lock();
        let count = failures.entry(service.to_string()).or_insert(0);
        *count += 1;
        tracing::warn!(service, failures = *count, "service failure recorded");
        *count
    }

    /// A service is healthy while its consecutive failures stay below the
    /// retry budget.
    pub fn is_service_healthy(&self, service: &str) -> bool {
        self.failure_count(service) < self.max_retries
    }

    pub fn failure_count(&self, service: &str) -> u32 {
        self.lock().get(service).copied().unwrap_or(0)
    }

    /// Clear the failure count after a successful acquisition.
    pub fn reset(&self, service: &str) {
        self.lock().remove(service);
    }

    /// Consecutive-failure counts for every service seen so far.
    pub fn status(&self) -> BTreeMap<String, u32> {
        self.lock().iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    /// Exponential backoff for the given zero-based attempt, capped at one
    /// minute.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = 2u32.saturating_pow(attempt.min(30));
        self.base_delay.saturating_mul(exp).min(MAX_BACKOFF)
    }

    pub async fn backoff(&self, attempt: u32) {
        tokio::time::sleep(self.backoff_delay(attempt)).await;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, u32>> {
        match self.failures.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Placeholder market snapshot representing calm conditions, used when
/// the live provider is exhausted.
pub fn fallback_market(timestamp: DateTime<Utc>) -> RawMarketSnapshot {
    let mut snapshot = RawMarketSnapshot::empty(timestamp);
    snapshot.spy = Some(440.25);
    snapshot.vix = Some(21.45);
    snapshot.dxy = Some(102.3);
    snapshot.source = DataSource::Fallback;
    snapshot
}

/// Neutral sentiment across all sources.
pub fn fallback_sentiment(timestamp: DateTime<Utc>) -> RawSentimentSnapshot {
    RawSentimentSnapshot {
        reddit: Some(0.0),
        twitter: Some(0.0),
        news: Some(0.0),
        timestamp,
        source: DataSource::Fallback,
    }
}

/// Maximum-uncertainty prediction: every probability at coin-flip, score at
/// midpoint, low confidence.
pub fn fallback_prediction() -> PredictionResult {
    let crash_probabilities = Horizon::ALL.iter().map(|h| (*h, 0.5)).collect();
    PredictionResult {
        crash_probabilities,
        ml_risk_score: 50.0,
        weighted_crash_probability: 0.5,
        market_direction: 0.0,
        confidence: 0.3,
        feature_contributions: BTreeMap::new(),
        source: DataSource::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_accumulate_until_reset() {
        let manager = ResilienceManager::new(3, Duration::from_secs(1));
        assert!(manager.is_service_healthy(SERVICE_MARKET_DATA));

        manager.note_failure(SERVICE_MARKET_DATA);
        manager.note_failure(SERVICE_MARKET_DATA);
        assert!(manager.is_service_healthy(SERVICE_MARKET_DATA));

        manager.note_failure(SERVICE_MARKET_DATA);
        assert!(!manager.is_service_healthy(SERVICE_MARKET_DATA));
        assert_eq!(manager.failure_count(SERVICE_MARKET_DATA), 3);

        manager.reset(SERVICE_MARKET_DATA);
        assert!(manager.is_service_healthy(SERVICE_MARKET_DATA));
        assert_eq!(manager.failure_count(SERVICE_MARKET_DATA), 0);
    }

    #[test]
    fn services_are_tracked_independently() {
        let manager = ResilienceManager::default();
        manager.note_failure(SERVICE_SENTIMENT_DATA);
        assert_eq!(manager.failure_count(SERVICE_SENTIMENT_DATA), 1);
        assert_eq!(manager.failure_count(SERVICE_MARKET_DATA), 0);

        let status = manager.status();
        assert_eq!(status.get(SERVICE_SENTIMENT_DATA), Some(&1));
        assert_eq!(status.get(SERVICE_MARKET_DATA), None);
    }

    #[test]
    fn backoff_doubles_and_caps_at_one_minute() {
        let manager = ResilienceManager::new(3, Duration::from_secs(1));
        assert_eq!(manager.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(manager.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(manager.backoff_delay(5), Duration::from_secs(32));
        assert_eq!(manager.backoff_delay(6), Duration::from_secs(60));
        assert_eq!(manager.backoff_delay(40), Duration::from_secs(60));
    }

    #[test]
    fn fallback_market_is_marked_and_calm() {
        let snapshot = fallback_market(Utc::now());
        assert_eq!(snapshot.source, DataSource::Fallback);
        assert_eq!(snapshot.spy, Some(440.25));
        assert_eq!(snapshot.vix, Some(21.45));
        assert_eq!(snapshot.dxy, Some(102.3));
        assert_eq!(snapshot.credit_spread, None);
    }

    #[test]
    fn fallback_prediction_is_maximally_uncertain() {
        let prediction = fallback_prediction();
        assert_eq!(prediction.source, DataSource::Fallback);
        for horizon in Horizon::ALL {
            assert_eq!(prediction.crash_probability(horizon), 0.5);
        }
        assert_eq!(prediction.ml_risk_score, 50.0);
        assert_eq!(prediction.confidence, 0.3);
    }
}
