use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a snapshot came from. Fallback payloads are canonical placeholder
/// values substituted when live acquisition fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Live,
    Fallback,
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Live
    }
}

/// Raw market indicators for one monitoring cycle. Every field is optional:
/// a provider that cannot supply an indicator leaves it `None`, never a
/// sentinel number. Unknown provider fields are ignored on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMarketSnapshot {
    pub spy: Option<f64>,
    pub vix: Option<f64>,
    pub dxy: Option<f64>,
    pub three_month: Option<f64>,
    pub two_year: Option<f64>,
    pub ten_year: Option<f64>,
    pub thirty_year: Option<f64>,
    /// Credit spread in basis points.
    pub credit_spread: Option<f64>,
    pub hyg: Option<f64>,
    pub lqd: Option<f64>,
    pub tlt: Option<f64>,
    pub put_call_ratio: Option<f64>,
    pub skew: Option<f64>,
    pub unemployment: Option<f64>,
    pub cpi: Option<f64>,
    pub consumer_confidence: Option<f64>,
    pub fed_funds_rate: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: DataSource,
}

impl RawMarketSnapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            spy: None,
            vix: None,
            dxy: None,
            three_month: None,
            two_year: None,
            ten_year: None,
            thirty_year: None,
            credit_spread: None,
            hyg: None,
            lqd: None,
            tlt: None,
            put_call_ratio: None,
            skew: None,
            unemployment: None,
            cpi: None,
            consumer_confidence: None,
            fed_funds_rate: None,
            timestamp,
            source: DataSource::Live,
        }
    }
}

/// Scalar sentiment values in an approximate [-1, 1] range, one per source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSentimentSnapshot {
    pub reddit: Option<f64>,
    pub twitter: Option<f64>,
    pub news: Option<f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: DataSource,
}

impl RawSentimentSnapshot {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            reddit: None,
            twitter: None,
            news: None,
            timestamp,
            source: DataSource::Live,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tolerates_unknown_and_missing_fields() {
        let v = json!({
            "vix": 18.5,
            "some_future_field": "ignored",
            "timestamp": "2026-08-29T12:00:00Z"
        });

        let snap: RawMarketSnapshot = serde_json::from_value(v).unwrap();
        assert_eq!(snap.vix, Some(18.5));
        assert_eq!(snap.spy, None);
        assert_eq!(snap.source, DataSource::Live);
    }

    #[test]
    fn fallback_source_round_trips() {
        let snap = RawSentimentSnapshot {
            reddit: Some(0.0),
            twitter: Some(0.0),
            news: Some(0.0),
            timestamp: Utc::now(),
            source: DataSource::Fallback,
        };

        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["source"], "fallback");
    }
}
