//! Weighted combination of sub-scores into a composite level.

use crate::domain::score::{ComponentScoreSet, CompositeRiskScore, RiskFactor, RiskLevel};
use chrono::{DateTime, Utc};

/// Fixed factor weights. Must sum to 1.0.
pub fn factor_weight(factor: RiskFactor) -> f64 {
    match factor {
        RiskFactor::Vix => 0.20,
        RiskFactor::Sentiment => 0.15,
        RiskFactor::Dxy => 0.15,
        RiskFactor::Momentum => 0.15,
        RiskFactor::Credit => 0.15,
        RiskFactor::YieldCurve => 0.10,
        RiskFactor::Options => 0.05,
        RiskFactor::Economic => 0.05,
    }
}

/// Combine sub-scores into a composite. Factors absent from the set
/// contribute nothing; the result is always within [0, 100].
pub fn aggregate(components: ComponentScoreSet, timestamp: DateTime<Utc>) -> CompositeRiskScore {
    let raw: f64 = components
        .iter()
        .map(|(factor, score)| score * factor_weight(factor))
        .sum();

    let value = raw.clamp(0.0, 100.0);
    let level = RiskLevel::from_score(value);

    tracing::debug!(value, level = level.as_str(), "aggregated composite risk score");

    CompositeRiskScore {
        value,
        level,
        components,
        timestamp,
    }
}
