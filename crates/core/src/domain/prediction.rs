use crate::domain::snapshot::DataSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Forecast window over which a stress-event probability is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Horizon {
    D1,
    D3,
    D7,
    D14,
    D30,
}

impl Horizon {
    pub const ALL: [Horizon; 5] = [
        Horizon::D1,
        Horizon::D3,
        Horizon::D7,
        Horizon::D14,
        Horizon::D30,
    ];

    pub fn days(&self) -> u32 {
        match self {
            Horizon::D1 => 1,
            Horizon::D3 => 3,
            Horizon::D7 => 7,
            Horizon::D14 => 14,
            Horizon::D30 => 30,
        }
    }

    /// Weight in the front-loaded crash-probability blend. The 30d horizon
    /// is reported but excluded from the blend.
    pub fn blend_weight(&self) -> f64 {
        match self {
            Horizon::D1 => 0.4,
            Horizon::D3 => 0.3,
            Horizon::D7 => 0.2,
            Horizon::D14 => 0.1,
            Horizon::D30 => 0.0,
        }
    }
}

/// Output of one prediction pass. Probabilities are clamped to [0, 1] and
/// the ML risk score to [0, 100] before this struct is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub crash_probabilities: BTreeMap<Horizon, f64>,
    pub ml_risk_score: f64,
    pub weighted_crash_probability: f64,
    pub market_direction: f64,
    pub confidence: f64,
    pub feature_contributions: BTreeMap<String, f64>,
    pub source: DataSource,
}

impl PredictionResult {
    pub fn crash_probability(&self, horizon: Horizon) -> f64 {
        self.crash_probabilities.get(&horizon).copied().unwrap_or(0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blend_weights_front_load_short_horizons() {
        let sum: f64 = Horizon::ALL.iter().map(|h| h.blend_weight()).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(Horizon::D1.blend_weight() > Horizon::D14.blend_weight());
        assert_eq!(Horizon::D30.blend_weight(), 0.0);
    }
}
