use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named risk factors contributing to the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    Vix,
    Sentiment,
    Dxy,
    Momentum,
    Credit,
    YieldCurve,
    Options,
    Economic,
}

impl RiskFactor {
    pub const ALL: [RiskFactor; 8] = [
        RiskFactor::Vix,
        RiskFactor::Sentiment,
        RiskFactor::Dxy,
        RiskFactor::Momentum,
        RiskFactor::Credit,
        RiskFactor::YieldCurve,
        RiskFactor::Options,
        RiskFactor::Economic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskFactor::Vix => "vix",
            RiskFactor::Sentiment => "sentiment",
            RiskFactor::Dxy => "dxy",
            RiskFactor::Momentum => "momentum",
            RiskFactor::Credit => "credit",
            RiskFactor::YieldCurve => "yield_curve",
            RiskFactor::Options => "options",
            RiskFactor::Economic => "economic",
        }
    }

    /// Label used in outbound alert bodies.
    pub fn display_name(&self) -> &'static str {
        match self {
            RiskFactor::Vix => "VIX Impact",
            RiskFactor::Sentiment => "Sentiment Impact",
            RiskFactor::Dxy => "Dollar Strength",
            RiskFactor::Momentum => "Market Momentum",
            RiskFactor::Credit => "Credit Risk",
            RiskFactor::YieldCurve => "Yield Curve",
            RiskFactor::Options => "Options Flow",
            RiskFactor::Economic => "Economic Indicators",
        }
    }
}

/// Per-factor sub-scores. Every stored value is clamped to [0, 100] on
/// insert so the invariant holds regardless of the producer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentScoreSet(BTreeMap<RiskFactor, f64>);

impl ComponentScoreSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn set(&mut self, factor: RiskFactor, score: f64) {
        self.0.insert(factor, score.clamp(0.0, 100.0));
    }

    pub fn get(&self, factor: RiskFactor) -> Option<f64> {
        self.0.get(&factor).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RiskFactor, f64)> + '_ {
        self.0.iter().map(|(f, s)| (*f, *s))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Discrete classification of a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Fixed bands: >=80 CRITICAL, >=60 HIGH, >=40 MEDIUM, >=20 LOW, else MINIMAL.
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            RiskLevel::Critical
        } else if score >= 60.0 {
            RiskLevel::High
        } else if score >= 40.0 {
            RiskLevel::Medium
        } else if score >= 20.0 {
            RiskLevel::Low
        } else {
            RiskLevel::Minimal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "MINIMAL",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MINIMAL" => Ok(RiskLevel::Minimal),
            "LOW" => Ok(RiskLevel::Low),
            "MEDIUM" => Ok(RiskLevel::Medium),
            "HIGH" => Ok(RiskLevel::High),
            "CRITICAL" => Ok(RiskLevel::Critical),
            other => anyhow::bail!("unknown risk level: {other}"),
        }
    }
}

/// The composite output of one scoring pass. Immutable once created; the
/// storage collaborator owns durability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeRiskScore {
    pub value: f64,
    pub level: RiskLevel,
    pub components: ComponentScoreSet,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_bands_are_inclusive_at_lower_edge() {
        assert_eq!(RiskLevel::from_score(80.0), RiskLevel::Critical);
        assert_eq!(RiskLevel::from_score(79.99), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(60.0), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(40.0), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(20.0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(19.99), RiskLevel::Minimal);
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Minimal);
    }

    #[test]
    fn component_scores_are_clamped() {
        let mut set = ComponentScoreSet::new();
        set.set(RiskFactor::Vix, 140.0);
        set.set(RiskFactor::Dxy, -5.0);
        assert_eq!(set.get(RiskFactor::Vix), Some(100.0));
        assert_eq!(set.get(RiskFactor::Dxy), Some(0.0));
    }

    #[test]
    fn factors_serialize_as_snake_case_keys() {
        let mut set = ComponentScoreSet::new();
        set.set(RiskFactor::YieldCurve, 40.0);
        let v = serde_json::to_value(&set).unwrap();
        assert_eq!(v["yield_curve"], 40.0);
    }
}
