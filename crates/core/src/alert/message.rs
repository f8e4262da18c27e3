//! Alert body construction. Plain text, one fact per line; components the
//! scorer could not compute render as "N/A" rather than being dropped.

use serde::{Deserialize, Serialize};

use crate::domain::prediction::{Horizon, PredictionResult};
use crate::domain::score::{CompositeRiskScore, RiskFactor};
use crate::domain::snapshot::DataSource;

/// Optional narrative attached to an alert when an analysis pass produced
/// one. All fields are optional; absent sections are omitted from the body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskInsights {
    pub summary: Option<String>,
    #[serde(default)]
    pub key_drivers: Vec<String>,
    pub recommendation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

pub fn format_alert(
    score: &CompositeRiskScore,
    prediction: Option<&PredictionResult>,
    insights: Option<&RiskInsights>,
) -> AlertMessage {
    let subject = format!(
        "Market Risk Alert: {} ({:.1}/100)",
        score.level.as_str(),
        score.value
    );

    let mut lines = Vec::new();
    lines.push(format!("Time: {}", score.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
    lines.push(format!("Risk Level: {}", score.level.as_str()));
    lines.push(format!("Composite Score: {:.1}/100", score.value));
    lines.push(String::new());

    lines.push("Component Scores:".to_string());
    for factor in RiskFactor::ALL {
        let rendered = match score.components.get(factor) {
            Some(v) => format!("{v:.1}"),
            None => "N/A".to_string(),
        };
        lines.push(format!("  {}: {rendered}", factor.display_name()));
    }

    if let Some(prediction) = prediction {
        lines.push(String::new());
        lines.push("Model Outlook:".to_string());
        lines.push(format!(
            "  Weighted Crash Probability: {:.1}%",
            prediction.weighted_crash_probability * 100.0
        ));
        for horizon in Horizon::ALL {
            lines.push(format!(
                "  {}d Crash Probability: {:.1}%",
                horizon.days(),
                prediction.crash_probability(horizon) * 100.0
            ));
        }
        lines.push(format!("  ML Risk Score: {:.1}/100", prediction.ml_risk_score));
        lines.push(format!(
            "  Market Direction: {:+.2}",
            prediction.market_direction
        ));
        lines.push(format!("  Confidence: {:.0}%", prediction.confidence * 100.0));
        if prediction.source == DataSource::Fallback {
            lines.push("  Note: model outlook built from fallback data".to_string());
        }
    }

    if let Some(insights) = insights {
        let mut section = Vec::new();
        if let Some(summary) = &insights.summary {
            section.push(format!("  {summary}"));
        }
        for driver in &insights.key_drivers {
            section.push(format!("  - {driver}"));
        }
        if let Some(recommendation) = &insights.recommendation {
            section.push(format!("  Recommendation: {recommendation}"));
        }
        if !section.is_empty() {
            lines.push(String::new());
            lines.push("Insights:".to_string());
            lines.extend(section);
        }
    }

    AlertMessage {
        subject,
        body: lines.join("\n"),
    }
}
