//! Portfolio-adjusted risk on top of the market composite.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioProfile {
    /// Market beta of the portfolio.
    pub beta: f64,
    /// Correlation with the broad market.
    pub correlation: f64,
    /// Concentration of the largest position, in [0, 1].
    pub concentration: f64,
}

impl Default for PortfolioProfile {
    fn default() -> Self {
        Self {
            beta: 1.0,
            correlation: 0.8,
            concentration: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioRisk {
    pub portfolio_risk: f64,
    pub market_risk: f64,
    pub beta_impact: f64,
    pub correlation_impact: f64,
    pub concentration_impact: f64,
}

/// Scale the market composite by portfolio characteristics
/// (beta 40%, correlation 30%, concentration 30%).
pub fn portfolio_risk(profile: &PortfolioProfile, market_risk_score: f64) -> PortfolioRisk {
    let multiplier =
        profile.beta * 0.4 + profile.correlation * 0.3 + profile.concentration * 0.3;

    PortfolioRisk {
        portfolio_risk: market_risk_score * multiplier,
        market_risk: market_risk_score,
        beta_impact: profile.beta * market_risk_score * 0.4,
        correlation_impact: profile.correlation * market_risk_score * 0.3,
        concentration_impact: profile.concentration * market_risk_score * 0.3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_profile_scales_below_market() {
        let risk = portfolio_risk(&PortfolioProfile::default(), 50.0);
        // 1.0*0.4 + 0.8*0.3 + 0.1*0.3 = 0.67
        assert!((risk.portfolio_risk - 33.5).abs() < 1e-9);
        assert_eq!(risk.market_risk, 50.0);
    }

    #[test]
    fn impacts_sum_to_portfolio_risk() {
        let profile = PortfolioProfile {
            beta: 1.4,
            correlation: 0.9,
            concentration: 0.3,
        };
        let risk = portfolio_risk(&profile, 70.0);
        let sum = risk.beta_impact + risk.correlation_impact + risk.concentration_impact;
        assert!((sum - risk.portfolio_risk).abs() < 1e-9);
    }
}
