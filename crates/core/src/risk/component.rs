//! Per-indicator sub-scores.
//!
//! Each factor maps one raw indicator to a [0, 100] score through a fixed
//! band table. Bands use `<` at every cutoff (an input exactly on a cutoff
//! lands in the higher band) so boundary behavior is uniform across factors.
//! Missing indicators score at their documented neutral defaults.

use crate::domain::score::{ComponentScoreSet, RiskFactor};
use crate::domain::snapshot::{RawMarketSnapshot, RawSentimentSnapshot};

pub const DEFAULT_VIX: f64 = 20.0;
pub const DEFAULT_SPY: f64 = 440.0;
pub const DEFAULT_DXY: f64 = 100.0;
pub const DEFAULT_CREDIT_SPREAD_BPS: f64 = 200.0;
pub const DEFAULT_TWO_YEAR: f64 = 4.5;
pub const DEFAULT_TEN_YEAR: f64 = 4.2;
pub const DEFAULT_PUT_CALL_RATIO: f64 = 0.8;
pub const DEFAULT_SKEW: f64 = 0.05;
pub const DEFAULT_UNEMPLOYMENT: f64 = 4.0;
pub const DEFAULT_CPI: f64 = 3.0;
pub const DEFAULT_CONSUMER_CONFIDENCE: f64 = 100.0;
pub const DEFAULT_FED_FUNDS_RATE: f64 = 5.0;

/// Volatility-index fear score: <15 -> 10, <20 -> 20, <25 -> 40, <30 -> 60,
/// <35 -> 80, else 100.
pub fn vix_score(vix: f64) -> f64 {
    if vix < 15.0 {
        10.0
    } else if vix < 20.0 {
        20.0
    } else if vix < 25.0 {
        40.0
    } else if vix < 30.0 {
        60.0
    } else if vix < 35.0 {
        80.0
    } else {
        100.0
    }
}

/// Sentiment risk from the average across sources; negative sentiment
/// raises risk. Missing sources count as 0.0 (neutral).
pub fn sentiment_score(sentiment: &RawSentimentSnapshot) -> f64 {
    let reddit = sentiment.reddit.unwrap_or(0.0);
    let twitter = sentiment.twitter.unwrap_or(0.0);
    let news = sentiment.news.unwrap_or(0.0);
    let avg = (reddit + twitter + news) / 3.0;

    if avg < -0.1 {
        90.0
    } else if avg < -0.05 {
        70.0
    } else if avg < 0.05 {
        50.0
    } else if avg < 0.1 {
        30.0
    } else {
        20.0
    }
}

/// Dollar-strength score. A strong dollar signals flight to safety.
pub fn dxy_score(dxy: f64) -> f64 {
    if dxy < 95.0 {
        20.0
    } else if dxy < 100.0 {
        30.0
    } else if dxy < 105.0 {
        40.0
    } else if dxy < 110.0 {
        60.0
    } else {
        80.0
    }
}

/// Momentum score from the equity index level; weaker momentum scores higher.
pub fn momentum_score(spy: f64) -> f64 {
    if spy < 390.0 {
        70.0
    } else if spy < 410.0 {
        60.0
    } else if spy < 430.0 {
        50.0
    } else if spy < 450.0 {
        40.0
    } else {
        30.0
    }
}

/// Credit stress from the spread level plus bond-market confirmation
/// (high-yield underperformance vs treasuries).
pub fn credit_score(market: &RawMarketSnapshot) -> f64 {
    let spread = market.credit_spread.unwrap_or(DEFAULT_CREDIT_SPREAD_BPS);

    let spread_score: f64 = if spread < 250.0 {
        20.0
    } else if spread < 350.0 {
        40.0
    } else if spread < 500.0 {
        60.0
    } else {
        80.0
    };

    // Bond confirmation only when all three ETF levels are present.
    let bond_stress = match (market.hyg, market.lqd, market.tlt) {
        (Some(hyg), Some(_lqd), Some(tlt)) if tlt != 0.0 => {
            let hy_vs_treasury = (hyg / tlt) * 100.0;
            if hy_vs_treasury < 85.0 {
                30.0
            } else if hy_vs_treasury < 90.0 {
                20.0
            } else {
                10.0
            }
        }
        _ => 0.0,
    };

    (spread_score + bond_stress).min(100.0)
}

/// Yield-curve score: inversion of 10Y-2Y (70% weight) plus the absolute
/// rate level (30%). Both very high and very low rates add risk.
pub fn yield_curve_score(market: &RawMarketSnapshot) -> f64 {
    let two_year = market.two_year.unwrap_or(DEFAULT_TWO_YEAR);
    let ten_year = market.ten_year.unwrap_or(DEFAULT_TEN_YEAR);

    let slope = ten_year - two_year;
    let inversion_score: f64 = if slope < -0.5 {
        80.0
    } else if slope < -0.1 {
        60.0
    } else if slope < 0.5 {
        40.0
    } else {
        20.0
    };

    let level_score: f64 = if ten_year < 2.0 {
        30.0
    } else if ten_year < 5.0 {
        10.0
    } else if ten_year < 6.0 {
        40.0
    } else {
        60.0
    };

    (inversion_score * 0.7 + level_score * 0.3).min(100.0)
}

/// Options-market score from put/call imbalance (both extremes are risky)
/// and implied-vol skew.
pub fn options_score(market: &RawMarketSnapshot) -> f64 {
    let put_call = market.put_call_ratio.unwrap_or(DEFAULT_PUT_CALL_RATIO);
    let skew = market.skew.unwrap_or(DEFAULT_SKEW);

    let pc_score: f64 = if put_call < 0.5 {
        60.0 // excessive complacency
    } else if put_call < 1.2 {
        20.0
    } else if put_call < 1.5 {
        50.0
    } else {
        70.0 // excessive fear
    };

    let skew_score: f64 = if skew < -0.05 {
        30.0
    } else if skew < 0.1 {
        10.0
    } else {
        40.0
    };

    (pc_score * 0.6 + skew_score * 0.4).min(100.0)
}

/// Additive macro score. Deliberately non-monotone: very low unemployment
/// and very low inflation both add risk (overheating / deflation).
pub fn economic_score(market: &RawMarketSnapshot) -> f64 {
    let unemployment = market.unemployment.unwrap_or(DEFAULT_UNEMPLOYMENT);
    let cpi = market.cpi.unwrap_or(DEFAULT_CPI);
    let confidence = market
        .consumer_confidence
        .unwrap_or(DEFAULT_CONSUMER_CONFIDENCE);
    let fed_funds = market.fed_funds_rate.unwrap_or(DEFAULT_FED_FUNDS_RATE);

    let mut score: f64 = 0.0;

    if unemployment > 6.0 {
        score += 30.0;
    } else if unemployment > 4.5 {
        score += 15.0;
    } else if unemployment < 3.5 {
        score += 10.0;
    }

    if cpi > 5.0 {
        score += 25.0;
    } else if cpi > 3.5 {
        score += 15.0;
    } else if cpi < 1.0 {
        score += 20.0;
    }

    if confidence < 80.0 {
        score += 20.0;
    } else if confidence > 130.0 {
        score += 10.0;
    }

    if fed_funds > 6.0 {
        score += 15.0;
    } else if fed_funds < 1.0 {
        score += 10.0;
    }

    score.min(100.0)
}

/// Score every factor from one pair of snapshots.
pub fn score_components(
    market: &RawMarketSnapshot,
    sentiment: &RawSentimentSnapshot,
) -> ComponentScoreSet {
    let mut set = ComponentScoreSet::new();
    set.set(RiskFactor::Vix, vix_score(market.vix.unwrap_or(DEFAULT_VIX)));
    set.set(RiskFactor::Sentiment, sentiment_score(sentiment));
    set.set(RiskFactor::Dxy, dxy_score(market.dxy.unwrap_or(DEFAULT_DXY)));
    set.set(
        RiskFactor::Momentum,
        momentum_score(market.spy.unwrap_or(DEFAULT_SPY)),
    );
    set.set(RiskFactor::Credit, credit_score(market));
    set.set(RiskFactor::YieldCurve, yield_curve_score(market));
    set.set(RiskFactor::Options, options_score(market));
    set.set(RiskFactor::Economic, economic_score(market));
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sentiment(reddit: f64, twitter: f64, news: f64) -> RawSentimentSnapshot {
        RawSentimentSnapshot {
            reddit: Some(reddit),
            twitter: Some(twitter),
            news: Some(news),
            timestamp: Utc::now(),
            source: Default::default(),
        }
    }

    #[test]
    fn vix_bands_are_non_decreasing_steps() {
        let mut prev = 0.0;
        for v in [5.0, 14.0, 16.0, 21.0, 26.0, 31.0, 40.0, 80.0] {
            let s = vix_score(v);
            assert!(s >= prev, "vix_score not monotone at {v}");
            prev = s;
        }
    }

    #[test]
    fn vix_boundaries_land_in_higher_band() {
        assert_eq!(vix_score(14.99), 10.0);
        assert_eq!(vix_score(15.0), 20.0);
        assert_eq!(vix_score(34.99), 80.0);
        assert_eq!(vix_score(35.0), 100.0);
    }

    #[test]
    fn vix_scenarios_from_band_table() {
        assert_eq!(vix_score(14.0), 10.0);
        assert_eq!(vix_score(45.0), 100.0);
    }

    #[test]
    fn neutral_sentiment_scores_fifty() {
        assert_eq!(sentiment_score(&sentiment(0.0, 0.0, 0.0)), 50.0);
    }

    #[test]
    fn negative_sentiment_raises_risk() {
        assert_eq!(sentiment_score(&sentiment(-0.2, -0.2, -0.2)), 90.0);
        assert_eq!(sentiment_score(&sentiment(0.2, 0.2, 0.2)), 20.0);
    }

    #[test]
    fn missing_sentiment_sources_are_neutral() {
        let s = RawSentimentSnapshot::empty(Utc::now());
        assert_eq!(sentiment_score(&s), 50.0);
    }

    #[test]
    fn credit_needs_all_bond_levels_for_confirmation() {
        let mut market = RawMarketSnapshot::empty(Utc::now());
        market.credit_spread = Some(200.0);
        assert_eq!(credit_score(&market), 20.0);

        market.hyg = Some(80.0);
        market.lqd = Some(120.0);
        market.tlt = Some(90.0);
        // 80/90*100 = 88.9 -> +20 bond stress
        assert_eq!(credit_score(&market), 40.0);
    }

    #[test]
    fn inverted_curve_scores_high() {
        let mut market = RawMarketSnapshot::empty(Utc::now());
        market.two_year = Some(5.0);
        market.ten_year = Some(4.2);
        // slope -0.8 -> 80, level 10 -> 0.7*80 + 0.3*10 = 59
        assert!((yield_curve_score(&market) - 59.0).abs() < 1e-9);
    }

    #[test]
    fn low_unemployment_adds_overheating_risk() {
        let mut market = RawMarketSnapshot::empty(Utc::now());
        market.unemployment = Some(3.0);
        market.cpi = Some(3.0);
        market.consumer_confidence = Some(100.0);
        market.fed_funds_rate = Some(5.0);
        assert_eq!(economic_score(&market), 10.0);
    }

    #[test]
    fn all_factors_present_and_bounded() {
        let market = RawMarketSnapshot::empty(Utc::now());
        let sent = RawSentimentSnapshot::empty(Utc::now());
        let set = score_components(&market, &sent);
        assert_eq!(set.len(), 8);
        for (_, score) in set.iter() {
            assert!((0.0..=100.0).contains(&score));
        }
    }
}
