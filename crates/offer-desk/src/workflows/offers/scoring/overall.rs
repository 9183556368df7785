use serde::{Deserialize, Serialize};

use super::super::domain::PriorityProfile;
use super::ScoreComponent;

pub const PRICE_POINTS_PER_MILLION: f64 = 40.0;
pub const POINTS_PER_RISK_STEP: f64 = 5.0;
pub const TIMELINE_BASE_POINTS: f64 = 60.0;
pub const TIMELINE_POINTS_PER_DAY: f64 = 0.5;

/// Days at which the timeline contribution reaches zero in both variants.
const TIMELINE_HORIZON_DAYS: f64 = TIMELINE_BASE_POINTS / TIMELINE_POINTS_PER_DAY;

/// Inputs blended into the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactor {
    Price,
    Risk,
    Timeline,
}

impl ScoreFactor {
    pub const fn label(self) -> &'static str {
        match self {
            ScoreFactor::Price => "Price",
            ScoreFactor::Risk => "Contingency risk",
            ScoreFactor::Timeline => "Closing timeline",
        }
    }
}

/// Fixed-weight breakdown: $1M is worth 40 points, each risk step 5, and the timeline
/// starts at 60 and loses half a point per day.
pub fn score_components(price: f64, risk_score: u8, closing_timeline_days: u32) -> Vec<ScoreComponent> {
    let price_points = price * PRICE_POINTS_PER_MILLION / 1_000_000.0;
    let risk_points = f64::from(risk_score) * POINTS_PER_RISK_STEP;
    let timeline_points =
        TIMELINE_BASE_POINTS - f64::from(closing_timeline_days) * TIMELINE_POINTS_PER_DAY;

    vec![
        ScoreComponent {
            factor: ScoreFactor::Price,
            points: price_points,
            notes: format!("${price:.0} at {PRICE_POINTS_PER_MILLION} points per $1M"),
        },
        ScoreComponent {
            factor: ScoreFactor::Risk,
            points: risk_points,
            notes: format!("risk score {risk_score} of 10"),
        },
        ScoreComponent {
            factor: ScoreFactor::Timeline,
            points: timeline_points,
            notes: format!("{closing_timeline_days} day close"),
        },
    ]
}

pub fn raw_overall_score(price: f64, risk_score: u8, closing_timeline_days: u32) -> f64 {
    score_components(price, risk_score, closing_timeline_days)
        .iter()
        .map(|component| component.points)
        .sum()
}

/// Rounded, unclamped overall score. Ranking always uses this value.
pub fn overall_score(price: f64, risk_score: u8, closing_timeline_days: u32) -> i64 {
    round_half_up(raw_overall_score(price, risk_score, closing_timeline_days))
}

/// `.5` rounds toward positive infinity, including for negative scores.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Score clamped to `0..=100` for presentation only.
pub fn display_score(overall_score: i64) -> u8 {
    overall_score.clamp(0, 100) as u8
}

/// Normalized weights (summing to 1) for the priority-aware variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreWeights {
    pub price: f64,
    pub risk: f64,
    pub timeline: f64,
}

impl ScoreWeights {
    pub fn even() -> Self {
        Self {
            price: 1.0 / 3.0,
            risk: 1.0 / 3.0,
            timeline: 1.0 / 3.0,
        }
    }

    pub fn from_profile(profile: &PriorityProfile) -> Self {
        let price = f64::from(profile.price);
        let risk = f64::from(profile.contingency_risk);
        let timeline = f64::from(profile.closing_speed);
        let total = price + risk + timeline;
        if total <= 0.0 {
            return Self::even();
        }

        Self {
            price: price / total,
            risk: risk / total,
            timeline: timeline / total,
        }
    }
}

/// Priority-weighted score. Each component is rescaled so its reference point is 100
/// ($1M price, risk 10, same-day close) before the listing's weights are applied.
/// Unclamped, like the fixed variant.
pub fn weighted_score(
    price: f64,
    risk_score: u8,
    closing_timeline_days: u32,
    weights: &ScoreWeights,
) -> f64 {
    let price_unit = price * 100.0 / 1_000_000.0;
    let risk_unit = f64::from(risk_score) * 10.0;
    let timeline_unit =
        (TIMELINE_HORIZON_DAYS - f64::from(closing_timeline_days)) / TIMELINE_HORIZON_DAYS * 100.0;

    weights.price * price_unit + weights.risk * risk_unit + weights.timeline * timeline_unit
}
