//! Pure scoring pipeline: net proceeds, contingency risk, and the overall ranking score.
//!
//! Every function here accepts any finite input and never fails; validation happens in the
//! normalizer before terms reach this module.

mod financial;
mod overall;
mod risk;

pub use financial::net_proceeds;
pub use overall::{
    display_score, overall_score, raw_overall_score, score_components, weighted_score,
    ScoreFactor, ScoreWeights,
};
pub use risk::{risk_score, MAX_RISK_SCORE, MIN_RISK_SCORE};

use serde::{Deserialize, Serialize};

use super::normalizer::NormalizedOffer;

/// Discrete contribution to the overall score, kept for transparent audits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreComponent {
    pub factor: ScoreFactor,
    pub points: f64,
    pub notes: String,
}

/// Metrics frozen onto an offer when it is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferScorecard {
    pub net_proceeds: f64,
    pub risk_score: u8,
    pub overall_score: i64,
}

pub fn score_offer(terms: &NormalizedOffer, loan_balance: Option<f64>) -> OfferScorecard {
    let risk_score = risk_score(terms.contingencies.len());
    OfferScorecard {
        net_proceeds: net_proceeds(terms.price, loan_balance, terms.commission),
        risk_score,
        overall_score: overall_score(terms.price, risk_score, terms.closing_timeline_days),
    }
}
