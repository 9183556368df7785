use serde::Serialize;

use super::domain::{Listing, Offer, OfferId};
use super::scoring::display_score;

/// Closing timelines longer than this are flagged as negotiable.
pub const LONG_CLOSING_DAYS: u32 = 45;
/// Offers carrying at least this many contingencies are flagged as negotiable.
pub const HEAVY_CONTINGENCY_COUNT: usize = 3;

/// Comparative read-out across a listing's offers. Data only; rendering is up to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OfferInsights {
    NoOffers,
    Ready(InsightSummary),
}

impl OfferInsights {
    pub fn summary_lines(&self) -> Vec<String> {
        match self {
            OfferInsights::NoOffers => vec!["No offers yet".to_string()],
            OfferInsights::Ready(summary) => {
                let mut lines = vec![
                    summary.recommendation.summary(),
                    summary.risk_assessment.summary(),
                    summary.net_proceeds_comparison.summary(),
                ];
                lines.extend(
                    summary
                        .negotiation_opportunities
                        .iter()
                        .map(NegotiationOpportunity::summary),
                );
                lines
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightSummary {
    pub offer_count: usize,
    pub recommendation: Recommendation,
    pub risk_assessment: RiskAssessment,
    pub net_proceeds_comparison: NetProceedsComparison,
    pub negotiation_opportunities: Vec<NegotiationOpportunity>,
}

/// Best overall offer by raw overall score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub offer_id: OfferId,
    pub buyer_name: String,
    pub overall_score: i64,
    pub display_score: u8,
}

impl Recommendation {
    pub fn summary(&self) -> String {
        format!(
            "{} has the strongest overall offer (score {})",
            self.buyer_name, self.display_score
        )
    }
}

/// Offer with the highest (safest) risk score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub offer_id: OfferId,
    pub buyer_name: String,
    pub risk_score: u8,
    pub contingency_count: usize,
}

impl RiskAssessment {
    pub fn summary(&self) -> String {
        format!(
            "{} carries the lowest risk ({}/10, {} contingenc{})",
            self.buyer_name,
            self.risk_score,
            self.contingency_count,
            if self.contingency_count == 1 { "y" } else { "ies" }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetProceedsComparison {
    pub offer_id: OfferId,
    pub buyer_name: String,
    pub net_proceeds: f64,
    /// Absent when the listing has a single offer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_up: Option<RunnerUp>,
}

impl NetProceedsComparison {
    pub fn summary(&self) -> String {
        match &self.runner_up {
            Some(runner_up) => format!(
                "{} nets the most at ${:.0}, ${:.0} ahead of {}",
                self.buyer_name, self.net_proceeds, runner_up.delta, runner_up.buyer_name
            ),
            None => format!(
                "{} nets ${:.0}; no other offers to compare yet",
                self.buyer_name, self.net_proceeds
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunnerUp {
    pub offer_id: OfferId,
    pub buyer_name: String,
    pub net_proceeds: f64,
    pub delta: f64,
}

/// Rule-based openings for a counter-offer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NegotiationOpportunity {
    BelowAsking {
        offer_id: OfferId,
        buyer_name: String,
        gap: f64,
    },
    LongClosing {
        offer_id: OfferId,
        buyer_name: String,
        closing_timeline_days: u32,
    },
    HeavyContingencies {
        offer_id: OfferId,
        buyer_name: String,
        contingency_count: usize,
    },
}

impl NegotiationOpportunity {
    pub fn summary(&self) -> String {
        match self {
            NegotiationOpportunity::BelowAsking {
                buyer_name, gap, ..
            } => format!("{buyer_name} is ${gap:.0} below asking; counter toward list price"),
            NegotiationOpportunity::LongClosing {
                buyer_name,
                closing_timeline_days,
                ..
            } => format!(
                "{buyer_name} needs {closing_timeline_days} days to close; ask for a faster timeline"
            ),
            NegotiationOpportunity::HeavyContingencies {
                buyer_name,
                contingency_count,
                ..
            } => format!(
                "{buyer_name} has {contingency_count} contingencies; ask to waive some"
            ),
        }
    }
}

pub fn generate_insights(listing: &Listing, offers: &[Offer]) -> OfferInsights {
    let (Some(best), Some(safest), Some(richest)) = (
        leader_by(offers, |offer| offer.overall_score as f64),
        leader_by(offers, |offer| f64::from(offer.risk_score)),
        leader_by(offers, |offer| offer.net_proceeds),
    ) else {
        return OfferInsights::NoOffers;
    };

    let others: Vec<Offer> = offers
        .iter()
        .filter(|offer| offer.id != richest.id)
        .cloned()
        .collect();
    let runner_up = leader_by(&others, |offer| offer.net_proceeds).map(|second| RunnerUp {
        offer_id: second.id.clone(),
        buyer_name: second.buyer_name.clone(),
        net_proceeds: second.net_proceeds,
        delta: richest.net_proceeds - second.net_proceeds,
    });

    OfferInsights::Ready(InsightSummary {
        offer_count: offers.len(),
        recommendation: Recommendation {
            offer_id: best.id.clone(),
            buyer_name: best.buyer_name.clone(),
            overall_score: best.overall_score,
            display_score: display_score(best.overall_score),
        },
        risk_assessment: RiskAssessment {
            offer_id: safest.id.clone(),
            buyer_name: safest.buyer_name.clone(),
            risk_score: safest.risk_score,
            contingency_count: safest.contingency_count(),
        },
        net_proceeds_comparison: NetProceedsComparison {
            offer_id: richest.id.clone(),
            buyer_name: richest.buyer_name.clone(),
            net_proceeds: richest.net_proceeds,
            runner_up,
        },
        negotiation_opportunities: negotiation_opportunities(listing, offers),
    })
}

/// Max by `key`; ties go to the earliest `created_at`, then to the first one seen.
fn leader_by<F>(offers: &[Offer], key: F) -> Option<&Offer>
where
    F: Fn(&Offer) -> f64,
{
    offers.iter().fold(None, |leader: Option<&Offer>, offer| match leader {
        None => Some(offer),
        Some(current) => {
            let (candidate, incumbent) = (key(offer), key(current));
            let wins = candidate > incumbent
                || (candidate == incumbent && offer.created_at < current.created_at);
            Some(if wins { offer } else { current })
        }
    })
}

fn negotiation_opportunities(listing: &Listing, offers: &[Offer]) -> Vec<NegotiationOpportunity> {
    let mut opportunities = Vec::new();
    for offer in offers {
        if offer.price < listing.asking_price {
            opportunities.push(NegotiationOpportunity::BelowAsking {
                offer_id: offer.id.clone(),
                buyer_name: offer.buyer_name.clone(),
                gap: listing.asking_price - offer.price,
            });
        }
        if offer.closing_timeline_days > LONG_CLOSING_DAYS {
            opportunities.push(NegotiationOpportunity::LongClosing {
                offer_id: offer.id.clone(),
                buyer_name: offer.buyer_name.clone(),
                closing_timeline_days: offer.closing_timeline_days,
            });
        }
        if offer.contingency_count() >= HEAVY_CONTINGENCY_COUNT {
            opportunities.push(NegotiationOpportunity::HeavyContingencies {
                offer_id: offer.id.clone(),
                buyer_name: offer.buyer_name.clone(),
                contingency_count: offer.contingency_count(),
            });
        }
    }
    opportunities
}
