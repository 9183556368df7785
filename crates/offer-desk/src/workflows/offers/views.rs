use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{
    BuyerType, Listing, ListingId, Offer, OfferId, OfferSource, OfferStatus, PriorityProfile,
};
use super::insights::{generate_insights, OfferInsights};
use super::scoring::{display_score, score_components, weighted_score, ScoreComponent, ScoreWeights};
use super::versions::ThreadIndex;

/// Presentation-ready offer snapshot with labels and the read-time weighted score.
#[derive(Debug, Clone, Serialize)]
pub struct OfferView {
    pub offer_id: OfferId,
    pub listing_id: ListingId,
    pub buyer_name: String,
    pub buyer_type: BuyerType,
    pub buyer_type_label: &'static str,
    pub price: f64,
    pub commission: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission_percent: Option<f64>,
    pub closing_timeline_days: u32,
    pub contingencies: Vec<String>,
    pub net_proceeds: f64,
    pub risk_score: u8,
    pub overall_score: i64,
    pub display_score: u8,
    pub weighted_score: f64,
    pub score_breakdown: Vec<ScoreComponent>,
    pub notes: String,
    pub status: OfferStatus,
    pub status_label: &'static str,
    pub source: OfferSource,
    pub needs_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_offer_id: Option<OfferId>,
    pub version_number: u32,
    pub is_counter_offer: bool,
    pub created_at: DateTime<Utc>,
}

impl OfferView {
    pub fn new(offer: &Offer, weights: &ScoreWeights) -> Self {
        Self {
            offer_id: offer.id.clone(),
            listing_id: offer.listing_id.clone(),
            buyer_name: offer.buyer_name.clone(),
            buyer_type: offer.buyer_type,
            buyer_type_label: offer.buyer_type.label(),
            price: offer.price,
            commission: offer.commission,
            commission_percent: offer.commission_percent,
            closing_timeline_days: offer.closing_timeline_days,
            contingencies: offer.contingencies.clone(),
            net_proceeds: offer.net_proceeds,
            risk_score: offer.risk_score,
            overall_score: offer.overall_score,
            display_score: display_score(offer.overall_score),
            weighted_score: weighted_score(
                offer.price,
                offer.risk_score,
                offer.closing_timeline_days,
                weights,
            ),
            score_breakdown: score_components(
                offer.price,
                offer.risk_score,
                offer.closing_timeline_days,
            ),
            notes: offer.notes.clone(),
            status: offer.status,
            status_label: offer.status.label(),
            source: offer.source,
            needs_review: offer.needs_review,
            parent_offer_id: offer.parent_offer_id.clone(),
            version_number: offer.version_number,
            is_counter_offer: offer.is_counter_offer,
            created_at: offer.created_at,
        }
    }

    /// Standalone view scored with even weights.
    pub fn unweighted(offer: &Offer) -> Self {
        Self::new(offer, &ScoreWeights::even())
    }
}

/// Ranked comparison of the live offers on a listing.
#[derive(Debug, Clone, Serialize)]
pub struct OfferComparison {
    pub listing_id: ListingId,
    pub asking_price: f64,
    pub priorities: PriorityProfile,
    pub offers: Vec<OfferView>,
    pub insights: OfferInsights,
}

/// Latest version of each thread that is still in play.
pub fn live_offers(offers: &[Offer]) -> Vec<Offer> {
    ThreadIndex::new(offers)
        .heads()
        .into_iter()
        .filter(|offer| !matches!(offer.status, OfferStatus::Cancelled | OfferStatus::Rejected))
        .cloned()
        .collect()
}

/// Rank by weighted score, then raw overall score, then submission time.
pub fn compare_offers(
    listing: &Listing,
    priorities: &PriorityProfile,
    offers: &[Offer],
) -> OfferComparison {
    let live = live_offers(offers);
    let weights = ScoreWeights::from_profile(priorities);

    let mut views: Vec<OfferView> = live
        .iter()
        .map(|offer| OfferView::new(offer, &weights))
        .collect();
    views.sort_by(|a, b| {
        b.weighted_score
            .total_cmp(&a.weighted_score)
            .then_with(|| b.overall_score.cmp(&a.overall_score))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    OfferComparison {
        listing_id: listing.id.clone(),
        asking_price: listing.asking_price,
        priorities: priorities.clone(),
        offers: views,
        insights: generate_insights(listing, &live),
    }
}
