use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::normalizer::{FieldError, ValidationError};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifier wrapper for listings.
    ListingId
);
string_id!(
    /// Identifier wrapper for offers and counter-offers.
    OfferId
);
string_id!(
    /// Identifier of the authenticated caller; resolved outside the engine.
    UserId
);
string_id!(
    /// Identifier wrapper for billing ledger entries.
    UsageEventId
);

/// Soft lifecycle of a listing. Listings are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Active,
    Pending,
    Sold,
}

impl ListingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Pending => "pending",
            ListingStatus::Sold => "sold",
        }
    }
}

/// A property for sale, owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub owner: UserId,
    pub address: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub asking_price: f64,
    pub loan_balance: Option<f64>,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when an owner registers a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    pub asking_price: f64,
    #[serde(default)]
    pub loan_balance: Option<f64>,
}

/// Owner-editable listing fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListingUpdate {
    #[serde(default)]
    pub status: Option<ListingStatus>,
    #[serde(default)]
    pub loan_balance: Option<f64>,
    #[serde(default)]
    pub clear_loan_balance: bool,
}

pub const MIN_PRIORITY_WEIGHT: u8 = 1;
pub const MAX_PRIORITY_WEIGHT: u8 = 10;
pub const DEFAULT_PRIORITY_WEIGHT: u8 = 5;

/// The five sliders a seller uses to bias the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityFactor {
    Price,
    NetProceeds,
    ClosingSpeed,
    ContingencyRisk,
    BuyerQualification,
}

impl PriorityFactor {
    pub const fn label(self) -> &'static str {
        match self {
            PriorityFactor::Price => "price",
            PriorityFactor::NetProceeds => "net_proceeds",
            PriorityFactor::ClosingSpeed => "closing_speed",
            PriorityFactor::ContingencyRisk => "contingency_risk",
            PriorityFactor::BuyerQualification => "buyer_qualification",
        }
    }
}

/// Per-listing weights, each in `[1, 10]`.
///
/// Ranking reads only `price`, `closing_speed` and `contingency_risk` (see
/// [`ScoreWeights::from_profile`](super::scoring::ScoreWeights::from_profile)).
/// `net_proceeds` and `buyer_qualification` are stored for the seller's record and do not
/// change the order of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityProfile {
    pub listing_id: ListingId,
    pub price: u8,
    pub net_proceeds: u8,
    pub closing_speed: u8,
    pub contingency_risk: u8,
    pub buyer_qualification: u8,
}

impl PriorityProfile {
    pub fn new(listing_id: ListingId) -> Self {
        Self {
            listing_id,
            price: DEFAULT_PRIORITY_WEIGHT,
            net_proceeds: DEFAULT_PRIORITY_WEIGHT,
            closing_speed: DEFAULT_PRIORITY_WEIGHT,
            contingency_risk: DEFAULT_PRIORITY_WEIGHT,
            buyer_qualification: DEFAULT_PRIORITY_WEIGHT,
        }
    }

    pub fn weight(&self, factor: PriorityFactor) -> u8 {
        match factor {
            PriorityFactor::Price => self.price,
            PriorityFactor::NetProceeds => self.net_proceeds,
            PriorityFactor::ClosingSpeed => self.closing_speed,
            PriorityFactor::ContingencyRisk => self.contingency_risk,
            PriorityFactor::BuyerQualification => self.buyer_qualification,
        }
    }

    /// Apply a partial update. Nothing is written unless every supplied weight is valid.
    pub fn apply(&mut self, patch: &PriorityPatch) -> Result<(), ValidationError> {
        let entries = [
            (PriorityFactor::Price, patch.price),
            (PriorityFactor::NetProceeds, patch.net_proceeds),
            (PriorityFactor::ClosingSpeed, patch.closing_speed),
            (PriorityFactor::ContingencyRisk, patch.contingency_risk),
            (PriorityFactor::BuyerQualification, patch.buyer_qualification),
        ];

        let fields: Vec<FieldError> = entries
            .iter()
            .filter_map(|(factor, value)| match value {
                Some(weight) if !(MIN_PRIORITY_WEIGHT..=MAX_PRIORITY_WEIGHT).contains(weight) => {
                    Some(FieldError::new(
                        factor.label(),
                        format!(
                            "weight {weight} outside {MIN_PRIORITY_WEIGHT}..={MAX_PRIORITY_WEIGHT}"
                        ),
                    ))
                }
                _ => None,
            })
            .collect();
        if !fields.is_empty() {
            return Err(ValidationError { fields });
        }

        for (factor, value) in entries {
            let Some(weight) = value else { continue };
            let slot = match factor {
                PriorityFactor::Price => &mut self.price,
                PriorityFactor::NetProceeds => &mut self.net_proceeds,
                PriorityFactor::ClosingSpeed => &mut self.closing_speed,
                PriorityFactor::ContingencyRisk => &mut self.contingency_risk,
                PriorityFactor::BuyerQualification => &mut self.buyer_qualification,
            };
            *slot = weight;
        }
        Ok(())
    }
}

/// Partial patch for [`PriorityProfile`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityPatch {
    #[serde(default)]
    pub price: Option<u8>,
    #[serde(default)]
    pub net_proceeds: Option<u8>,
    #[serde(default)]
    pub closing_speed: Option<u8>,
    #[serde(default)]
    pub contingency_risk: Option<u8>,
    #[serde(default)]
    pub buyer_qualification: Option<u8>,
}

/// Buyer classification captured on the offer form or by extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuyerType {
    #[serde(alias = "first-time")]
    FirstTime,
    Cash,
    #[serde(alias = "pre-approved")]
    PreApproved,
    Investor,
    Other,
}

impl BuyerType {
    pub const fn label(self) -> &'static str {
        match self {
            BuyerType::FirstTime => "First-time buyer",
            BuyerType::Cash => "Cash buyer",
            BuyerType::PreApproved => "Pre-approved",
            BuyerType::Investor => "Investor",
            BuyerType::Other => "Other",
        }
    }
}

/// Offer status. Offers are never deleted; cancellation is a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl OfferStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Cancelled => "cancelled",
        }
    }

    /// Only pending offers move; every other status is terminal.
    pub const fn can_transition_to(self, next: OfferStatus) -> bool {
        matches!(
            (self, next),
            (
                OfferStatus::Pending,
                OfferStatus::Accepted | OfferStatus::Rejected | OfferStatus::Cancelled
            )
        )
    }
}

/// Where the offer terms came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferSource {
    Manual,
    Extracted,
    /// Placeholder written when extraction failed; always flagged for review.
    ExtractionFallback,
}

/// A stored offer snapshot. Computed metrics are frozen at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub listing_id: ListingId,
    pub submitted_by: UserId,
    pub buyer_name: String,
    pub buyer_type: BuyerType,
    pub price: f64,
    /// Commission resolved to dollars.
    pub commission: f64,
    /// The percentage the commission was given as, when it was one.
    pub commission_percent: Option<f64>,
    pub closing_timeline_days: u32,
    pub contingencies: Vec<String>,
    pub net_proceeds: f64,
    pub risk_score: u8,
    pub overall_score: i64,
    pub notes: String,
    pub status: OfferStatus,
    pub source: OfferSource,
    pub needs_review: bool,
    pub parent_offer_id: Option<OfferId>,
    pub version_number: u32,
    pub is_counter_offer: bool,
    pub created_at: DateTime<Utc>,
}

impl Offer {
    pub fn is_root(&self) -> bool {
        self.parent_offer_id.is_none()
    }

    pub fn contingency_count(&self) -> usize {
        self.contingencies.len()
    }
}

/// Billable actions recorded in the usage ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageEventType {
    OfferCreation,
    DocumentExtraction,
}

impl UsageEventType {
    pub const fn label(self) -> &'static str {
        match self {
            UsageEventType::OfferCreation => "offer_creation",
            UsageEventType::DocumentExtraction => "document_extraction",
        }
    }
}

/// Append-only ledger entry; only `processed` changes after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub id: UsageEventId,
    pub user_id: UserId,
    pub event_type: UsageEventType,
    pub amount_cents: u32,
    pub offer_id: Option<OfferId>,
    pub processed: bool,
    pub created_at: DateTime<Utc>,
}

/// Fixed charge per billable action, in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsagePricing {
    pub offer_creation_cents: u32,
    pub document_extraction_cents: u32,
}

impl UsagePricing {
    pub const fn amount_for(&self, event_type: UsageEventType) -> u32 {
        match event_type {
            UsageEventType::OfferCreation => self.offer_creation_cents,
            UsageEventType::DocumentExtraction => self.document_extraction_cents,
        }
    }
}

impl Default for UsagePricing {
    fn default() -> Self {
        Self {
            offer_creation_cents: 50,
            document_extraction_cents: 200,
        }
    }
}
