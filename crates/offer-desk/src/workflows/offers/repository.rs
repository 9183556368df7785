use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::domain::{
    Listing, ListingId, Offer, OfferId, PriorityProfile, UsageEvent, UsageEventId, UserId,
};

/// Listing and priority storage so the service can be exercised in isolation.
pub trait ListingRepository: Send + Sync {
    fn insert_listing(&self, listing: Listing) -> Result<Listing, RepositoryError>;
    fn update_listing(&self, listing: Listing) -> Result<(), RepositoryError>;
    fn fetch_listing(&self, id: &ListingId) -> Result<Option<Listing>, RepositoryError>;
    fn fetch_priorities(&self, id: &ListingId)
        -> Result<Option<PriorityProfile>, RepositoryError>;
    fn save_priorities(&self, profile: PriorityProfile) -> Result<(), RepositoryError>;
}

/// Flat offer table. Threads are reconstructed from parent pointers, never stored.
pub trait OfferRepository: Send + Sync {
    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError>;
    fn update_offer(&self, offer: Offer) -> Result<(), RepositoryError>;
    fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, RepositoryError>;
    fn offers_for_listing(&self, id: &ListingId) -> Result<Vec<Offer>, RepositoryError>;
}

/// Append-only billing ledger.
pub trait UsageLedger: Send + Sync {
    fn record(&self, event: UsageEvent) -> Result<UsageEvent, RepositoryError>;
    fn mark_processed(&self, id: &UsageEventId) -> Result<(), RepositoryError>;
    fn unprocessed(&self, user: &UserId) -> Result<Vec<UsageEvent>, RepositoryError>;
}

/// Everything the offer desk persists, usually one backing store.
pub trait OfferStore: ListingRepository + OfferRepository + UsageLedger {}

impl<T> OfferStore for T where T: ListingRepository + OfferRepository + UsageLedger {}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound usage billing (metered subscription provider or similar).
pub trait BillingGateway: Send + Sync {
    fn charge(&self, event: &UsageEvent) -> Result<(), BillingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("billing provider unavailable: {0}")]
    Transport(String),
    #[error("charge rejected: {0}")]
    Rejected(String),
}

/// Identifier source for offers and ledger entries.
pub trait IdGenerator: Send + Sync {
    fn offer_id(&self) -> OfferId;
    fn listing_id(&self) -> ListingId;
    fn usage_event_id(&self) -> UsageEventId;
}

/// Which [`IdGenerator`] a deployment runs with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    #[default]
    Sequence,
    Uuid,
}

impl IdStrategy {
    pub const fn label(self) -> &'static str {
        match self {
            IdStrategy::Sequence => "sequence",
            IdStrategy::Uuid => "uuid",
        }
    }

    pub fn generator(self) -> Box<dyn IdGenerator> {
        match self {
            IdStrategy::Sequence => Box::new(SequenceIds::default()),
            IdStrategy::Uuid => Box::new(UuidIds),
        }
    }
}

/// Readable, monotonically numbered ids (`offer-000001`). Each instance counts on its own.
#[derive(Debug)]
pub struct SequenceIds {
    listings: AtomicU64,
    offers: AtomicU64,
    events: AtomicU64,
}

impl Default for SequenceIds {
    fn default() -> Self {
        Self {
            listings: AtomicU64::new(1),
            offers: AtomicU64::new(1),
            events: AtomicU64::new(1),
        }
    }
}

fn next(counter: &AtomicU64, prefix: &str) -> String {
    let id = counter.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

impl IdGenerator for SequenceIds {
    fn offer_id(&self) -> OfferId {
        OfferId(next(&self.offers, "offer"))
    }

    fn listing_id(&self) -> ListingId {
        ListingId(next(&self.listings, "listing"))
    }

    fn usage_event_id(&self) -> UsageEventId {
        UsageEventId(next(&self.events, "usage"))
    }
}

/// Random v4 UUIDs for multi-instance deployments.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn offer_id(&self) -> OfferId {
        OfferId(Uuid::new_v4().to_string())
    }

    fn listing_id(&self) -> ListingId {
        ListingId(Uuid::new_v4().to_string())
    }

    fn usage_event_id(&self) -> UsageEventId {
        UsageEventId(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_ids_are_padded_and_independent_per_kind() {
        let ids = SequenceIds::default();
        assert_eq!(ids.offer_id(), OfferId("offer-000001".to_string()));
        assert_eq!(ids.offer_id(), OfferId("offer-000002".to_string()));
        assert_eq!(ids.listing_id(), ListingId("listing-000001".to_string()));
        assert_eq!(ids.usage_event_id(), UsageEventId("usage-000001".to_string()));
    }

    #[test]
    fn uuid_ids_parse_back() {
        let id = UuidIds.offer_id();
        assert!(Uuid::parse_str(&id.0).is_ok());
        assert_ne!(UuidIds.offer_id(), id);
    }

    #[test]
    fn strategy_builds_matching_generator() {
        let generator = IdStrategy::Sequence.generator();
        assert_eq!(generator.offer_id().0, "offer-000001");
        assert_eq!(IdStrategy::Uuid.label(), "uuid");
        assert_eq!(IdStrategy::default(), IdStrategy::Sequence);
    }
}
