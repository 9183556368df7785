use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::body::to_bytes;
use axum::response::Response;
use serde_json::Value;

use crate::workflows::offers::domain::{
    BuyerType, Listing, ListingId, NewListing, Offer, OfferId, PriorityProfile, UsageEvent,
    UsageEventId, UsagePricing, UserId,
};
use crate::workflows::offers::normalizer::{RawNumber, RawOfferInput};
use crate::workflows::offers::repository::{
    BillingError, BillingGateway, ListingRepository, OfferRepository, RepositoryError,
    SequenceIds, UsageLedger,
};
use crate::workflows::offers::service::OfferDeskService;

pub(super) fn owner() -> UserId {
    UserId("agent-1".to_string())
}

pub(super) fn stranger() -> UserId {
    UserId("agent-2".to_string())
}

pub(super) fn new_listing() -> NewListing {
    NewListing {
        address: "1247 Oak Valley Dr".to_string(),
        city: "Austin".to_string(),
        state: "TX".to_string(),
        postal_code: "78704".to_string(),
        asking_price: 700_000.0,
        loan_balance: Some(200_000.0),
    }
}

/// The reference offer: $700k, 3% commission, one contingency, 30 days.
pub(super) fn reference_input() -> RawOfferInput {
    RawOfferInput {
        buyer_name: Some("Jordan Reyes".to_string()),
        buyer_type: Some(BuyerType::PreApproved),
        price: Some(RawNumber::from(700_000.0)),
        agent_commission: Some(RawNumber::from(3.0)),
        closing_timeline_days: Some(RawNumber::from(30.0)),
        contingencies: vec!["inspection".to_string()],
        notes: Some("Flexible on move-out".to_string()),
        ..RawOfferInput::default()
    }
}

pub(super) fn build_service() -> (
    OfferDeskService<MemoryStore, RecordingBilling>,
    Arc<MemoryStore>,
    Arc<RecordingBilling>,
) {
    build_service_with(RecordingBilling::default())
}

pub(super) fn build_service_with(
    billing: RecordingBilling,
) -> (
    OfferDeskService<MemoryStore, RecordingBilling>,
    Arc<MemoryStore>,
    Arc<RecordingBilling>,
) {
    let store = Arc::new(MemoryStore::default());
    let billing = Arc::new(billing);
    let service = OfferDeskService::new(
        store.clone(),
        billing.clone(),
        Arc::new(SequenceIds::default()),
        UsagePricing::default(),
    );
    (service, store, billing)
}

#[derive(Default)]
pub(super) struct MemoryStore {
    listings: Mutex<HashMap<ListingId, Listing>>,
    priorities: Mutex<HashMap<ListingId, PriorityProfile>>,
    offers: Mutex<Vec<Offer>>,
    pub(super) events: Mutex<Vec<UsageEvent>>,
}

impl MemoryStore {
    pub(super) fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().expect("ledger mutex poisoned").clone()
    }

    pub(super) fn forget_priorities(&self, id: &ListingId) {
        self.priorities
            .lock()
            .expect("priorities mutex poisoned")
            .remove(id);
    }
}

impl ListingRepository for MemoryStore {
    fn insert_listing(&self, listing: Listing) -> Result<Listing, RepositoryError> {
        let mut guard = self.listings.lock().expect("listing mutex poisoned");
        if guard.contains_key(&listing.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(listing.id.clone(), listing.clone());
        Ok(listing)
    }

    fn update_listing(&self, listing: Listing) -> Result<(), RepositoryError> {
        let mut guard = self.listings.lock().expect("listing mutex poisoned");
        guard.insert(listing.id.clone(), listing);
        Ok(())
    }

    fn fetch_listing(&self, id: &ListingId) -> Result<Option<Listing>, RepositoryError> {
        let guard = self.listings.lock().expect("listing mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn fetch_priorities(
        &self,
        id: &ListingId,
    ) -> Result<Option<PriorityProfile>, RepositoryError> {
        let guard = self.priorities.lock().expect("priorities mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn save_priorities(&self, profile: PriorityProfile) -> Result<(), RepositoryError> {
        let mut guard = self.priorities.lock().expect("priorities mutex poisoned");
        guard.insert(profile.listing_id.clone(), profile);
        Ok(())
    }
}

impl OfferRepository for MemoryStore {
    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError> {
        let mut guard = self.offers.lock().expect("offer mutex poisoned");
        if guard.iter().any(|existing| existing.id == offer.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(offer.clone());
        Ok(offer)
    }

    fn update_offer(&self, offer: Offer) -> Result<(), RepositoryError> {
        let mut guard = self.offers.lock().expect("offer mutex poisoned");
        let slot = guard
            .iter_mut()
            .find(|existing| existing.id == offer.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = offer;
        Ok(())
    }

    fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, RepositoryError> {
        let guard = self.offers.lock().expect("offer mutex poisoned");
        Ok(guard.iter().find(|offer| &offer.id == id).cloned())
    }

    fn offers_for_listing(&self, id: &ListingId) -> Result<Vec<Offer>, RepositoryError> {
        let guard = self.offers.lock().expect("offer mutex poisoned");
        Ok(guard
            .iter()
            .filter(|offer| &offer.listing_id == id)
            .cloned()
            .collect())
    }
}

impl UsageLedger for MemoryStore {
    fn record(&self, event: UsageEvent) -> Result<UsageEvent, RepositoryError> {
        self.events
            .lock()
            .expect("ledger mutex poisoned")
            .push(event.clone());
        Ok(event)
    }

    fn mark_processed(&self, id: &UsageEventId) -> Result<(), RepositoryError> {
        let mut guard = self.events.lock().expect("ledger mutex poisoned");
        let event = guard
            .iter_mut()
            .find(|event| &event.id == id)
            .ok_or(RepositoryError::NotFound)?;
        event.processed = true;
        Ok(())
    }

    fn unprocessed(&self, user: &UserId) -> Result<Vec<UsageEvent>, RepositoryError> {
        let guard = self.events.lock().expect("ledger mutex poisoned");
        Ok(guard
            .iter()
            .filter(|event| &event.user_id == user && !event.processed)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct RecordingBilling {
    pub(super) failing: bool,
    charges: Mutex<Vec<UsageEvent>>,
}

impl RecordingBilling {
    pub(super) fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub(super) fn charges(&self) -> Vec<UsageEvent> {
        self.charges.lock().expect("billing mutex poisoned").clone()
    }
}

impl BillingGateway for RecordingBilling {
    fn charge(&self, event: &UsageEvent) -> Result<(), BillingError> {
        if self.failing {
            return Err(BillingError::Transport("provider timed out".to_string()));
        }
        self.charges
            .lock()
            .expect("billing mutex poisoned")
            .push(event.clone());
        Ok(())
    }
}

pub(super) async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}
