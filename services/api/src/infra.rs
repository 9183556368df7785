use metrics_exporter_prometheus::PrometheusHandle;
use offer_desk::config::OfferDeskConfig;
use offer_desk::workflows::offers::{
    BillingError, BillingGateway, IdGenerator, Listing, ListingId, ListingRepository, Offer,
    OfferDeskService, OfferId, OfferRepository, PriorityProfile, RepositoryError, UsageEvent,
    UsageEventId, UsageLedger, UserId,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::info;

pub(crate) type AppOfferService = OfferDeskService<InMemoryOfferStore, LoggingBillingGateway>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) fn offer_service(
    config: &OfferDeskConfig,
    store: Arc<InMemoryOfferStore>,
) -> Arc<AppOfferService> {
    let ids: Arc<dyn IdGenerator> = Arc::from(config.id_strategy.generator());
    Arc::new(OfferDeskService::new(
        store,
        Arc::new(LoggingBillingGateway),
        ids,
        config.pricing,
    ))
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("in-memory store poisoned".to_string()))
}

/// Process-local store for the demo and single-instance deployments.
#[derive(Default)]
pub(crate) struct InMemoryOfferStore {
    listings: Mutex<HashMap<ListingId, Listing>>,
    priorities: Mutex<HashMap<ListingId, PriorityProfile>>,
    offers: Mutex<Vec<Offer>>,
    usage: Mutex<Vec<UsageEvent>>,
}

impl InMemoryOfferStore {
    pub(crate) fn usage(&self) -> Result<Vec<UsageEvent>, RepositoryError> {
        Ok(lock(&self.usage)?.clone())
    }
}

impl ListingRepository for InMemoryOfferStore {
    fn insert_listing(&self, listing: Listing) -> Result<Listing, RepositoryError> {
        let mut guard = lock(&self.listings)?;
        if guard.contains_key(&listing.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(listing.id.clone(), listing.clone());
        Ok(listing)
    }

    fn update_listing(&self, listing: Listing) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.listings)?;
        if guard.contains_key(&listing.id) {
            guard.insert(listing.id.clone(), listing);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch_listing(&self, id: &ListingId) -> Result<Option<Listing>, RepositoryError> {
        Ok(lock(&self.listings)?.get(id).cloned())
    }

    fn fetch_priorities(
        &self,
        id: &ListingId,
    ) -> Result<Option<PriorityProfile>, RepositoryError> {
        Ok(lock(&self.priorities)?.get(id).cloned())
    }

    fn save_priorities(&self, profile: PriorityProfile) -> Result<(), RepositoryError> {
        lock(&self.priorities)?.insert(profile.listing_id.clone(), profile);
        Ok(())
    }
}

impl OfferRepository for InMemoryOfferStore {
    fn insert_offer(&self, offer: Offer) -> Result<Offer, RepositoryError> {
        let mut guard = lock(&self.offers)?;
        if guard.iter().any(|existing| existing.id == offer.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(offer.clone());
        Ok(offer)
    }

    fn update_offer(&self, offer: Offer) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.offers)?;
        let slot = guard
            .iter_mut()
            .find(|existing| existing.id == offer.id)
            .ok_or(RepositoryError::NotFound)?;
        *slot = offer;
        Ok(())
    }

    fn fetch_offer(&self, id: &OfferId) -> Result<Option<Offer>, RepositoryError> {
        Ok(lock(&self.offers)?.iter().find(|offer| &offer.id == id).cloned())
    }

    fn offers_for_listing(&self, id: &ListingId) -> Result<Vec<Offer>, RepositoryError> {
        Ok(lock(&self.offers)?
            .iter()
            .filter(|offer| &offer.listing_id == id)
            .cloned()
            .collect())
    }
}

impl UsageLedger for InMemoryOfferStore {
    fn record(&self, event: UsageEvent) -> Result<UsageEvent, RepositoryError> {
        lock(&self.usage)?.push(event.clone());
        Ok(event)
    }

    fn mark_processed(&self, id: &UsageEventId) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.usage)?;
        let event = guard
            .iter_mut()
            .find(|event| &event.id == id)
            .ok_or(RepositoryError::NotFound)?;
        event.processed = true;
        Ok(())
    }

    fn unprocessed(&self, user: &UserId) -> Result<Vec<UsageEvent>, RepositoryError> {
        Ok(lock(&self.usage)?
            .iter()
            .filter(|event| &event.user_id == user && !event.processed)
            .cloned()
            .collect())
    }
}

/// Stand-in for the metered billing provider: logs each charge and accepts it.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LoggingBillingGateway;

impl BillingGateway for LoggingBillingGateway {
    fn charge(&self, event: &UsageEvent) -> Result<(), BillingError> {
        info!(
            usage_event_id = %event.id,
            user_id = %event.user_id,
            event = event.event_type.label(),
            amount_cents = event.amount_cents,
            "usage charged"
        );
        Ok(())
    }
}
