use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{
    Listing, ListingId, ListingStatus, ListingUpdate, NewListing, Offer, OfferId, OfferSource,
    OfferStatus, PriorityPatch, PriorityProfile, UsageEvent, UsageEventType, UsagePricing, UserId,
};
use super::extraction::{fallback_payload, ExtractionFailure};
use super::normalizer::{normalize, FieldError, NormalizedOffer, RawOfferInput, ValidationError};
use super::repository::{BillingGateway, IdGenerator, OfferStore, RepositoryError};
use super::scoring::score_offer;
use super::versions::{
    self, create_counter, create_root, OfferDiff, OfferDraft, TermsPatch, VersionError,
};
use super::views::{compare_offers, OfferComparison};

/// Id carried by counters built for preview; never stored.
pub const PREVIEW_OFFER_ID: &str = "preview";

/// Orchestrates listings, offers, and usage billing on top of an [`OfferStore`].
///
/// Writes that touch one listing's offers run under that listing's lock, so two counters
/// can never claim the same version number. Billing happens after the lock is released and
/// never undoes a stored offer.
pub struct OfferDeskService<R, B> {
    repository: Arc<R>,
    billing: Arc<B>,
    ids: Arc<dyn IdGenerator>,
    pricing: UsagePricing,
    listing_locks: Mutex<HashMap<ListingId, Arc<Mutex<()>>>>,
}

/// A counter that has not been stored, with its diff against the parent.
#[derive(Debug, Clone, Serialize)]
pub struct CounterPreview {
    pub counter: Offer,
    pub diff: OfferDiff,
}

impl<R, B> OfferDeskService<R, B>
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    pub fn new(
        repository: Arc<R>,
        billing: Arc<B>,
        ids: Arc<dyn IdGenerator>,
        pricing: UsagePricing,
    ) -> Self {
        Self {
            repository,
            billing,
            ids,
            pricing,
            listing_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn pricing(&self) -> UsagePricing {
        self.pricing
    }

    /// Register a listing for `owner` together with its default priority profile.
    pub fn create_listing(
        &self,
        owner: &UserId,
        request: NewListing,
    ) -> Result<Listing, OfferDeskError> {
        let mut fields = Vec::new();
        if request.address.trim().is_empty() {
            fields.push(FieldError::new("address", "is required"));
        }
        if !request.asking_price.is_finite() || request.asking_price <= 0.0 {
            fields.push(FieldError::new("asking_price", "must be greater than zero"));
        }
        if let Some(error) = loan_balance_error(request.loan_balance) {
            fields.push(error);
        }
        if !fields.is_empty() {
            return Err(ValidationError { fields }.into());
        }

        let listing = Listing {
            id: self.ids.listing_id(),
            owner: owner.clone(),
            address: request.address.trim().to_string(),
            city: request.city,
            state: request.state,
            postal_code: request.postal_code,
            asking_price: request.asking_price,
            loan_balance: request.loan_balance,
            status: ListingStatus::Active,
            created_at: Utc::now(),
        };

        let stored = self.repository.insert_listing(listing)?;
        self.repository
            .save_priorities(PriorityProfile::new(stored.id.clone()))?;
        info!(
            listing_id = %stored.id,
            owner = %stored.owner,
            asking_price = stored.asking_price,
            "listing created"
        );
        Ok(stored)
    }

    pub fn listing(&self, user: &UserId, listing_id: &ListingId) -> Result<Listing, OfferDeskError> {
        self.owned_listing(user, listing_id)
    }

    /// Change status or loan balance. Stored offer snapshots keep the figures they were
    /// scored with.
    pub fn update_listing(
        &self,
        user: &UserId,
        listing_id: &ListingId,
        update: ListingUpdate,
    ) -> Result<Listing, OfferDeskError> {
        if let Some(error) = loan_balance_error(update.loan_balance) {
            return Err(ValidationError { fields: vec![error] }.into());
        }

        let mut listing = self.owned_listing(user, listing_id)?;
        if let Some(status) = update.status {
            listing.status = status;
        }
        if update.clear_loan_balance {
            listing.loan_balance = None;
        } else if update.loan_balance.is_some() {
            listing.loan_balance = update.loan_balance;
        }

        self.repository.update_listing(listing.clone())?;
        info!(
            listing_id = %listing.id,
            status = listing.status.label(),
            "listing updated"
        );
        Ok(listing)
    }

    /// Priority profile for a listing, created with default weights when missing.
    pub fn priorities(
        &self,
        user: &UserId,
        listing_id: &ListingId,
    ) -> Result<PriorityProfile, OfferDeskError> {
        let listing = self.owned_listing(user, listing_id)?;
        self.profile_for(&listing.id)
    }

    pub fn update_priorities(
        &self,
        user: &UserId,
        listing_id: &ListingId,
        patch: PriorityPatch,
    ) -> Result<PriorityProfile, OfferDeskError> {
        let listing = self.owned_listing(user, listing_id)?;
        let mut profile = self.profile_for(&listing.id)?;
        profile.apply(&patch)?;
        self.repository.save_priorities(profile.clone())?;
        debug!(listing_id = %listing.id, ?profile, "priorities updated");
        Ok(profile)
    }

    /// Manual entry of a new offer thread.
    pub fn submit_offer(
        &self,
        user: &UserId,
        listing_id: &ListingId,
        input: RawOfferInput,
    ) -> Result<Offer, OfferDeskError> {
        let listing = self.owned_listing(user, listing_id)?;
        let terms = normalize(&input)?;
        let offer = self.store_root(user, &listing, terms, OfferSource::Manual)?;
        self.bill(user, &offer.id, UsageEventType::OfferCreation);
        Ok(offer)
    }

    /// Store the result of document extraction. A failed or unusable extraction becomes a
    /// placeholder offer flagged for review instead of an error.
    pub fn submit_extracted(
        &self,
        user: &UserId,
        listing_id: &ListingId,
        extraction: Result<RawOfferInput, ExtractionFailure>,
    ) -> Result<Offer, OfferDeskError> {
        let listing = self.owned_listing(user, listing_id)?;

        let extracted = extraction.and_then(|payload| {
            normalize(&payload).map_err(|error| ExtractionFailure::new(error.to_string()))
        });
        let (terms, source) = match extracted {
            Ok(terms) => (terms, OfferSource::Extracted),
            Err(failure) => {
                warn!(
                    listing_id = %listing.id,
                    reason = %failure.reason,
                    "extraction failed; storing placeholder offer for review"
                );
                let terms = normalize(&fallback_payload(&listing, &failure.reason))?;
                (terms, OfferSource::ExtractionFallback)
            }
        };

        let offer = self.store_root(user, &listing, terms, source)?;
        self.bill(user, &offer.id, UsageEventType::OfferCreation);
        if source == OfferSource::Extracted {
            self.bill(user, &offer.id, UsageEventType::DocumentExtraction);
        }
        Ok(offer)
    }

    /// Append a counter after the latest version of a thread.
    pub fn counter_offer(
        &self,
        user: &UserId,
        offer_id: &OfferId,
        patch: TermsPatch,
    ) -> Result<Offer, OfferDeskError> {
        let (listing, _) = self.owned_offer(user, offer_id)?;
        let counter = {
            let lock = self.listing_lock(&listing.id);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

            let id = self.ids.offer_id();
            let counter = self.build_counter(user, &listing, offer_id, &patch, id)?.counter;
            self.repository.insert_offer(counter)?
        };

        info!(
            listing_id = %listing.id,
            offer_id = %counter.id,
            parent_offer_id = %offer_id,
            version = counter.version_number,
            price = counter.price,
            "counter-offer recorded"
        );
        self.bill(user, &counter.id, UsageEventType::OfferCreation);
        Ok(counter)
    }

    /// Build the counter a patch would produce without storing or billing it.
    pub fn preview_counter(
        &self,
        user: &UserId,
        offer_id: &OfferId,
        patch: TermsPatch,
    ) -> Result<CounterPreview, OfferDeskError> {
        let (listing, _) = self.owned_offer(user, offer_id)?;
        let id = OfferId(PREVIEW_OFFER_ID.to_string());
        self.build_counter(user, &listing, offer_id, &patch, id)
    }

    /// Edit a pending offer in place. Offers that were already countered are frozen.
    pub fn revise_offer(
        &self,
        user: &UserId,
        offer_id: &OfferId,
        patch: TermsPatch,
    ) -> Result<Offer, OfferDeskError> {
        let (listing, _) = self.owned_offer(user, offer_id)?;
        let lock = self.listing_lock(&listing.id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let offers = self.repository.offers_for_listing(&listing.id)?;
        let current = find(&offers, offer_id)?;
        if current.status != OfferStatus::Pending {
            return Err(OfferDeskError::Frozen(offer_id.clone()));
        }
        ensure_not_countered(&offers, offer_id)?;

        let terms = patch.apply_to(&NormalizedOffer::from(current))?;
        let scorecard = score_offer(&terms, listing.loan_balance);
        let revised = Offer {
            buyer_name: terms.buyer_name,
            buyer_type: terms.buyer_type,
            price: terms.price,
            commission: terms.commission,
            commission_percent: terms.commission_percent,
            closing_timeline_days: terms.closing_timeline_days,
            contingencies: terms.contingencies,
            notes: terms.notes,
            net_proceeds: scorecard.net_proceeds,
            risk_score: scorecard.risk_score,
            overall_score: scorecard.overall_score,
            needs_review: current.needs_review && !patch.supplies_guessed_terms(),
            ..current.clone()
        };

        self.repository.update_offer(revised.clone())?;
        info!(
            offer_id = %revised.id,
            price = revised.price,
            needs_review = revised.needs_review,
            "offer revised"
        );
        Ok(revised)
    }

    pub fn set_offer_status(
        &self,
        user: &UserId,
        offer_id: &OfferId,
        status: OfferStatus,
    ) -> Result<Offer, OfferDeskError> {
        let (listing, _) = self.owned_offer(user, offer_id)?;
        let lock = self.listing_lock(&listing.id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let offers = self.repository.offers_for_listing(&listing.id)?;
        let mut offer = find(&offers, offer_id)?.clone();
        if !offer.status.can_transition_to(status) {
            return Err(OfferDeskError::InvalidStatusTransition {
                from: offer.status,
                to: status,
            });
        }
        ensure_not_countered(&offers, offer_id)?;

        offer.status = status;
        self.repository.update_offer(offer.clone())?;
        info!(
            offer_id = %offer.id,
            status = offer.status.label(),
            "offer status changed"
        );
        Ok(offer)
    }

    pub fn offer(&self, user: &UserId, offer_id: &OfferId) -> Result<Offer, OfferDeskError> {
        let (_, offer) = self.owned_offer(user, offer_id)?;
        Ok(offer)
    }

    /// Whole negotiation thread containing `offer_id`, ascending by version.
    pub fn history(&self, user: &UserId, offer_id: &OfferId) -> Result<Vec<Offer>, OfferDeskError> {
        let (listing, _) = self.owned_offer(user, offer_id)?;
        let offers = self.repository.offers_for_listing(&listing.id)?;
        Ok(versions::history(&offers, offer_id)?)
    }

    pub fn diff(
        &self,
        user: &UserId,
        from: &OfferId,
        to: &OfferId,
    ) -> Result<OfferDiff, OfferDeskError> {
        let (listing, _) = self.owned_offer(user, from)?;
        let offers = self.repository.offers_for_listing(&listing.id)?;
        Ok(versions::diff_in_thread(&offers, from, to)?)
    }

    /// Ranked views of the live offers plus insights, weighted by the listing's priorities.
    pub fn compare(
        &self,
        user: &UserId,
        listing_id: &ListingId,
    ) -> Result<OfferComparison, OfferDeskError> {
        let listing = self.owned_listing(user, listing_id)?;
        let priorities = self.profile_for(&listing.id)?;
        let offers = self.repository.offers_for_listing(&listing.id)?;
        let comparison = compare_offers(&listing, &priorities, &offers);
        debug!(
            listing_id = %listing.id,
            ranked = comparison.offers.len(),
            "comparison built"
        );
        Ok(comparison)
    }

    /// Usage events still waiting for the billing provider.
    pub fn unbilled_usage(&self, user: &UserId) -> Result<Vec<UsageEvent>, OfferDeskError> {
        Ok(self.repository.unprocessed(user)?)
    }

    fn store_root(
        &self,
        user: &UserId,
        listing: &Listing,
        terms: NormalizedOffer,
        source: OfferSource,
    ) -> Result<Offer, OfferDeskError> {
        let scorecard = score_offer(&terms, listing.loan_balance);
        debug!(
            listing_id = %listing.id,
            net_proceeds = scorecard.net_proceeds,
            risk_score = scorecard.risk_score,
            overall_score = scorecard.overall_score,
            "offer scored"
        );

        let offer = create_root(
            listing.id.clone(),
            OfferDraft {
                id: self.ids.offer_id(),
                submitted_by: user.clone(),
                terms,
                scorecard,
                source,
                created_at: Utc::now(),
            },
        );

        let stored = {
            let lock = self.listing_lock(&listing.id);
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.repository.insert_offer(offer)?
        };
        info!(
            listing_id = %listing.id,
            offer_id = %stored.id,
            buyer = %stored.buyer_name,
            price = stored.price,
            needs_review = stored.needs_review,
            "offer recorded"
        );
        Ok(stored)
    }

    fn build_counter(
        &self,
        user: &UserId,
        listing: &Listing,
        parent_id: &OfferId,
        patch: &TermsPatch,
        id: OfferId,
    ) -> Result<CounterPreview, OfferDeskError> {
        let offers = self.repository.offers_for_listing(&listing.id)?;
        let parent = find(&offers, parent_id)?;
        versions::ensure_latest(&offers, parent_id)?;
        if parent.status != OfferStatus::Pending {
            return Err(OfferDeskError::Frozen(parent_id.clone()));
        }

        let terms = patch.apply_to(&NormalizedOffer::from(parent))?;
        let scorecard = score_offer(&terms, listing.loan_balance);
        // Placeholder terms stay flagged until the agent restates them.
        let source = if parent.needs_review && !patch.supplies_guessed_terms() {
            OfferSource::ExtractionFallback
        } else {
            OfferSource::Manual
        };
        let counter = create_counter(
            parent,
            OfferDraft {
                id,
                submitted_by: user.clone(),
                terms,
                scorecard,
                source,
                created_at: Utc::now(),
            },
        );
        let diff = versions::diff(parent, &counter);
        Ok(CounterPreview { counter, diff })
    }

    /// Record the usage event, then charge it. Failures are logged and leave the event
    /// unprocessed for reconciliation.
    fn bill(&self, user: &UserId, offer_id: &OfferId, event_type: UsageEventType) {
        let event = UsageEvent {
            id: self.ids.usage_event_id(),
            user_id: user.clone(),
            event_type,
            amount_cents: self.pricing.amount_for(event_type),
            offer_id: Some(offer_id.clone()),
            processed: false,
            created_at: Utc::now(),
        };

        let event = match self.repository.record(event) {
            Ok(event) => event,
            Err(error) => {
                warn!(
                    %offer_id,
                    event = event_type.label(),
                    %error,
                    "usage event could not be recorded"
                );
                return;
            }
        };

        match self.billing.charge(&event) {
            Ok(()) => {
                if let Err(error) = self.repository.mark_processed(&event.id) {
                    warn!(usage_event_id = %event.id, %error, "charged usage event not marked processed");
                }
            }
            Err(error) => {
                warn!(
                    usage_event_id = %event.id,
                    %offer_id,
                    event = event_type.label(),
                    amount_cents = event.amount_cents,
                    %error,
                    "billing failed; usage event left for reconciliation"
                );
            }
        }
    }

    fn owned_listing(&self, user: &UserId, listing_id: &ListingId) -> Result<Listing, OfferDeskError> {
        let listing = self
            .repository
            .fetch_listing(listing_id)?
            .ok_or_else(|| OfferDeskError::not_found("listing", listing_id))?;
        if &listing.owner != user {
            return Err(OfferDeskError::Forbidden(listing_id.clone()));
        }
        Ok(listing)
    }

    fn owned_offer(&self, user: &UserId, offer_id: &OfferId) -> Result<(Listing, Offer), OfferDeskError> {
        let offer = self
            .repository
            .fetch_offer(offer_id)?
            .ok_or_else(|| OfferDeskError::not_found("offer", offer_id))?;
        let listing = self.owned_listing(user, &offer.listing_id)?;
        Ok((listing, offer))
    }

    fn profile_for(&self, listing_id: &ListingId) -> Result<PriorityProfile, OfferDeskError> {
        if let Some(profile) = self.repository.fetch_priorities(listing_id)? {
            return Ok(profile);
        }
        let profile = PriorityProfile::new(listing_id.clone());
        self.repository.save_priorities(profile.clone())?;
        debug!(%listing_id, "default priorities created");
        Ok(profile)
    }

    fn listing_lock(&self, listing_id: &ListingId) -> Arc<Mutex<()>> {
        let mut locks = self
            .listing_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(listing_id.clone()).or_default())
    }
}

fn find<'a>(offers: &'a [Offer], offer_id: &OfferId) -> Result<&'a Offer, OfferDeskError> {
    offers
        .iter()
        .find(|offer| &offer.id == offer_id)
        .ok_or_else(|| OfferDeskError::not_found("offer", offer_id))
}

/// A version that has a counter is frozen for every write.
fn ensure_not_countered(offers: &[Offer], offer_id: &OfferId) -> Result<(), OfferDeskError> {
    match versions::ensure_latest(offers, offer_id) {
        Err(VersionError::Superseded { .. }) => Err(OfferDeskError::Frozen(offer_id.clone())),
        other => Ok(other?),
    }
}

fn loan_balance_error(loan_balance: Option<f64>) -> Option<FieldError> {
    match loan_balance {
        Some(balance) if !balance.is_finite() || balance < 0.0 => Some(FieldError::new(
            "loan_balance",
            "must be a non-negative amount",
        )),
        _ => None,
    }
}

/// Error raised by the offer desk service.
#[derive(Debug, thiserror::Error)]
pub enum OfferDeskError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("listing {0} belongs to another user")]
    Forbidden(ListingId),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Version(VersionError),
    #[error("offer {0} is frozen and can no longer change")]
    Frozen(OfferId),
    #[error("cannot move offer from {} to {}", .from.label(), .to.label())]
    InvalidStatusTransition { from: OfferStatus, to: OfferStatus },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl OfferDeskError {
    fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<VersionError> for OfferDeskError {
    fn from(error: VersionError) -> Self {
        match error {
            VersionError::UnknownOffer(id) => Self::not_found("offer", id),
            other => Self::Version(other),
        }
    }
}
