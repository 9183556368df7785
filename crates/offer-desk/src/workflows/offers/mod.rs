//! Offer intake, scoring, counter-offer threads, and listing comparisons.
//!
//! Everything below [`service`] is pure and synchronous: the normalizer, the scoring
//! pipeline, the version graph, and the insight generator take plain values and return
//! plain values. The service adds storage, per-listing write serialization, and usage
//! billing on top.

pub mod domain;
pub mod extraction;
pub mod insights;
pub mod normalizer;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod versions;
pub mod views;

#[cfg(test)]
mod tests;

pub use domain::{
    BuyerType, Listing, ListingId, ListingStatus, ListingUpdate, NewListing, Offer, OfferId,
    OfferSource, OfferStatus, PriorityFactor, PriorityPatch, PriorityProfile, UsageEvent,
    UsageEventId, UsageEventType, UsagePricing, UserId,
};
pub use extraction::{ExtractionFailure, ExtractionOutcome};
pub use insights::{
    generate_insights, InsightSummary, NegotiationOpportunity, NetProceedsComparison,
    OfferInsights, Recommendation, RiskAssessment, RunnerUp,
};
pub use normalizer::{
    normalize, CommissionUnit, FieldError, NormalizedOffer, RawNumber, RawOfferInput,
    ValidationError,
};
pub use repository::{
    BillingError, BillingGateway, IdGenerator, IdStrategy, ListingRepository, OfferRepository,
    OfferStore, RepositoryError, SequenceIds, UsageLedger, UuidIds,
};
pub use router::{offer_router, USER_HEADER};
pub use scoring::{OfferScorecard, ScoreComponent, ScoreFactor, ScoreWeights};
pub use service::{CounterPreview, OfferDeskError, OfferDeskService, PREVIEW_OFFER_ID};
pub use versions::{ContingencyChange, FieldChange, OfferDiff, TermsPatch, VersionError};
pub use views::{OfferComparison, OfferView};
