//! Boundary to the document extraction service.
//!
//! The extractor itself lives outside this crate. It hands back either a payload shaped like
//! manual entry or an [`ExtractionFailure`]; failures never reach the caller and instead become
//! a placeholder offer flagged for review.

use serde::{Deserialize, Serialize};

use super::domain::{BuyerType, Listing};
use super::normalizer::{RawNumber, RawOfferInput};

/// Closing timeline used for placeholder offers.
pub const FALLBACK_TIMELINE_DAYS: u32 = 30;
pub const FALLBACK_BUYER_NAME: &str = "Pending review";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("document extraction failed: {reason}")]
pub struct ExtractionFailure {
    pub reason: String,
}

impl ExtractionFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// What the extraction service reported for one uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Extracted { payload: RawOfferInput },
    Failed { reason: String },
}

impl ExtractionOutcome {
    pub fn into_result(self) -> Result<RawOfferInput, ExtractionFailure> {
        match self {
            ExtractionOutcome::Extracted { payload } => Ok(payload),
            ExtractionOutcome::Failed { reason } => Err(ExtractionFailure::new(reason)),
        }
    }
}

/// Terms stored when extraction could not read the document.
pub fn fallback_payload(listing: &Listing, reason: &str) -> RawOfferInput {
    RawOfferInput {
        buyer_name: Some(FALLBACK_BUYER_NAME.to_string()),
        buyer_type: Some(BuyerType::Other),
        price: Some(RawNumber::from(listing.asking_price)),
        closing_timeline_days: Some(RawNumber::from(f64::from(FALLBACK_TIMELINE_DAYS))),
        notes: Some(format!(
            "Automatic extraction failed ({reason}); terms must be entered by hand"
        )),
        ..RawOfferInput::default()
    }
}
