//! Counter-offer threads built from flat parent pointers.
//!
//! Offers live in a flat table keyed by id. A thread is every offer whose parent chain ends
//! at the same root; membership is computed by walking `parent_offer_id` links.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{BuyerType, ListingId, Offer, OfferId, OfferSource, OfferStatus, UserId};
use super::normalizer::{
    normalize, CommissionUnit, NormalizedOffer, RawNumber, RawOfferInput, ValidationError,
};
use super::scoring::OfferScorecard;

/// Upper bound on parent hops before a chain is treated as corrupt.
const MAX_CHAIN_HOPS: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("offer {0} not found")]
    UnknownOffer(OfferId),
    #[error("parent chain of offer {0} is dangling or cyclic")]
    BrokenChain(OfferId),
    #[error("offer {offer_id} was already countered by {countered_by}; counter the latest version")]
    Superseded {
        offer_id: OfferId,
        countered_by: OfferId,
    },
    #[error("offers {left} and {right} belong to different negotiation threads")]
    DifferentThreads { left: OfferId, right: OfferId },
}

/// Everything a new version needs besides its position in the thread.
#[derive(Debug, Clone)]
pub struct OfferDraft {
    pub id: OfferId,
    pub submitted_by: UserId,
    pub terms: NormalizedOffer,
    pub scorecard: OfferScorecard,
    pub source: OfferSource,
    pub created_at: DateTime<Utc>,
}

/// Start a new negotiation thread.
pub fn create_root(listing_id: ListingId, draft: OfferDraft) -> Offer {
    build(listing_id, draft, None, 1)
}

/// Append a counter after `parent`. The caller guarantees `parent` is the thread's latest
/// version (see [`ensure_latest`]).
pub fn create_counter(parent: &Offer, draft: OfferDraft) -> Offer {
    build(
        parent.listing_id.clone(),
        draft,
        Some(parent.id.clone()),
        parent.version_number + 1,
    )
}

fn build(
    listing_id: ListingId,
    draft: OfferDraft,
    parent_offer_id: Option<OfferId>,
    version_number: u32,
) -> Offer {
    let OfferDraft {
        id,
        submitted_by,
        terms,
        scorecard,
        source,
        created_at,
    } = draft;

    Offer {
        id,
        listing_id,
        submitted_by,
        buyer_name: terms.buyer_name,
        buyer_type: terms.buyer_type,
        price: terms.price,
        commission: terms.commission,
        commission_percent: terms.commission_percent,
        closing_timeline_days: terms.closing_timeline_days,
        contingencies: terms.contingencies,
        net_proceeds: scorecard.net_proceeds,
        risk_score: scorecard.risk_score,
        overall_score: scorecard.overall_score,
        notes: terms.notes,
        status: OfferStatus::Pending,
        source,
        needs_review: source == OfferSource::ExtractionFallback,
        is_counter_offer: parent_offer_id.is_some(),
        parent_offer_id,
        version_number,
        created_at,
    }
}

/// Changes carried by a counter-offer or an in-place revision. Absent fields inherit.
///
/// A new `agent_commission` goes through the usual unit resolution; an inherited
/// percentage commission stays a percentage and is re-priced against the new price.
/// `commission_unit` only qualifies a new `agent_commission` and is refused on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermsPatch {
    #[serde(default)]
    pub buyer_name: Option<String>,
    #[serde(default)]
    pub buyer_type: Option<BuyerType>,
    #[serde(default)]
    pub price: Option<RawNumber>,
    #[serde(default)]
    pub agent_commission: Option<RawNumber>,
    #[serde(default)]
    pub commission_unit: Option<CommissionUnit>,
    #[serde(default)]
    pub closing_timeline_days: Option<RawNumber>,
    #[serde(default)]
    pub contingencies: Option<Vec<String>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TermsPatch {
    /// True when the patch restates every term an extraction placeholder had to guess.
    pub fn supplies_guessed_terms(&self) -> bool {
        self.buyer_name.is_some() && self.price.is_some() && self.closing_timeline_days.is_some()
    }

    pub fn apply_to(&self, base: &NormalizedOffer) -> Result<NormalizedOffer, ValidationError> {
        let mut raw = RawOfferInput::from(base);

        if let Some(name) = &self.buyer_name {
            raw.buyer_name = Some(name.clone());
        }
        if let Some(buyer_type) = self.buyer_type {
            raw.buyer_type = Some(buyer_type);
        }
        if let Some(price) = &self.price {
            raw.price = Some(price.clone());
        }
        match (&self.agent_commission, self.commission_unit) {
            (Some(commission), unit) => {
                raw.agent_commission = Some(commission.clone());
                raw.commission_unit = unit;
            }
            (None, Some(_)) => {
                return Err(ValidationError::single(
                    "commission_unit",
                    "cannot change without a new agent_commission",
                ))
            }
            (None, None) => {}
        }
        if let Some(days) = &self.closing_timeline_days {
            raw.closing_timeline_days = Some(days.clone());
        }
        if let Some(contingencies) = &self.contingencies {
            raw.contingencies = contingencies.clone();
        }
        if let Some(notes) = &self.notes {
            raw.notes = Some(notes.clone());
        }

        normalize(&raw)
    }
}

/// Read-only arena view over one listing's offers.
pub struct ThreadIndex<'a> {
    by_id: HashMap<&'a OfferId, &'a Offer>,
}

impl<'a> ThreadIndex<'a> {
    pub fn new(offers: &'a [Offer]) -> Self {
        Self {
            by_id: offers.iter().map(|offer| (&offer.id, offer)).collect(),
        }
    }

    pub fn get(&self, id: &OfferId) -> Option<&'a Offer> {
        self.by_id.get(id).copied()
    }

    /// Walk parent links to the thread root, refusing dangling or cyclic chains.
    pub fn root_of(&self, id: &OfferId) -> Result<&'a Offer, VersionError> {
        let mut current = self
            .get(id)
            .ok_or_else(|| VersionError::UnknownOffer(id.clone()))?;
        let mut visited: HashSet<&'a OfferId> = HashSet::new();

        while let Some(parent_id) = &current.parent_offer_id {
            if !visited.insert(&current.id) || visited.len() > MAX_CHAIN_HOPS {
                return Err(VersionError::BrokenChain(id.clone()));
            }
            current = self
                .get(parent_id)
                .ok_or_else(|| VersionError::BrokenChain(id.clone()))?;
        }

        Ok(current)
    }

    /// Every member of the thread containing `id`, ascending by version.
    pub fn thread(&self, id: &OfferId) -> Result<Vec<&'a Offer>, VersionError> {
        let root = self.root_of(id)?;
        let mut members: Vec<&'a Offer> = self
            .by_id
            .values()
            .copied()
            .filter(|offer| {
                self.root_of(&offer.id)
                    .map(|candidate| candidate.id == root.id)
                    .unwrap_or(false)
            })
            .collect();

        members.sort_by(|a, b| {
            a.version_number
                .cmp(&b.version_number)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(members)
    }

    /// The counter pointing at `id`, if one exists.
    pub fn counter_of(&self, id: &OfferId) -> Option<&'a Offer> {
        self.by_id
            .values()
            .copied()
            .filter(|offer| offer.parent_offer_id.as_ref() == Some(id))
            .min_by(|a, b| a.created_at.cmp(&b.created_at))
    }

    /// Latest version of every thread whose chain is intact.
    pub fn heads(&self) -> Vec<&'a Offer> {
        let mut heads: Vec<&'a Offer> = self
            .by_id
            .values()
            .copied()
            .filter(|offer| self.counter_of(&offer.id).is_none())
            .filter(|offer| self.root_of(&offer.id).is_ok())
            .collect();
        heads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        heads
    }
}

/// All versions sharing a root with `offer_id`, ascending by version number.
pub fn history(offers: &[Offer], offer_id: &OfferId) -> Result<Vec<Offer>, VersionError> {
    let index = ThreadIndex::new(offers);
    Ok(index.thread(offer_id)?.into_iter().cloned().collect())
}

/// Counters are always built from the newest version of a thread.
pub fn ensure_latest(offers: &[Offer], offer_id: &OfferId) -> Result<(), VersionError> {
    let index = ThreadIndex::new(offers);
    index.root_of(offer_id)?;
    match index.counter_of(offer_id) {
        Some(counter) => Err(VersionError::Superseded {
            offer_id: offer_id.clone(),
            countered_by: counter.id.clone(),
        }),
        None => Ok(()),
    }
}

/// Before/after pair with a changed flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange<T> {
    pub before: T,
    pub after: T,
    pub changed: bool,
}

impl<T: PartialEq> FieldChange<T> {
    fn new(before: T, after: T) -> Self {
        let changed = before != after;
        Self {
            before,
            after,
            changed,
        }
    }
}

/// Contingencies compared as sets (case-insensitive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContingencyChange {
    pub before: Vec<String>,
    pub after: Vec<String>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: bool,
}

impl ContingencyChange {
    fn new(before: &[String], after: &[String]) -> Self {
        let keys = |items: &[String]| -> HashSet<String> {
            items.iter().map(|item| item.to_lowercase()).collect()
        };
        let before_keys = keys(before);
        let after_keys = keys(after);

        let added: Vec<String> = after
            .iter()
            .filter(|item| !before_keys.contains(&item.to_lowercase()))
            .cloned()
            .collect();
        let removed: Vec<String> = before
            .iter()
            .filter(|item| !after_keys.contains(&item.to_lowercase()))
            .cloned()
            .collect();
        let changed = !added.is_empty() || !removed.is_empty();

        Self {
            before: before.to_vec(),
            after: after.to_vec(),
            added,
            removed,
            changed,
        }
    }
}

/// Field-by-field comparison of two versions in one thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferDiff {
    pub from: OfferId,
    pub to: OfferId,
    pub from_version: u32,
    pub to_version: u32,
    pub price: FieldChange<f64>,
    pub net_proceeds: FieldChange<f64>,
    pub commission: FieldChange<f64>,
    pub closing_timeline_days: FieldChange<u32>,
    pub contingencies: ContingencyChange,
    pub notes: FieldChange<String>,
}

impl OfferDiff {
    pub fn changed_fields(&self) -> Vec<&'static str> {
        [
            ("price", self.price.changed),
            ("net_proceeds", self.net_proceeds.changed),
            ("commission", self.commission.changed),
            ("closing_timeline_days", self.closing_timeline_days.changed),
            ("contingencies", self.contingencies.changed),
            ("notes", self.notes.changed),
        ]
        .into_iter()
        .filter_map(|(field, changed)| changed.then_some(field))
        .collect()
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_fields().is_empty()
    }
}

pub fn diff(before: &Offer, after: &Offer) -> OfferDiff {
    OfferDiff {
        from: before.id.clone(),
        to: after.id.clone(),
        from_version: before.version_number,
        to_version: after.version_number,
        price: FieldChange::new(before.price, after.price),
        net_proceeds: FieldChange::new(before.net_proceeds, after.net_proceeds),
        commission: FieldChange::new(before.commission, after.commission),
        closing_timeline_days: FieldChange::new(
            before.closing_timeline_days,
            after.closing_timeline_days,
        ),
        contingencies: ContingencyChange::new(&before.contingencies, &after.contingencies),
        notes: FieldChange::new(before.notes.clone(), after.notes.clone()),
    }
}

/// Diff two offers after checking they share a thread root.
pub fn diff_in_thread(
    offers: &[Offer],
    left: &OfferId,
    right: &OfferId,
) -> Result<OfferDiff, VersionError> {
    let index = ThreadIndex::new(offers);
    let left_root = index.root_of(left)?;
    let right_root = index.root_of(right)?;
    if left_root.id != right_root.id {
        return Err(VersionError::DifferentThreads {
            left: left.clone(),
            right: right.clone(),
        });
    }

    let (Some(before), Some(after)) = (index.get(left), index.get(right)) else {
        return Err(VersionError::UnknownOffer(left.clone()));
    };
    Ok(diff(before, after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::offers::scoring::score_offer;
    use chrono::{Duration, TimeZone};

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("valid timestamp")
            + Duration::minutes(minutes)
    }

    fn draft(id: &str, terms: NormalizedOffer, minutes: i64) -> OfferDraft {
        let scorecard = score_offer(&terms, Some(200_000.0));
        OfferDraft {
            id: OfferId(id.to_string()),
            submitted_by: UserId("agent-1".to_string()),
            terms,
            scorecard,
            source: OfferSource::Manual,
            created_at: at(minutes),
        }
    }

    fn base_terms() -> NormalizedOffer {
        normalize(&RawOfferInput {
            buyer_name: Some("Jordan Reyes".to_string()),
            buyer_type: Some(BuyerType::PreApproved),
            price: Some(700_000.0.into()),
            agent_commission: Some(3.0.into()),
            closing_timeline_days: Some(30.0.into()),
            contingencies: vec!["inspection".to_string()],
            notes: Some("Flexible on move-out".to_string()),
            ..RawOfferInput::default()
        })
        .expect("valid terms")
    }

    fn price_patch(price: f64) -> TermsPatch {
        TermsPatch {
            price: Some(price.into()),
            ..TermsPatch::default()
        }
    }

    fn chain() -> Vec<Offer> {
        let root = create_root(ListingId("listing-1".to_string()), draft("o-1", base_terms(), 0));
        let second_terms = price_patch(690_000.0)
            .apply_to(&NormalizedOffer::from(&root))
            .expect("valid");
        let second = create_counter(&root, draft("o-2", second_terms, 10));
        let third_terms = TermsPatch {
            contingencies: Some(Vec::new()),
            ..TermsPatch::default()
        }
        .apply_to(&NormalizedOffer::from(&second))
        .expect("valid");
        let third = create_counter(&second, draft("o-3", third_terms, 20));
        vec![third, root, second]
    }

    #[test]
    fn root_starts_at_version_one() {
        let root = create_root(ListingId("listing-1".to_string()), draft("o-1", base_terms(), 0));
        assert_eq!(root.version_number, 1);
        assert!(root.parent_offer_id.is_none());
        assert!(!root.is_counter_offer);
        assert_eq!(root.status, OfferStatus::Pending);
    }

    #[test]
    fn counter_increments_version_and_inherits_terms() {
        let root = create_root(ListingId("listing-1".to_string()), draft("o-1", base_terms(), 0));
        let terms = price_patch(690_000.0)
            .apply_to(&NormalizedOffer::from(&root))
            .expect("valid");
        let counter = create_counter(&root, draft("o-2", terms, 5));

        assert_eq!(counter.version_number, 2);
        assert_eq!(counter.parent_offer_id, Some(root.id.clone()));
        assert!(counter.is_counter_offer);
        assert_eq!(counter.listing_id, root.listing_id);
        assert_eq!(counter.price, 690_000.0);
        assert_eq!(counter.buyer_name, root.buyer_name);
        assert_eq!(counter.contingencies, root.contingencies);
        assert_eq!(counter.closing_timeline_days, root.closing_timeline_days);
        assert_eq!(counter.notes, root.notes);
        assert_eq!(counter.commission_percent, Some(3.0));
        assert_eq!(counter.commission, 20_700.0);
        assert_eq!(counter.net_proceeds, 690_000.0 - 200_000.0 - 20_700.0);
    }

    #[test]
    fn patch_with_new_commission_uses_unit_resolution() {
        let base = base_terms();
        let terms = TermsPatch {
            agent_commission: Some(15_000.0.into()),
            ..TermsPatch::default()
        }
        .apply_to(&base)
        .expect("valid");
        assert_eq!(terms.commission, 15_000.0);
        assert_eq!(terms.commission_percent, None);
    }

    #[test]
    fn commission_unit_without_amount_is_refused() {
        let error = TermsPatch {
            commission_unit: Some(CommissionUnit::Dollar),
            ..TermsPatch::default()
        }
        .apply_to(&base_terms())
        .expect_err("unit alone is ambiguous");
        assert_eq!(error.fields.len(), 1);
        assert_eq!(error.fields[0].field, "commission_unit");

        let terms = TermsPatch {
            agent_commission: Some(10.0.into()),
            commission_unit: Some(CommissionUnit::Dollar),
            ..TermsPatch::default()
        }
        .apply_to(&base_terms())
        .expect("unit with amount");
        assert_eq!(terms.commission, 10.0);
    }

    #[test]
    fn guessed_terms_need_buyer_price_and_timeline() {
        let mut patch = price_patch(680_000.0);
        assert!(!patch.supplies_guessed_terms());
        patch.buyer_name = Some("Avery Chen".to_string());
        patch.closing_timeline_days = Some(21.0.into());
        assert!(patch.supplies_guessed_terms());
    }

    #[test]
    fn history_returns_whole_thread_from_any_member() {
        let offers = chain();
        for id in ["o-1", "o-2", "o-3"] {
            let thread = history(&offers, &OfferId(id.to_string())).expect("thread");
            let versions: Vec<u32> = thread.iter().map(|offer| offer.version_number).collect();
            assert_eq!(versions, vec![1, 2, 3]);
            let ids: Vec<&str> = thread.iter().map(|offer| offer.id.0.as_str()).collect();
            assert_eq!(ids, vec!["o-1", "o-2", "o-3"]);
        }
    }

    #[test]
    fn history_excludes_other_threads() {
        let mut offers = chain();
        offers.push(create_root(
            ListingId("listing-1".to_string()),
            draft("o-9", base_terms(), 30),
        ));

        let thread = history(&offers, &OfferId("o-9".to_string())).expect("thread");
        assert_eq!(thread.len(), 1);
        assert_eq!(
            history(&offers, &OfferId("o-2".to_string())).expect("thread").len(),
            3
        );
    }

    #[test]
    fn history_of_unknown_offer_is_not_found() {
        let offers = chain();
        assert_eq!(
            history(&offers, &OfferId("missing".to_string())),
            Err(VersionError::UnknownOffer(OfferId("missing".to_string())))
        );
    }

    #[test]
    fn cyclic_parent_chain_is_refused() {
        let mut offers = chain();
        for offer in offers.iter_mut() {
            if offer.id.0 == "o-1" {
                offer.parent_offer_id = Some(OfferId("o-3".to_string()));
            }
        }

        assert_eq!(
            history(&offers, &OfferId("o-2".to_string())),
            Err(VersionError::BrokenChain(OfferId("o-2".to_string())))
        );
    }

    #[test]
    fn dangling_parent_is_refused() {
        let mut offers = chain();
        offers.retain(|offer| offer.id.0 != "o-1");
        assert!(matches!(
            history(&offers, &OfferId("o-3".to_string())),
            Err(VersionError::BrokenChain(_))
        ));
    }

    #[test]
    fn only_the_latest_version_can_be_countered() {
        let offers = chain();
        assert!(ensure_latest(&offers, &OfferId("o-3".to_string())).is_ok());
        assert_eq!(
            ensure_latest(&offers, &OfferId("o-1".to_string())),
            Err(VersionError::Superseded {
                offer_id: OfferId("o-1".to_string()),
                countered_by: OfferId("o-2".to_string()),
            })
        );
    }

    #[test]
    fn heads_lists_latest_version_per_thread() {
        let mut offers = chain();
        offers.push(create_root(
            ListingId("listing-1".to_string()),
            draft("o-9", base_terms(), 30),
        ));

        let index = ThreadIndex::new(&offers);
        let heads: Vec<&str> = index.heads().iter().map(|offer| offer.id.0.as_str()).collect();
        assert_eq!(heads, vec!["o-3", "o-9"]);
    }

    #[test]
    fn diff_flags_changed_fields() {
        let offers = chain();
        let diff = diff_in_thread(
            &offers,
            &OfferId("o-1".to_string()),
            &OfferId("o-3".to_string()),
        )
        .expect("same thread");

        assert_eq!((diff.from_version, diff.to_version), (1, 3));
        assert!(diff.price.changed);
        assert!(diff.net_proceeds.changed);
        assert!(diff.commission.changed);
        assert!(!diff.closing_timeline_days.changed);
        assert!(!diff.notes.changed);
        assert_eq!(diff.contingencies.removed, vec!["inspection"]);
        assert!(diff.contingencies.added.is_empty());
        assert_eq!(
            diff.changed_fields(),
            vec!["price", "net_proceeds", "commission", "contingencies"]
        );
    }

    #[test]
    fn contingency_diff_ignores_case() {
        let change = ContingencyChange::new(
            &["Inspection".to_string(), "appraisal".to_string()],
            &["inspection".to_string(), "financing".to_string()],
        );
        assert_eq!(change.added, vec!["financing"]);
        assert_eq!(change.removed, vec!["appraisal"]);
        assert!(change.changed);
    }

    #[test]
    fn diff_across_threads_is_refused() {
        let mut offers = chain();
        offers.push(create_root(
            ListingId("listing-1".to_string()),
            draft("o-9", base_terms(), 30),
        ));

        assert!(matches!(
            diff_in_thread(
                &offers,
                &OfferId("o-1".to_string()),
                &OfferId("o-9".to_string())
            ),
            Err(VersionError::DifferentThreads { .. })
        ));
    }
}
