//! Canonicalizes manual form input and extraction payloads into offer terms.
//!
//! Both intake paths deliver the same [`RawOfferInput`] shape, so everything downstream
//! of [`normalize`] is agnostic to how the offer was captured.

use serde::{Deserialize, Serialize};

use super::domain::{BuyerType, Offer};

/// Commission values at or below this are read as a percentage of price.
pub const PERCENT_COMMISSION_THRESHOLD: f64 = 20.0;
/// Commission assumed when the input does not carry one.
pub const DEFAULT_COMMISSION_PERCENT: f64 = 6.0;
pub const DEFAULT_BUYER_NAME: &str = "Unnamed buyer";

/// A number that may arrive as JSON number or as human text such as `"$700,000"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    fn parse(&self) -> Option<f64> {
        let value = match self {
            RawNumber::Number(value) => *value,
            RawNumber::Text(raw) => {
                let cleaned: String = raw
                    .chars()
                    .filter(|c| !c.is_whitespace() && !matches!(c, '$' | ',' | '_'))
                    .collect();
                cleaned.parse::<f64>().ok()?
            }
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for RawNumber {
    fn from(value: f64) -> Self {
        RawNumber::Number(value)
    }
}

/// Explicit commission unit. When absent the magnitude heuristic applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionUnit {
    Percent,
    Dollar,
}

/// Offer terms as typed by an agent or returned by the extraction service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOfferInput {
    #[serde(default, alias = "buyerName")]
    pub buyer_name: Option<String>,
    #[serde(default, alias = "buyerType")]
    pub buyer_type: Option<BuyerType>,
    #[serde(default)]
    pub price: Option<RawNumber>,
    #[serde(default, alias = "agentCommission")]
    pub agent_commission: Option<RawNumber>,
    #[serde(default, alias = "commissionType")]
    pub commission_unit: Option<CommissionUnit>,
    #[serde(default, alias = "closingTimelineDays")]
    pub closing_timeline_days: Option<RawNumber>,
    #[serde(default)]
    pub contingencies: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Canonical offer terms, ready for scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedOffer {
    pub buyer_name: String,
    pub buyer_type: BuyerType,
    pub price: f64,
    pub commission: f64,
    pub commission_percent: Option<f64>,
    pub closing_timeline_days: u32,
    pub contingencies: Vec<String>,
    pub notes: String,
}

/// The raw form of normalized terms. Units are explicit so re-normalizing is a no-op.
impl From<&NormalizedOffer> for RawOfferInput {
    fn from(terms: &NormalizedOffer) -> Self {
        let (agent_commission, commission_unit) = match terms.commission_percent {
            Some(percent) => (percent, CommissionUnit::Percent),
            None => (terms.commission, CommissionUnit::Dollar),
        };

        Self {
            buyer_name: Some(terms.buyer_name.clone()),
            buyer_type: Some(terms.buyer_type),
            price: Some(RawNumber::Number(terms.price)),
            agent_commission: Some(RawNumber::Number(agent_commission)),
            commission_unit: Some(commission_unit),
            closing_timeline_days: Some(RawNumber::Number(f64::from(
                terms.closing_timeline_days,
            ))),
            contingencies: terms.contingencies.clone(),
            notes: Some(terms.notes.clone()),
        }
    }
}

impl From<&Offer> for NormalizedOffer {
    fn from(offer: &Offer) -> Self {
        Self {
            buyer_name: offer.buyer_name.clone(),
            buyer_type: offer.buyer_type,
            price: offer.price,
            commission: offer.commission,
            commission_percent: offer.commission_percent,
            closing_timeline_days: offer.closing_timeline_days,
            contingencies: offer.contingencies.clone(),
            notes: offer.notes.clone(),
        }
    }
}

/// Single field failure surfaced back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Input rejected before any computation ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("invalid input: {}", describe(.fields))]
pub struct ValidationError {
    pub fields: Vec<FieldError>,
}

impl ValidationError {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError::new(field, message)],
        }
    }
}

fn describe(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|error| format!("{} {}", error.field, error.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn normalize(input: &RawOfferInput) -> Result<NormalizedOffer, ValidationError> {
    let mut errors = Vec::new();

    let price = match input.price.as_ref().map(RawNumber::parse) {
        None => {
            errors.push(FieldError::new("price", "is required"));
            None
        }
        Some(None) => {
            errors.push(FieldError::new("price", "must be a number"));
            None
        }
        Some(Some(value)) if value <= 0.0 => {
            errors.push(FieldError::new("price", "must be greater than zero"));
            None
        }
        Some(Some(value)) => Some(value),
    };

    let closing_timeline_days = match input.closing_timeline_days.as_ref().map(RawNumber::parse)
    {
        None => {
            errors.push(FieldError::new("closing_timeline_days", "is required"));
            None
        }
        Some(None) => {
            errors.push(FieldError::new("closing_timeline_days", "must be a number"));
            None
        }
        Some(Some(days)) if days < 0.0 || days.fract() != 0.0 || days > f64::from(u32::MAX) => {
            errors.push(FieldError::new(
                "closing_timeline_days",
                "must be a whole, non-negative number of days",
            ));
            None
        }
        Some(Some(days)) => Some(days as u32),
    };

    let commission = match input.agent_commission.as_ref().map(RawNumber::parse) {
        None => Some(None),
        Some(None) => {
            errors.push(FieldError::new("agent_commission", "must be a number"));
            None
        }
        Some(Some(value)) if value < 0.0 => {
            errors.push(FieldError::new("agent_commission", "must not be negative"));
            None
        }
        Some(Some(value)) => {
            let unit = input.commission_unit.unwrap_or(if value <= PERCENT_COMMISSION_THRESHOLD {
                CommissionUnit::Percent
            } else {
                CommissionUnit::Dollar
            });
            if unit == CommissionUnit::Percent && value > 100.0 {
                errors.push(FieldError::new(
                    "agent_commission",
                    "percentage must not exceed 100",
                ));
                None
            } else {
                Some(Some((value, unit)))
            }
        }
    };

    let (Some(price), Some(closing_timeline_days), Some(commission)) =
        (price, closing_timeline_days, commission)
    else {
        return Err(ValidationError { fields: errors });
    };

    let (commission, commission_percent) = match commission {
        None => (
            price * DEFAULT_COMMISSION_PERCENT / 100.0,
            Some(DEFAULT_COMMISSION_PERCENT),
        ),
        Some((percent, CommissionUnit::Percent)) => (price * percent / 100.0, Some(percent)),
        Some((dollars, CommissionUnit::Dollar)) => (dollars, None),
    };

    let buyer_name = input
        .buyer_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_BUYER_NAME)
        .to_string();

    Ok(NormalizedOffer {
        buyer_name,
        buyer_type: input.buyer_type.unwrap_or(BuyerType::Other),
        price,
        commission,
        commission_percent,
        closing_timeline_days,
        contingencies: dedupe_contingencies(&input.contingencies),
        notes: input.notes.clone().unwrap_or_default(),
    })
}

/// Trim, drop blanks, and collapse case-insensitive duplicates keeping the first spelling.
pub fn dedupe_contingencies(raw: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.iter()
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .filter(|entry| seen.insert(entry.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(price: f64, commission: Option<f64>) -> RawOfferInput {
        RawOfferInput {
            buyer_name: Some("Jordan Reyes".to_string()),
            buyer_type: Some(BuyerType::PreApproved),
            price: Some(price.into()),
            agent_commission: commission.map(RawNumber::from),
            commission_unit: None,
            closing_timeline_days: Some(30.0.into()),
            contingencies: vec!["inspection".to_string()],
            notes: None,
        }
    }

    #[test]
    fn small_commission_values_are_percentages() {
        for percent in [0.5, 3.0, 6.0, 20.0] {
            let terms = normalize(&input(700_000.0, Some(percent))).expect("valid");
            assert_eq!(terms.commission, 700_000.0 * percent / 100.0);
            assert_eq!(terms.commission_percent, Some(percent));
        }
    }

    #[test]
    fn commission_above_threshold_is_dollars() {
        for dollars in [20.01, 25_000.0, 42_000.0] {
            let terms = normalize(&input(700_000.0, Some(dollars))).expect("valid");
            assert_eq!(terms.commission, dollars);
            assert_eq!(terms.commission_percent, None);
        }
    }

    #[test]
    fn three_percent_on_seven_hundred_thousand_is_twenty_one_thousand() {
        let terms = normalize(&input(700_000.0, Some(3.0))).expect("valid");
        assert_eq!(terms.commission, 21_000.0);
    }

    #[test]
    fn missing_commission_defaults_to_six_percent() {
        let terms = normalize(&input(500_000.0, None)).expect("valid");
        assert_eq!(terms.commission, 30_000.0);
        assert_eq!(terms.commission_percent, Some(DEFAULT_COMMISSION_PERCENT));
    }

    #[test]
    fn explicit_unit_overrides_the_heuristic() {
        let mut raw = input(400_000.0, Some(15.0));
        raw.commission_unit = Some(CommissionUnit::Dollar);
        let terms = normalize(&raw).expect("valid");
        assert_eq!(terms.commission, 15.0);

        let mut raw = input(400_000.0, Some(25.0));
        raw.commission_unit = Some(CommissionUnit::Percent);
        let terms = normalize(&raw).expect("valid");
        assert_eq!(terms.commission, 100_000.0);
    }

    #[test]
    fn contingencies_collapse_duplicates_and_keep_custom_entries() {
        let mut raw = input(300_000.0, None);
        raw.contingencies = vec![
            "Inspection".to_string(),
            " inspection ".to_string(),
            "financing".to_string(),
            "".to_string(),
            "Sale of buyer's condo".to_string(),
            "Financing".to_string(),
        ];

        let terms = normalize(&raw).expect("valid");
        assert_eq!(
            terms.contingencies,
            vec!["Inspection", "financing", "Sale of buyer's condo"]
        );
    }

    #[test]
    fn numeric_strings_are_accepted() {
        let mut raw = input(1.0, None);
        raw.price = Some(RawNumber::Text("$700,000".to_string()));
        raw.agent_commission = Some(RawNumber::Text("2.5".to_string()));
        raw.closing_timeline_days = Some(RawNumber::Text("45".to_string()));

        let terms = normalize(&raw).expect("valid");
        assert_eq!(terms.price, 700_000.0);
        assert_eq!(terms.commission, 17_500.0);
        assert_eq!(terms.closing_timeline_days, 45);
    }

    #[test]
    fn collects_every_field_error() {
        let raw = RawOfferInput {
            price: Some(RawNumber::Text("about a million".to_string())),
            agent_commission: Some((-1.0).into()),
            closing_timeline_days: Some(12.5.into()),
            ..RawOfferInput::default()
        };

        let err = normalize(&raw).expect_err("invalid");
        let fields: Vec<&str> = err.fields.iter().map(|f| f.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["price", "closing_timeline_days", "agent_commission"]
        );
        assert!(err.to_string().contains("price must be a number"));
    }

    #[test]
    fn missing_required_fields_are_reported() {
        let err = normalize(&RawOfferInput::default()).expect_err("missing");
        assert_eq!(err.fields.len(), 2);
        assert!(err.fields.iter().all(|f| f.message == "is required"));
    }

    #[test]
    fn defaults_buyer_fields() {
        let raw = RawOfferInput {
            buyer_name: Some("   ".to_string()),
            price: Some(250_000.0.into()),
            closing_timeline_days: Some(0.0.into()),
            ..RawOfferInput::default()
        };
        let terms = normalize(&raw).expect("valid");
        assert_eq!(terms.buyer_name, DEFAULT_BUYER_NAME);
        assert_eq!(terms.buyer_type, BuyerType::Other);
        assert!(terms.contingencies.is_empty());
        assert_eq!(terms.notes, "");
    }

    #[test]
    fn normalizing_normalized_terms_is_a_no_op() {
        let cases = [
            input(700_000.0, Some(3.0)),
            input(700_000.0, Some(12.0)),
            input(650_000.0, Some(25_000.0)),
            input(480_000.0, None),
        ];

        for raw in cases {
            let once = normalize(&raw).expect("valid");
            let twice = normalize(&RawOfferInput::from(&once)).expect("still valid");
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn extraction_payload_keys_deserialize() {
        let payload = serde_json::json!({
            "buyerName": "Casey Lin",
            "buyerType": "cash",
            "price": 615000,
            "agentCommission": null,
            "closingTimelineDays": 21,
            "contingencies": ["appraisal"],
            "notes": "Escalation clause up to 630k"
        });

        let raw: RawOfferInput = serde_json::from_value(payload).expect("payload parses");
        let terms = normalize(&raw).expect("valid");
        assert_eq!(terms.buyer_name, "Casey Lin");
        assert_eq!(terms.buyer_type, BuyerType::Cash);
        assert_eq!(terms.commission, 36_900.0);
    }
}
