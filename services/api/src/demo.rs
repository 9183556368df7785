use crate::infra::{offer_service, InMemoryOfferStore};
use chrono::Utc;
use clap::Args;
use offer_desk::config::OfferDeskConfig;
use offer_desk::error::AppError;
use offer_desk::workflows::offers::{
    BuyerType, ExtractionFailure, IdStrategy, Listing, NewListing, Offer, OfferComparison, OfferDeskError,
    OfferDiff, OfferInsights, PriorityPatch, RawNumber, RawOfferInput, TermsPatch, UsageEvent,
    UsagePricing, UserId,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Print the full demo result as JSON instead of a text summary.
    #[arg(long)]
    pub(crate) json: bool,
    /// Weight closing speed above price when ranking (1-10).
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub(crate) closing_speed_weight: Option<u8>,
    /// Skip the counter-offer round.
    #[arg(long)]
    pub(crate) skip_counter: bool,
}

#[derive(Debug, Serialize)]
struct DemoReport {
    listing: Listing,
    comparison: OfferComparison,
    #[serde(skip_serializing_if = "Option::is_none")]
    counter_diff: Option<OfferDiff>,
    history: Vec<Offer>,
    usage: Vec<UsageEvent>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        json,
        closing_speed_weight,
        skip_counter,
    } = args;

    let store = Arc::new(InMemoryOfferStore::default());
    let service = offer_service(
        &OfferDeskConfig {
            id_strategy: IdStrategy::Sequence,
            pricing: UsagePricing::default(),
        },
        store.clone(),
    );
    let agent = UserId("demo-agent".to_string());

    let listing = service.create_listing(
        &agent,
        NewListing {
            address: "1247 Oak Valley Dr".to_string(),
            city: "Austin".to_string(),
            state: "TX".to_string(),
            postal_code: "78704".to_string(),
            asking_price: 700_000.0,
            loan_balance: Some(200_000.0),
        },
    )?;
    if let Some(weight) = closing_speed_weight {
        service.update_priorities(
            &agent,
            &listing.id,
            PriorityPatch {
                closing_speed: Some(weight),
                ..PriorityPatch::default()
            },
        )?;
    }

    let lead = service.submit_offer(
        &agent,
        &listing.id,
        sample_offer("Jordan Reyes", BuyerType::PreApproved, 700_000.0, 3.0, 30, &["inspection"]),
    )?;
    service.submit_offer(
        &agent,
        &listing.id,
        sample_offer("Priya Natarajan", BuyerType::Cash, 685_000.0, 25_000.0, 14, &[]),
    )?;
    service.submit_extracted(
        &agent,
        &listing.id,
        Ok(sample_offer(
            "Casey Morgan",
            BuyerType::FirstTime,
            705_000.0,
            2.5,
            60,
            &["inspection", "appraisal", "financing", "sale of current home"],
        )),
    )?;
    service.submit_extracted(
        &agent,
        &listing.id,
        Err(ExtractionFailure::new("scanned PDF had no readable text")),
    )?;

    let counter_diff = if skip_counter {
        None
    } else {
        let counter = service.counter_offer(
            &agent,
            &lead.id,
            TermsPatch {
                price: Some(RawNumber::from(712_500.0)),
                closing_timeline_days: Some(RawNumber::from(21.0)),
                ..TermsPatch::default()
            },
        )?;
        Some(service.diff(&agent, &lead.id, &counter.id)?)
    };

    let report = DemoReport {
        comparison: service.compare(&agent, &listing.id)?,
        history: service.history(&agent, &lead.id)?,
        usage: store.usage().map_err(OfferDeskError::from)?,
        listing,
        counter_diff,
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(body) => println!("{body}"),
            Err(err) => println!("Demo payload unavailable: {err}"),
        }
        return Ok(());
    }

    render_report(&report);
    Ok(())
}

fn sample_offer(
    buyer: &str,
    buyer_type: BuyerType,
    price: f64,
    commission: f64,
    days: u32,
    contingencies: &[&str],
) -> RawOfferInput {
    RawOfferInput {
        buyer_name: Some(buyer.to_string()),
        buyer_type: Some(buyer_type),
        price: Some(RawNumber::from(price)),
        agent_commission: Some(RawNumber::from(commission)),
        closing_timeline_days: Some(RawNumber::from(f64::from(days))),
        contingencies: contingencies.iter().map(|c| c.to_string()).collect(),
        ..RawOfferInput::default()
    }
}

fn render_report(report: &DemoReport) {
    let listing = &report.listing;
    println!(
        "Offer desk demo ({})",
        Utc::now().format("%Y-%m-%d %H:%M UTC")
    );
    println!(
        "Listing {}: {}, {} {} | asking ${:.0} | loan ${:.0}",
        listing.id,
        listing.address,
        listing.city,
        listing.state,
        listing.asking_price,
        listing.loan_balance.unwrap_or_default()
    );

    let priorities = &report.comparison.priorities;
    println!(
        "Priorities: price {} | net proceeds {} | closing speed {} | contingency risk {} | buyer qualification {}",
        priorities.price,
        priorities.net_proceeds,
        priorities.closing_speed,
        priorities.contingency_risk,
        priorities.buyer_qualification
    );

    println!("\nRanked offers");
    for (rank, view) in report.comparison.offers.iter().enumerate() {
        let review = if view.needs_review { " [needs review]" } else { "" };
        println!(
            "{:>2}. {} ({}) v{} | ${:.0} | net ${:.0} | risk {}/10 | {} days | score {} (weighted {:.1}){}",
            rank + 1,
            view.buyer_name,
            view.buyer_type_label,
            view.version_number,
            view.price,
            view.net_proceeds,
            view.risk_score,
            view.closing_timeline_days,
            view.display_score,
            view.weighted_score,
            review
        );
    }

    println!("\nInsights");
    for line in report.comparison.insights.summary_lines() {
        println!("- {line}");
    }
    if let OfferInsights::Ready(summary) = &report.comparison.insights {
        println!("  ({} live offers compared)", summary.offer_count);
    }

    if let Some(diff) = &report.counter_diff {
        println!(
            "\nCounter-offer v{} -> v{} changed: {}",
            diff.from_version,
            diff.to_version,
            diff.changed_fields().join(", ")
        );
        println!(
            "  price ${:.0} -> ${:.0} | net ${:.0} -> ${:.0}",
            diff.price.before, diff.price.after, diff.net_proceeds.before, diff.net_proceeds.after
        );
    }

    println!("\nNegotiation thread");
    for offer in &report.history {
        println!(
            "- v{} {} ${:.0} ({})",
            offer.version_number,
            offer.id,
            offer.price,
            offer.status.label()
        );
    }

    let total_cents: u32 = report.usage.iter().map(|event| event.amount_cents).sum();
    println!(
        "\nUsage ledger: {} events, ${:.2} billed",
        report.usage.len(),
        f64::from(total_cents) / 100.0
    );
    for event in &report.usage {
        println!(
            "  - {} {} {}c{}",
            event.id,
            event.event_type.label(),
            event.amount_cents,
            if event.processed { "" } else { " (unbilled)" }
        );
    }
}
