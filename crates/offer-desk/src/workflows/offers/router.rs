use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{ListingId, ListingUpdate, NewListing, OfferId, OfferStatus, PriorityPatch, UserId};
use super::extraction::ExtractionOutcome;
use super::normalizer::RawOfferInput;
use super::repository::{BillingGateway, OfferStore, RepositoryError};
use super::service::{OfferDeskError, OfferDeskService};
use super::versions::{TermsPatch, VersionError};
use super::views::OfferView;

/// Header carrying the authenticated caller, set by the upstream auth layer.
pub const USER_HEADER: &str = "x-user-id";

type SharedService<R, B> = Arc<OfferDeskService<R, B>>;

/// Router exposing listings, offers, negotiation threads, and comparisons.
pub fn offer_router<R, B>(service: SharedService<R, B>) -> Router
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    Router::new()
        .route("/api/v1/listings", post(create_listing_handler::<R, B>))
        .route(
            "/api/v1/listings/:listing_id",
            get(listing_handler::<R, B>).patch(update_listing_handler::<R, B>),
        )
        .route(
            "/api/v1/listings/:listing_id/priorities",
            get(priorities_handler::<R, B>).patch(update_priorities_handler::<R, B>),
        )
        .route(
            "/api/v1/listings/:listing_id/offers",
            post(submit_offer_handler::<R, B>),
        )
        .route(
            "/api/v1/listings/:listing_id/offers/extracted",
            post(submit_extracted_handler::<R, B>),
        )
        .route(
            "/api/v1/listings/:listing_id/comparison",
            get(comparison_handler::<R, B>),
        )
        .route(
            "/api/v1/offers/:offer_id",
            get(offer_handler::<R, B>).patch(revise_offer_handler::<R, B>),
        )
        .route(
            "/api/v1/offers/:offer_id/counter",
            post(counter_offer_handler::<R, B>),
        )
        .route(
            "/api/v1/offers/:offer_id/counter/preview",
            post(preview_counter_handler::<R, B>),
        )
        .route(
            "/api/v1/offers/:offer_id/status",
            post(offer_status_handler::<R, B>),
        )
        .route(
            "/api/v1/offers/:offer_id/history",
            get(history_handler::<R, B>),
        )
        .route(
            "/api/v1/offers/:offer_id/diff/:other_offer_id",
            get(diff_handler::<R, B>),
        )
        .with_state(service)
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusChange {
    pub status: OfferStatus,
}

fn caller(headers: &HeaderMap) -> Result<UserId, Response> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| UserId(value.to_string()))
        .ok_or_else(|| {
            let payload = json!({ "error": format!("missing {USER_HEADER} header") });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, OfferDeskError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) fn error_response(error: OfferDeskError) -> Response {
    let status = match &error {
        OfferDeskError::NotFound { .. } => StatusCode::NOT_FOUND,
        OfferDeskError::Forbidden(_) => StatusCode::FORBIDDEN,
        OfferDeskError::Validation(validation) => {
            let payload = json!({
                "error": error.to_string(),
                "fields": validation.fields,
            });
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
        }
        OfferDeskError::Version(VersionError::Superseded { .. })
        | OfferDeskError::Frozen(_)
        | OfferDeskError::InvalidStatusTransition { .. }
        | OfferDeskError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
        OfferDeskError::Version(VersionError::DifferentThreads { .. }) => StatusCode::BAD_REQUEST,
        OfferDeskError::Version(VersionError::UnknownOffer(_))
        | OfferDeskError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
        OfferDeskError::Version(VersionError::BrokenChain(_))
        | OfferDeskError::Repository(RepositoryError::Unavailable(_)) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({ "error": error.to_string() });
    (status, Json(payload)).into_response()
}

macro_rules! identify {
    ($headers:expr) => {
        match caller(&$headers) {
            Ok(user) => user,
            Err(response) => return response,
        }
    };
}

async fn create_listing_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    headers: HeaderMap,
    Json(request): Json<NewListing>,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    respond(StatusCode::CREATED, service.create_listing(&user, request))
}

async fn listing_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(listing_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    respond(StatusCode::OK, service.listing(&user, &ListingId(listing_id)))
}

async fn update_listing_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(listing_id): Path<String>,
    headers: HeaderMap,
    Json(update): Json<ListingUpdate>,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    respond(
        StatusCode::OK,
        service.update_listing(&user, &ListingId(listing_id), update),
    )
}

async fn priorities_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(listing_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    respond(StatusCode::OK, service.priorities(&user, &ListingId(listing_id)))
}

async fn update_priorities_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(listing_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<PriorityPatch>,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    respond(
        StatusCode::OK,
        service.update_priorities(&user, &ListingId(listing_id), patch),
    )
}

async fn submit_offer_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(listing_id): Path<String>,
    headers: HeaderMap,
    Json(input): Json<RawOfferInput>,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    let result = service
        .submit_offer(&user, &ListingId(listing_id), input)
        .map(|offer| OfferView::unweighted(&offer));
    respond(StatusCode::CREATED, result)
}

async fn submit_extracted_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(listing_id): Path<String>,
    headers: HeaderMap,
    Json(outcome): Json<ExtractionOutcome>,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    let result = service
        .submit_extracted(&user, &ListingId(listing_id), outcome.into_result())
        .map(|offer| OfferView::unweighted(&offer));
    respond(StatusCode::CREATED, result)
}

async fn comparison_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(listing_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    respond(StatusCode::OK, service.compare(&user, &ListingId(listing_id)))
}

async fn offer_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(offer_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    let result = service
        .offer(&user, &OfferId(offer_id))
        .map(|offer| OfferView::unweighted(&offer));
    respond(StatusCode::OK, result)
}

async fn revise_offer_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(offer_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<TermsPatch>,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    let result = service
        .revise_offer(&user, &OfferId(offer_id), patch)
        .map(|offer| OfferView::unweighted(&offer));
    respond(StatusCode::OK, result)
}

async fn counter_offer_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(offer_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<TermsPatch>,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    let result = service
        .counter_offer(&user, &OfferId(offer_id), patch)
        .map(|offer| OfferView::unweighted(&offer));
    respond(StatusCode::CREATED, result)
}

async fn preview_counter_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(offer_id): Path<String>,
    headers: HeaderMap,
    Json(patch): Json<TermsPatch>,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    respond(
        StatusCode::OK,
        service.preview_counter(&user, &OfferId(offer_id), patch),
    )
}

async fn offer_status_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(offer_id): Path<String>,
    headers: HeaderMap,
    Json(change): Json<StatusChange>,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    let result = service
        .set_offer_status(&user, &OfferId(offer_id), change.status)
        .map(|offer| OfferView::unweighted(&offer));
    respond(StatusCode::OK, result)
}

async fn history_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path(offer_id): Path<String>,
    headers: HeaderMap,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    let result = service.history(&user, &OfferId(offer_id)).map(|thread| {
        thread
            .iter()
            .map(OfferView::unweighted)
            .collect::<Vec<_>>()
    });
    respond(StatusCode::OK, result)
}

async fn diff_handler<R, B>(
    State(service): State<SharedService<R, B>>,
    Path((offer_id, other_offer_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response
where
    R: OfferStore + 'static,
    B: BillingGateway + 'static,
{
    let user = identify!(headers);
    respond(
        StatusCode::OK,
        service.diff(&user, &OfferId(offer_id), &OfferId(other_offer_id)),
    )
}
