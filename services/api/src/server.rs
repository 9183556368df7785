use crate::cli::ServeArgs;
use crate::infra::{offer_service, AppState, InMemoryOfferStore};
use crate::routes::with_offer_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use offer_desk::config::AppConfig;
use offer_desk::error::AppError;
use offer_desk::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryOfferStore::default());
    let service = offer_service(&config.offers, store);

    let app = with_offer_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        id_strategy = config.offers.id_strategy.label(),
        "offer desk ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
