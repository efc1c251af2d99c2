use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use uuid::Uuid;

mod admin;
mod auth;
mod booking;
mod config;
mod db;
mod error;
mod events;
mod handlers;
mod message;
mod models;
mod payments;
mod pricing;
mod property;
mod refund;
mod review;
mod schema;
mod store;

use booking::BookingService;
use config::AppConfig;
use error::AppError;
use events::EventHub;
use store::MarketplaceStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn MarketplaceStore>,
    pub bookings: Arc<BookingService>,
    pub events: EventHub,
}

async fn authenticate(
    headers: HeaderMap,
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?;
    let token = auth_header
        .to_str()
        .ok()
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization header format".to_string()))?;
    let user = auth::validate_token(token, &state.config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    log::debug!("Authenticated user: {} ({})", user.id, user.role);
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    profile_id: Uuid,
}

/// Issues a token for an existing profile. Development helper; there is no
/// password check.
async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    let profile = state
        .store
        .get_profile(request.profile_id)
        .await?
        .ok_or(AppError::NotFound("Profile"))?;
    let token = auth::create_token(profile.id, profile.role, &state.config.jwt_secret)
        .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))?;
    log::info!("Issued token for {} ({})", profile.id, profile.role);
    Ok(Json(json!({ "token": token, "role": profile.role })))
}

fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/create-payment", post(handlers::create_payment))
        .route("/verify-payment", post(handlers::verify_payment))
        .route("/cancel-booking", post(handlers::cancel_booking))
        .route("/process-refund", post(handlers::process_refund))
        .route("/bookings", get(handlers::list_bookings))
        .route("/bookings/:id/refund-preview", get(handlers::refund_preview))
        .route("/properties", post(property::create_property))
        .route("/properties/:id/reviews", post(review::create_review))
        .route("/conversations", post(message::start_conversation))
        .route(
            "/conversations/:id/messages",
            get(message::list_messages).post(message::send_message),
        )
        .route("/messages/unread-count", get(message::unread_count))
        .route("/events", get(events::events_handler))
        .route("/admin/settings", get(admin::get_settings).put(admin::update_settings))
        .route("/admin/commissions", get(admin::list_commissions))
        .route("/admin/payments/:id/release", post(admin::release_payout))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/", get(|| async { "Hello, Rental Marketplace!" }))
        .route("/login", post(login))
        .route("/properties", get(property::list_properties))
        .route("/properties/:id", get(property::get_property))
        .route("/properties/:id/quote", get(property::quote))
        .route("/properties/:id/reviews", get(review::list_reviews))
        .merge(protected_routes)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
    log::info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = Arc::new(AppConfig::load()?);
    log::info!("Loaded config: {}", config);

    let pool = db::establish_pool(&config.database_url, config.database_pool_size)?;
    let pg_store = db::PgStore::new(pool);
    let test_query = pg_store.ping().await?;
    log::info!("Database test query result: {}", test_query);

    let gateway = payments::HostedCheckoutClient::new(&config.payment_api_base, &config.payment_secret_key)?;
    log::info!("Payment provider: {}", config.payment_api_base);

    let store: Arc<dyn MarketplaceStore> = Arc::new(pg_store);
    let events = EventHub::new();
    let bookings = Arc::new(BookingService::new(
        store.clone(),
        Arc::new(gateway),
        events.clone(),
        config.clone(),
    ));
    let state = AppState {
        config: config.clone(),
        store,
        bookings,
        events,
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    log::info!("Starting server on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
