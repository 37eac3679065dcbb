//! SnazzPay - Secure Cash-on-Delivery Operations Service

use anyhow::Result;
use axum::{extract::{Path, State}, http::StatusCode, response::{IntoResponse, Response}, routing::{get, post, put}, Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

use snazzpay::config::AppConfig;
use snazzpay::domain::aggregates::{FulfillmentUpdate, Lead, Order, OrderDraft, ShaktiCard};
use snazzpay::lifecycle::{FeeSettlement, OrderLifecycleManager};
use snazzpay::reporting::{self, CommissionPolicy, OrderBookStats};
use snazzpay::services::{
    DocumentStore, LogNotifier, NatsNotifier, NotificationSender, PaymentGateway, PgDocumentStore,
    RazorpayGateway, Recipient, UnconfiguredGateway,
};
use snazzpay::SnazzError;

#[derive(Clone)]
struct AppState {
    lifecycle: Arc<OrderLifecycleManager>,
    store: Arc<dyn DocumentStore>,
    default_commission_rate: Decimal,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let db = PgPoolOptions::new().max_connections(10).connect(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(db));
    let gateway: Arc<dyn PaymentGateway> = match (&config.razorpay_key_id, &config.razorpay_key_secret) {
        (Some(id), Some(secret)) => Arc::new(RazorpayGateway::new(id.clone(), secret.clone())),
        _ => {
            tracing::warn!("razorpay credentials not set, gateway calls will fail until configured");
            Arc::new(UnconfiguredGateway)
        }
    };
    let notifier: Arc<dyn NotificationSender> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsNotifier::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unreachable, notifications will only be logged");
                Arc::new(LogNotifier)
            }
        },
        None => Arc::new(LogNotifier),
    };

    let mut lifecycle = OrderLifecycleManager::new(store.clone(), gateway, notifier, config.currency.clone());
    if let Some(email) = config.ops_email.clone() {
        lifecycle = lifecycle.with_ops_contact(Recipient {
            name: "SnazzPay Operations".into(),
            email: Some(email),
            phone: None,
        });
    }
    let state = AppState {
        lifecycle: Arc::new(lifecycle),
        store,
        default_commission_rate: config.default_commission_rate,
    };

    let app = Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "snazzpay"})) }))
        .route("/api/v1/leads", get(list_leads).post(create_lead))
        .route("/api/v1/leads/:id/verify-intent", post(verify_intent))
        .route("/api/v1/leads/:id/push-to-seller", post(push_to_seller))
        .route("/api/v1/leads/:id/cancel", post(cancel_lead))
        .route("/api/v1/leads/:id/convert", post(convert_lead))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/api/v1/orders/unread-count", get(unread_count))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/authorize", post(authorize_order))
        .route("/api/v1/orders/:id/fulfillment", put(update_fulfillment))
        .route("/api/v1/orders/:id/cancel", post(cancel_order))
        .route("/api/v1/orders/:id/cancel-with-fee", post(cancel_with_fee))
        .route("/api/v1/orders/:id/read", put(mark_read))
        .route("/api/v1/webhooks/payment", post(payment_webhook))
        .route("/api/v1/cards/:phone", get(get_card))
        .route("/api/v1/reports/summary", get(report_summary))
        .route("/api/v1/reports/commission", get(report_commission))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("🚀 SnazzPay listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}

// =============================================================================
// Error mapping
// =============================================================================

struct ApiError(SnazzError);

impl From<SnazzError> for ApiError {
    fn from(e: SnazzError) -> Self { Self(e) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self.0, "request failed");
        let status = match &self.0 {
            SnazzError::Validation(_) | SnazzError::InvalidAmount(_) | SnazzError::FeeExceedsTotal { .. } => {
                StatusCode::BAD_REQUEST
            }
            SnazzError::InvalidCancellationToken => StatusCode::FORBIDDEN,
            SnazzError::NotFound { .. } => StatusCode::NOT_FOUND,
            SnazzError::AlreadyCaptured(_)
            | SnazzError::AlreadyConverted(_)
            | SnazzError::InvalidTransition { .. }
            | SnazzError::PaymentNotFound(_) => StatusCode::CONFLICT,
            SnazzError::GatewayRejected(_) => StatusCode::BAD_GATEWAY,
            SnazzError::PartialFailure { .. }
            | SnazzError::Configuration(_)
            | SnazzError::Storage(_)
            | SnazzError::Notification(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // Partial failures carry the reconciliation details an operator needs.
        let body = match &self.0 {
            SnazzError::PartialFailure { order_id, captured, refund, reason } => json!({
                "error": self.0.to_string(),
                "partialFailure": {
                    "orderId": order_id,
                    "captured": captured,
                    "refund": refund,
                    "reason": reason,
                },
            }),
            _ => json!({ "error": self.0.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

fn invalid(e: validator::ValidationErrors) -> ApiError {
    ApiError(SnazzError::Validation(e.to_string()))
}

// =============================================================================
// Request DTOs
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct DraftRequest {
    #[validate(length(min = 1))]
    product_ordered: String,
    #[validate(range(min = 1))]
    quantity: u32,
    price: Decimal,
    #[validate(length(min = 1))]
    customer_name: String,
    #[validate(email)]
    customer_email: Option<String>,
    #[validate(length(min = 10))]
    contact_no: String,
    customer_address: String,
    pincode: String,
    seller_id: Option<String>,
    source: Option<String>,
}

impl DraftRequest {
    fn into_draft(self, default_source: &str) -> OrderDraft {
        OrderDraft {
            product_ordered: self.product_ordered,
            quantity: self.quantity,
            price: self.price,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            contact_no: self.contact_no,
            customer_address: self.customer_address,
            pincode: self.pincode,
            seller_id: self.seller_id,
            source: self.source.unwrap_or_else(|| default_source.to_string()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CheckoutRequest {
    #[serde(flatten)]
    #[validate]
    draft: DraftRequest,
    lead_id: Option<String>,
    #[serde(default)]
    capture_immediately: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeRequest {
    #[serde(default)]
    capture_immediately: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelRequest {
    cancellation_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelWithFeeRequest {
    fee_amount: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadRequest {
    is_read: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentWebhookRequest {
    gateway_order_id: String,
    payment_id: String,
}

// =============================================================================
// Handlers
// =============================================================================

async fn create_lead(State(s): State<AppState>, Json(r): Json<DraftRequest>) -> Result<(StatusCode, Json<Lead>), ApiError> {
    r.validate().map_err(invalid)?;
    let lead = s.lifecycle.create_lead(r.into_draft("Collaborator")).await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

async fn list_leads(State(s): State<AppState>) -> Result<Json<Vec<Lead>>, ApiError> {
    Ok(Json(s.lifecycle.list_leads().await?))
}

async fn verify_intent(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Lead>, ApiError> {
    Ok(Json(s.lifecycle.verify_intent(&id).await?))
}

async fn push_to_seller(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Lead>, ApiError> {
    Ok(Json(s.lifecycle.push_to_seller(&id).await?))
}

async fn cancel_lead(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Lead>, ApiError> {
    Ok(Json(s.lifecycle.cancel_lead(&id).await?))
}

async fn convert_lead(State(s): State<AppState>, Path(id): Path<String>) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = s.lifecycle.convert_lead(&id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> Result<(StatusCode, Json<Order>), ApiError> {
    r.validate().map_err(invalid)?;
    let order = s
        .lifecycle
        .checkout_authorize(r.draft.into_draft("Shopify"), r.lead_id.as_deref(), r.capture_immediately)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn create_order(State(s): State<AppState>, Json(r): Json<DraftRequest>) -> Result<(StatusCode, Json<Order>), ApiError> {
    r.validate().map_err(invalid)?;
    let order = s.lifecycle.create_order(r.into_draft("Seller")).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(State(s): State<AppState>) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(s.lifecycle.list_orders().await?))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<String>) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.lifecycle.get_order(&id).await?))
}

async fn authorize_order(
    State(s): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<AuthorizeRequest>>,
) -> Result<Json<Order>, ApiError> {
    let r = body.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(s.lifecycle.authorize_order(&id, r.capture_immediately).await?))
}

async fn update_fulfillment(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<FulfillmentUpdate>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.lifecycle.update_fulfillment(&id, update).await?))
}

async fn cancel_order(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(r): Json<CancelRequest>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.lifecycle.cancel_before_dispatch(&id, &r.cancellation_id).await?))
}

async fn cancel_with_fee(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(r): Json<CancelWithFeeRequest>,
) -> Result<Json<FeeSettlement>, ApiError> {
    Ok(Json(s.lifecycle.cancel_with_fee(&id, r.fee_amount).await?))
}

async fn mark_read(
    State(s): State<AppState>,
    Path(id): Path<String>,
    Json(r): Json<ReadRequest>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(s.lifecycle.mark_read(&id, r.is_read).await?))
}

async fn unread_count(State(s): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let count = s.lifecycle.unread_count().await?;
    Ok(Json(json!({ "unread": count })))
}

async fn payment_webhook(
    State(s): State<AppState>,
    Json(r): Json<PaymentWebhookRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    s.lifecycle.record_payment(&r.gateway_order_id, &r.payment_id).await?;
    Ok(Json(json!({ "status": "recorded" })))
}

async fn get_card(State(s): State<AppState>, Path(phone): Path<String>) -> Result<Json<ShaktiCard>, ApiError> {
    s.lifecycle
        .find_card(&phone)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError(SnazzError::NotFound { kind: "card", id: phone }))
}

async fn report_summary(State(s): State<AppState>) -> Result<Json<OrderBookStats>, ApiError> {
    let orders = s.lifecycle.list_orders().await?;
    let leads = s.lifecycle.list_leads().await?;
    Ok(Json(reporting::order_book_stats(&orders, &leads)))
}

async fn report_commission(State(s): State<AppState>) -> Result<Json<HashMap<String, Decimal>>, ApiError> {
    let orders = s.lifecycle.list_orders().await?;
    let mut policy = CommissionPolicy::new(s.default_commission_rate);
    // Per-seller overrides live in their own collection: { id, rate }.
    for doc in s.store.get_collection("commission_rates").await? {
        let rate = serde_json::from_value::<Decimal>(doc["rate"].clone()).ok();
        if let (Some(id), Some(rate)) = (doc["id"].as_str(), rate) {
            policy = policy.with_override(id, rate);
        }
    }
    Ok(Json(reporting::commission_by_seller(&orders, &policy)))
}
