//! REST surface over the [`OrderDesk`].
//!
//! Success bodies are wrapped as `{ "result": ... }`; failures carry
//! `{ "error": <code>, "message": <text> }` with a status derived from the
//! error kind.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, warn};
use validator::Validate;

use crate::client::ErrorBody;
use crate::config::TokenTable;
use crate::desk::{Actor, NewOrder, OrderDesk};
use crate::domain::aggregates::{Decision, OrderStatus, RequestType};
use crate::domain::value_objects::{OrderId, ProductId, Quantity, RequestId, UserId, VariantId, WarehouseId};
use crate::{CoordinatorError, Result};

#[derive(Clone)]
pub struct AppState {
    pub desk: Arc<OrderDesk>,
    pub tokens: Arc<TokenTable>,
}

impl AppState {
    pub fn new(desk: Arc<OrderDesk>, tokens: TokenTable) -> Self { Self { desk, tokens: Arc::new(tokens) } }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "storefront-orders"})) }))
        .route("/api/orders", post(place_order))
        .route("/api/orders/:id", get(get_order))
        .route("/api/orders/:id/status", put(update_status))
        .route("/api/orders/:id/payment", post(start_payment))
        .route("/api/orders/:id/payment/callback", post(payment_callback))
        .route("/api/requests", get(list_requests).post(create_request))
        .route("/api/requests/stats", get(request_stats))
        .route("/api/requests/:id/status", put(review_request))
        .route("/api/requests/:id/note", put(edit_note))
        .route("/api/stocks/products/:id/total-quantities", get(total_quantities))
        .route("/api/stocks/:id/items", get(stock_items))
        .route("/api/stocks/:id/items/:variant", put(set_stock))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// =============================================================================
// Envelope, errors, authentication
// =============================================================================

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub result: T,
}

fn ok<T: Serialize>(result: T) -> Json<Envelope<T>> { Json(Envelope { result }) }

impl CoordinatorError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthExpired => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateRequest { .. } | Self::InvalidState(_) => StatusCode::CONFLICT,
            Self::TransitionNotAllowed(_) | Self::PaymentUnsupported(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PaymentDeclined => StatusCode::PAYMENT_REQUIRED,
            Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::FetchTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "request failed");
        } else {
            warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ErrorBody { error: self.code().to_string(), message: self.user_message() };
        (status, Json(body)).into_response()
    }
}

/// Caller resolved from `Authorization: Bearer <token>`.
pub struct Authenticated(pub Actor);

#[async_trait]
impl FromRequestParts<AppState> for Authenticated {
    type Rejection = CoordinatorError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .ok_or(CoordinatorError::AuthExpired)?;
        state.tokens.resolve(token).cloned().map(Authenticated).ok_or(CoordinatorError::AuthExpired)
    }
}

// =============================================================================
// Orders
// =============================================================================

async fn place_order(
    State(s): State<AppState>,
    Authenticated(actor): Authenticated,
    Json(body): Json<NewOrder>,
) -> Result<impl IntoResponse> {
    let order = s.desk.place_order(&actor, body).await?;
    Ok((StatusCode::CREATED, ok(order)))
}

async fn get_order(State(s): State<AppState>, Authenticated(actor): Authenticated, Path(id): Path<OrderId>) -> Result<impl IntoResponse> {
    Ok(ok(s.desk.order(&actor, &id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    order_id: Option<OrderId>,
    status: String,
}

async fn update_status(
    State(s): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse> {
    if body.order_id.as_ref().is_some_and(|o| o != &id) {
        return Err(CoordinatorError::Validation("orderId does not match the path".into()));
    }
    let status = OrderStatus::from_str(&body.status)?;
    Ok(ok(s.desk.update_status(&actor, &id, status).await?))
}

async fn start_payment(State(s): State<AppState>, Authenticated(actor): Authenticated, Path(id): Path<OrderId>) -> Result<impl IntoResponse> {
    Ok(ok(s.desk.start_payment(&actor, &id).await?))
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    success: bool,
}

async fn payment_callback(
    State(s): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<OrderId>,
    Json(body): Json<CallbackBody>,
) -> Result<impl IntoResponse> {
    Ok(ok(s.desk.payment_callback(&actor, &id, body.success).await?))
}

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestListParams {
    order_id: Option<OrderId>,
}

async fn list_requests(
    State(s): State<AppState>,
    Authenticated(actor): Authenticated,
    Query(p): Query<RequestListParams>,
) -> Result<impl IntoResponse> {
    let requests = match p.order_id {
        Some(order_id) => s.desk.requests_for_order(&actor, &order_id).await?,
        None => s.desk.all_requests(&actor).await?,
    };
    Ok(ok(requests))
}

#[derive(Debug, Deserialize)]
struct Ref<T> {
    id: T,
}

#[derive(Debug, Deserialize, Validate)]
struct CreateRequestBody {
    order: Ref<OrderId>,
    user: Ref<UserId>,
    #[serde(rename = "type")]
    kind: RequestType,
    #[validate(length(min = 1, max = 1000, message = "reason must be between 1 and 1000 characters"))]
    reason: String,
}

async fn create_request(
    State(s): State<AppState>,
    Authenticated(actor): Authenticated,
    Json(body): Json<CreateRequestBody>,
) -> Result<impl IntoResponse> {
    body.validate()?;
    if body.user.id != actor.user_id {
        return Err(CoordinatorError::Forbidden);
    }
    let request = s.desk.file_request(&actor, &body.order.id, body.kind, &body.reason).await?;
    Ok((StatusCode::CREATED, ok(request)))
}

async fn request_stats(State(s): State<AppState>, Authenticated(actor): Authenticated) -> Result<impl IntoResponse> {
    Ok(ok(s.desk.request_stats(&actor).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviewParams {
    status: String,
    admin_note: Option<String>,
}

async fn review_request(
    State(s): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<RequestId>,
    Query(p): Query<ReviewParams>,
) -> Result<impl IntoResponse> {
    let decision = Decision::from_str(&p.status)?;
    Ok(ok(s.desk.review_request(&actor, &id, decision, p.admin_note).await?))
}

#[derive(Debug, Deserialize)]
struct NoteBody {
    note: String,
}

async fn edit_note(
    State(s): State<AppState>,
    Authenticated(actor): Authenticated,
    Path(id): Path<RequestId>,
    Json(body): Json<NoteBody>,
) -> Result<impl IntoResponse> {
    Ok(ok(s.desk.edit_note(&actor, &id, &body.note).await?))
}

// =============================================================================
// Stock
// =============================================================================

async fn total_quantities(State(s): State<AppState>, Path(id): Path<ProductId>) -> Result<impl IntoResponse> {
    Ok(ok(s.desk.total_quantities(&id).await?))
}

async fn stock_items(State(s): State<AppState>, Path(id): Path<WarehouseId>) -> Result<impl IntoResponse> {
    Ok(ok(s.desk.warehouse_items(&id).await?))
}

#[derive(Debug, Deserialize)]
struct QuantityBody {
    quantity: Quantity,
}

async fn set_stock(
    State(s): State<AppState>,
    Authenticated(actor): Authenticated,
    Path((warehouse, variant)): Path<(WarehouseId, VariantId)>,
    Json(body): Json<QuantityBody>,
) -> Result<impl IntoResponse> {
    s.desk.set_stock(&actor, &warehouse, &variant, body.quantity).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(CoordinatorError::AuthExpired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(CoordinatorError::DuplicateRequest { order_id: "O1".into(), kind: RequestType::Cancel }.status_code(), StatusCode::CONFLICT);
        assert_eq!(CoordinatorError::TransitionNotAllowed("x".into()).status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(CoordinatorError::FetchTimeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_create_request_body_shape() {
        let body: CreateRequestBody = serde_json::from_str(
            r#"{"order":{"id":"O1"},"user":{"id":"U1"},"type":"RETURN","reason":"too small"}"#,
        )
        .unwrap();
        assert_eq!(body.kind, RequestType::Return);
        assert!(body.validate().is_ok());
        let empty: CreateRequestBody =
            serde_json::from_str(r#"{"order":{"id":"O1"},"user":{"id":"U1"},"type":"CANCEL","reason":""}"#).unwrap();
        assert!(empty.validate().is_err());
    }
}
