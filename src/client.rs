//! REST client for the storefront backend.
//!
//! Credentials are passed into every call rather than read from ambient
//! storage. Client-side checks (empty reason, duplicate requests, status
//! guards, missing reject note) fail before any write reaches the backend.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::desk::{PaymentGateway, PaymentOutcome};
use crate::domain::aggregates::{Decision, Order, OrderStatus, PaymentMethod, Request, RequestType, StockItem};
use crate::domain::value_objects::{OrderId, ProductId, Reason, RequestId, UserId, WarehouseId};
use crate::stock::{QuantityMap, StockSource};
use crate::workflow::{DuplicatePolicy, RequestFlags, RequestStats};
use crate::{CoordinatorError, Result};

/// Bearer token for one user session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
}

impl Credentials {
    pub fn bearer(token: impl Into<String>) -> Self { Self { token: token.into() } }
    pub fn token(&self) -> &str { &self.token }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("Credentials(***)") }
}

/// `{ result: ... }` or `{ data: ... }`; neither present means empty.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_inner(self) -> Option<T> { self.result.or(self.data) }
}

/// Error body returned by the backend on non-2xx responses.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize)]
struct Ref<'a> { id: &'a str }

#[derive(Serialize)]
struct CreateRequestBody<'a> {
    order: Ref<'a>,
    user: Ref<'a>,
    #[serde(rename = "type")]
    kind: RequestType,
    reason: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody<'a> {
    order_id: &'a OrderId,
    status: OrderStatus,
}

#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    duplicate_policy: DuplicatePolicy,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoordinatorError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self::with_client(base_url, http))
    }

    /// Build from an existing client (useful for testing).
    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url, duplicate_policy: DuplicatePolicy::default() }
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// A [`StockSource`] bound to one set of credentials.
    pub fn stock_source(&self, credentials: Credentials) -> BackendStockSource {
        BackendStockSource { client: self.clone(), credentials }
    }

    fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

    fn get(&self, credentials: &Credentials, path: &str) -> RequestBuilder {
        self.http.get(self.url(path)).bearer_auth(credentials.token())
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    #[instrument(skip(self, credentials))]
    pub async fn order(&self, credentials: &Credentials, id: &OrderId) -> Result<Order> {
        let response = send(self.get(credentials, &format!("/api/orders/{id}"))).await?;
        decode::<Order>(response, "order").await?.ok_or_else(|| CoordinatorError::NotFound(format!("order {id}")))
    }

    /// Administrator status write. Statuses outside the allow-list are refused locally.
    #[instrument(skip(self, credentials))]
    pub async fn update_order_status(&self, credentials: &Credentials, id: &OrderId, status: OrderStatus) -> Result<Order> {
        if !status.is_admin_assignable() {
            return Err(CoordinatorError::TransitionNotAllowed(format!("status {status} cannot be assigned by an administrator")));
        }
        let request = self
            .http
            .put(self.url(&format!("/api/orders/{id}/status")))
            .bearer_auth(credentials.token())
            .json(&StatusBody { order_id: id, status });
        let response = send(request).await?;
        decode::<Order>(response, "order").await?.ok_or_else(|| CoordinatorError::NotFound(format!("order {id}")))
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    pub async fn requests_for_order(&self, credentials: &Credentials, order_id: &OrderId) -> Result<Vec<Request>> {
        let request = self.get(credentials, "/api/requests").query(&[("orderId", order_id.as_str())]);
        Ok(decode(send(request).await?, "requests").await?.unwrap_or_default())
    }

    pub async fn request_flags(&self, credentials: &Credentials, order_id: &OrderId) -> Result<RequestFlags> {
        let requests = self.requests_for_order(credentials, order_id).await?;
        Ok(RequestFlags {
            has_cancel_request: requests.iter().any(|r| r.kind() == RequestType::Cancel),
            has_return_request: requests.iter().any(|r| r.kind() == RequestType::Return),
        })
    }

    /// Files a request after checking the reason, existing requests and the order status.
    #[instrument(skip(self, credentials, order, reason), fields(order_id = %order.id()))]
    pub async fn create_request(
        &self,
        credentials: &Credentials,
        order: &Order,
        user: &UserId,
        kind: RequestType,
        reason: &str,
    ) -> Result<Request> {
        let reason = Reason::new(reason)?;
        let existing = self.requests_for_order(credentials, order.id()).await?;
        if existing.iter().any(|r| r.kind() == kind && self.duplicate_policy.blocks(r)) {
            return Err(CoordinatorError::DuplicateRequest { order_id: order.id().clone(), kind });
        }
        if !order.status().accepts_request(kind) {
            return Err(CoordinatorError::InvalidState(format!("a {kind} request cannot be filed while the order is {}", order.status())));
        }

        let body = CreateRequestBody {
            order: Ref { id: order.id().as_str() },
            user: Ref { id: user.as_str() },
            kind,
            reason: reason.as_str(),
        };
        let response = self
            .http
            .post(self.url("/api/requests"))
            .bearer_auth(credentials.token())
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::CONFLICT {
            let body = response.json::<ErrorBody>().await.unwrap_or_default();
            if body.error == "duplicate_request" {
                return Err(CoordinatorError::DuplicateRequest { order_id: order.id().clone(), kind });
            }
            return Err(CoordinatorError::InvalidState(body.message));
        }
        let response = check(response).await?;
        decode::<Request>(response, "request").await?.ok_or_else(|| CoordinatorError::Network("empty response to request creation".into()))
    }

    pub async fn all_requests(&self, credentials: &Credentials) -> Result<Vec<Request>> {
        Ok(decode(send(self.get(credentials, "/api/requests")).await?, "requests").await?.unwrap_or_default())
    }

    pub async fn request_stats(&self, credentials: &Credentials) -> Result<RequestStats> {
        Ok(decode(send(self.get(credentials, "/api/requests/stats")).await?, "request stats").await?.unwrap_or_default())
    }

    /// Best-effort stats refresh; a failure is logged and yields `None`.
    pub async fn refresh_stats(&self, credentials: &Credentials) -> Option<RequestStats> {
        match self.request_stats(credentials).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "request stats refresh failed");
                None
            }
        }
    }

    #[instrument(skip(self, credentials, admin_note))]
    pub async fn review_request(
        &self,
        credentials: &Credentials,
        id: &RequestId,
        decision: Decision,
        admin_note: Option<&str>,
    ) -> Result<Request> {
        let note = admin_note.map(str::trim).filter(|n| !n.is_empty());
        if decision == Decision::Rejected && note.is_none() {
            return Err(CoordinatorError::Validation("an admin note is required when rejecting".into()));
        }
        let status = match decision { Decision::Approved => "APPROVED", Decision::Rejected => "REJECTED" };
        let mut query = vec![("status", status)];
        if let Some(note) = note {
            query.push(("adminNote", note));
        }
        let request = self
            .http
            .put(self.url(&format!("/api/requests/{id}/status")))
            .bearer_auth(credentials.token())
            .query(&query);
        decode::<Request>(send(request).await?, "request").await?.ok_or_else(|| CoordinatorError::NotFound(format!("request {id}")))
    }

    pub async fn edit_note(&self, credentials: &Credentials, id: &RequestId, note: &str) -> Result<Request> {
        let request = self
            .http
            .put(self.url(&format!("/api/requests/{id}/note")))
            .bearer_auth(credentials.token())
            .json(&serde_json::json!({ "note": note }));
        decode::<Request>(send(request).await?, "request").await?.ok_or_else(|| CoordinatorError::NotFound(format!("request {id}")))
    }

    // -------------------------------------------------------------------------
    // Stock
    // -------------------------------------------------------------------------

    pub async fn total_quantities(&self, credentials: &Credentials, product: &ProductId) -> Result<QuantityMap> {
        let path = format!("/api/stocks/products/{product}/total-quantities");
        let totals: HashMap<String, i64> = decode(send(self.get(credentials, &path)).await?, "total quantities").await?.unwrap_or_default();
        Ok(QuantityMap::from_reported(totals))
    }

    pub async fn warehouse_items(&self, credentials: &Credentials, warehouse: &WarehouseId) -> Result<Vec<StockItem>> {
        let path = format!("/api/stocks/{warehouse}/items");
        Ok(decode(send(self.get(credentials, &path)).await?, "stock items").await?.unwrap_or_default())
    }

    pub async fn warehouse_quantities(&self, credentials: &Credentials, warehouse: &WarehouseId, product: &ProductId) -> Result<QuantityMap> {
        let items = self.warehouse_items(credentials, warehouse).await?;
        Ok(QuantityMap::from_reported(
            items
                .into_iter()
                .filter(|item| &item.product_id == product)
                .flat_map(|item| item.variants)
                .map(|v| (v.id, v.quantity)),
        ))
    }
}

/// Stock fetches for one signed-in session.
#[derive(Clone)]
pub struct BackendStockSource {
    client: BackendClient,
    credentials: Credentials,
}

#[async_trait]
impl StockSource for BackendStockSource {
    async fn total_quantities(&self, product: &ProductId) -> Result<QuantityMap> {
        self.client.total_quantities(&self.credentials, product).await
    }

    async fn warehouse_quantities(&self, warehouse: &WarehouseId, product: &ProductId) -> Result<QuantityMap> {
        self.client.warehouse_quantities(&self.credentials, warehouse, product).await
    }
}

async fn send(request: RequestBuilder) -> Result<Response> {
    let response = request.send().await.map_err(transport_error)?;
    check(response).await
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().path().to_string();
    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    debug!(%status, %url, code = %body.error, "backend returned an error");
    Err(error_from_status(status, body, &url))
}

/// Maps a non-2xx response onto an error kind.
pub fn error_from_status(status: StatusCode, body: ErrorBody, resource: &str) -> CoordinatorError {
    match status {
        StatusCode::UNAUTHORIZED => CoordinatorError::AuthExpired,
        StatusCode::FORBIDDEN => CoordinatorError::Forbidden,
        StatusCode::NOT_FOUND => CoordinatorError::NotFound(resource.to_string()),
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => CoordinatorError::FetchTimeout,
        _ => match body.error.as_str() {
            "validation_error" => CoordinatorError::Validation(body.message),
            "invalid_state" => CoordinatorError::InvalidState(body.message),
            "transition_not_allowed" => CoordinatorError::TransitionNotAllowed(body.message),
            "payment_unsupported" => CoordinatorError::PaymentUnsupported(body.message),
            "payment_declined" => CoordinatorError::PaymentDeclined,
            _ => CoordinatorError::Network(format!("unexpected status {status}")),
        },
    }
}

fn transport_error(e: reqwest::Error) -> CoordinatorError {
    if e.is_timeout() {
        CoordinatorError::FetchTimeout
    } else {
        CoordinatorError::Network(e.to_string())
    }
}

async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<Option<T>> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let envelope: Envelope<T> =
        serde_json::from_slice(&bytes).map_err(|e| CoordinatorError::Network(format!("invalid {what} response: {e}")))?;
    Ok(envelope.into_inner())
}

/// Payment provider reached over HTTP. Any 2xx is an approval.
pub struct HttpPaymentGateway {
    http: Client,
    endpoint: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentBody<'a> {
    order_id: &'a OrderId,
    amount: Decimal,
    currency: &'a str,
    method: PaymentMethod,
}

impl HttpPaymentGateway {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoordinatorError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self { http, endpoint: endpoint.into() })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initiate(&self, order: &Order) -> Result<PaymentOutcome> {
        let body = PaymentBody {
            order_id: order.id(),
            amount: order.total().amount(),
            currency: order.total().currency(),
            method: order.payment_method(),
        };
        let response = self.http.post(&self.endpoint).json(&body).send().await.map_err(transport_error)?;
        Ok(if response.status().is_success() { PaymentOutcome::Approved } else { PaymentOutcome::Declined })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(error_from_status(StatusCode::UNAUTHORIZED, ErrorBody::default(), "/x"), CoordinatorError::AuthExpired));
        assert!(matches!(error_from_status(StatusCode::FORBIDDEN, ErrorBody::default(), "/x"), CoordinatorError::Forbidden));
        assert!(matches!(error_from_status(StatusCode::NOT_FOUND, ErrorBody::default(), "/x"), CoordinatorError::NotFound(_)));
        let body = ErrorBody { error: "invalid_state".into(), message: "already reviewed".into() };
        assert!(matches!(error_from_status(StatusCode::CONFLICT, body, "/x"), CoordinatorError::InvalidState(m) if m == "already reviewed"));
        assert!(matches!(error_from_status(StatusCode::BAD_GATEWAY, ErrorBody::default(), "/x"), CoordinatorError::Network(_)));
    }

    #[test]
    fn test_envelope_prefers_result_then_data() {
        let e: Envelope<u32> = serde_json::from_str(r#"{"data": 2}"#).unwrap();
        assert_eq!(e.into_inner(), Some(2));
        let e: Envelope<u32> = serde_json::from_str(r#"{"result": 1, "data": 2}"#).unwrap();
        assert_eq!(e.into_inner(), Some(1));
        let e: Envelope<u32> = serde_json::from_str("{}").unwrap();
        assert_eq!(e.into_inner(), None);
    }

    #[test]
    fn test_credentials_are_redacted() {
        assert_eq!(format!("{:?}", Credentials::bearer("secret")), "Credentials(***)");
    }
}
