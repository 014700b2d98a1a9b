//! Domain events
use crate::domain::aggregates::{OrderStatus, RequestStatus, RequestType};
use crate::domain::value_objects::{OrderId, Quantity, RequestId, UserId, VariantId, WarehouseId};
use rust_decimal::Decimal;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Request(RequestEvent),
    Stock(StockEvent),
}

impl DomainEvent {
    /// Subject suffix, e.g. `order.status_changed`.
    pub fn subject(&self) -> String {
        let (aggregate, event) = match self {
            Self::Order(e) => ("order", e.name()),
            Self::Request(e) => ("request", e.name()),
            Self::Stock(e) => ("stock", e.name()),
        };
        format!("{aggregate}.{event}")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: OrderId, customer_id: UserId, status: OrderStatus, total: Decimal },
    StatusChanged { order_id: OrderId, from: OrderStatus, to: OrderStatus },
    Cancelled { order_id: OrderId, request_id: RequestId },
    PaymentSettled { order_id: OrderId, success: bool },
}

impl OrderEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "placed",
            Self::StatusChanged { .. } => "status_changed",
            Self::Cancelled { .. } => "cancelled",
            Self::PaymentSettled { .. } => "payment_settled",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestEvent {
    Filed { request_id: RequestId, order_id: OrderId, kind: RequestType },
    Reviewed { request_id: RequestId, order_id: OrderId, kind: RequestType, status: RequestStatus },
    NoteEdited { request_id: RequestId },
}

impl RequestEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Filed { .. } => "filed",
            Self::Reviewed { .. } => "reviewed",
            Self::NoteEdited { .. } => "note_edited",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StockEvent {
    QuantitySet { warehouse_id: WarehouseId, variant_id: VariantId, quantity: Quantity },
}

impl StockEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::QuantitySet { .. } => "quantity_set",
        }
    }
}
