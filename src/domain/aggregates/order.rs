//! Order Aggregate
//!
//! Holds the canonical order status table: which statuses exist, which an
//! administrator may assign, and which gate the customer request workflow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::aggregates::request::RequestType;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{Money, MoneyError, OrderId, ProductId, RequestId, UserId, VariantId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    AwaitingPayment,
    Confirmed,
    Processing,
    #[serde(alias = "SHIPPING")]
    InTransit,
    PendingReceipt,
    Delivered,
    Cancelled,
    ReturnRequested,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 9] = [
        Self::Pending, Self::AwaitingPayment, Self::Confirmed, Self::Processing, Self::InTransit,
        Self::PendingReceipt, Self::Delivered, Self::Cancelled, Self::ReturnRequested,
    ];

    /// Statuses an administrator may assign directly.
    pub const ADMIN_ASSIGNABLE: [OrderStatus; 6] = [
        Self::Pending, Self::Confirmed, Self::Processing, Self::InTransit, Self::PendingReceipt, Self::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::Confirmed => "CONFIRMED",
            Self::Processing => "PROCESSING",
            Self::InTransit => "IN_TRANSIT",
            Self::PendingReceipt => "PENDING_RECEIPT",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::ReturnRequested => "RETURN_REQUESTED",
        }
    }

    pub fn initial_for(method: PaymentMethod) -> Self {
        if method.requires_upfront_payment() { Self::AwaitingPayment } else { Self::Pending }
    }

    pub fn is_admin_assignable(&self) -> bool { Self::ADMIN_ASSIGNABLE.contains(self) }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Cancelled | Self::Delivered) }

    /// Whether a customer may file a request of `kind` while the order is in this status.
    pub fn accepts_request(&self, kind: RequestType) -> bool {
        match kind {
            RequestType::Cancel => matches!(self, Self::Pending | Self::Confirmed | Self::AwaitingPayment),
            RequestType::Return => *self == Self::Delivered,
        }
    }

    /// Position along the fulfilment sequence; `None` for side states.
    fn forward_rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::Confirmed => Some(1),
            Self::Processing => Some(2),
            Self::InTransit => Some(3),
            Self::PendingReceipt => Some(4),
            Self::Delivered => Some(5),
            Self::AwaitingPayment | Self::Cancelled | Self::ReturnRequested => None,
        }
    }

    pub fn presentation(&self) -> StatusPresentation {
        let (label, tone) = match self {
            Self::Pending => ("Pending confirmation", Tone::Warning),
            Self::AwaitingPayment => ("Awaiting payment", Tone::Warning),
            Self::Confirmed => ("Confirmed", Tone::Info),
            Self::Processing => ("Processing", Tone::Info),
            Self::InTransit => ("In transit", Tone::Info),
            Self::PendingReceipt => ("Awaiting receipt", Tone::Info),
            Self::Delivered => ("Delivered", Tone::Success),
            Self::Cancelled => ("Cancelled", Tone::Danger),
            Self::ReturnRequested => ("Return requested", Tone::Neutral),
        };
        StatusPresentation { label, tone }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        if normalized == "SHIPPING" {
            return Ok(Self::InTransit);
        }
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Display attributes shared by every screen that renders a status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StatusPresentation {
    pub label: &'static str,
    pub tone: Tone,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone { Neutral, Info, Warning, Success, Danger }

/// How strictly administrator status writes are checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// Any allow-listed status from any current status.
    #[default]
    Permissive,
    /// Allow-listed, forward-only, and never out of a terminal or return state.
    Strict,
}

impl TransitionPolicy {
    pub fn check(&self, from: OrderStatus, to: OrderStatus) -> Result<(), OrderError> {
        if !to.is_admin_assignable() {
            return Err(OrderError::NotAssignable(to));
        }
        if *self == Self::Permissive {
            return Ok(());
        }
        if from.is_terminal() || from == OrderStatus::ReturnRequested {
            return Err(OrderError::TransitionNotAllowed { from, to });
        }
        match (from.forward_rank(), to.forward_rank()) {
            (Some(a), Some(b)) if b < a => Err(OrderError::TransitionNotAllowed { from, to }),
            _ => Ok(()),
        }
    }
}

impl FromStr for TransitionPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(Self::Permissive),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown transition policy `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod { CashOnDelivery, Card, EWallet, BankTransfer }

impl PaymentMethod {
    pub fn requires_upfront_payment(&self) -> bool { !matches!(self, Self::CashOnDelivery) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
}

impl OrderItem {
    pub fn new(product_id: ProductId, variant_id: VariantId, name: impl Into<String>, quantity: u32, unit_price: Money) -> Self {
        let subtotal = unit_price.multiply(quantity);
        Self { product_id, variant_id, name: name.into(), quantity, unit_price, subtotal }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingDetails {
    pub recipient: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: String,
    pub note: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    customer_id: UserId,
    status: OrderStatus,
    payment_method: PaymentMethod,
    items: Vec<OrderItem>,
    subtotal: Money,
    discount: Money,
    shipping_fee: Money,
    total: Money,
    shipping: ShippingDetails,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

impl Order {
    pub fn place(
        customer_id: UserId,
        items: Vec<OrderItem>,
        discount: Money,
        shipping_fee: Money,
        shipping: ShippingDetails,
        payment_method: PaymentMethod,
    ) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        if items.iter().any(|i| i.quantity == 0) { return Err(OrderError::InvalidQuantity); }
        if discount.is_negative() { return Err(OrderError::NegativeAmount("discount")); }
        if shipping_fee.is_negative() { return Err(OrderError::NegativeAmount("shipping fee")); }

        let currency = items[0].unit_price.currency().to_string();
        let subtotal = items.iter().try_fold(Money::zero(&currency), |acc, i| acc.add(&i.subtotal))?;
        let total = subtotal.saturating_sub(&discount)?.add(&shipping_fee)?;
        let now = Utc::now();
        let mut order = Self {
            id: OrderId::generate(), customer_id, status: OrderStatus::initial_for(payment_method), payment_method,
            items, subtotal, discount, shipping_fee, total, shipping, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed {
            order_id: order.id.clone(), customer_id: order.customer_id.clone(), status: order.status, total: order.total.amount(),
        }));
        Ok(order)
    }

    pub fn id(&self) -> &OrderId { &self.id }
    pub fn customer_id(&self) -> &UserId { &self.customer_id }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn items(&self) -> &[OrderItem] { &self.items }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn discount(&self) -> &Money { &self.discount }
    pub fn shipping_fee(&self) -> &Money { &self.shipping_fee }
    pub fn total(&self) -> &Money { &self.total }
    pub fn shipping(&self) -> &ShippingDetails { &self.shipping }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Administrator status write, checked against the allow-list and `policy`.
    pub fn assign_status(&mut self, to: OrderStatus, policy: TransitionPolicy) -> Result<(), OrderError> {
        policy.check(self.status, to)?;
        self.transition(to);
        Ok(())
    }

    /// Applied when a CANCEL request is approved.
    pub fn cancel_for_request(&mut self, request_id: RequestId) -> Result<(), OrderError> {
        if !self.status.accepts_request(RequestType::Cancel) {
            return Err(OrderError::NotCancellable(self.status));
        }
        self.transition(OrderStatus::Cancelled);
        self.raise_event(DomainEvent::Order(OrderEvent::Cancelled { order_id: self.id.clone(), request_id }));
        Ok(())
    }

    /// Applied when a RETURN request is filed.
    pub fn mark_return_requested(&mut self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Delivered {
            return Err(OrderError::TransitionNotAllowed { from: self.status, to: OrderStatus::ReturnRequested });
        }
        self.transition(OrderStatus::ReturnRequested);
        Ok(())
    }

    /// Applied when a RETURN request is rejected.
    pub fn withdraw_return(&mut self) {
        if self.status == OrderStatus::ReturnRequested {
            self.transition(OrderStatus::Delivered);
        }
    }

    pub fn ensure_payable(&self) -> Result<(), OrderError> {
        if !self.payment_method.requires_upfront_payment() {
            return Err(OrderError::PaymentUnsupported(self.payment_method));
        }
        if self.status != OrderStatus::AwaitingPayment {
            return Err(OrderError::NotAwaitingPayment(self.status));
        }
        Ok(())
    }

    /// Outcome reported by the payment collaborator.
    pub fn settle_payment(&mut self, success: bool) -> Result<(), OrderError> {
        self.ensure_payable()?;
        if success {
            self.transition(OrderStatus::Pending);
        } else {
            self.touch();
        }
        self.raise_event(DomainEvent::Order(OrderEvent::PaymentSettled { order_id: self.id.clone(), success }));
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }

    fn transition(&mut self, to: OrderStatus) {
        let from = self.status;
        self.status = to;
        self.touch();
        if from != to {
            self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id.clone(), from, to }));
        }
    }

    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("item quantity must be at least 1")]
    InvalidQuantity,
    #[error("{0} cannot be negative")]
    NegativeAmount(&'static str),
    #[error("order amounts use different currencies")]
    CurrencyMismatch,
    #[error("unknown order status `{0}`")]
    UnknownStatus(String),
    #[error("status {0} cannot be assigned by an administrator")]
    NotAssignable(OrderStatus),
    #[error("cannot move order from {from} to {to}")]
    TransitionNotAllowed { from: OrderStatus, to: OrderStatus },
    #[error("order in status {0} can no longer be cancelled")]
    NotCancellable(OrderStatus),
    #[error("payment method {0:?} does not support online payment")]
    PaymentUnsupported(PaymentMethod),
    #[error("order in status {0} is not awaiting payment")]
    NotAwaitingPayment(OrderStatus),
}

impl From<MoneyError> for OrderError {
    fn from(_: MoneyError) -> Self { Self::CurrencyMismatch }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn order(method: PaymentMethod) -> Order {
        let item = OrderItem::new("P1".into(), "V1".into(), "Tee", 2, Money::usd(Decimal::new(10, 0)));
        Order::place("U1".into(), vec![item], Money::usd(Decimal::new(5, 0)), Money::usd(Decimal::new(3, 0)), ShippingDetails::default(), method).unwrap()
    }

    #[test]
    fn test_initial_status_follows_payment_method() {
        assert_eq!(order(PaymentMethod::CashOnDelivery).status(), OrderStatus::Pending);
        assert_eq!(order(PaymentMethod::Card).status(), OrderStatus::AwaitingPayment);
    }

    #[test]
    fn test_totals() {
        let o = order(PaymentMethod::CashOnDelivery);
        assert_eq!(o.subtotal().amount(), Decimal::new(20, 0));
        assert_eq!(o.total().amount(), Decimal::new(18, 0));
    }

    #[test]
    fn test_negative_discount_or_fee_is_rejected() {
        let item = || OrderItem::new("P1".into(), "V1".into(), "Tee", 1, Money::usd(Decimal::new(10, 0)));
        let placed = |discount: i64, fee: i64| {
            Order::place("U1".into(), vec![item()], Money::usd(Decimal::new(discount, 0)), Money::usd(Decimal::new(fee, 0)),
                ShippingDetails::default(), PaymentMethod::CashOnDelivery)
        };
        assert_eq!(placed(0, -100).unwrap_err(), OrderError::NegativeAmount("shipping fee"));
        assert_eq!(placed(-5, 0).unwrap_err(), OrderError::NegativeAmount("discount"));
        assert_eq!(placed(50, 0).unwrap().total().amount(), Decimal::ZERO);
    }

    #[test]
    fn test_shipping_alias_parses_to_in_transit() {
        assert_eq!("SHIPPING".parse::<OrderStatus>().unwrap(), OrderStatus::InTransit);
        let parsed: OrderStatus = serde_json::from_str("\"SHIPPING\"").unwrap();
        assert_eq!(parsed, OrderStatus::InTransit);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"IN_TRANSIT\"");
    }

    #[test]
    fn test_permissive_allows_any_allow_listed_target() {
        let mut o = order(PaymentMethod::CashOnDelivery);
        o.assign_status(OrderStatus::Delivered, TransitionPolicy::Permissive).unwrap();
        o.assign_status(OrderStatus::Pending, TransitionPolicy::Permissive).unwrap();
        assert_eq!(o.status(), OrderStatus::Pending);
    }

    #[test]
    fn test_side_states_are_never_assignable() {
        let mut o = order(PaymentMethod::CashOnDelivery);
        for to in [OrderStatus::Cancelled, OrderStatus::ReturnRequested, OrderStatus::AwaitingPayment] {
            assert_eq!(o.assign_status(to, TransitionPolicy::Permissive), Err(OrderError::NotAssignable(to)));
        }
    }

    #[test]
    fn test_strict_rejects_backwards_and_terminal_moves() {
        let mut o = order(PaymentMethod::CashOnDelivery);
        o.assign_status(OrderStatus::Processing, TransitionPolicy::Strict).unwrap();
        assert!(o.assign_status(OrderStatus::Confirmed, TransitionPolicy::Strict).is_err());
        o.assign_status(OrderStatus::Delivered, TransitionPolicy::Strict).unwrap();
        assert!(o.assign_status(OrderStatus::Delivered, TransitionPolicy::Strict).is_err());
    }

    #[test]
    fn test_cancel_guard() {
        let mut o = order(PaymentMethod::CashOnDelivery);
        o.assign_status(OrderStatus::InTransit, TransitionPolicy::Permissive).unwrap();
        assert_eq!(o.cancel_for_request("R1".into()), Err(OrderError::NotCancellable(OrderStatus::InTransit)));
        o.assign_status(OrderStatus::Confirmed, TransitionPolicy::Permissive).unwrap();
        o.cancel_for_request("R1".into()).unwrap();
        assert_eq!(o.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn test_payment_settlement() {
        let mut cod = order(PaymentMethod::CashOnDelivery);
        assert_eq!(cod.settle_payment(true), Err(OrderError::PaymentUnsupported(PaymentMethod::CashOnDelivery)));

        let mut card = order(PaymentMethod::Card);
        card.settle_payment(false).unwrap();
        assert_eq!(card.status(), OrderStatus::AwaitingPayment);
        card.settle_payment(true).unwrap();
        assert_eq!(card.status(), OrderStatus::Pending);
        assert!(card.take_events().iter().any(|e| matches!(e, DomainEvent::Order(OrderEvent::PaymentSettled { success: true, .. }))));
    }
}
